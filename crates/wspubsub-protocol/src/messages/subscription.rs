//! SUBSCRIBE / UNSUBSCRIBE requests and their confirmations.
//!
//! Subscribe and unsubscribe share a layout, so one struct covers both
//! type codes and records which one it was in `action`.

use bytes::Bytes;

use crate::error::{ProtocolError, ProtocolResult};
use crate::flags::MessageFlags;
use crate::frame::{FrameReader, FrameWriter};
use crate::headers::decode_headers;
use crate::messages::{MessageCodec, utf8};
use crate::types::{B2sType, S2bType};

/// Whether a request adds or removes interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

/// SUBSCRIBE_EXACT or UNSUBSCRIBE_EXACT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactSubscription {
    pub action: SubscriptionAction,
    pub authorization: String,
    pub topic: Bytes,
}

const EXACT_HEADERS: &[&str] = &["authorization", "x-topic"];

/// Compiles an `x-glob` pattern.
///
/// Standard glob syntax: `*` and `?` also match `/`, `[...]` is a class.
pub fn compile_glob(glob: &str) -> ProtocolResult<glob::Pattern> {
    glob::Pattern::new(glob).map_err(|e| ProtocolError::malformed("x-glob", e.to_string()))
}

impl MessageCodec<S2bType> for ExactSubscription {
    fn kinds() -> &'static [S2bType] {
        &[S2bType::SubscribeExact, S2bType::UnsubscribeExact]
    }

    fn kind(&self) -> S2bType {
        match self.action {
            SubscriptionAction::Subscribe => S2bType::SubscribeExact,
            SubscriptionAction::Unsubscribe => S2bType::UnsubscribeExact,
        }
    }

    fn parse(
        flags: MessageFlags,
        kind: S2bType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        let headers = decode_headers(flags, reader, EXACT_HEADERS)?;
        let action = if kind == S2bType::SubscribeExact {
            SubscriptionAction::Subscribe
        } else {
            SubscriptionAction::Unsubscribe
        };
        Ok(Self {
            action,
            authorization: utf8(&headers, "authorization")?,
            topic: Bytes::copy_from_slice(headers.require("x-topic")?),
        })
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        writer
            .header("authorization", self.authorization.as_bytes())?
            .header("x-topic", &self.topic)?;
        Ok(())
    }
}

/// SUBSCRIBE_GLOB or UNSUBSCRIBE_GLOB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobSubscription {
    pub action: SubscriptionAction,
    pub authorization: String,
    pub glob: String,
}

const GLOB_HEADERS: &[&str] = &["authorization", "x-glob"];

impl MessageCodec<S2bType> for GlobSubscription {
    fn kinds() -> &'static [S2bType] {
        &[S2bType::SubscribeGlob, S2bType::UnsubscribeGlob]
    }

    fn kind(&self) -> S2bType {
        match self.action {
            SubscriptionAction::Subscribe => S2bType::SubscribeGlob,
            SubscriptionAction::Unsubscribe => S2bType::UnsubscribeGlob,
        }
    }

    fn parse(
        flags: MessageFlags,
        kind: S2bType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        let headers = decode_headers(flags, reader, GLOB_HEADERS)?;
        let action = if kind == S2bType::SubscribeGlob {
            SubscriptionAction::Subscribe
        } else {
            SubscriptionAction::Unsubscribe
        };
        let glob = utf8(&headers, "x-glob")?;
        compile_glob(&glob)?;
        Ok(Self {
            action,
            authorization: utf8(&headers, "authorization")?,
            glob,
        })
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        compile_glob(&self.glob)?;
        writer
            .header("authorization", self.authorization.as_bytes())?
            .header("x-glob", self.glob.as_bytes())?;
        Ok(())
    }
}

/// CONFIRM_SUBSCRIBE_EXACT or CONFIRM_UNSUBSCRIBE_EXACT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmExactSubscription {
    pub action: SubscriptionAction,
    pub topic: Bytes,
}

const CONFIRM_EXACT_HEADERS: &[&str] = &["x-topic"];

impl MessageCodec<B2sType> for ConfirmExactSubscription {
    fn kinds() -> &'static [B2sType] {
        &[
            B2sType::ConfirmSubscribeExact,
            B2sType::ConfirmUnsubscribeExact,
        ]
    }

    fn kind(&self) -> B2sType {
        match self.action {
            SubscriptionAction::Subscribe => B2sType::ConfirmSubscribeExact,
            SubscriptionAction::Unsubscribe => B2sType::ConfirmUnsubscribeExact,
        }
    }

    fn parse(
        flags: MessageFlags,
        kind: B2sType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        let headers = decode_headers(flags, reader, CONFIRM_EXACT_HEADERS)?;
        let action = if kind == B2sType::ConfirmSubscribeExact {
            SubscriptionAction::Subscribe
        } else {
            SubscriptionAction::Unsubscribe
        };
        Ok(Self {
            action,
            topic: Bytes::copy_from_slice(headers.require("x-topic")?),
        })
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        writer.header("x-topic", &self.topic)?;
        Ok(())
    }
}

/// CONFIRM_SUBSCRIBE_GLOB or CONFIRM_UNSUBSCRIBE_GLOB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmGlobSubscription {
    pub action: SubscriptionAction,
    pub glob: String,
}

const CONFIRM_GLOB_HEADERS: &[&str] = &["x-glob"];

impl MessageCodec<B2sType> for ConfirmGlobSubscription {
    fn kinds() -> &'static [B2sType] {
        &[
            B2sType::ConfirmSubscribeGlob,
            B2sType::ConfirmUnsubscribeGlob,
        ]
    }

    fn kind(&self) -> B2sType {
        match self.action {
            SubscriptionAction::Subscribe => B2sType::ConfirmSubscribeGlob,
            SubscriptionAction::Unsubscribe => B2sType::ConfirmUnsubscribeGlob,
        }
    }

    fn parse(
        flags: MessageFlags,
        kind: B2sType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        let headers = decode_headers(flags, reader, CONFIRM_GLOB_HEADERS)?;
        let action = if kind == B2sType::ConfirmSubscribeGlob {
            SubscriptionAction::Subscribe
        } else {
            SubscriptionAction::Unsubscribe
        };
        Ok(Self {
            action,
            glob: utf8(&headers, "x-glob")?,
        })
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        writer.header("x-glob", self.glob.as_bytes())?;
        Ok(())
    }
}
