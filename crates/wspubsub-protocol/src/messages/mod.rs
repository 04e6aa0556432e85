//! Typed messages and their codecs.
//!
//! Every message kind is a plain struct implementing [`MessageCodec`] for
//! the direction(s) it travels in. Kinds with identical layouts share one
//! struct (e.g. [`StreamPart`] is both NOTIFY_STREAM and RECEIVE_STREAM).
//! [`S2bMessage`] and [`B2sMessage`] are the tagged unions handed to and
//! from the dispatcher.

mod configure;
mod notify;
mod stream;
mod subscription;
mod zstd;

pub use configure::{ConfirmConfigure, Configure};
pub use notify::{ConfirmNotify, Notify, PayloadDescriptor};
pub use stream::{ConfirmReceive, StreamContinue, StreamPart, StreamPartKind};
pub use subscription::{
    ConfirmExactSubscription, ConfirmGlobSubscription, ExactSubscription, GlobSubscription,
    SubscriptionAction, compile_glob,
};
pub use zstd::{EnableZstdCustom, EnableZstdPreset, FIRST_CUSTOM_ID, MAX_COMPRESSION_LEVEL};

use bytes::Bytes;

use crate::error::{ProtocolError, ProtocolResult};
use crate::flags::MessageFlags;
use crate::frame::{FrameReader, FrameWriter};
use crate::headers::Headers;
use crate::integer::{decode_signed, decode_unsigned};
use crate::types::{B2sType, MessageKind, S2bType};

/// Longest `x-identifier` a notification may use.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Parse and serialize one message kind.
pub trait MessageCodec<K: MessageKind>: Sized {
    /// Type codes this codec accepts.
    fn kinds() -> &'static [K];

    /// Type code this value serializes as.
    fn kind(&self) -> K;

    /// Decodes the header section and body. `kind` is one of [`Self::kinds`].
    fn parse(flags: MessageFlags, kind: K, reader: &mut FrameReader<'_>) -> ProtocolResult<Self>;

    /// Writes headers and body; the inverse of [`MessageCodec::parse`].
    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()>;

    /// Produces a complete frame.
    fn serialize(&self, minimal_headers: bool) -> ProtocolResult<Bytes> {
        let mut writer = FrameWriter::new(
            MessageFlags::for_headers(minimal_headers),
            self.kind().code(),
        );
        self.write(&mut writer)?;
        Ok(writer.finish())
    }
}

/// Any message a subscriber sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S2bMessage {
    Configure(Configure),
    ExactSubscription(ExactSubscription),
    GlobSubscription(GlobSubscription),
    Notify(Notify),
    NotifyStream(StreamPart),
    ContinueReceive(StreamContinue),
    ConfirmReceive(ConfirmReceive),
}

impl S2bMessage {
    /// Type code of this message.
    pub fn kind(&self) -> S2bType {
        match self {
            Self::Configure(m) => m.kind(),
            Self::ExactSubscription(m) => m.kind(),
            Self::GlobSubscription(m) => m.kind(),
            Self::Notify(m) => m.kind(),
            Self::NotifyStream(m) => MessageCodec::<S2bType>::kind(m),
            Self::ContinueReceive(m) => MessageCodec::<S2bType>::kind(m),
            Self::ConfirmReceive(m) => m.kind(),
        }
    }

    /// Serializes with the codec for this variant.
    pub fn serialize(&self, minimal_headers: bool) -> ProtocolResult<Bytes> {
        match self {
            Self::Configure(m) => m.serialize(minimal_headers),
            Self::ExactSubscription(m) => m.serialize(minimal_headers),
            Self::GlobSubscription(m) => m.serialize(minimal_headers),
            Self::Notify(m) => m.serialize(minimal_headers),
            Self::NotifyStream(m) => MessageCodec::<S2bType>::serialize(m, minimal_headers),
            Self::ContinueReceive(m) => MessageCodec::<S2bType>::serialize(m, minimal_headers),
            Self::ConfirmReceive(m) => m.serialize(minimal_headers),
        }
    }
}

/// Any message a broadcaster sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum B2sMessage {
    ConfirmConfigure(ConfirmConfigure),
    ConfirmExactSubscription(ConfirmExactSubscription),
    ConfirmGlobSubscription(ConfirmGlobSubscription),
    ConfirmNotify(ConfirmNotify),
    ContinueNotify(StreamContinue),
    ReceiveStream(StreamPart),
    EnableZstdPreset(EnableZstdPreset),
    EnableZstdCustom(EnableZstdCustom),
}

impl B2sMessage {
    /// Type code of this message.
    pub fn kind(&self) -> B2sType {
        match self {
            Self::ConfirmConfigure(m) => m.kind(),
            Self::ConfirmExactSubscription(m) => m.kind(),
            Self::ConfirmGlobSubscription(m) => m.kind(),
            Self::ConfirmNotify(m) => m.kind(),
            Self::ContinueNotify(m) => MessageCodec::<B2sType>::kind(m),
            Self::ReceiveStream(m) => MessageCodec::<B2sType>::kind(m),
            Self::EnableZstdPreset(m) => m.kind(),
            Self::EnableZstdCustom(m) => m.kind(),
        }
    }

    /// Serializes with the codec for this variant.
    pub fn serialize(&self, minimal_headers: bool) -> ProtocolResult<Bytes> {
        match self {
            Self::ConfirmConfigure(m) => m.serialize(minimal_headers),
            Self::ConfirmExactSubscription(m) => m.serialize(minimal_headers),
            Self::ConfirmGlobSubscription(m) => m.serialize(minimal_headers),
            Self::ConfirmNotify(m) => m.serialize(minimal_headers),
            Self::ContinueNotify(m) => MessageCodec::<B2sType>::serialize(m, minimal_headers),
            Self::ReceiveStream(m) => MessageCodec::<B2sType>::serialize(m, minimal_headers),
            Self::EnableZstdPreset(m) => m.serialize(minimal_headers),
            Self::EnableZstdCustom(m) => m.serialize(minimal_headers),
        }
    }
}

macro_rules! impl_from_variant {
    ($message:ident { $($variant:ident($inner:ty)),* $(,)? }) => {
        $(
            impl From<$inner> for $message {
                fn from(inner: $inner) -> Self {
                    Self::$variant(inner)
                }
            }
        )*
    };
}

impl_from_variant!(S2bMessage {
    Configure(Configure),
    ExactSubscription(ExactSubscription),
    GlobSubscription(GlobSubscription),
    Notify(Notify),
    NotifyStream(StreamPart),
    ContinueReceive(StreamContinue),
    ConfirmReceive(ConfirmReceive),
});

impl_from_variant!(B2sMessage {
    ConfirmConfigure(ConfirmConfigure),
    ConfirmExactSubscription(ConfirmExactSubscription),
    ConfirmGlobSubscription(ConfirmGlobSubscription),
    ConfirmNotify(ConfirmNotify),
    ContinueNotify(StreamContinue),
    ReceiveStream(StreamPart),
    EnableZstdPreset(EnableZstdPreset),
    EnableZstdCustom(EnableZstdCustom),
});

// Field helpers shared by the codecs. Each maps a bad value to a
// MalformedMessage naming the header.

pub(crate) fn bounded<'a>(
    headers: &Headers<'a>,
    name: &'static str,
    max_len: usize,
) -> ProtocolResult<&'a [u8]> {
    let value = headers.require(name)?;
    if value.len() > max_len {
        return Err(ProtocolError::malformed(
            name,
            format!("{} bytes (max {max_len})", value.len()),
        ));
    }
    Ok(value)
}

pub(crate) fn fixed<const N: usize>(
    headers: &Headers<'_>,
    name: &'static str,
) -> ProtocolResult<[u8; N]> {
    let value = headers.require(name)?;
    value
        .try_into()
        .map_err(|_| ProtocolError::malformed(name, format!("{} bytes (need {N})", value.len())))
}

pub(crate) fn unsigned(
    headers: &Headers<'_>,
    name: &'static str,
    max_len: usize,
) -> ProtocolResult<u64> {
    let value = bounded(headers, name, max_len)?;
    decode_unsigned(value).ok_or_else(|| ProtocolError::malformed(name, "integer overflow"))
}

pub(crate) fn signed(
    headers: &Headers<'_>,
    name: &'static str,
    max_len: usize,
) -> ProtocolResult<i64> {
    let value = bounded(headers, name, max_len)?;
    decode_signed(value).ok_or_else(|| ProtocolError::malformed(name, "integer overflow"))
}

pub(crate) fn boolean(headers: &Headers<'_>, name: &'static str) -> ProtocolResult<bool> {
    match fixed::<1>(headers, name)? {
        [0] => Ok(false),
        [1] => Ok(true),
        [other] => Err(ProtocolError::malformed(
            name,
            format!("expected 0 or 1, got {other}"),
        )),
    }
}

pub(crate) fn utf8(headers: &Headers<'_>, name: &'static str) -> ProtocolResult<String> {
    let value = headers.require(name)?;
    String::from_utf8(value.to_vec())
        .map_err(|_| ProtocolError::malformed(name, "not valid utf-8"))
}

pub(crate) fn identifier(headers: &Headers<'_>) -> ProtocolResult<Bytes> {
    bounded(headers, "x-identifier", MAX_IDENTIFIER_LEN).map(Bytes::copy_from_slice)
}

pub(crate) fn check_identifier(identifier: &[u8]) -> ProtocolResult<()> {
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(ProtocolError::malformed(
            "x-identifier",
            format!("{} bytes (max {MAX_IDENTIFIER_LEN})", identifier.len()),
        ));
    }
    Ok(())
}
