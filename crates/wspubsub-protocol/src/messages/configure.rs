//! CONFIGURE / CONFIRM_CONFIGURE: the handshake that seeds the connection
//! nonce and says whether the subscriber accepts zstd.

use crate::digest::NONCE_LEN;
use crate::error::ProtocolResult;
use crate::flags::MessageFlags;
use crate::frame::{FrameReader, FrameWriter};
use crate::headers::decode_headers;
use crate::messages::{MessageCodec, boolean, fixed};
use crate::types::{B2sType, S2bType};

/// First frame on every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configure {
    /// Subscriber's half of the connection nonce.
    pub subscriber_nonce: [u8; NONCE_LEN],
    /// Subscriber will accept zstd compressed payloads.
    pub enable_zstd: bool,
    /// Subscriber will accept dictionaries trained on this connection.
    pub enable_training: bool,
    /// Preset dictionary the subscriber would like; 0 for none.
    pub initial_dict: u16,
}

const CONFIGURE_HEADERS: &[&str] = &[
    "x-subscriber-nonce",
    "x-enable-zstd",
    "x-enable-training",
    "x-initial-dict",
];

impl MessageCodec<S2bType> for Configure {
    fn kinds() -> &'static [S2bType] {
        &[S2bType::Configure]
    }

    fn kind(&self) -> S2bType {
        S2bType::Configure
    }

    fn parse(
        flags: MessageFlags,
        _kind: S2bType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        let headers = decode_headers(flags, reader, CONFIGURE_HEADERS)?;
        Ok(Self {
            subscriber_nonce: fixed(&headers, "x-subscriber-nonce")?,
            enable_zstd: boolean(&headers, "x-enable-zstd")?,
            enable_training: boolean(&headers, "x-enable-training")?,
            initial_dict: u16::from_be_bytes(fixed(&headers, "x-initial-dict")?),
        })
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        writer
            .header("x-subscriber-nonce", &self.subscriber_nonce)?
            .header("x-enable-zstd", &[u8::from(self.enable_zstd)])?
            .header("x-enable-training", &[u8::from(self.enable_training)])?
            .header("x-initial-dict", &self.initial_dict.to_be_bytes())?;
        Ok(())
    }
}

/// Broadcaster's reply to [`Configure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmConfigure {
    /// Broadcaster's half of the connection nonce.
    pub broadcaster_nonce: [u8; NONCE_LEN],
}

const CONFIRM_CONFIGURE_HEADERS: &[&str] = &["x-broadcaster-nonce"];

impl MessageCodec<B2sType> for ConfirmConfigure {
    fn kinds() -> &'static [B2sType] {
        &[B2sType::ConfirmConfigure]
    }

    fn kind(&self) -> B2sType {
        B2sType::ConfirmConfigure
    }

    fn parse(
        flags: MessageFlags,
        _kind: B2sType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        let headers = decode_headers(flags, reader, CONFIRM_CONFIGURE_HEADERS)?;
        Ok(Self {
            broadcaster_nonce: fixed(&headers, "x-broadcaster-nonce")?,
        })
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        writer.header("x-broadcaster-nonce", &self.broadcaster_nonce)?;
        Ok(())
    }
}
