//! NOTIFY and CONFIRM_NOTIFY, plus the payload descriptor shared with the
//! first part of a stream.

use bytes::Bytes;

use crate::digest::SHA512_LEN;
use crate::error::{ProtocolError, ProtocolResult};
use crate::flags::MessageFlags;
use crate::frame::{FrameReader, FrameWriter};
use crate::headers::{Headers, decode_headers};
use crate::integer::encode_unsigned;
use crate::messages::{MessageCodec, check_identifier, fixed, identifier, unsigned, utf8};
use crate::types::{B2sType, S2bType};

/// What a notification carries, independent of how it is framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDescriptor {
    pub topic: Bytes,
    /// Negotiated compressor; 0 means the payload is not compressed.
    pub compressor_id: u64,
    pub compressed_length: u64,
    pub decompressed_length: u64,
    /// SHA-512 of the complete compressed payload.
    pub compressed_sha512: [u8; SHA512_LEN],
}

/// Header names of a descriptor, in wire order.
pub(crate) const DESCRIPTOR_HEADERS: &[&str] = &[
    "x-topic",
    "x-compressor",
    "x-compressed-length",
    "x-decompressed-length",
    "x-compressed-sha512",
];

impl PayloadDescriptor {
    pub(crate) fn from_headers(headers: &Headers<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            topic: Bytes::copy_from_slice(headers.require("x-topic")?),
            compressor_id: unsigned(headers, "x-compressor", 8)?,
            compressed_length: unsigned(headers, "x-compressed-length", 8)?,
            decompressed_length: unsigned(headers, "x-decompressed-length", 8)?,
            compressed_sha512: fixed(headers, "x-compressed-sha512")?,
        })
    }

    pub(crate) fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        writer
            .header("x-topic", &self.topic)?
            .header("x-compressor", &encode_unsigned(self.compressor_id))?
            .header(
                "x-compressed-length",
                &encode_unsigned(self.compressed_length),
            )?
            .header(
                "x-decompressed-length",
                &encode_unsigned(self.decompressed_length),
            )?
            .header("x-compressed-sha512", &self.compressed_sha512)?;
        Ok(())
    }
}

/// A notification small enough for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notify {
    pub authorization: String,
    pub identifier: Bytes,
    pub descriptor: PayloadDescriptor,
    /// The whole compressed payload.
    pub body: Bytes,
}

const NOTIFY_HEADERS: &[&str] = &[
    "authorization",
    "x-identifier",
    "x-topic",
    "x-compressor",
    "x-compressed-length",
    "x-decompressed-length",
    "x-compressed-sha512",
];

impl Notify {
    fn check_body(&self) -> ProtocolResult<()> {
        if self.body.len() as u64 != self.descriptor.compressed_length {
            return Err(ProtocolError::malformed(
                "x-compressed-length",
                format!(
                    "declares {} bytes but body has {}",
                    self.descriptor.compressed_length,
                    self.body.len()
                ),
            ));
        }
        Ok(())
    }
}

impl MessageCodec<S2bType> for Notify {
    fn kinds() -> &'static [S2bType] {
        &[S2bType::Notify]
    }

    fn kind(&self) -> S2bType {
        S2bType::Notify
    }

    fn parse(
        flags: MessageFlags,
        _kind: S2bType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        let headers = decode_headers(flags, reader, NOTIFY_HEADERS)?;
        let notify = Self {
            authorization: utf8(&headers, "authorization")?,
            identifier: identifier(&headers)?,
            descriptor: PayloadDescriptor::from_headers(&headers)?,
            body: Bytes::copy_from_slice(reader.read_remaining()),
        };
        notify.check_body()?;
        Ok(notify)
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        check_identifier(&self.identifier)?;
        self.check_body()?;
        writer
            .header("authorization", self.authorization.as_bytes())?
            .header("x-identifier", &self.identifier)?;
        self.descriptor.write(writer)?;
        writer.body(&self.body);
        Ok(())
    }
}

/// Broadcaster finished fanning out a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmNotify {
    pub identifier: Bytes,
    /// Number of subscribers the notification reached.
    pub subscribers: u64,
}

const CONFIRM_NOTIFY_HEADERS: &[&str] = &["x-identifier", "x-subscribers"];

impl MessageCodec<B2sType> for ConfirmNotify {
    fn kinds() -> &'static [B2sType] {
        &[B2sType::ConfirmNotify]
    }

    fn kind(&self) -> B2sType {
        B2sType::ConfirmNotify
    }

    fn parse(
        flags: MessageFlags,
        _kind: B2sType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        let headers = decode_headers(flags, reader, CONFIRM_NOTIFY_HEADERS)?;
        Ok(Self {
            identifier: identifier(&headers)?,
            subscribers: unsigned(&headers, "x-subscribers", 8)?,
        })
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        check_identifier(&self.identifier)?;
        writer
            .header("x-identifier", &self.identifier)?
            .header("x-subscribers", &encode_unsigned(self.subscribers))?;
        Ok(())
    }
}
