//! Multi-frame notifications: NOTIFY_STREAM / RECEIVE_STREAM parts and the
//! CONTINUE_* / CONFIRM_RECEIVE flow control around them.
//!
//! A part always starts with `authorization`, `x-identifier`, `x-part-id`.
//! Only part 0 follows those with the payload descriptor, so the parser
//! decodes the first three, looks at the part id, and then decides whether
//! to read the descriptor.

use bytes::Bytes;

use crate::error::{ProtocolError, ProtocolResult};
use crate::flags::MessageFlags;
use crate::frame::{FrameReader, FrameWriter};
use crate::headers::decode_headers;
use crate::integer::encode_unsigned;
use crate::messages::notify::DESCRIPTOR_HEADERS;
use crate::messages::{MessageCodec, PayloadDescriptor, check_identifier, identifier, unsigned, utf8};
use crate::types::{B2sType, S2bType};

/// Which part of a stream a frame carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPartKind {
    /// Part 0, which describes the whole payload.
    First(PayloadDescriptor),
    /// Any later part.
    Continuation { part_id: u64 },
}

/// One NOTIFY_STREAM (subscriber to broadcaster) or RECEIVE_STREAM
/// (broadcaster to subscriber) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPart {
    pub authorization: String,
    pub identifier: Bytes,
    pub kind: StreamPartKind,
    /// Bytes appended to the compressed payload.
    pub body: Bytes,
}

const PART_HEADERS: &[&str] = &["authorization", "x-identifier", "x-part-id"];

impl StreamPart {
    /// Part id; 0 for the first part.
    pub fn part_id(&self) -> u64 {
        match self.kind {
            StreamPartKind::First(_) => 0,
            StreamPartKind::Continuation { part_id } => part_id,
        }
    }

    /// Descriptor, present on part 0 only.
    pub fn descriptor(&self) -> Option<&PayloadDescriptor> {
        match &self.kind {
            StreamPartKind::First(descriptor) => Some(descriptor),
            StreamPartKind::Continuation { .. } => None,
        }
    }

    fn parse_part(flags: MessageFlags, reader: &mut FrameReader<'_>) -> ProtocolResult<Self> {
        let headers = decode_headers(flags, reader, PART_HEADERS)?;
        let authorization = utf8(&headers, "authorization")?;
        let identifier = identifier(&headers)?;
        let part_id = unsigned(&headers, "x-part-id", 8)?;

        let kind = if part_id == 0 {
            let descriptor_headers = decode_headers(flags, reader, DESCRIPTOR_HEADERS)?;
            StreamPartKind::First(PayloadDescriptor::from_headers(&descriptor_headers)?)
        } else {
            StreamPartKind::Continuation { part_id }
        };

        Ok(Self {
            authorization,
            identifier,
            kind,
            body: Bytes::copy_from_slice(reader.read_remaining()),
        })
    }

    fn write_part(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        check_identifier(&self.identifier)?;
        if let StreamPartKind::Continuation { part_id: 0 } = self.kind {
            return Err(ProtocolError::malformed(
                "x-part-id",
                "part 0 must carry the payload descriptor",
            ));
        }

        writer
            .header("authorization", self.authorization.as_bytes())?
            .header("x-identifier", &self.identifier)?
            .header("x-part-id", &encode_unsigned(self.part_id()))?;
        if let StreamPartKind::First(descriptor) = &self.kind {
            descriptor.write(writer)?;
        }
        writer.body(&self.body);
        Ok(())
    }
}

impl MessageCodec<S2bType> for StreamPart {
    fn kinds() -> &'static [S2bType] {
        &[S2bType::NotifyStream]
    }

    fn kind(&self) -> S2bType {
        S2bType::NotifyStream
    }

    fn parse(
        flags: MessageFlags,
        _kind: S2bType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        Self::parse_part(flags, reader)
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        self.write_part(writer)
    }
}

impl MessageCodec<B2sType> for StreamPart {
    fn kinds() -> &'static [B2sType] {
        &[B2sType::ReceiveStream]
    }

    fn kind(&self) -> B2sType {
        B2sType::ReceiveStream
    }

    fn parse(
        flags: MessageFlags,
        _kind: B2sType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        Self::parse_part(flags, reader)
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        self.write_part(writer)
    }
}

/// CONTINUE_RECEIVE (subscriber) or CONTINUE_NOTIFY (broadcaster): the
/// receiver holds every part up to `part_id` and wants the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamContinue {
    pub identifier: Bytes,
    pub part_id: u64,
}

const CONTINUE_HEADERS: &[&str] = &["x-identifier", "x-part-id"];

impl StreamContinue {
    fn parse_continue(flags: MessageFlags, reader: &mut FrameReader<'_>) -> ProtocolResult<Self> {
        let headers = decode_headers(flags, reader, CONTINUE_HEADERS)?;
        Ok(Self {
            identifier: identifier(&headers)?,
            part_id: unsigned(&headers, "x-part-id", 8)?,
        })
    }

    fn write_continue(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        check_identifier(&self.identifier)?;
        writer
            .header("x-identifier", &self.identifier)?
            .header("x-part-id", &encode_unsigned(self.part_id))?;
        Ok(())
    }
}

impl MessageCodec<S2bType> for StreamContinue {
    fn kinds() -> &'static [S2bType] {
        &[S2bType::ContinueReceive]
    }

    fn kind(&self) -> S2bType {
        S2bType::ContinueReceive
    }

    fn parse(
        flags: MessageFlags,
        _kind: S2bType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        Self::parse_continue(flags, reader)
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        self.write_continue(writer)
    }
}

impl MessageCodec<B2sType> for StreamContinue {
    fn kinds() -> &'static [B2sType] {
        &[B2sType::ContinueNotify]
    }

    fn kind(&self) -> B2sType {
        B2sType::ContinueNotify
    }

    fn parse(
        flags: MessageFlags,
        _kind: B2sType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        Self::parse_continue(flags, reader)
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        self.write_continue(writer)
    }
}

/// Subscriber received and processed a whole notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmReceive {
    pub identifier: Bytes,
}

const CONFIRM_RECEIVE_HEADERS: &[&str] = &["x-identifier"];

impl MessageCodec<S2bType> for ConfirmReceive {
    fn kinds() -> &'static [S2bType] {
        &[S2bType::ConfirmReceive]
    }

    fn kind(&self) -> S2bType {
        S2bType::ConfirmReceive
    }

    fn parse(
        flags: MessageFlags,
        _kind: S2bType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        let headers = decode_headers(flags, reader, CONFIRM_RECEIVE_HEADERS)?;
        Ok(Self {
            identifier: identifier(&headers)?,
        })
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        check_identifier(&self.identifier)?;
        writer.header("x-identifier", &self.identifier)?;
        Ok(())
    }
}
