//! Frame layout.
//!
//! The transport delivers whole messages, so a frame carries no length of
//! its own:
//!
//! ```text
//! +-----------+----------+------------------+-----------------+
//! | flags (1) | type (1) | header section   | body (optional) |
//! +-----------+----------+------------------+-----------------+
//! ```
//!
//! The body, for kinds that have one, is whatever follows the headers.

use bytes::Bytes;

use crate::error::{ProtocolError, ProtocolResult};
use crate::flags::MessageFlags;
use crate::headers::encode_header;

/// Bytes taken by the flags and type code.
pub const FRAME_PREFIX_LEN: usize = 2;

/// A frame with its prefix split off, ready for a codec.
#[derive(Debug)]
pub struct RawFrame<'a> {
    pub flags: MessageFlags,
    pub type_code: u8,
    pub reader: FrameReader<'a>,
}

/// Splits the flags and type code off a received frame.
pub fn split_frame(data: &[u8]) -> ProtocolResult<RawFrame<'_>> {
    if data.len() < FRAME_PREFIX_LEN {
        return Err(ProtocolError::IncompleteFrame {
            expected: FRAME_PREFIX_LEN,
            received: data.len(),
        });
    }

    Ok(RawFrame {
        flags: MessageFlags::from_byte(data[0]),
        type_code: data[1],
        reader: FrameReader::new(&data[FRAME_PREFIX_LEN..]),
    })
}

/// Cursor over the header section and body of one frame.
///
/// Reads never copy; the returned slices borrow from the frame.
#[derive(Debug, Clone)]
pub struct FrameReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> ProtocolResult<u16> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Reads exactly `len` bytes.
    pub fn read_slice(&mut self, len: usize) -> ProtocolResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                ProtocolError::malformed_header(format!(
                    "needed {len} bytes, only {} remain",
                    self.data.len() - self.pos
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Consumes everything left in the frame.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

/// Builds one outgoing frame.
#[derive(Debug)]
pub struct FrameWriter {
    flags: MessageFlags,
    buffer: Vec<u8>,
}

impl FrameWriter {
    /// Starts a frame with the given flags and type code.
    pub fn new(flags: MessageFlags, type_code: u8) -> Self {
        let mut buffer = Vec::with_capacity(64);
        buffer.push(flags.to_byte());
        buffer.push(type_code);
        Self { flags, buffer }
    }

    /// Flags this frame is written with.
    pub fn flags(&self) -> MessageFlags {
        self.flags
    }

    /// Appends one header in the frame's header mode.
    pub fn header(&mut self, name: &str, value: &[u8]) -> ProtocolResult<&mut Self> {
        encode_header(&mut self.buffer, self.flags, name, value)?;
        Ok(self)
    }

    /// Appends the body. Must come after every header.
    pub fn body(&mut self, body: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(body);
        self
    }

    /// Returns the finished frame.
    pub fn finish(self) -> Bytes {
        Bytes::from(self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_rejects_short_frames() {
        assert_eq!(
            split_frame(&[1]).unwrap_err(),
            ProtocolError::IncompleteFrame {
                expected: 2,
                received: 1
            }
        );
    }

    #[test]
    fn split_reads_prefix() {
        let frame = split_frame(&[1, 7, 0xaa]).unwrap();
        assert!(frame.flags.minimal_headers());
        assert_eq!(frame.type_code, 7);
        assert_eq!(frame.reader.remaining(), 1);
    }

    #[test]
    fn reader_rejects_overrun() {
        let mut reader = FrameReader::new(&[0, 5, 1, 2]);
        assert_eq!(reader.read_u16().unwrap(), 5);
        assert!(matches!(
            reader.read_slice(5),
            Err(ProtocolError::MalformedHeader { .. })
        ));
        // failed reads leave the cursor untouched
        assert_eq!(reader.read_remaining(), &[1, 2]);
        assert!(reader.is_empty());
    }

    #[test]
    fn writer_emits_prefix_then_headers_then_body() {
        let mut writer = FrameWriter::new(MessageFlags::MINIMAL_HEADERS, 3);
        writer.header("x-glob", b"a*").unwrap();
        writer.body(b"zz");
        assert_eq!(&writer.finish()[..], &[1, 3, 0, 2, b'a', b'*', b'z', b'z']);
    }
}
