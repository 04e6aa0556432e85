//! Header section codec.
//!
//! Two interchangeable encodings, selected per frame by
//! [`MessageFlags::MINIMAL_HEADERS`]:
//!
//! - explicit: `[name len u16][name][value len u16][value]` per header
//! - minimal: `[value len u16][value]` per header, in the kind's fixed order
//!
//! Neither form has a terminator; the message kind knows how many headers
//! to expect. Values are opaque here, each codec validates its own.

use crate::error::{ProtocolError, ProtocolResult};
use crate::flags::MessageFlags;
use crate::frame::FrameReader;

/// Longest header name or value.
pub const MAX_HEADER_LEN: usize = u16::MAX as usize;

/// Appends one header to `out` in the mode chosen by `flags`.
pub fn encode_header(
    out: &mut Vec<u8>,
    flags: MessageFlags,
    name: &str,
    value: &[u8],
) -> ProtocolResult<()> {
    if name.len() > MAX_HEADER_LEN {
        return Err(ProtocolError::malformed_header(format!(
            "header name is {} bytes (max {MAX_HEADER_LEN})",
            name.len()
        )));
    }
    if value.len() > MAX_HEADER_LEN {
        return Err(ProtocolError::malformed_header(format!(
            "{name} value is {} bytes (max {MAX_HEADER_LEN})",
            value.len()
        )));
    }

    if !flags.minimal_headers() {
        out.extend_from_slice(&(name.len() as u16).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
    }
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value);
    Ok(())
}

/// Encodes a whole header section.
pub fn encode_headers(
    flags: MessageFlags,
    names: &[&str],
    values: &[&[u8]],
) -> ProtocolResult<Vec<u8>> {
    if names.len() != values.len() {
        return Err(ProtocolError::malformed_header(format!(
            "{} names but {} values",
            names.len(),
            values.len()
        )));
    }

    let mut out = Vec::new();
    for (name, value) in names.iter().zip(values) {
        encode_header(&mut out, flags, name, value)?;
    }
    Ok(out)
}

/// Decoded headers, borrowing their values from the frame.
#[derive(Debug, Clone, Default)]
pub struct Headers<'a> {
    entries: Vec<(&'static str, &'a [u8])>,
}

impl<'a> Headers<'a> {
    /// Value of `name`, if it was present.
    pub fn get(&self, name: &str) -> Option<&'a [u8]> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| *value)
    }

    /// Value of `name`, or a malformed header error.
    pub fn require(&self, name: &'static str) -> ProtocolResult<&'a [u8]> {
        self.get(name)
            .ok_or_else(|| ProtocolError::malformed_header(format!("missing header {name}")))
    }

    /// Number of decoded headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no header was decoded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads `expected.len()` headers from `reader`.
///
/// In minimal mode the values are assigned to `expected` positionally. In
/// explicit mode each name must be one of `expected` and appear only once;
/// order is free.
pub fn decode_headers<'a>(
    flags: MessageFlags,
    reader: &mut FrameReader<'a>,
    expected: &[&'static str],
) -> ProtocolResult<Headers<'a>> {
    let mut entries = Vec::with_capacity(expected.len());

    if flags.minimal_headers() {
        for name in expected {
            let len = reader.read_u16()? as usize;
            let value = reader.read_slice(len)?;
            entries.push((*name, value));
        }
        return Ok(Headers { entries });
    }

    for _ in 0..expected.len() {
        let name_len = reader.read_u16()? as usize;
        let raw_name = reader.read_slice(name_len)?;
        let name = expected
            .iter()
            .copied()
            .find(|candidate| candidate.as_bytes() == raw_name)
            .ok_or_else(|| {
                ProtocolError::malformed(
                    "header name",
                    format!("unexpected header {:?}", String::from_utf8_lossy(raw_name)),
                )
            })?;
        if entries.iter().any(|(seen, _)| *seen == name) {
            return Err(ProtocolError::malformed(name, "repeated header"));
        }

        let value_len = reader.read_u16()? as usize;
        let value = reader.read_slice(value_len)?;
        entries.push((name, value));
    }

    Ok(Headers { entries })
}
