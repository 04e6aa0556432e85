//! Minimal-length big-endian integers.
//!
//! Numeric header values are sent with as few bytes as possible. The header
//! codec supplies the length prefix, so nothing here is self-delimiting.
//! Zero encodes as a single `0x00` byte, never as an empty value.

/// Widest value either codec accepts.
pub const MAX_INTEGER_LEN: usize = 8;

/// Encodes `n` using the fewest big-endian bytes (1..=8).
pub fn encode_unsigned(n: u64) -> Vec<u8> {
    let bytes = n.to_be_bytes();
    let skip = ((n.leading_zeros() / 8) as usize).min(MAX_INTEGER_LEN - 1);
    bytes[skip..].to_vec()
}

/// Encodes `n` as minimal two's complement (1..=8 bytes).
///
/// A leading byte is dropped only while the sign bit of the byte after it
/// still carries the same sign, so `128` needs `00 80` and `-1` is `ff`.
pub fn encode_signed(n: i64) -> Vec<u8> {
    let bytes = n.to_be_bytes();
    let mut start = 0;
    while start < MAX_INTEGER_LEN - 1 {
        let next_negative = bytes[start + 1] & 0x80 != 0;
        let redundant = (bytes[start] == 0x00 && !next_negative)
            || (bytes[start] == 0xff && next_negative);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Decodes a big-endian unsigned value. Returns `None` above 8 bytes.
///
/// Leading zero bytes and the empty slice are tolerated on input.
pub fn decode_unsigned(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > MAX_INTEGER_LEN {
        return None;
    }
    let mut buf = [0u8; MAX_INTEGER_LEN];
    buf[MAX_INTEGER_LEN - bytes.len()..].copy_from_slice(bytes);
    Some(u64::from_be_bytes(buf))
}

/// Decodes a big-endian two's complement value. Returns `None` above 8 bytes.
pub fn decode_signed(bytes: &[u8]) -> Option<i64> {
    if bytes.len() > MAX_INTEGER_LEN {
        return None;
    }
    let fill = match bytes.first() {
        Some(first) if first & 0x80 != 0 => 0xff,
        _ => 0x00,
    };
    let mut buf = [fill; MAX_INTEGER_LEN];
    buf[MAX_INTEGER_LEN - bytes.len()..].copy_from_slice(bytes);
    Some(i64::from_be_bytes(buf))
}
