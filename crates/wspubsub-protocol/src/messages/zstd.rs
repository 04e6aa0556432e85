//! ENABLE_ZSTD_PRESET / ENABLE_ZSTD_CUSTOM: the broadcaster announcing a
//! compressor the subscriber may expect from now on.

use bytes::Bytes;

use crate::error::{ProtocolError, ProtocolResult};
use crate::flags::MessageFlags;
use crate::frame::{FrameReader, FrameWriter};
use crate::headers::{Headers, decode_headers};
use crate::integer::{encode_signed, encode_unsigned};
use crate::messages::{MessageCodec, fixed, signed, unsigned};
use crate::types::B2sType;

/// Highest zstd compression level either side may announce.
pub const MAX_COMPRESSION_LEVEL: i16 = 22;

/// First compressor id reserved for dictionaries sent inline.
pub const FIRST_CUSTOM_ID: u64 = 65536;

const ZSTD_HEADERS: &[&str] = &[
    "x-identifier",
    "x-compression-level",
    "x-min-size",
    "x-max-size",
];

/// A preset dictionary (or plain zstd, id 1) both peers already know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableZstdPreset {
    pub identifier: u16,
    pub compression_level: i16,
    pub min_size: u32,
    pub max_size: u64,
}

/// A dictionary the broadcaster trained and ships in the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableZstdCustom {
    pub identifier: u64,
    pub compression_level: i16,
    pub min_size: u32,
    pub max_size: u64,
    pub dictionary: Bytes,
}

fn compression_level(headers: &Headers<'_>) -> ProtocolResult<i16> {
    let level = signed(headers, "x-compression-level", 2)?;
    let level = i16::try_from(level)
        .map_err(|_| ProtocolError::malformed("x-compression-level", "out of range"))?;
    check_level(level)?;
    Ok(level)
}

fn check_level(level: i16) -> ProtocolResult<()> {
    if level > MAX_COMPRESSION_LEVEL {
        return Err(ProtocolError::malformed(
            "x-compression-level",
            format!("{level} exceeds {MAX_COMPRESSION_LEVEL}"),
        ));
    }
    Ok(())
}

fn size_hints(headers: &Headers<'_>) -> ProtocolResult<(u32, u64)> {
    Ok((
        u32::from_be_bytes(fixed(headers, "x-min-size")?),
        u64::from_be_bytes(fixed(headers, "x-max-size")?),
    ))
}

fn write_common(
    writer: &mut FrameWriter,
    identifier: &[u8],
    level: i16,
    min_size: u32,
    max_size: u64,
) -> ProtocolResult<()> {
    check_level(level)?;
    writer
        .header("x-identifier", identifier)?
        .header("x-compression-level", &encode_signed(i64::from(level)))?
        .header("x-min-size", &min_size.to_be_bytes())?
        .header("x-max-size", &max_size.to_be_bytes())?;
    Ok(())
}

impl EnableZstdPreset {
    fn check_identifier(identifier: u64) -> ProtocolResult<u16> {
        u16::try_from(identifier)
            .ok()
            .filter(|id| *id >= 1)
            .ok_or_else(|| {
                ProtocolError::malformed(
                    "x-identifier",
                    format!("preset id {identifier} not in 1..=65535"),
                )
            })
    }
}

impl MessageCodec<B2sType> for EnableZstdPreset {
    fn kinds() -> &'static [B2sType] {
        &[B2sType::EnableZstdPreset]
    }

    fn kind(&self) -> B2sType {
        B2sType::EnableZstdPreset
    }

    fn parse(
        flags: MessageFlags,
        _kind: B2sType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        let headers = decode_headers(flags, reader, ZSTD_HEADERS)?;
        let identifier = Self::check_identifier(unsigned(&headers, "x-identifier", 2)?)?;
        let compression_level = compression_level(&headers)?;
        let (min_size, max_size) = size_hints(&headers)?;
        Ok(Self {
            identifier,
            compression_level,
            min_size,
            max_size,
        })
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        Self::check_identifier(u64::from(self.identifier))?;
        write_common(
            writer,
            &encode_unsigned(u64::from(self.identifier)),
            self.compression_level,
            self.min_size,
            self.max_size,
        )
    }
}

impl EnableZstdCustom {
    fn check_identifier(identifier: u64) -> ProtocolResult<()> {
        if identifier < FIRST_CUSTOM_ID {
            return Err(ProtocolError::malformed(
                "x-identifier",
                format!("custom id {identifier} below {FIRST_CUSTOM_ID}"),
            ));
        }
        Ok(())
    }
}

impl MessageCodec<B2sType> for EnableZstdCustom {
    fn kinds() -> &'static [B2sType] {
        &[B2sType::EnableZstdCustom]
    }

    fn kind(&self) -> B2sType {
        B2sType::EnableZstdCustom
    }

    fn parse(
        flags: MessageFlags,
        _kind: B2sType,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<Self> {
        let headers = decode_headers(flags, reader, ZSTD_HEADERS)?;
        let identifier = unsigned(&headers, "x-identifier", 8)?;
        Self::check_identifier(identifier)?;
        let compression_level = compression_level(&headers)?;
        let (min_size, max_size) = size_hints(&headers)?;
        Ok(Self {
            identifier,
            compression_level,
            min_size,
            max_size,
            dictionary: Bytes::copy_from_slice(reader.read_remaining()),
        })
    }

    fn write(&self, writer: &mut FrameWriter) -> ProtocolResult<()> {
        Self::check_identifier(self.identifier)?;
        write_common(
            writer,
            &encode_unsigned(self.identifier),
            self.compression_level,
            self.min_size,
            self.max_size,
        )?;
        writer.body(&self.dictionary);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::split_frame;

    fn reparse_preset(frame: &[u8]) -> ProtocolResult<EnableZstdPreset> {
        let mut raw = split_frame(frame)?;
        EnableZstdPreset::parse(raw.flags, B2sType::EnableZstdPreset, &mut raw.reader)
    }

    #[test]
    fn preset_rejects_id_zero() {
        let preset = EnableZstdPreset {
            identifier: 0,
            compression_level: 3,
            min_size: 0,
            max_size: u64::MAX,
        };
        assert!(matches!(
            preset.serialize(true),
            Err(ProtocolError::MalformedMessage { header: "x-identifier", .. })
        ));
    }

    #[test]
    fn level_above_ceiling_is_rejected_both_ways() {
        let preset = EnableZstdPreset {
            identifier: 1,
            compression_level: 23,
            min_size: 0,
            max_size: 10,
        };
        assert!(preset.serialize(true).is_err());

        let mut writer = FrameWriter::new(MessageFlags::MINIMAL_HEADERS, 9);
        writer
            .header("x-identifier", &[1])
            .unwrap()
            .header("x-compression-level", &[23])
            .unwrap()
            .header("x-min-size", &[0; 4])
            .unwrap()
            .header("x-max-size", &[0; 8])
            .unwrap();
        assert!(matches!(
            reparse_preset(&writer.finish()),
            Err(ProtocolError::MalformedMessage { header: "x-compression-level", .. })
        ));
    }

    #[test]
    fn negative_levels_are_allowed() {
        let preset = EnableZstdPreset {
            identifier: 1,
            compression_level: -5,
            min_size: 32,
            max_size: 1 << 20,
        };
        let frame = preset.serialize(false).unwrap();
        assert_eq!(reparse_preset(&frame).unwrap(), preset);
    }

    #[test]
    fn custom_id_must_clear_preset_range() {
        let custom = EnableZstdCustom {
            identifier: FIRST_CUSTOM_ID - 1,
            compression_level: 3,
            min_size: 0,
            max_size: u64::MAX,
            dictionary: Bytes::from_static(b"dict"),
        };
        assert!(custom.serialize(true).is_err());

        let custom = EnableZstdCustom {
            identifier: FIRST_CUSTOM_ID,
            ..custom
        };
        let frame = custom.serialize(true).unwrap();
        let mut raw = split_frame(&frame).unwrap();
        let parsed =
            EnableZstdCustom::parse(raw.flags, B2sType::EnableZstdCustom, &mut raw.reader)
                .unwrap();
        assert_eq!(parsed, custom);
    }
}
