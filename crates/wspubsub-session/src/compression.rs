//! Compression negotiation and the engine that does the actual work.
//!
//! Compressor ids:
//! - `0`: no compression, always acceptable
//! - `1`: zstd without a dictionary
//! - `2..=65535`: preset dictionaries both sides know out-of-band
//! - `65536..`: dictionaries trained by the broadcaster and sent inline
//!
//! Only the two most recent custom dictionaries are kept. The newest one
//! is used for new payloads; the older one stays around so payloads
//! compressed just before the switch still decode.

#[cfg(feature = "zstd")]
use std::collections::HashMap;
use std::collections::VecDeque;

use bytes::Bytes;
use tracing::debug;
use wspubsub_protocol::{
    EnableZstdCustom, EnableZstdPreset, FIRST_CUSTOM_ID, MAX_COMPRESSION_LEVEL,
};

use crate::error::{SessionError, SessionResult};

/// Custom dictionaries retained per connection.
pub const MAX_CUSTOM_DICTIONARIES: usize = 2;

/// Compressor id for zstd without a dictionary.
pub const ZSTD_PLAIN_ID: u64 = 1;

/// One negotiated compressor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressorEntry {
    pub id: u64,
    pub level: i16,
    /// Advisory only.
    pub min_size_hint: u32,
    /// Advisory only; `u64::MAX` for unbounded.
    pub max_size_hint: u64,
    /// Present for custom dictionaries.
    pub dictionary: Option<Bytes>,
}

impl CompressorEntry {
    /// The "no compression" entry.
    pub fn none() -> Self {
        Self {
            id: 0,
            level: 0,
            min_size_hint: 0,
            max_size_hint: u64::MAX,
            dictionary: None,
        }
    }

    /// Whether this is a dictionary sent inline.
    pub fn is_custom(&self) -> bool {
        self.id >= FIRST_CUSTOM_ID
    }

    /// Whether `len` falls inside the size hints.
    pub fn suits(&self, len: usize) -> bool {
        let len = len as u64;
        len >= u64::from(self.min_size_hint) && len <= self.max_size_hint
    }
}

impl From<&EnableZstdPreset> for CompressorEntry {
    fn from(message: &EnableZstdPreset) -> Self {
        Self {
            id: u64::from(message.identifier),
            level: message.compression_level,
            min_size_hint: message.min_size,
            max_size_hint: message.max_size,
            dictionary: None,
        }
    }
}

impl From<&EnableZstdCustom> for CompressorEntry {
    fn from(message: &EnableZstdCustom) -> Self {
        Self {
            id: message.identifier,
            level: message.compression_level,
            min_size_hint: message.min_size,
            max_size_hint: message.max_size,
            dictionary: Some(message.dictionary.clone()),
        }
    }
}

/// Which compressors are valid on one connection.
#[derive(Debug, Clone)]
pub struct CompressionNegotiation {
    enabled: bool,
    training: bool,
    /// Ordered oldest to newest announcement.
    presets: Vec<CompressorEntry>,
    customs: VecDeque<CompressorEntry>,
}

impl CompressionNegotiation {
    /// Creates state for a connection that did (or did not) enable zstd.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            training: enabled,
            presets: Vec::new(),
            customs: VecDeque::with_capacity(MAX_CUSTOM_DICTIONARIES + 1),
        }
    }

    /// Builder: whether custom dictionaries may be announced.
    pub fn with_training(mut self, training: bool) -> Self {
        self.training = self.enabled && training;
        self
    }

    /// Whether zstd was enabled at CONFIGURE.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether custom dictionaries may be announced.
    pub fn training_enabled(&self) -> bool {
        self.training
    }

    fn check_level(level: i16) -> SessionResult<()> {
        if level > MAX_COMPRESSION_LEVEL {
            return Err(SessionError::violation(format!(
                "compression level {level} exceeds {MAX_COMPRESSION_LEVEL}"
            )));
        }
        Ok(())
    }

    /// Registers a preset (or plain zstd, id 1), replacing an earlier
    /// announcement of the same id.
    pub fn announce_preset(&mut self, entry: CompressorEntry) -> SessionResult<()> {
        if !self.enabled {
            return Err(SessionError::violation("zstd announced but not enabled"));
        }
        if entry.id == 0 || entry.id >= FIRST_CUSTOM_ID {
            return Err(SessionError::violation(format!(
                "preset id {} not in 1..{FIRST_CUSTOM_ID}",
                entry.id
            )));
        }
        Self::check_level(entry.level)?;

        debug!(compressor_id = entry.id, level = entry.level, "Preset enabled");
        self.presets.retain(|preset| preset.id != entry.id);
        self.presets.push(CompressorEntry {
            dictionary: None,
            ..entry
        });
        Ok(())
    }

    /// Registers a custom dictionary, evicting the oldest beyond
    /// [`MAX_CUSTOM_DICTIONARIES`].
    pub fn announce_custom(&mut self, entry: CompressorEntry) -> SessionResult<()> {
        if !self.training {
            return Err(SessionError::violation(
                "custom dictionary announced but training is not enabled",
            ));
        }
        if entry.id < FIRST_CUSTOM_ID {
            return Err(SessionError::violation(format!(
                "custom id {} below {FIRST_CUSTOM_ID}",
                entry.id
            )));
        }
        if entry.dictionary.is_none() {
            return Err(SessionError::violation("custom compressor without dictionary"));
        }
        Self::check_level(entry.level)?;

        debug!(compressor_id = entry.id, level = entry.level, "Custom dictionary enabled");
        self.customs.retain(|custom| custom.id != entry.id);
        self.customs.push_back(entry);
        while self.customs.len() > MAX_CUSTOM_DICTIONARIES {
            if let Some(evicted) = self.customs.pop_front() {
                debug!(compressor_id = evicted.id, "Custom dictionary evicted");
            }
        }
        Ok(())
    }

    /// Applies an ENABLE_ZSTD_PRESET frame.
    pub fn apply_preset(&mut self, message: &EnableZstdPreset) -> SessionResult<()> {
        self.announce_preset(CompressorEntry::from(message))
    }

    /// Applies an ENABLE_ZSTD_CUSTOM frame.
    pub fn apply_custom(&mut self, message: &EnableZstdCustom) -> SessionResult<()> {
        self.announce_custom(CompressorEntry::from(message))
    }

    /// Compressor for new outbound payloads: newest custom dictionary,
    /// else newest preset, else none.
    pub fn current_outbound_compressor(&self) -> CompressorEntry {
        self.customs
            .back()
            .or_else(|| self.presets.last())
            .cloned()
            .unwrap_or_else(CompressorEntry::none)
    }

    /// Compressor for a new payload of `len` bytes: the current one when
    /// the engine can use it and the size hints fit, otherwise none.
    pub fn outbound_for(&self, len: usize, engine: &dyn CompressionEngine) -> CompressorEntry {
        let current = self.current_outbound_compressor();
        if current.id != 0 && current.suits(len) && engine.supports(&current) {
            current
        } else {
            CompressorEntry::none()
        }
    }

    /// Entry needed to decompress a payload tagged with `id`.
    pub fn resolve(&self, id: u64) -> Option<CompressorEntry> {
        if id == 0 {
            return Some(CompressorEntry::none());
        }
        if !self.enabled {
            return None;
        }
        let announced = self
            .presets
            .iter()
            .chain(self.customs.iter())
            .find(|entry| entry.id == id)
            .cloned();
        if announced.is_none() && id == ZSTD_PLAIN_ID {
            return Some(CompressorEntry {
                id: ZSTD_PLAIN_ID,
                ..CompressorEntry::none()
            });
        }
        announced
    }

    /// Whether a payload tagged with `id` may be accepted.
    pub fn is_acceptable_for_decompression(&self, id: u64) -> bool {
        self.resolve(id).is_some()
    }

    /// Ids of the retained custom dictionaries, oldest first.
    pub fn retained_custom_ids(&self) -> Vec<u64> {
        self.customs.iter().map(|entry| entry.id).collect()
    }
}

/// Does the compression math for negotiated compressors.
pub trait CompressionEngine: Send {
    /// Whether `entry` can be used with this engine.
    fn supports(&self, entry: &CompressorEntry) -> bool;

    /// Compresses a payload.
    fn compress(&mut self, payload: &[u8], entry: &CompressorEntry) -> SessionResult<Bytes>;

    /// Decompresses a payload expected to be `decompressed_length` bytes.
    fn decompress(
        &mut self,
        payload: &[u8],
        entry: &CompressorEntry,
        decompressed_length: u64,
    ) -> SessionResult<Bytes>;

    /// Trains a dictionary of at most `max_size` bytes from recent payloads.
    fn train_dictionary(&mut self, samples: &[Bytes], max_size: usize) -> SessionResult<Bytes>;
}

/// Engine that only handles compressor 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityEngine;

impl CompressionEngine for IdentityEngine {
    fn supports(&self, entry: &CompressorEntry) -> bool {
        entry.id == 0
    }

    fn compress(&mut self, payload: &[u8], entry: &CompressorEntry) -> SessionResult<Bytes> {
        if entry.id != 0 {
            return Err(SessionError::compression(format!(
                "compressor {} is not available",
                entry.id
            )));
        }
        Ok(Bytes::copy_from_slice(payload))
    }

    fn decompress(
        &mut self,
        payload: &[u8],
        entry: &CompressorEntry,
        decompressed_length: u64,
    ) -> SessionResult<Bytes> {
        if entry.id != 0 {
            return Err(SessionError::compression(format!(
                "compressor {} is not available",
                entry.id
            )));
        }
        if payload.len() as u64 != decompressed_length {
            return Err(SessionError::compression(format!(
                "uncompressed payload is {} bytes, declared {decompressed_length}",
                payload.len()
            )));
        }
        Ok(Bytes::copy_from_slice(payload))
    }

    fn train_dictionary(&mut self, _samples: &[Bytes], _max_size: usize) -> SessionResult<Bytes> {
        Err(SessionError::compression(
            "dictionary training needs the zstd feature",
        ))
    }
}

/// zstd engine with optional preset dictionaries.
#[cfg(feature = "zstd")]
#[derive(Debug, Clone, Default)]
pub struct ZstdEngine {
    presets: HashMap<u64, Bytes>,
}

#[cfg(feature = "zstd")]
impl ZstdEngine {
    /// Creates an engine with no preset dictionaries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: makes a preset dictionary available under `id`.
    pub fn with_preset(mut self, id: u16, dictionary: Bytes) -> Self {
        self.presets.insert(u64::from(id), dictionary);
        self
    }

    fn dictionary<'a>(&'a self, entry: &'a CompressorEntry) -> Option<&'a Bytes> {
        entry
            .dictionary
            .as_ref()
            .or_else(|| self.presets.get(&entry.id))
    }

    fn capacity(decompressed_length: u64) -> SessionResult<usize> {
        usize::try_from(decompressed_length)
            .map_err(|_| SessionError::compression("decompressed length does not fit in memory"))
    }
}

#[cfg(feature = "zstd")]
impl CompressionEngine for ZstdEngine {
    fn supports(&self, entry: &CompressorEntry) -> bool {
        entry.id <= ZSTD_PLAIN_ID || self.dictionary(entry).is_some()
    }

    fn compress(&mut self, payload: &[u8], entry: &CompressorEntry) -> SessionResult<Bytes> {
        let level = i32::from(entry.level);
        let compressed = match entry.id {
            0 => return Ok(Bytes::copy_from_slice(payload)),
            ZSTD_PLAIN_ID => zstd::bulk::compress(payload, level),
            id => {
                let dictionary = self.dictionary(entry).ok_or_else(|| {
                    SessionError::compression(format!("no dictionary for compressor {id}"))
                })?;
                zstd::bulk::Compressor::with_dictionary(level, dictionary)
                    .and_then(|mut compressor| compressor.compress(payload))
            }
        };
        compressed
            .map(Bytes::from)
            .map_err(|e| SessionError::compression(e.to_string()))
    }

    fn decompress(
        &mut self,
        payload: &[u8],
        entry: &CompressorEntry,
        decompressed_length: u64,
    ) -> SessionResult<Bytes> {
        if entry.id == 0 {
            return IdentityEngine.decompress(payload, entry, decompressed_length);
        }
        let capacity = Self::capacity(decompressed_length)?;
        let decompressed = match entry.id {
            ZSTD_PLAIN_ID => zstd::bulk::decompress(payload, capacity),
            id => {
                let dictionary = self.dictionary(entry).ok_or_else(|| {
                    SessionError::compression(format!("no dictionary for compressor {id}"))
                })?;
                zstd::bulk::Decompressor::with_dictionary(dictionary)
                    .and_then(|mut decompressor| decompressor.decompress(payload, capacity))
            }
        }
        .map_err(|e| SessionError::compression(e.to_string()))?;

        if decompressed.len() as u64 != decompressed_length {
            return Err(SessionError::compression(format!(
                "decompressed to {} bytes, declared {decompressed_length}",
                decompressed.len()
            )));
        }
        Ok(Bytes::from(decompressed))
    }

    fn train_dictionary(&mut self, samples: &[Bytes], max_size: usize) -> SessionResult<Bytes> {
        zstd::dict::from_samples(samples, max_size)
            .map(Bytes::from)
            .map_err(|e| SessionError::compression(e.to_string()))
    }
}

/// zstd when the feature is on, otherwise the identity engine.
pub fn default_engine() -> Box<dyn CompressionEngine> {
    #[cfg(feature = "zstd")]
    {
        Box::new(ZstdEngine::new())
    }
    #[cfg(not(feature = "zstd"))]
    {
        Box::new(IdentityEngine)
    }
}
