//! Per-message flags byte.

use bitflags::bitflags;

bitflags! {
    /// First byte of every frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MessageFlags: u8 {
        /// Header names are omitted; values follow the kind's fixed order.
        const MINIMAL_HEADERS = 1 << 0;
    }
}

impl MessageFlags {
    /// Create flags from the raw byte. Unknown bits are kept but never checked.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self::from_bits_retain(byte)
    }

    /// Raw byte value.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self.bits()
    }

    /// Flags for the chosen header mode.
    #[must_use]
    pub fn for_headers(minimal_headers: bool) -> Self {
        if minimal_headers {
            Self::MINIMAL_HEADERS
        } else {
            Self::empty()
        }
    }

    /// Whether the header section uses minimal encoding.
    #[must_use]
    pub const fn minimal_headers(self) -> bool {
        self.contains(Self::MINIMAL_HEADERS)
    }
}

impl Default for MessageFlags {
    fn default() -> Self {
        Self::empty()
    }
}
