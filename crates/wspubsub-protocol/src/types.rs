//! Message type registry.
//!
//! Each direction has its own closed set of type codes. The numeric values
//! are fixed here rather than derived from declaration order, so reordering
//! variants can never change the wire format.

use std::fmt;
use std::hash::Hash;

/// Which peer sends a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Subscriber (client) to broadcaster (server).
    SubscriberToBroadcaster,
    /// Broadcaster (server) to subscriber (client).
    BroadcasterToSubscriber,
}

/// A per-direction set of message type codes.
pub trait MessageKind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Direction this set of codes travels in.
    const DIRECTION: Direction;

    /// Every kind in the set.
    const ALL: &'static [Self];

    /// Wire value of the type byte.
    fn code(self) -> u8;

    /// Protocol name, e.g. `SUBSCRIBE_EXACT`.
    fn name(self) -> &'static str;

    /// Looks up a kind by its wire value.
    fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.code() == code)
    }
}

/// Messages a subscriber sends to a broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum S2bType {
    Configure = 1,
    SubscribeExact = 2,
    SubscribeGlob = 3,
    UnsubscribeExact = 4,
    UnsubscribeGlob = 5,
    Notify = 6,
    NotifyStream = 7,
    ContinueReceive = 8,
    ConfirmReceive = 9,
}

impl MessageKind for S2bType {
    const DIRECTION: Direction = Direction::SubscriberToBroadcaster;

    const ALL: &'static [Self] = &[
        Self::Configure,
        Self::SubscribeExact,
        Self::SubscribeGlob,
        Self::UnsubscribeExact,
        Self::UnsubscribeGlob,
        Self::Notify,
        Self::NotifyStream,
        Self::ContinueReceive,
        Self::ConfirmReceive,
    ];

    fn code(self) -> u8 {
        self as u8
    }

    fn name(self) -> &'static str {
        match self {
            Self::Configure => "CONFIGURE",
            Self::SubscribeExact => "SUBSCRIBE_EXACT",
            Self::SubscribeGlob => "SUBSCRIBE_GLOB",
            Self::UnsubscribeExact => "UNSUBSCRIBE_EXACT",
            Self::UnsubscribeGlob => "UNSUBSCRIBE_GLOB",
            Self::Notify => "NOTIFY",
            Self::NotifyStream => "NOTIFY_STREAM",
            Self::ContinueReceive => "CONTINUE_RECEIVE",
            Self::ConfirmReceive => "CONFIRM_RECEIVE",
        }
    }
}

/// Messages a broadcaster sends to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum B2sType {
    ConfirmConfigure = 1,
    ConfirmSubscribeExact = 2,
    ConfirmSubscribeGlob = 3,
    ConfirmUnsubscribeExact = 4,
    ConfirmUnsubscribeGlob = 5,
    ConfirmNotify = 6,
    ContinueNotify = 7,
    ReceiveStream = 8,
    EnableZstdPreset = 9,
    EnableZstdCustom = 10,
}

impl MessageKind for B2sType {
    const DIRECTION: Direction = Direction::BroadcasterToSubscriber;

    const ALL: &'static [Self] = &[
        Self::ConfirmConfigure,
        Self::ConfirmSubscribeExact,
        Self::ConfirmSubscribeGlob,
        Self::ConfirmUnsubscribeExact,
        Self::ConfirmUnsubscribeGlob,
        Self::ConfirmNotify,
        Self::ContinueNotify,
        Self::ReceiveStream,
        Self::EnableZstdPreset,
        Self::EnableZstdCustom,
    ];

    fn code(self) -> u8 {
        self as u8
    }

    fn name(self) -> &'static str {
        match self {
            Self::ConfirmConfigure => "CONFIRM_CONFIGURE",
            Self::ConfirmSubscribeExact => "CONFIRM_SUBSCRIBE_EXACT",
            Self::ConfirmSubscribeGlob => "CONFIRM_SUBSCRIBE_GLOB",
            Self::ConfirmUnsubscribeExact => "CONFIRM_UNSUBSCRIBE_EXACT",
            Self::ConfirmUnsubscribeGlob => "CONFIRM_UNSUBSCRIBE_GLOB",
            Self::ConfirmNotify => "CONFIRM_NOTIFY",
            Self::ContinueNotify => "CONTINUE_NOTIFY",
            Self::ReceiveStream => "RECEIVE_STREAM",
            Self::EnableZstdPreset => "ENABLE_ZSTD_PRESET",
            Self::EnableZstdCustom => "ENABLE_ZSTD_CUSTOM",
        }
    }
}

impl fmt::Display for S2bType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for B2sType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_stable() {
        assert_eq!(S2bType::Configure.code(), 1);
        assert_eq!(S2bType::ConfirmReceive.code(), 9);
        assert_eq!(B2sType::ConfirmConfigure.code(), 1);
        assert_eq!(B2sType::ReceiveStream.code(), 8);
        assert_eq!(B2sType::EnableZstdCustom.code(), 10);
    }

    #[test]
    fn codes_are_unique_per_direction() {
        let s2b: HashSet<u8> = S2bType::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(s2b.len(), S2bType::ALL.len());

        let b2s: HashSet<u8> = B2sType::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(b2s.len(), B2sType::ALL.len());
    }

    #[test]
    fn from_code_round_trips() {
        for kind in S2bType::ALL {
            assert_eq!(S2bType::from_code(kind.code()), Some(*kind));
        }
        for kind in B2sType::ALL {
            assert_eq!(B2sType::from_code(kind.code()), Some(*kind));
        }
        assert_eq!(S2bType::from_code(0), None);
        assert_eq!(B2sType::from_code(11), None);
    }

    #[test]
    fn display_uses_protocol_names() {
        assert_eq!(S2bType::NotifyStream.to_string(), "NOTIFY_STREAM");
        assert_eq!(B2sType::EnableZstdPreset.to_string(), "ENABLE_ZSTD_PRESET");
    }
}
