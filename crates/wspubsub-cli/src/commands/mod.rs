//! Subcommand implementations.

pub mod decode;
pub mod simulate;
pub mod token;

use wspubsub_protocol::Direction;

/// Short label used when printing frames.
pub fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::SubscriberToBroadcaster => "s2b",
        Direction::BroadcasterToSubscriber => "b2s",
    }
}
