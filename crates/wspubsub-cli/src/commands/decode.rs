//! `wspubsub decode`

use wspubsub_protocol::{Direction, MessageFlags, parse_b2s_frame, parse_s2b_frame, split_frame};

use crate::error::CliResult;

/// Decodes a hex frame into a printable description.
pub fn describe(direction: Direction, hex_frame: &str) -> CliResult<String> {
    let compact: String = hex_frame.split_whitespace().collect();
    let frame = hex::decode(compact)?;
    let raw = split_frame(&frame)?;
    let mode = if raw.flags.contains(MessageFlags::MINIMAL_HEADERS) {
        "minimal"
    } else {
        "explicit"
    };

    let (kind, body) = match direction {
        Direction::SubscriberToBroadcaster => {
            let message = parse_s2b_frame(&frame)?;
            (message.kind().to_string(), format!("{message:#?}"))
        }
        Direction::BroadcasterToSubscriber => {
            let message = parse_b2s_frame(&frame)?;
            (message.kind().to_string(), format!("{message:#?}"))
        }
    };
    Ok(format!("{kind} ({mode} headers, {} bytes)\n{body}", frame.len()))
}

/// Prints the decoded frame to stdout.
pub fn run(direction: Direction, hex_frame: &str) -> CliResult<()> {
    println!("{}", describe(direction, hex_frame)?);
    Ok(())
}
