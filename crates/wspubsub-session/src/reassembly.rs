//! Reassembly of NOTIFY_STREAM / RECEIVE_STREAM parts.
//!
//! One connection has at most one open stream. Part 0 opens it and fixes
//! the identifier, total compressed length and SHA-512; later parts must
//! carry the same identifier and consecutive part ids. Once the declared
//! length is reached the hash is checked and the payload handed back.
//!
//! Any violation aborts the reassembler for good: the buffered bytes are
//! dropped and the caller is expected to disconnect.

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};
use wspubsub_protocol::{PayloadDescriptor, PayloadHasher, StreamPart, StreamPartKind};

use crate::error::{SessionError, SessionResult};

/// A fully received and verified notification, still compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedNotification {
    pub identifier: Bytes,
    pub topic: Bytes,
    pub compressor_id: u64,
    pub decompressed_length: u64,
    /// Concatenated part bodies.
    pub payload: Bytes,
    /// Number of parts it arrived in.
    pub parts: u64,
}

/// What the receiver should do after a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartOutcome {
    /// More parts are due; acknowledge `part_id` with a CONTINUE_* frame.
    Continue { identifier: Bytes, part_id: u64 },
    /// Last part arrived and verified; acknowledge with a CONFIRM_* frame.
    Complete(CompletedNotification),
}

#[derive(Debug)]
struct OpenStream {
    identifier: Bytes,
    descriptor: PayloadDescriptor,
    next_part_id: u64,
    buffer: BytesMut,
    hasher: PayloadHasher,
}

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    Accumulating(Box<OpenStream>),
    Aborted,
}

/// Per-connection stream reassembler.
#[derive(Debug)]
pub struct Reassembler {
    phase: Phase,
    max_notification_bytes: u64,
}

impl Reassembler {
    /// Creates a reassembler refusing notifications above the given size.
    pub fn new(max_notification_bytes: u64) -> Self {
        Self {
            phase: Phase::Idle,
            max_notification_bytes,
        }
    }

    /// Identifier of the stream currently being received.
    pub fn open_identifier(&self) -> Option<&Bytes> {
        match &self.phase {
            Phase::Accumulating(open) => Some(&open.identifier),
            _ => None,
        }
    }

    /// Whether a stream is partially received.
    pub fn is_open(&self) -> bool {
        matches!(self.phase, Phase::Accumulating(_))
    }

    /// Whether an earlier violation disabled the reassembler.
    pub fn is_aborted(&self) -> bool {
        matches!(self.phase, Phase::Aborted)
    }

    /// Feeds one part. On error the reassembler is aborted.
    pub fn accept(&mut self, part: &StreamPart) -> SessionResult<PartOutcome> {
        let phase = std::mem::take(&mut self.phase);
        match self.step(phase, part) {
            Ok((phase, outcome)) => {
                self.phase = phase;
                Ok(outcome)
            }
            Err(e) => {
                warn!(
                    identifier = %String::from_utf8_lossy(&part.identifier),
                    part_id = part.part_id(),
                    error = %e,
                    "Stream reassembly aborted"
                );
                self.phase = Phase::Aborted;
                Err(e)
            }
        }
    }

    fn step(&self, phase: Phase, part: &StreamPart) -> SessionResult<(Phase, PartOutcome)> {
        match (phase, &part.kind) {
            (Phase::Aborted, _) => Err(SessionError::violation(
                "stream part after reassembly was aborted",
            )),
            (Phase::Idle, StreamPartKind::First(descriptor)) => {
                let open = self.open(part, descriptor)?;
                Self::progress(open, part)
            }
            (Phase::Idle, StreamPartKind::Continuation { part_id }) => Err(SessionError::violation(
                format!("part {part_id} received without part 0"),
            )),
            (Phase::Accumulating(open), StreamPartKind::First(_)) => {
                Err(SessionError::violation(if open.identifier == part.identifier {
                    "stream restarted before it completed".to_owned()
                } else {
                    format!(
                        "notifications weaved: {} opened while {} is open",
                        String::from_utf8_lossy(&part.identifier),
                        String::from_utf8_lossy(&open.identifier)
                    )
                }))
            }
            (Phase::Accumulating(open), StreamPartKind::Continuation { part_id }) => {
                if open.identifier != part.identifier {
                    return Err(SessionError::violation(format!(
                        "notifications weaved: part of {} while {} is open",
                        String::from_utf8_lossy(&part.identifier),
                        String::from_utf8_lossy(&open.identifier)
                    )));
                }
                if *part_id != open.next_part_id {
                    return Err(SessionError::violation(format!(
                        "expected part {}, got {part_id}",
                        open.next_part_id
                    )));
                }
                Self::progress(*open, part)
            }
        }
    }

    fn open(&self, part: &StreamPart, descriptor: &PayloadDescriptor) -> SessionResult<OpenStream> {
        let declared = descriptor.compressed_length;
        if declared > self.max_notification_bytes
            || descriptor.decompressed_length > self.max_notification_bytes
        {
            return Err(SessionError::violation(format!(
                "notification of {declared} bytes exceeds {}",
                self.max_notification_bytes
            )));
        }
        if declared == 0 && !part.body.is_empty() {
            return Err(SessionError::violation(
                "part 0 carries a body but declares no compressed bytes",
            ));
        }

        debug!(
            identifier = %String::from_utf8_lossy(&part.identifier),
            topic = %String::from_utf8_lossy(&descriptor.topic),
            compressor_id = descriptor.compressor_id,
            compressed_length = declared,
            "Stream opened"
        );
        Ok(OpenStream {
            identifier: part.identifier.clone(),
            descriptor: descriptor.clone(),
            next_part_id: 0,
            buffer: BytesMut::with_capacity(usize::try_from(declared).unwrap_or(0).min(1 << 20)),
            hasher: PayloadHasher::new(),
        })
    }

    fn progress(mut open: OpenStream, part: &StreamPart) -> SessionResult<(Phase, PartOutcome)> {
        let declared = open.descriptor.compressed_length;
        let received = open.buffer.len() as u64 + part.body.len() as u64;
        if received > declared {
            return Err(SessionError::violation(format!(
                "part {} overruns declared length {declared}",
                part.part_id()
            )));
        }

        open.buffer.extend_from_slice(&part.body);
        open.hasher.update(&part.body);
        let part_id = open.next_part_id;
        debug!(part_id, received, declared, "Stream part accepted");

        if received < declared {
            open.next_part_id = part_id
                .checked_add(1)
                .ok_or_else(|| SessionError::violation("part id overflow"))?;
            let identifier = open.identifier.clone();
            return Ok((
                Phase::Accumulating(Box::new(open)),
                PartOutcome::Continue {
                    identifier,
                    part_id,
                },
            ));
        }

        if open.hasher.finalize() != open.descriptor.compressed_sha512 {
            return Err(SessionError::integrity(
                &open.identifier,
                "compressed payload does not match x-compressed-sha512",
            ));
        }

        Ok((
            Phase::Idle,
            PartOutcome::Complete(CompletedNotification {
                identifier: open.identifier,
                topic: open.descriptor.topic,
                compressor_id: open.descriptor.compressor_id,
                decompressed_length: open.descriptor.decompressed_length,
                payload: open.buffer.freeze(),
                parts: part_id + 1,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wspubsub_protocol::payload_sha512;

    fn first(identifier: &'static [u8], payload: &[u8], body: &'static [u8]) -> StreamPart {
        StreamPart {
            authorization: String::new(),
            identifier: Bytes::from_static(identifier),
            kind: StreamPartKind::First(PayloadDescriptor {
                topic: Bytes::from_static(b"orders"),
                compressor_id: 0,
                compressed_length: payload.len() as u64,
                decompressed_length: payload.len() as u64,
                compressed_sha512: payload_sha512(payload),
            }),
            body: Bytes::from_static(body),
        }
    }

    fn next(identifier: &'static [u8], part_id: u64, body: &'static [u8]) -> StreamPart {
        StreamPart {
            authorization: String::new(),
            identifier: Bytes::from_static(identifier),
            kind: StreamPartKind::Continuation { part_id },
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn parts_in_order_complete() {
        let mut reassembler = Reassembler::new(1024);
        let continue_0 = reassembler.accept(&first(b"x", b"abcdef", b"ab")).unwrap();
        assert_eq!(
            continue_0,
            PartOutcome::Continue {
                identifier: Bytes::from_static(b"x"),
                part_id: 0
            }
        );
        assert_eq!(reassembler.open_identifier().map(|id| &id[..]), Some(&b"x"[..]));
        reassembler.accept(&next(b"x", 1, b"cd")).unwrap();

        let PartOutcome::Complete(done) = reassembler.accept(&next(b"x", 2, b"ef")).unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(&done.payload[..], b"abcdef");
        assert_eq!(done.parts, 3);
        assert!(!reassembler.is_open());
    }

    #[test]
    fn single_part_stream_completes_immediately() {
        let mut reassembler = Reassembler::new(1024);
        let outcome = reassembler.accept(&first(b"x", b"all", b"all")).unwrap();
        assert!(matches!(outcome, PartOutcome::Complete(ref done) if done.parts == 1));
    }

    #[test]
    fn empty_notification_completes_on_part_zero() {
        let mut reassembler = Reassembler::new(1024);
        let outcome = reassembler.accept(&first(b"x", b"", b"")).unwrap();
        assert!(matches!(outcome, PartOutcome::Complete(ref done) if done.payload.is_empty()));
    }

    #[test]
    fn out_of_order_part_aborts() {
        let mut reassembler = Reassembler::new(1024);
        reassembler.accept(&first(b"x", b"abcdef", b"ab")).unwrap();
        assert!(matches!(
            reassembler.accept(&next(b"x", 2, b"ef")),
            Err(SessionError::ProtocolViolation { .. })
        ));
        assert!(reassembler.is_aborted());
        // terminal: even the correct part is refused now
        assert!(reassembler.accept(&next(b"x", 1, b"cd")).is_err());
    }

    #[test]
    fn weaving_aborts() {
        let mut reassembler = Reassembler::new(1024);
        reassembler.accept(&first(b"x", b"abcdef", b"ab")).unwrap();
        assert!(reassembler.accept(&first(b"y", b"zz", b"z")).is_err());
        assert!(reassembler.is_aborted());
    }

    #[test]
    fn continuation_of_other_identifier_aborts() {
        let mut reassembler = Reassembler::new(1024);
        reassembler.accept(&first(b"x", b"abcdef", b"ab")).unwrap();
        assert!(reassembler.accept(&next(b"y", 1, b"cd")).is_err());
    }

    #[test]
    fn corrupted_part_fails_integrity() {
        let mut reassembler = Reassembler::new(1024);
        reassembler.accept(&first(b"x", b"abcdef", b"ab")).unwrap();
        reassembler.accept(&next(b"x", 1, b"cD")).unwrap();
        assert!(matches!(
            reassembler.accept(&next(b"x", 2, b"ef")),
            Err(SessionError::IntegrityFailure { .. })
        ));
        assert!(reassembler.is_aborted());
    }

    #[test]
    fn overrun_aborts() {
        let mut reassembler = Reassembler::new(1024);
        reassembler.accept(&first(b"x", b"abc", b"ab")).unwrap();
        assert!(reassembler.accept(&next(b"x", 1, b"cd")).is_err());
    }

    #[test]
    fn body_with_zero_declared_length_aborts() {
        let mut reassembler = Reassembler::new(1024);
        let mut part = first(b"x", b"", b"");
        part.body = Bytes::from_static(b"junk");
        assert!(reassembler.accept(&part).is_err());
    }

    #[test]
    fn oversized_notification_is_refused() {
        let mut reassembler = Reassembler::new(4);
        assert!(reassembler.accept(&first(b"x", b"abcdef", b"ab")).is_err());
    }

    #[test]
    fn continuation_without_start_aborts() {
        let mut reassembler = Reassembler::new(1024);
        assert!(reassembler.accept(&next(b"x", 1, b"ab")).is_err());
    }
}
