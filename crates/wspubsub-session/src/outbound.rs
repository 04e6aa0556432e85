//! Sending side of a multi-part notification.
//!
//! Parts go out one at a time: part k+1 is only produced after the peer
//! acknowledged part k with a CONTINUE_* frame, and the final part is
//! acknowledged by a CONFIRM_* frame instead.

use bytes::Bytes;
use wspubsub_protocol::{PayloadDescriptor, StreamPart, StreamPartKind};

use crate::error::{SessionError, SessionResult};

/// Splits one compressed payload into stream parts under backpressure.
#[derive(Debug)]
pub struct StreamSender {
    identifier: Bytes,
    descriptor: PayloadDescriptor,
    payload: Bytes,
    max_part_size: usize,
    next_part_id: u64,
    offset: usize,
    /// Part sent and not yet acknowledged.
    in_flight: Option<u64>,
}

impl StreamSender {
    /// `descriptor.compressed_length` must equal `payload.len()`.
    pub fn new(
        identifier: Bytes,
        descriptor: PayloadDescriptor,
        payload: Bytes,
        max_part_size: usize,
    ) -> SessionResult<Self> {
        if max_part_size == 0 {
            return Err(SessionError::config("max_part_size must be greater than 0"));
        }
        if descriptor.compressed_length != payload.len() as u64 {
            return Err(SessionError::integrity(
                &identifier,
                "descriptor length differs from payload",
            ));
        }
        Ok(Self {
            identifier,
            descriptor,
            payload,
            max_part_size,
            next_part_id: 0,
            offset: 0,
            in_flight: None,
        })
    }

    /// Identifier shared by every part.
    pub fn identifier(&self) -> &Bytes {
        &self.identifier
    }

    /// Total number of parts, at least one.
    pub fn part_count(&self) -> u64 {
        (self.payload.len().div_ceil(self.max_part_size)).max(1) as u64
    }

    fn last_part_id(&self) -> u64 {
        self.part_count() - 1
    }

    fn all_sent(&self) -> bool {
        self.next_part_id > self.last_part_id()
    }

    /// Whether a part can be sent right now.
    pub fn ready(&self) -> bool {
        self.in_flight.is_none() && !self.all_sent()
    }

    /// Produces the next part if one is due, minting its authorization
    /// only in that case.
    pub fn next_part(
        &mut self,
        mint: impl FnOnce() -> SessionResult<String>,
    ) -> SessionResult<Option<StreamPart>> {
        if !self.ready() {
            return Ok(None);
        }

        let part_id = self.next_part_id;
        let end = (self.offset + self.max_part_size).min(self.payload.len());
        let body = self.payload.slice(self.offset..end);
        let kind = if part_id == 0 {
            StreamPartKind::First(self.descriptor.clone())
        } else {
            StreamPartKind::Continuation { part_id }
        };
        let part = StreamPart {
            authorization: mint()?,
            identifier: self.identifier.clone(),
            kind,
            body,
        };

        self.offset = end;
        self.next_part_id += 1;
        self.in_flight = Some(part_id);
        Ok(Some(part))
    }

    fn check_ack(&self, identifier: &[u8], what: &str) -> SessionResult<u64> {
        if identifier != &self.identifier[..] {
            return Err(SessionError::violation(format!(
                "{what} for {} while sending {}",
                String::from_utf8_lossy(identifier),
                String::from_utf8_lossy(&self.identifier)
            )));
        }
        self.in_flight
            .ok_or_else(|| SessionError::violation(format!("{what} with no part in flight")))
    }

    /// Handles CONTINUE_*: the peer holds every part up to `part_id`.
    pub fn on_continue(&mut self, identifier: &[u8], part_id: u64) -> SessionResult<()> {
        let in_flight = self.check_ack(identifier, "continue")?;
        if part_id != in_flight {
            return Err(SessionError::violation(format!(
                "continue for part {part_id}, part {in_flight} is in flight"
            )));
        }
        if in_flight == self.last_part_id() {
            return Err(SessionError::violation(
                "continue for the final part, expected a confirmation",
            ));
        }
        self.in_flight = None;
        Ok(())
    }

    /// Handles CONFIRM_*: the peer received the whole notification.
    pub fn on_confirm(&mut self, identifier: &[u8]) -> SessionResult<()> {
        let in_flight = self.check_ack(identifier, "confirmation")?;
        if in_flight != self.last_part_id() {
            return Err(SessionError::violation(format!(
                "confirmation after part {in_flight} of {}",
                self.part_count()
            )));
        }
        self.in_flight = None;
        Ok(())
    }

    /// Whether every part was sent and the final one confirmed.
    pub fn is_finished(&self) -> bool {
        self.all_sent() && self.in_flight.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wspubsub_protocol::payload_sha512;

    fn sender(payload: &'static [u8], max_part_size: usize) -> StreamSender {
        let descriptor = PayloadDescriptor {
            topic: Bytes::from_static(b"t"),
            compressor_id: 0,
            compressed_length: payload.len() as u64,
            decompressed_length: payload.len() as u64,
            compressed_sha512: payload_sha512(payload),
        };
        StreamSender::new(
            Bytes::from_static(b"id"),
            descriptor,
            Bytes::from_static(payload),
            max_part_size,
        )
        .unwrap()
    }

    fn token() -> SessionResult<String> {
        Ok("tok".to_owned())
    }

    #[test]
    fn waits_for_continue_between_parts() {
        let mut sender = sender(b"abcde", 2);
        assert_eq!(sender.part_count(), 3);

        let part0 = sender.next_part(token).unwrap().unwrap();
        assert_eq!(part0.part_id(), 0);
        assert_eq!(&part0.body[..], b"ab");
        assert!(sender.next_part(token).unwrap().is_none());

        sender.on_continue(b"id", 0).unwrap();
        let part1 = sender.next_part(token).unwrap().unwrap();
        assert_eq!(part1.part_id(), 1);
        sender.on_continue(b"id", 1).unwrap();

        let part2 = sender.next_part(token).unwrap().unwrap();
        assert_eq!(&part2.body[..], b"e");
        assert!(sender.on_continue(b"id", 2).is_err());
        sender.on_confirm(b"id").unwrap();
        assert!(sender.is_finished());
    }

    #[test]
    fn mint_is_not_called_without_a_part_due() {
        let mut sender = sender(b"ab", 1);
        sender.next_part(token).unwrap();
        let result = sender.next_part(|| panic!("minted a token for nothing"));
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn empty_payload_is_one_empty_part() {
        let mut sender = sender(b"", 8);
        assert_eq!(sender.part_count(), 1);
        let part = sender.next_part(token).unwrap().unwrap();
        assert!(part.body.is_empty());
        sender.on_confirm(b"id").unwrap();
        assert!(sender.is_finished());
    }

    #[test]
    fn early_confirmation_is_a_violation() {
        let mut sender = sender(b"abcd", 2);
        sender.next_part(token).unwrap();
        assert!(sender.on_confirm(b"id").is_err());
    }

    #[test]
    fn ack_for_other_identifier_is_a_violation() {
        let mut sender = sender(b"abcd", 2);
        sender.next_part(token).unwrap();
        assert!(sender.on_continue(b"other", 0).is_err());
    }
}
