//! Outbound splitting and inbound reassembly agree for any payload and
//! part size.

use bytes::Bytes;
use proptest::prelude::*;
use wspubsub_protocol::{PayloadDescriptor, payload_sha512};
use wspubsub_session::{PartOutcome, Reassembler, SessionError, StreamSender};

fn descriptor(payload: &[u8]) -> PayloadDescriptor {
    PayloadDescriptor {
        topic: Bytes::from_static(b"orders"),
        compressor_id: 0,
        compressed_length: payload.len() as u64,
        decompressed_length: payload.len() as u64,
        compressed_sha512: payload_sha512(payload),
    }
}

proptest! {
    #[test]
    fn split_then_reassemble(
        payload in proptest::collection::vec(any::<u8>(), 0..2048),
        part_size in 1usize..300,
    ) {
        let payload = Bytes::from(payload);
        let identifier = Bytes::from_static(b"n0");
        let mut sender =
            StreamSender::new(identifier.clone(), descriptor(&payload), payload.clone(), part_size)
                .unwrap();
        let expected_parts = sender.part_count();
        let mut reassembler = Reassembler::new(u64::MAX);

        let completed = loop {
            let part = sender
                .next_part(|| Ok("websocket:x:-1".to_string()))
                .unwrap()
                .expect("sender is ready after every acknowledgement");
            prop_assert!(part.body.len() <= part_size);
            match reassembler.accept(&part).unwrap() {
                PartOutcome::Continue { identifier, part_id } => {
                    sender.on_continue(&identifier, part_id).unwrap();
                }
                PartOutcome::Complete(done) => {
                    sender.on_confirm(&done.identifier).unwrap();
                    break done;
                }
            }
        };

        prop_assert!(sender.is_finished());
        prop_assert_eq!(completed.parts, expected_parts);
        prop_assert_eq!(completed.payload, payload);
        prop_assert!(!reassembler.is_open());
    }

    #[test]
    fn any_corrupted_byte_fails_integrity(
        payload in proptest::collection::vec(any::<u8>(), 1..512),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let declared = descriptor(&payload);
        let mut corrupted = payload.clone();
        let at = index.index(corrupted.len());
        corrupted[at] ^= flip;

        let mut sender =
            StreamSender::new(Bytes::from_static(b"n0"), declared, Bytes::from(corrupted), 64)
                .unwrap();
        let mut reassembler = Reassembler::new(u64::MAX);
        let outcome = loop {
            let part = sender.next_part(|| Ok(String::new())).unwrap().unwrap();
            match reassembler.accept(&part) {
                Ok(PartOutcome::Continue { identifier, part_id }) => {
                    sender.on_continue(&identifier, part_id).unwrap();
                }
                other => break other,
            }
        };
        prop_assert!(
            matches!(outcome, Err(SessionError::IntegrityFailure { .. })),
            "unexpected outcome {:?}",
            outcome
        );
        prop_assert!(reassembler.is_aborted());
    }
}
