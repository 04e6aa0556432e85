//! Every message kind survives serialize then parse in both header modes,
//! and both modes decode to the same value.

use bytes::Bytes;
use proptest::prelude::*;
use wspubsub_protocol::{
    B2sMessage, ConfirmConfigure, ConfirmExactSubscription, ConfirmGlobSubscription,
    ConfirmNotify, ConfirmReceive, Configure, EnableZstdCustom, EnableZstdPreset,
    ExactSubscription, FIRST_CUSTOM_ID, GlobSubscription, MAX_COMPRESSION_LEVEL, Notify,
    PayloadDescriptor, S2bMessage, StreamContinue, StreamPart, StreamPartKind, SubscriptionAction,
    parse_b2s_frame, parse_s2b_frame,
};

fn blob(max: usize) -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..=max).prop_map(Bytes::from)
}

fn identifier() -> impl Strategy<Value = Bytes> {
    blob(64)
}

fn token() -> impl Strategy<Value = String> {
    "websocket:[A-Za-z0-9_-]{0,43}:-?[0-9a-f]{1,16}"
}

/// Globs with single `*` wildcards, `?` and character classes.
fn glob() -> impl Strategy<Value = String> {
    "([a-z0-9/?]|\\[[a-z]-[a-z]\\]){0,8}(\\*[a-z0-9/?]{1,6}){0,2}\\*?"
}

fn action() -> impl Strategy<Value = SubscriptionAction> {
    prop_oneof![
        Just(SubscriptionAction::Subscribe),
        Just(SubscriptionAction::Unsubscribe)
    ]
}

fn sha512() -> impl Strategy<Value = [u8; 64]> {
    prop::collection::vec(any::<u8>(), 64).prop_map(|bytes| {
        let mut out = [0u8; 64];
        out.copy_from_slice(&bytes);
        out
    })
}

fn descriptor(compressed_length: u64) -> impl Strategy<Value = PayloadDescriptor> {
    (blob(32), any::<u64>(), any::<u64>(), sha512()).prop_map(
        move |(topic, compressor_id, decompressed_length, compressed_sha512)| PayloadDescriptor {
            topic,
            compressor_id,
            compressed_length,
            decompressed_length,
            compressed_sha512,
        },
    )
}

fn stream_part() -> impl Strategy<Value = StreamPart> {
    let kind = prop_oneof![
        any::<u64>().prop_flat_map(descriptor).prop_map(StreamPartKind::First),
        (1..=u64::MAX).prop_map(|part_id| StreamPartKind::Continuation { part_id }),
    ];
    (token(), identifier(), kind, blob(128)).prop_map(|(authorization, identifier, kind, body)| {
        StreamPart {
            authorization,
            identifier,
            kind,
            body,
        }
    })
}

fn stream_continue() -> impl Strategy<Value = StreamContinue> {
    (identifier(), any::<u64>())
        .prop_map(|(identifier, part_id)| StreamContinue { identifier, part_id })
}

fn level() -> impl Strategy<Value = i16> {
    i16::MIN..=MAX_COMPRESSION_LEVEL
}

fn s2b_message() -> impl Strategy<Value = S2bMessage> {
    prop_oneof![
        (any::<[u8; 32]>(), any::<bool>(), any::<bool>(), any::<u16>()).prop_map(
            |(subscriber_nonce, enable_zstd, enable_training, initial_dict)| {
                S2bMessage::from(Configure {
                    subscriber_nonce,
                    enable_zstd,
                    enable_training,
                    initial_dict,
                })
            }
        ),
        (action(), token(), blob(64)).prop_map(|(action, authorization, topic)| {
            S2bMessage::from(ExactSubscription {
                action,
                authorization,
                topic,
            })
        }),
        (action(), token(), glob()).prop_map(|(action, authorization, glob)| {
            S2bMessage::from(GlobSubscription {
                action,
                authorization,
                glob,
            })
        }),
        (token(), identifier(), blob(256))
            .prop_flat_map(|(authorization, identifier, body)| {
                let len = body.len() as u64;
                descriptor(len).prop_map(move |descriptor| Notify {
                    authorization: authorization.clone(),
                    identifier: identifier.clone(),
                    descriptor,
                    body: body.clone(),
                })
            })
            .prop_map(S2bMessage::from),
        stream_part().prop_map(S2bMessage::NotifyStream),
        stream_continue().prop_map(S2bMessage::ContinueReceive),
        identifier().prop_map(|identifier| S2bMessage::from(ConfirmReceive { identifier })),
    ]
}

fn b2s_message() -> impl Strategy<Value = B2sMessage> {
    prop_oneof![
        any::<[u8; 32]>().prop_map(|broadcaster_nonce| {
            B2sMessage::from(ConfirmConfigure { broadcaster_nonce })
        }),
        (action(), blob(64)).prop_map(|(action, topic)| {
            B2sMessage::from(ConfirmExactSubscription { action, topic })
        }),
        (action(), "\\PC{0,24}").prop_map(|(action, glob)| {
            B2sMessage::from(ConfirmGlobSubscription { action, glob })
        }),
        (identifier(), any::<u64>()).prop_map(|(identifier, subscribers)| {
            B2sMessage::from(ConfirmNotify {
                identifier,
                subscribers,
            })
        }),
        stream_continue().prop_map(B2sMessage::ContinueNotify),
        stream_part().prop_map(B2sMessage::ReceiveStream),
        (1..=u16::MAX, level(), any::<u32>(), any::<u64>()).prop_map(
            |(identifier, compression_level, min_size, max_size)| {
                B2sMessage::from(EnableZstdPreset {
                    identifier,
                    compression_level,
                    min_size,
                    max_size,
                })
            }
        ),
        (
            FIRST_CUSTOM_ID..=u64::MAX,
            level(),
            any::<u32>(),
            any::<u64>(),
            blob(256)
        )
            .prop_map(
                |(identifier, compression_level, min_size, max_size, dictionary)| {
                    B2sMessage::from(EnableZstdCustom {
                        identifier,
                        compression_level,
                        min_size,
                        max_size,
                        dictionary,
                    })
                }
            ),
    ]
}

proptest! {
    #[test]
    fn s2b_round_trips(message in s2b_message()) {
        let minimal = message.serialize(true).unwrap();
        let explicit = message.serialize(false).unwrap();
        prop_assert_eq!(minimal[1], message.kind() as u8);
        prop_assert_eq!(&parse_s2b_frame(&minimal).unwrap(), &message);
        prop_assert_eq!(&parse_s2b_frame(&explicit).unwrap(), &message);
        prop_assert!(explicit.len() > minimal.len());
    }

    #[test]
    fn b2s_round_trips(message in b2s_message()) {
        let minimal = message.serialize(true).unwrap();
        let explicit = message.serialize(false).unwrap();
        prop_assert_eq!(minimal[1], message.kind() as u8);
        prop_assert_eq!(&parse_b2s_frame(&minimal).unwrap(), &message);
        prop_assert_eq!(&parse_b2s_frame(&explicit).unwrap(), &message);
        prop_assert!(explicit.len() > minimal.len());
    }

    #[test]
    fn truncated_frames_never_parse_as_something_else(message in s2b_message(), cut in 0usize..16) {
        let frame = message.serialize(true).unwrap();
        let cut = cut.min(frame.len());
        let truncated = &frame[..frame.len() - cut];
        if let Ok(parsed) = parse_s2b_frame(truncated) {
            // only kinds with a body can lose bytes and still parse
            prop_assert_eq!(parsed.kind(), message.kind());
        }
    }
}

#[test]
fn stream_part_zero_reads_descriptor_headers() {
    let part = StreamPart {
        authorization: "websocket:AA:-1".to_owned(),
        identifier: Bytes::from_static(b"n1"),
        kind: StreamPartKind::First(PayloadDescriptor {
            topic: Bytes::from_static(b"orders"),
            compressor_id: 0,
            compressed_length: 10,
            decompressed_length: 10,
            compressed_sha512: [7; 64],
        }),
        body: Bytes::from_static(b"hello"),
    };
    let frame = S2bMessage::NotifyStream(part.clone()).serialize(true).unwrap();
    let S2bMessage::NotifyStream(parsed) = parse_s2b_frame(&frame).unwrap() else {
        panic!("expected a stream part");
    };
    assert_eq!(parsed.part_id(), 0);
    assert_eq!(parsed.descriptor().map(|d| d.compressed_length), Some(10));
    assert_eq!(parsed, part);
}

#[test]
fn continuation_with_part_zero_cannot_be_written() {
    let part = StreamPart {
        authorization: String::new(),
        identifier: Bytes::new(),
        kind: StreamPartKind::Continuation { part_id: 0 },
        body: Bytes::new(),
    };
    assert!(S2bMessage::NotifyStream(part).serialize(true).is_err());
}
