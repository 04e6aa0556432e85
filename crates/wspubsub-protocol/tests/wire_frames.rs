//! Byte-exact frames. Any change here breaks interop with deployed peers.

use bytes::Bytes;
use wspubsub_protocol::{
    B2sMessage, ConfirmExactSubscription, Configure, EnableZstdPreset, ExactSubscription,
    MessageCodec, S2bMessage, StreamPart, StreamPartKind, SubscriptionAction, authorization_value,
    derive_connection_nonce, parse_b2s_frame, parse_s2b_frame,
};

fn subscriber_nonce() -> [u8; 32] {
    std::array::from_fn(|i| i as u8)
}

fn broadcaster_nonce() -> [u8; 32] {
    std::array::from_fn(|i| 32 + i as u8)
}

#[test]
fn configure_minimal() {
    let configure = Configure {
        subscriber_nonce: [0x11; 32],
        enable_zstd: true,
        enable_training: false,
        initial_dict: 0,
    };
    let frame = configure.serialize(true).unwrap();
    insta::assert_snapshot!(
        hex::encode(&frame),
        @"01010020111111111111111111111111111111111111111111111111111111111111111100010100010000020000"
    );
}

#[test]
fn connection_nonce_and_first_token() {
    let nonce = derive_connection_nonce(&subscriber_nonce(), &broadcaster_nonce());
    insta::assert_snapshot!(
        hex::encode(nonce),
        @"fdeab9acf3710362bd2658cdc9a29e8f9c757fcf9811603a8c447cd1d9151108"
    );
    insta::assert_snapshot!(
        authorization_value(&nonce, -1),
        @"websocket:_eq5rPNxA2K9JljNyaKej5x1f8-YEWA6jER80dkVEQg:-1"
    );
}

#[test]
fn subscribe_exact_in_both_modes() {
    let nonce = derive_connection_nonce(&subscriber_nonce(), &broadcaster_nonce());
    let subscribe = S2bMessage::from(ExactSubscription {
        action: SubscriptionAction::Subscribe,
        authorization: authorization_value(&nonce, -1),
        topic: Bytes::from_static(b"orders"),
    });

    let explicit = subscribe.serialize(false).unwrap();
    insta::assert_snapshot!(
        hex::encode(&explicit),
        @"0002000d617574686f72697a6174696f6e0038776562736f636b65743a5f65713572504e7841324b394a6c6a4e79614b656a35783166382d59455741366a45523830646b564551673a2d310007782d746f70696300066f7264657273"
    );

    let minimal = subscribe.serialize(true).unwrap();
    insta::assert_snapshot!(
        hex::encode(&minimal),
        @"01020038776562736f636b65743a5f65713572504e7841324b394a6c6a4e79614b656a35783166382d59455741366a45523830646b564551673a2d3100066f7264657273"
    );

    assert_eq!(parse_s2b_frame(&explicit).unwrap(), subscribe);
    assert_eq!(parse_s2b_frame(&minimal).unwrap(), subscribe);
}

#[test]
fn confirm_subscribe_exact_echoes_topic() {
    let frame = B2sMessage::from(ConfirmExactSubscription {
        action: SubscriptionAction::Subscribe,
        topic: Bytes::from_static(b"orders"),
    })
    .serialize(true)
    .unwrap();
    insta::assert_snapshot!(hex::encode(&frame), @"010200066f7264657273");
}

#[test]
fn enable_zstd_preset_fixed_width_hints() {
    let preset = EnableZstdPreset {
        identifier: 1,
        compression_level: 3,
        min_size: 32,
        max_size: u64::MAX,
    };
    let frame = preset.serialize(true).unwrap();
    insta::assert_snapshot!(
        hex::encode(&frame),
        @"01090001010001030004000000200008ffffffffffffffff"
    );
    assert_eq!(
        parse_b2s_frame(&frame).unwrap(),
        B2sMessage::EnableZstdPreset(preset)
    );
}

#[test]
fn receive_stream_continuation_part() {
    let part = StreamPart {
        authorization: "websocket:x:2".to_owned(),
        identifier: Bytes::from_static(b"n1"),
        kind: StreamPartKind::Continuation { part_id: 1 },
        body: Bytes::from_static(b"tail"),
    };
    let frame = B2sMessage::ReceiveStream(part).serialize(true).unwrap();
    insta::assert_snapshot!(
        hex::encode(&frame),
        @"0108000d776562736f636b65743a783a3200026e310001017461696c"
    );
}

#[test]
fn explicit_headers_may_arrive_in_any_order() {
    // CONFIRM_NOTIFY with x-subscribers before x-identifier
    let mut frame = vec![0x00, 0x06];
    for (name, value) in [("x-subscribers", &[0x03][..]), ("x-identifier", &b"n1"[..])] {
        frame.extend_from_slice(&(name.len() as u16).to_be_bytes());
        frame.extend_from_slice(name.as_bytes());
        frame.extend_from_slice(&(value.len() as u16).to_be_bytes());
        frame.extend_from_slice(value);
    }
    let B2sMessage::ConfirmNotify(confirm) = parse_b2s_frame(&frame).unwrap() else {
        panic!("expected CONFIRM_NOTIFY");
    };
    assert_eq!(confirm.subscribers, 3);
    assert_eq!(&confirm.identifier[..], b"n1");
}
