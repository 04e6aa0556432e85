//! Wire codec for the websocket publish/subscribe protocol.
//!
//! A subscriber and a broadcaster exchange discrete binary frames over a
//! persistent connection. Each frame carries exactly one message:
//!
//! ```text
//! +-----------+----------+------------------+-----------------+
//! | flags (1) | type (1) | header section   | body (optional) |
//! +-----------+----------+------------------+-----------------+
//! ```
//!
//! The header section is written either with names (explicit) or, when
//! [`MessageFlags::MINIMAL_HEADERS`] is set, as bare values in a fixed
//! order. Numeric values use the shortest big-endian form
//! (see [`encode_unsigned`]).
//!
//! Everything here is pure: parsing borrows an already-buffered frame and
//! serialization returns a new buffer. Connection state (nonces, counters,
//! reassembly, compression negotiation) lives in the session layer.
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use wspubsub_protocol::{
//!     B2sMessage, ConfirmExactSubscription, SubscriptionAction, parse_b2s_frame,
//! };
//!
//! let confirm = ConfirmExactSubscription {
//!     action: SubscriptionAction::Subscribe,
//!     topic: Bytes::from_static(b"orders"),
//! };
//! let frame = B2sMessage::from(confirm.clone()).serialize(true).unwrap();
//! assert_eq!(parse_b2s_frame(&frame).unwrap(), B2sMessage::from(confirm));
//! ```

mod authorization;
mod digest;
mod dispatch;
mod error;
mod flags;
mod frame;
mod headers;
mod integer;
mod messages;
mod types;

pub use authorization::{
    AUTHORIZATION_SCHEME, ParsedAuthorization, authorization_value, format_counter,
    parse_authorization, parse_counter,
};
pub use digest::{NONCE_LEN, PayloadHasher, SHA512_LEN, derive_connection_nonce, payload_sha512};
pub use dispatch::{Dispatcher, b2s_dispatcher, parse_b2s_frame, parse_s2b_frame, s2b_dispatcher};
pub use error::{ProtocolError, ProtocolResult};
pub use flags::MessageFlags;
pub use frame::{FRAME_PREFIX_LEN, FrameReader, FrameWriter, RawFrame, split_frame};
pub use headers::{Headers, MAX_HEADER_LEN, decode_headers, encode_header, encode_headers};
pub use integer::{MAX_INTEGER_LEN, decode_signed, decode_unsigned, encode_signed, encode_unsigned};
pub use messages::{
    B2sMessage, ConfirmConfigure, ConfirmExactSubscription, ConfirmGlobSubscription,
    ConfirmNotify, ConfirmReceive, Configure, EnableZstdCustom, EnableZstdPreset,
    ExactSubscription, FIRST_CUSTOM_ID, GlobSubscription, MAX_COMPRESSION_LEVEL,
    MAX_IDENTIFIER_LEN, MessageCodec, Notify, PayloadDescriptor, S2bMessage, StreamContinue,
    StreamPart, StreamPartKind, SubscriptionAction, compile_glob,
};
pub use types::{B2sType, Direction, MessageKind, S2bType};
