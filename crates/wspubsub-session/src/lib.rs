//! Connection-scoped state for the websocket publish/subscribe protocol.
//!
//! The wire codec in `wspubsub_protocol` is stateless. This crate holds
//! what one connection needs on top of it:
//! - nonce exchange and the two authorization counters
//! - reassembly of multi-part notifications
//! - compression negotiation, with pluggable compression engines
//! - broadcaster and subscriber session state machines
//! - async loops moving frames between a session and a transport
//!
//! # Example
//!
//! ```rust,no_run
//! use wspubsub_session::{
//!     BroadcasterSession, ChannelTransport, LocalHub, SessionConfig, SubscriberClient,
//!     SubscriberSession, serve_subscriber,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = LocalHub::new();
//!     let (client_end, server_end) = ChannelTransport::pair(16);
//!
//!     let (handle, deliveries) = hub.connect();
//!     let session = BroadcasterSession::new(SessionConfig::default(), Box::new(handle))?;
//!     tokio::spawn(serve_subscriber(server_end, session, deliveries));
//!
//!     let subscriber = SubscriberSession::new(SessionConfig::default())?;
//!     let mut client = SubscriberClient::connect(client_end, subscriber).await?;
//!     client.subscribe_exact("orders").await?;
//!     client.notify("orders", "hello").await?;
//!     let received = client.next_notification().await?;
//!     assert_eq!(&received.payload[..], b"hello");
//!     Ok(())
//! }
//! ```

mod broadcaster;
mod compression;
mod config;
mod driver;
mod error;
mod fanout;
mod nonce;
mod outbound;
mod reassembly;
mod subscriber;
mod transport;

pub use broadcaster::BroadcasterSession;
#[cfg(feature = "zstd")]
pub use compression::ZstdEngine;
pub use compression::{
    CompressionEngine, CompressionNegotiation, CompressorEntry, IdentityEngine,
    MAX_CUSTOM_DICTIONARIES, ZSTD_PLAIN_ID, default_engine,
};
pub use config::SessionConfig;
pub use driver::{SubscriberClient, serve_subscriber};
pub use error::{SessionError, SessionResult};
pub use fanout::{FanOut, HubHandle, LocalHub, NoFanOut, Publication, SubscriptionChange};
pub use nonce::{ConnectionNonceState, FixedNonceSource, NonceSource, RandomNonceSource};
pub use outbound::StreamSender;
pub use reassembly::{CompletedNotification, PartOutcome, Reassembler};
pub use subscriber::{ReceivedNotification, SubscriberEvent, SubscriberOutput, SubscriberSession};
pub use transport::{ChannelTransport, FrameTransport, receive_within};
