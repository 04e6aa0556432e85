//! Connection nonce and authorization counters.
//!
//! Both peers contribute 32 random bytes at CONFIGURE / CONFIRM_CONFIGURE
//! and derive `SHA-256(subscriber || broadcaster)`. Every authorized frame
//! then spends one counter value of its sender's direction: subscriber
//! tokens run -1, -2, ... and broadcaster tokens run 1, 2, .... Each peer
//! tracks both counters, minting for its own direction and verifying the
//! other.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::debug;
use wspubsub_protocol::{Direction, NONCE_LEN, authorization_value, derive_connection_nonce};

use crate::error::{SessionError, SessionResult};

/// Source of the 32-byte nonce contributions.
pub trait NonceSource: Send {
    /// Returns a fresh contribution.
    fn next_nonce(&mut self) -> [u8; NONCE_LEN];
}

/// Nonces from an OS-seeded CSPRNG.
#[derive(Debug)]
pub struct RandomNonceSource {
    rng: StdRng,
}

impl RandomNonceSource {
    /// Seeds a generator from the operating system.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl Default for RandomNonceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceSource for RandomNonceSource {
    fn next_nonce(&mut self) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng.fill_bytes(&mut nonce);
        nonce
    }
}

/// Always returns the same nonce. For tests and reproducible simulations.
#[derive(Debug, Clone, Copy)]
pub struct FixedNonceSource(pub [u8; NONCE_LEN]);

impl NonceSource for FixedNonceSource {
    fn next_nonce(&mut self) -> [u8; NONCE_LEN] {
        self.0
    }
}

/// Per-connection nonce and counter state.
#[derive(Debug, Clone)]
pub struct ConnectionNonceState {
    subscriber_nonce: Option<[u8; NONCE_LEN]>,
    broadcaster_nonce: Option<[u8; NONCE_LEN]>,
    connection_nonce: Option<[u8; NONCE_LEN]>,
    /// Counter carried by the next subscriber token.
    subscriber_counter: i64,
    /// Counter carried by the next broadcaster token.
    broadcaster_counter: i64,
}

impl Default for ConnectionNonceState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionNonceState {
    /// Creates state with neither contribution known.
    pub fn new() -> Self {
        Self {
            subscriber_nonce: None,
            broadcaster_nonce: None,
            connection_nonce: None,
            subscriber_counter: -1,
            broadcaster_counter: 1,
        }
    }

    /// Subscriber side: records the contribution sent in CONFIGURE.
    pub fn set_subscriber_nonce(&mut self, nonce: [u8; NONCE_LEN]) -> SessionResult<()> {
        if self.subscriber_nonce.is_some() {
            return Err(SessionError::violation("subscriber nonce already set"));
        }
        self.subscriber_nonce = Some(nonce);
        Ok(())
    }

    /// Broadcaster side: accepts the subscriber's contribution, draws its
    /// own, and derives the connection nonce. Returns the broadcaster nonce
    /// for CONFIRM_CONFIGURE.
    pub fn on_configure(
        &mut self,
        subscriber_nonce: [u8; NONCE_LEN],
        source: &mut dyn NonceSource,
    ) -> SessionResult<[u8; NONCE_LEN]> {
        self.set_subscriber_nonce(subscriber_nonce)?;
        let broadcaster_nonce = source.next_nonce();
        self.establish(broadcaster_nonce)?;
        Ok(broadcaster_nonce)
    }

    /// Subscriber side: accepts the broadcaster's contribution from
    /// CONFIRM_CONFIGURE.
    pub fn on_confirm_configure(&mut self, broadcaster_nonce: [u8; NONCE_LEN]) -> SessionResult<()> {
        if self.subscriber_nonce.is_none() {
            return Err(SessionError::violation(
                "CONFIRM_CONFIGURE before CONFIGURE was sent",
            ));
        }
        self.establish(broadcaster_nonce)
    }

    fn establish(&mut self, broadcaster_nonce: [u8; NONCE_LEN]) -> SessionResult<()> {
        let Some(subscriber_nonce) = self.subscriber_nonce else {
            return Err(SessionError::violation("subscriber nonce unknown"));
        };
        if self.broadcaster_nonce.is_some() {
            return Err(SessionError::violation("broadcaster nonce already set"));
        }
        self.broadcaster_nonce = Some(broadcaster_nonce);
        self.connection_nonce = Some(derive_connection_nonce(&subscriber_nonce, &broadcaster_nonce));
        debug!("Connection nonce derived");
        Ok(())
    }

    /// Derived nonce, once both contributions are known.
    pub fn connection_nonce(&self) -> Option<&[u8; NONCE_LEN]> {
        self.connection_nonce.as_ref()
    }

    /// Whether tokens can be minted and verified.
    pub fn is_established(&self) -> bool {
        self.connection_nonce.is_some()
    }

    /// Counter the next token of `direction` will carry.
    pub fn next_counter(&self, direction: Direction) -> i64 {
        match direction {
            Direction::SubscriberToBroadcaster => self.subscriber_counter,
            Direction::BroadcasterToSubscriber => self.broadcaster_counter,
        }
    }

    fn nonce_or_violation(&self) -> SessionResult<&[u8; NONCE_LEN]> {
        self.connection_nonce
            .as_ref()
            .ok_or_else(|| SessionError::violation("authorization before CONFIGURE completed"))
    }

    fn advance(&mut self, direction: Direction) -> SessionResult<()> {
        let next = match direction {
            Direction::SubscriberToBroadcaster => self.subscriber_counter.checked_sub(1),
            Direction::BroadcasterToSubscriber => self.broadcaster_counter.checked_add(1),
        }
        .ok_or_else(|| SessionError::violation("authorization counter exhausted"))?;

        match direction {
            Direction::SubscriberToBroadcaster => self.subscriber_counter = next,
            Direction::BroadcasterToSubscriber => self.broadcaster_counter = next,
        }
        Ok(())
    }

    /// Mints the token for the next authorized frame in `direction`.
    pub fn next_token(&mut self, direction: Direction) -> SessionResult<String> {
        let counter = self.next_counter(direction);
        let token = authorization_value(self.nonce_or_violation()?, counter);
        self.advance(direction)?;
        Ok(token)
    }

    /// Subscriber side: token for a subscribe, unsubscribe or notify frame.
    pub fn next_subscriber_token(&mut self) -> SessionResult<String> {
        self.next_token(Direction::SubscriberToBroadcaster)
    }

    /// Broadcaster side: token for a RECEIVE_STREAM part.
    pub fn next_broadcaster_token(&mut self) -> SessionResult<String> {
        self.next_token(Direction::BroadcasterToSubscriber)
    }

    /// Checks a received token against the expected counter for
    /// `direction` and consumes that counter value.
    ///
    /// A mismatch leaves the counter untouched; the connection is closed
    /// anyway.
    pub fn verify_token(&mut self, direction: Direction, token: &str) -> SessionResult<()> {
        let expected_counter = self.next_counter(direction);
        let expected = authorization_value(self.nonce_or_violation()?, expected_counter);
        if token != expected {
            debug!(expected_counter, "Authorization mismatch");
            return Err(SessionError::AuthorizationFailed { expected_counter });
        }
        self.advance(direction)
    }
}
