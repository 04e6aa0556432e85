//! Subscriber side of one connection.
//!
//! Mirror image of the broadcaster session: methods such as
//! [`SubscriberSession::subscribe_exact`] produce frames to send, and
//! [`SubscriberSession::handle`] consumes the broadcaster's frames,
//! returning replies plus [`SubscriberEvent`]s for the application.

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::{debug, info};
use wspubsub_protocol::{
    B2sMessage, ConfirmExactSubscription, ConfirmGlobSubscription, ConfirmNotify, ConfirmReceive,
    Configure, Direction, ExactSubscription, GlobSubscription, Notify, PayloadDescriptor,
    S2bMessage, StreamContinue, StreamPart, SubscriptionAction, compile_glob, payload_sha512,
};

use crate::compression::{
    CompressionEngine, CompressionNegotiation, CompressorEntry, ZSTD_PLAIN_ID, default_engine,
};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::fanout::{Publication, SubscriptionChange};
use crate::nonce::{ConnectionNonceState, NonceSource, RandomNonceSource};
use crate::outbound::StreamSender;
use crate::reassembly::{PartOutcome, Reassembler};

/// A notification delivered to this subscriber, decompressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedNotification {
    pub identifier: Bytes,
    pub topic: Bytes,
    pub compressor_id: u64,
    pub payload: Bytes,
    pub parts: u64,
}

/// Something the application may care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberEvent {
    /// Handshake finished; tokens can be minted.
    Configured,
    /// Broadcaster confirmed a subscribe or unsubscribe.
    SubscriptionConfirmed(SubscriptionChange),
    /// Broadcaster fanned out one of our notifications.
    NotifyConfirmed { identifier: Bytes, subscribers: u64 },
    /// A notification arrived.
    Received(ReceivedNotification),
    /// Broadcaster announced a compressor.
    CompressorEnabled { compressor_id: u64 },
}

/// Replies and events produced by one incoming frame.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SubscriberOutput {
    pub replies: Vec<S2bMessage>,
    pub events: Vec<SubscriberEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    New,
    AwaitingConfirm,
    Configured,
}

#[derive(Debug)]
enum OutboundNotify {
    Single { identifier: Bytes },
    Stream(StreamSender),
}

/// Per-connection subscriber state.
pub struct SubscriberSession {
    config: SessionConfig,
    phase: Phase,
    requested_zstd: bool,
    requested_training: bool,
    nonce: ConnectionNonceState,
    nonce_source: Box<dyn NonceSource>,
    reassembler: Reassembler,
    compression: CompressionNegotiation,
    engine: Box<dyn CompressionEngine>,
    pending: VecDeque<SubscriptionChange>,
    outbound: Option<OutboundNotify>,
    queue: VecDeque<(Publication, bool)>,
    next_identifier: u64,
}

impl SubscriberSession {
    /// Creates a session that has not sent CONFIGURE yet.
    pub fn new(config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;
        Ok(Self {
            reassembler: Reassembler::new(config.max_notification_bytes),
            config,
            phase: Phase::New,
            requested_zstd: false,
            requested_training: false,
            nonce: ConnectionNonceState::new(),
            nonce_source: Box::new(RandomNonceSource::new()),
            compression: CompressionNegotiation::new(false),
            engine: default_engine(),
            pending: VecDeque::new(),
            outbound: None,
            queue: VecDeque::new(),
            next_identifier: 0,
        })
    }

    /// Builder: replace the nonce source.
    pub fn with_nonce_source(mut self, source: Box<dyn NonceSource>) -> Self {
        self.nonce_source = source;
        self
    }

    /// Builder: replace the compression engine.
    pub fn with_engine(mut self, engine: Box<dyn CompressionEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Session settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether CONFIRM_CONFIGURE arrived.
    pub fn is_configured(&self) -> bool {
        self.phase == Phase::Configured
    }

    /// Nonce and counter state.
    pub fn nonce_state(&self) -> &ConnectionNonceState {
        &self.nonce
    }

    /// Negotiated compressors.
    pub fn compression(&self) -> &CompressionNegotiation {
        &self.compression
    }

    /// Subscription requests not yet confirmed.
    pub fn pending_confirmations(&self) -> usize {
        self.pending.len()
    }

    /// Whether an outgoing notification awaits its confirmation.
    pub fn notify_in_flight(&self) -> bool {
        self.outbound.is_some()
    }

    /// Whether the broadcaster owes a frame: a confirmation, a reply to a
    /// notification in flight or the next part of a RECEIVE_STREAM.
    pub fn awaiting_reply(&self) -> bool {
        self.phase == Phase::AwaitingConfirm
            || !self.pending.is_empty()
            || self.outbound.is_some()
            || self.reassembler.is_open()
    }

    /// Opens the handshake.
    pub fn configure(&mut self) -> SessionResult<S2bMessage> {
        if self.phase != Phase::New {
            return Err(SessionError::violation("CONFIGURE already sent"));
        }
        let subscriber_nonce = self.nonce_source.next_nonce();
        self.nonce.set_subscriber_nonce(subscriber_nonce)?;

        let plain = CompressorEntry {
            id: ZSTD_PLAIN_ID,
            ..CompressorEntry::none()
        };
        self.requested_zstd = self.config.enable_zstd && self.engine.supports(&plain);
        self.requested_training = self.requested_zstd && self.config.enable_training;
        self.phase = Phase::AwaitingConfirm;
        debug!(
            zstd = self.requested_zstd,
            training = self.requested_training,
            "Sending CONFIGURE"
        );

        Ok(Configure {
            subscriber_nonce,
            enable_zstd: self.requested_zstd,
            enable_training: self.requested_training,
            initial_dict: self.config.initial_dict,
        }
        .into())
    }

    fn require_configured(&self, what: &str) -> SessionResult<()> {
        if self.phase != Phase::Configured {
            return Err(SessionError::violation(format!("{what} before CONFIRM_CONFIGURE")));
        }
        Ok(())
    }

    fn request(&mut self, change: SubscriptionChange) -> SessionResult<S2bMessage> {
        self.require_configured("subscription")?;
        if let SubscriptionChange::Glob { glob, .. } = &change {
            compile_glob(glob)?;
        }
        let authorization = self.nonce.next_subscriber_token()?;
        let message = match &change {
            SubscriptionChange::Exact { action, topic } => ExactSubscription {
                action: *action,
                authorization,
                topic: topic.clone(),
            }
            .into(),
            SubscriptionChange::Glob { action, glob } => GlobSubscription {
                action: *action,
                authorization,
                glob: glob.clone(),
            }
            .into(),
        };
        self.pending.push_back(change);
        Ok(message)
    }

    /// SUBSCRIBE_EXACT for `topic`.
    pub fn subscribe_exact(&mut self, topic: impl Into<Bytes>) -> SessionResult<S2bMessage> {
        self.request(SubscriptionChange::Exact {
            action: SubscriptionAction::Subscribe,
            topic: topic.into(),
        })
    }

    /// UNSUBSCRIBE_EXACT for `topic`.
    pub fn unsubscribe_exact(&mut self, topic: impl Into<Bytes>) -> SessionResult<S2bMessage> {
        self.request(SubscriptionChange::Exact {
            action: SubscriptionAction::Unsubscribe,
            topic: topic.into(),
        })
    }

    /// SUBSCRIBE_GLOB for `glob`.
    pub fn subscribe_glob(&mut self, glob: impl Into<String>) -> SessionResult<S2bMessage> {
        self.request(SubscriptionChange::Glob {
            action: SubscriptionAction::Subscribe,
            glob: glob.into(),
        })
    }

    /// UNSUBSCRIBE_GLOB for `glob`.
    pub fn unsubscribe_glob(&mut self, glob: impl Into<String>) -> SessionResult<S2bMessage> {
        self.request(SubscriptionChange::Glob {
            action: SubscriptionAction::Unsubscribe,
            glob: glob.into(),
        })
    }

    /// Queues a notification. Payloads that fit in one part go out as a
    /// single NOTIFY, larger ones as NOTIFY_STREAM parts. Returns the frames
    /// that can be sent now.
    pub fn notify(
        &mut self,
        topic: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> SessionResult<Vec<S2bMessage>> {
        self.enqueue(topic.into(), payload.into(), false)
    }

    /// Like [`Self::notify`] but always uses NOTIFY_STREAM.
    pub fn notify_stream(
        &mut self,
        topic: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> SessionResult<Vec<S2bMessage>> {
        self.enqueue(topic.into(), payload.into(), true)
    }

    fn enqueue(
        &mut self,
        topic: Bytes,
        payload: Bytes,
        stream: bool,
    ) -> SessionResult<Vec<S2bMessage>> {
        self.queue.push_back((Publication { topic, payload }, stream));
        if self.phase != Phase::Configured {
            return Ok(Vec::new());
        }
        self.pump()
    }

    fn pump(&mut self) -> SessionResult<Vec<S2bMessage>> {
        let mut frames = Vec::new();
        if self.outbound.is_none()
            && let Some((publication, stream)) = self.queue.pop_front()
        {
            let (identifier, descriptor, compressed) = self.compress(publication)?;
            if !stream && compressed.len() <= self.config.max_part_size {
                let authorization = self.nonce.next_subscriber_token()?;
                debug!(
                    identifier = %String::from_utf8_lossy(&identifier),
                    compressor_id = descriptor.compressor_id,
                    "Sending NOTIFY"
                );
                self.outbound = Some(OutboundNotify::Single {
                    identifier: identifier.clone(),
                });
                frames.push(
                    Notify {
                        authorization,
                        identifier,
                        descriptor,
                        body: compressed,
                    }
                    .into(),
                );
                return Ok(frames);
            }
            self.outbound = Some(OutboundNotify::Stream(StreamSender::new(
                identifier,
                descriptor,
                compressed,
                self.config.max_part_size,
            )?));
        }

        if let Some(OutboundNotify::Stream(sender)) = self.outbound.as_mut() {
            let nonce = &mut self.nonce;
            if let Some(part) = sender.next_part(|| nonce.next_subscriber_token())? {
                debug!(
                    identifier = %String::from_utf8_lossy(&part.identifier),
                    part_id = part.part_id(),
                    "Sending NOTIFY_STREAM part"
                );
                frames.push(S2bMessage::NotifyStream(part));
            }
        }
        Ok(frames)
    }

    fn compress(
        &mut self,
        publication: Publication,
    ) -> SessionResult<(Bytes, PayloadDescriptor, Bytes)> {
        let entry = self
            .compression
            .outbound_for(publication.payload.len(), self.engine.as_ref());
        let compressed = self.engine.compress(&publication.payload, &entry)?;
        let identifier = Bytes::from(format!("n{}", self.next_identifier));
        self.next_identifier += 1;
        let descriptor = PayloadDescriptor {
            topic: publication.topic,
            compressor_id: entry.id,
            compressed_length: compressed.len() as u64,
            decompressed_length: publication.payload.len() as u64,
            compressed_sha512: payload_sha512(&compressed),
        };
        Ok((identifier, descriptor, compressed))
    }

    /// Handles one frame from the broadcaster.
    pub fn handle(&mut self, message: B2sMessage) -> SessionResult<SubscriberOutput> {
        let kind = message.kind();
        debug!(kind = %kind, "Handling broadcaster frame");

        match message {
            B2sMessage::ConfirmConfigure(confirm) => {
                if self.phase != Phase::AwaitingConfirm {
                    return Err(SessionError::violation("unexpected CONFIRM_CONFIGURE"));
                }
                self.nonce.on_confirm_configure(confirm.broadcaster_nonce)?;
                self.compression = CompressionNegotiation::new(self.requested_zstd)
                    .with_training(self.requested_training);
                self.phase = Phase::Configured;
                info!("Connection configured");
                Ok(SubscriberOutput {
                    replies: self.pump()?,
                    events: vec![SubscriberEvent::Configured],
                })
            }
            _ if self.phase != Phase::Configured => Err(SessionError::violation(format!(
                "{kind} before CONFIRM_CONFIGURE"
            ))),
            B2sMessage::ConfirmExactSubscription(ConfirmExactSubscription { action, topic }) => {
                self.on_subscription_confirmed(SubscriptionChange::Exact { action, topic })
            }
            B2sMessage::ConfirmGlobSubscription(ConfirmGlobSubscription { action, glob }) => {
                self.on_subscription_confirmed(SubscriptionChange::Glob { action, glob })
            }
            B2sMessage::ConfirmNotify(confirm) => self.on_confirm_notify(confirm),
            B2sMessage::ContinueNotify(ack) => {
                let Some(OutboundNotify::Stream(sender)) = self.outbound.as_mut() else {
                    return Err(SessionError::violation(
                        "CONTINUE_NOTIFY with no stream in flight",
                    ));
                };
                sender.on_continue(&ack.identifier, ack.part_id)?;
                Ok(SubscriberOutput {
                    replies: self.pump()?,
                    events: Vec::new(),
                })
            }
            B2sMessage::ReceiveStream(part) => self.on_receive_stream(part),
            B2sMessage::EnableZstdPreset(preset) => {
                self.compression.apply_preset(&preset)?;
                Ok(SubscriberOutput {
                    replies: Vec::new(),
                    events: vec![SubscriberEvent::CompressorEnabled {
                        compressor_id: u64::from(preset.identifier),
                    }],
                })
            }
            B2sMessage::EnableZstdCustom(custom) => {
                self.compression.apply_custom(&custom)?;
                Ok(SubscriberOutput {
                    replies: Vec::new(),
                    events: vec![SubscriberEvent::CompressorEnabled {
                        compressor_id: custom.identifier,
                    }],
                })
            }
        }
    }

    fn on_subscription_confirmed(
        &mut self,
        change: SubscriptionChange,
    ) -> SessionResult<SubscriberOutput> {
        if self.pending.front() != Some(&change) {
            return Err(SessionError::violation(format!(
                "unexpected subscription confirmation {change:?}"
            )));
        }
        self.pending.pop_front();
        debug!(?change, "Subscription confirmed");
        Ok(SubscriberOutput {
            replies: Vec::new(),
            events: vec![SubscriberEvent::SubscriptionConfirmed(change)],
        })
    }

    fn on_confirm_notify(&mut self, confirm: ConfirmNotify) -> SessionResult<SubscriberOutput> {
        match self.outbound.as_mut() {
            Some(OutboundNotify::Single { identifier }) if *identifier == confirm.identifier => {}
            Some(OutboundNotify::Stream(sender)) => sender.on_confirm(&confirm.identifier)?,
            _ => {
                return Err(SessionError::violation(format!(
                    "unexpected CONFIRM_NOTIFY for {}",
                    String::from_utf8_lossy(&confirm.identifier)
                )));
            }
        }
        self.outbound = None;
        info!(
            identifier = %String::from_utf8_lossy(&confirm.identifier),
            subscribers = confirm.subscribers,
            "Notification confirmed"
        );
        Ok(SubscriberOutput {
            replies: self.pump()?,
            events: vec![SubscriberEvent::NotifyConfirmed {
                identifier: confirm.identifier,
                subscribers: confirm.subscribers,
            }],
        })
    }

    fn on_receive_stream(&mut self, part: StreamPart) -> SessionResult<SubscriberOutput> {
        self.nonce
            .verify_token(Direction::BroadcasterToSubscriber, &part.authorization)?;
        if let Some(descriptor) = part.descriptor()
            && !self
                .compression
                .is_acceptable_for_decompression(descriptor.compressor_id)
        {
            return Err(SessionError::violation(format!(
                "compressor {} was not negotiated",
                descriptor.compressor_id
            )));
        }

        match self.reassembler.accept(&part)? {
            PartOutcome::Continue {
                identifier,
                part_id,
            } => Ok(SubscriberOutput {
                replies: vec![S2bMessage::ContinueReceive(StreamContinue {
                    identifier,
                    part_id,
                })],
                events: Vec::new(),
            }),
            PartOutcome::Complete(done) => {
                let entry = self.compression.resolve(done.compressor_id).ok_or_else(|| {
                    SessionError::violation(format!(
                        "compressor {} is no longer retained",
                        done.compressor_id
                    ))
                })?;
                let payload =
                    self.engine
                        .decompress(&done.payload, &entry, done.decompressed_length)?;
                info!(
                    identifier = %String::from_utf8_lossy(&done.identifier),
                    topic = %String::from_utf8_lossy(&done.topic),
                    parts = done.parts,
                    "Notification received"
                );
                Ok(SubscriberOutput {
                    replies: vec![
                        ConfirmReceive {
                            identifier: done.identifier.clone(),
                        }
                        .into(),
                    ],
                    events: vec![SubscriberEvent::Received(ReceivedNotification {
                        identifier: done.identifier,
                        topic: done.topic,
                        compressor_id: done.compressor_id,
                        payload,
                        parts: done.parts,
                    })],
                })
            }
        }
    }
}
