//! Broadcaster side of one connection.
//!
//! The session is a synchronous state machine: feed it each parsed frame
//! with [`BroadcasterSession::handle`] and send back whatever it returns.
//! Deliveries for the subscriber go in through
//! [`BroadcasterSession::enqueue_delivery`] and come out as RECEIVE_STREAM
//! parts, one notification at a time.

use std::collections::{HashSet, VecDeque};

use bytes::Bytes;
use tracing::{debug, info};
use wspubsub_protocol::{
    B2sMessage, ConfirmConfigure, ConfirmExactSubscription, ConfirmGlobSubscription,
    ConfirmNotify, ConfirmReceive, Configure, Direction, EnableZstdCustom, EnableZstdPreset,
    ExactSubscription, FIRST_CUSTOM_ID, GlobSubscription, Notify, PayloadDescriptor, S2bMessage,
    StreamContinue, StreamPart, SubscriptionAction, payload_sha512,
};

use crate::compression::{
    CompressionEngine, CompressionNegotiation, CompressorEntry, ZSTD_PLAIN_ID, default_engine,
};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::fanout::{FanOut, Publication, SubscriptionChange};
use crate::nonce::{ConnectionNonceState, NonceSource, RandomNonceSource};
use crate::outbound::StreamSender;
use crate::reassembly::{PartOutcome, Reassembler};

/// Recent payloads kept as dictionary training samples.
const MAX_TRAINING_SAMPLES: usize = 256;

/// Per-connection broadcaster state.
pub struct BroadcasterSession {
    config: SessionConfig,
    configured: bool,
    nonce: ConnectionNonceState,
    nonce_source: Box<dyn NonceSource>,
    reassembler: Reassembler,
    compression: CompressionNegotiation,
    engine: Box<dyn CompressionEngine>,
    fanout: Box<dyn FanOut>,
    exact: HashSet<Bytes>,
    globs: HashSet<String>,
    outbound: Option<StreamSender>,
    queue: VecDeque<Publication>,
    next_delivery: u64,
    next_custom_id: u64,
    samples: VecDeque<Bytes>,
}

impl BroadcasterSession {
    /// Creates a session awaiting CONFIGURE.
    pub fn new(config: SessionConfig, fanout: Box<dyn FanOut>) -> SessionResult<Self> {
        config.validate()?;
        Ok(Self {
            reassembler: Reassembler::new(config.max_notification_bytes),
            config,
            configured: false,
            nonce: ConnectionNonceState::new(),
            nonce_source: Box::new(RandomNonceSource::new()),
            compression: CompressionNegotiation::new(false),
            engine: default_engine(),
            fanout,
            exact: HashSet::new(),
            globs: HashSet::new(),
            outbound: None,
            queue: VecDeque::new(),
            next_delivery: 0,
            next_custom_id: FIRST_CUSTOM_ID,
            samples: VecDeque::new(),
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

    /// Whether CONFIGURE was handled.
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Nonce and counter state.
    pub fn nonce_state(&self) -> &ConnectionNonceState {
        &self.nonce
    }

    /// Negotiated compressors.
    pub fn compression(&self) -> &CompressionNegotiation {
        &self.compression
    }

    /// Deliveries waiting behind the one in flight.
    pub fn queued_deliveries(&self) -> usize {
        self.queue.len()
    }

    /// Whether a delivery is being streamed.
    pub fn delivery_in_flight(&self) -> bool {
        self.outbound.is_some()
    }

    /// Whether the subscriber owes a frame: the next part of a NOTIFY_STREAM
    /// or a reply to a delivery in flight. Between those the connection may
    /// stay silent indefinitely.
    pub fn awaiting_reply(&self) -> bool {
        self.outbound.is_some() || self.reassembler.is_open()
    }

    /// Handles one frame from the subscriber, returning the replies.
    pub fn handle(&mut self, message: S2bMessage) -> SessionResult<Vec<B2sMessage>> {
        let kind = message.kind();
        debug!(kind = %kind, "Handling subscriber frame");

        match message {
            S2bMessage::Configure(configure) => self.on_configure(configure),
            _ if !self.configured => Err(SessionError::violation(format!(
                "{kind} before CONFIGURE"
            ))),
            S2bMessage::ExactSubscription(request) => self.on_exact(request),
            S2bMessage::GlobSubscription(request) => self.on_glob(request),
            S2bMessage::Notify(notify) => self.on_notify(notify),
            S2bMessage::NotifyStream(part) => self.on_notify_stream(part),
            S2bMessage::ContinueReceive(ack) => self.on_continue_receive(ack),
            S2bMessage::ConfirmReceive(ack) => self.on_confirm_receive(ack),
        }
    }

    fn on_configure(&mut self, configure: Configure) -> SessionResult<Vec<B2sMessage>> {
        if self.configured {
            return Err(SessionError::violation("second CONFIGURE"));
        }

        let broadcaster_nonce = self
            .nonce
            .on_configure(configure.subscriber_nonce, &mut *self.nonce_source)?;

        let plain = self.preset_entry(ZSTD_PLAIN_ID);
        let zstd = self.config.enable_zstd && configure.enable_zstd && self.engine.supports(&plain);
        let training = zstd && self.config.enable_training && configure.enable_training;
        self.compression = CompressionNegotiation::new(zstd).with_training(training);
        self.configured = true;
        info!(
            zstd,
            training = self.compression.training_enabled(),
            initial_dict = configure.initial_dict,
            "Subscriber configured"
        );

        let mut replies = vec![B2sMessage::from(ConfirmConfigure { broadcaster_nonce })];
        if zstd {
            let requested = self.preset_entry(u64::from(configure.initial_dict));
            let entry = if configure.initial_dict > 1
                && self
                    .config
                    .preset_dictionaries
                    .contains(&configure.initial_dict)
                && self.engine.supports(&requested)
            {
                requested
            } else {
                plain
            };
            let announcement = EnableZstdPreset {
                identifier: u16::try_from(entry.id)
                    .map_err(|_| SessionError::config("preset id out of range"))?,
                compression_level: entry.level,
                min_size: entry.min_size_hint,
                max_size: entry.max_size_hint,
            };
            self.compression.announce_preset(entry)?;
            replies.push(announcement.into());
        }
        replies.extend(self.pump()?);
        Ok(replies)
    }

    fn preset_entry(&self, id: u64) -> CompressorEntry {
        CompressorEntry {
            id,
            level: self.config.compression_level,
            min_size_hint: self.config.min_size_hint,
            max_size_hint: self.config.max_size_hint,
            dictionary: None,
        }
    }

    fn on_exact(&mut self, request: ExactSubscription) -> SessionResult<Vec<B2sMessage>> {
        self.nonce
            .verify_token(Direction::SubscriberToBroadcaster, &request.authorization)?;

        let topic = String::from_utf8_lossy(&request.topic).into_owned();
        let changed = match request.action {
            SubscriptionAction::Subscribe => self.exact.insert(request.topic.clone()),
            SubscriptionAction::Unsubscribe => self.exact.remove(&request.topic),
        };
        if !changed {
            return Err(SessionError::violation(match request.action {
                SubscriptionAction::Subscribe => format!("already subscribed to {topic}"),
                SubscriptionAction::Unsubscribe => format!("not subscribed to {topic}"),
            }));
        }

        self.fanout.update(&SubscriptionChange::Exact {
            action: request.action,
            topic: request.topic.clone(),
        })?;
        debug!(topic = %topic, action = ?request.action, "Exact subscription updated");
        Ok(vec![
            ConfirmExactSubscription {
                action: request.action,
                topic: request.topic,
            }
            .into(),
        ])
    }

    fn on_glob(&mut self, request: GlobSubscription) -> SessionResult<Vec<B2sMessage>> {
        self.nonce
            .verify_token(Direction::SubscriberToBroadcaster, &request.authorization)?;

        let changed = match request.action {
            SubscriptionAction::Subscribe => self.globs.insert(request.glob.clone()),
            SubscriptionAction::Unsubscribe => self.globs.remove(&request.glob),
        };
        if !changed {
            return Err(SessionError::violation(match request.action {
                SubscriptionAction::Subscribe => format!("already subscribed to {}", request.glob),
                SubscriptionAction::Unsubscribe => format!("not subscribed to {}", request.glob),
            }));
        }

        self.fanout.update(&SubscriptionChange::Glob {
            action: request.action,
            glob: request.glob.clone(),
        })?;
        debug!(glob = %request.glob, action = ?request.action, "Glob subscription updated");
        Ok(vec![
            ConfirmGlobSubscription {
                action: request.action,
                glob: request.glob,
            }
            .into(),
        ])
    }

    fn on_notify(&mut self, notify: Notify) -> SessionResult<Vec<B2sMessage>> {
        self.nonce
            .verify_token(Direction::SubscriberToBroadcaster, &notify.authorization)?;
        if let Some(open) = self.reassembler.open_identifier() {
            return Err(SessionError::violation(format!(
                "NOTIFY while stream {} is open",
                String::from_utf8_lossy(open)
            )));
        }

        let descriptor = &notify.descriptor;
        if payload_sha512(&notify.body) != descriptor.compressed_sha512 {
            return Err(SessionError::integrity(
                &notify.identifier,
                "compressed payload does not match x-compressed-sha512",
            ));
        }

        let subscribers = self.publish(
            &notify.identifier,
            descriptor.topic.clone(),
            descriptor.compressor_id,
            descriptor.decompressed_length,
            &notify.body,
        )?;
        Ok(vec![
            ConfirmNotify {
                identifier: notify.identifier,
                subscribers,
            }
            .into(),
        ])
    }

    fn on_notify_stream(&mut self, part: StreamPart) -> SessionResult<Vec<B2sMessage>> {
        self.nonce
            .verify_token(Direction::SubscriberToBroadcaster, &part.authorization)?;
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
            } => Ok(vec![B2sMessage::ContinueNotify(StreamContinue {
                identifier,
                part_id,
            })]),
            PartOutcome::Complete(done) => {
                let subscribers = self.publish(
                    &done.identifier,
                    done.topic,
                    done.compressor_id,
                    done.decompressed_length,
                    &done.payload,
                )?;
                Ok(vec![
                    ConfirmNotify {
                        identifier: done.identifier,
                        subscribers,
                    }
                    .into(),
                ])
            }
        }
    }

    fn publish(
        &mut self,
        identifier: &[u8],
        topic: Bytes,
        compressor_id: u64,
        decompressed_length: u64,
        compressed: &[u8],
    ) -> SessionResult<u64> {
        let entry = self.compression.resolve(compressor_id).ok_or_else(|| {
            SessionError::violation(format!("compressor {compressor_id} was not negotiated"))
        })?;
        if decompressed_length > self.config.max_notification_bytes {
            return Err(SessionError::violation(format!(
                "notification of {decompressed_length} bytes exceeds {}",
                self.config.max_notification_bytes
            )));
        }

        let payload = self
            .engine
            .decompress(compressed, &entry, decompressed_length)?;
        if self.compression.training_enabled() {
            self.samples.push_back(payload.clone());
            while self.samples.len() > MAX_TRAINING_SAMPLES {
                self.samples.pop_front();
            }
        }

        let topic_text = String::from_utf8_lossy(&topic).into_owned();
        let reached = self.fanout.publish(Publication { topic, payload })?;
        info!(
            identifier = %String::from_utf8_lossy(identifier),
            topic = %topic_text,
            compressor_id,
            reached,
            "Notification published"
        );
        Ok(reached)
    }

    fn on_continue_receive(&mut self, ack: StreamContinue) -> SessionResult<Vec<B2sMessage>> {
        let sender = self
            .outbound
            .as_mut()
            .ok_or_else(|| SessionError::violation("CONTINUE_RECEIVE with nothing in flight"))?;
        sender.on_continue(&ack.identifier, ack.part_id)?;
        self.pump()
    }

    fn on_confirm_receive(&mut self, ack: ConfirmReceive) -> SessionResult<Vec<B2sMessage>> {
        let sender = self
            .outbound
            .as_mut()
            .ok_or_else(|| SessionError::violation("CONFIRM_RECEIVE with nothing in flight"))?;
        sender.on_confirm(&ack.identifier)?;
        debug!(
            identifier = %String::from_utf8_lossy(&ack.identifier),
            "Delivery confirmed"
        );
        self.outbound = None;
        self.pump()
    }

    /// Queues a notification for this subscriber. Returns the frames that
    /// can go out right away.
    pub fn enqueue_delivery(&mut self, publication: Publication) -> SessionResult<Vec<B2sMessage>> {
        self.queue.push_back(publication);
        if !self.configured {
            return Ok(Vec::new());
        }
        self.pump()
    }

    fn pump(&mut self) -> SessionResult<Vec<B2sMessage>> {
        if self.outbound.is_none()
            && let Some(publication) = self.queue.pop_front()
        {
            self.outbound = Some(self.prepare_delivery(publication)?);
        }

        let mut frames = Vec::new();
        if let Some(sender) = self.outbound.as_mut() {
            let nonce = &mut self.nonce;
            if let Some(part) = sender.next_part(|| nonce.next_broadcaster_token())? {
                debug!(
                    identifier = %String::from_utf8_lossy(&part.identifier),
                    part_id = part.part_id(),
                    bytes = part.body.len(),
                    "Sending delivery part"
                );
                frames.push(B2sMessage::ReceiveStream(part));
            }
        }
        Ok(frames)
    }

    fn prepare_delivery(&mut self, publication: Publication) -> SessionResult<StreamSender> {
        let entry = self
            .compression
            .outbound_for(publication.payload.len(), self.engine.as_ref());
        let compressed = self.engine.compress(&publication.payload, &entry)?;

        let identifier = Bytes::from(format!("d{}", self.next_delivery));
        self.next_delivery += 1;
        let descriptor = PayloadDescriptor {
            topic: publication.topic,
            compressor_id: entry.id,
            compressed_length: compressed.len() as u64,
            decompressed_length: publication.payload.len() as u64,
            compressed_sha512: payload_sha512(&compressed),
        };
        StreamSender::new(identifier, descriptor, compressed, self.config.max_part_size)
    }

    /// Announces a dictionary for this connection. New deliveries use it
    /// right away.
    pub fn announce_custom_dictionary(&mut self, dictionary: Bytes) -> SessionResult<B2sMessage> {
        if !self.configured {
            return Err(SessionError::violation("dictionary before CONFIGURE"));
        }
        let entry = CompressorEntry {
            id: self.next_custom_id,
            dictionary: Some(dictionary.clone()),
            ..self.preset_entry(self.next_custom_id)
        };
        if !self.engine.supports(&entry) {
            return Err(SessionError::compression(
                "engine cannot use custom dictionaries",
            ));
        }
        let announcement = EnableZstdCustom {
            identifier: entry.id,
            compression_level: entry.level,
            min_size: entry.min_size_hint,
            max_size: entry.max_size_hint,
            dictionary,
        };
        self.compression.announce_custom(entry)?;
        self.next_custom_id += 1;
        info!(compressor_id = announcement.identifier, "Custom dictionary announced");
        Ok(announcement.into())
    }

    /// Trains a dictionary from recently published payloads and announces
    /// it. Returns `None` when there is nothing to train on.
    pub fn train_custom_dictionary(
        &mut self,
        max_size: usize,
    ) -> SessionResult<Option<B2sMessage>> {
        if self.samples.is_empty() {
            return Ok(None);
        }
        let samples: Vec<Bytes> = self.samples.iter().cloned().collect();
        let dictionary = self.engine.train_dictionary(&samples, max_size)?;
        self.announce_custom_dictionary(dictionary).map(Some)
    }
}
