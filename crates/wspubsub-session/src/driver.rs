//! Async connection loops.
//!
//! Sessions are synchronous; these functions confine one session to one
//! task and move frames between it and a [`FrameTransport`].

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wspubsub_protocol::{S2bMessage, SubscriptionAction, parse_b2s_frame, parse_s2b_frame};

use crate::broadcaster::BroadcasterSession;
use crate::error::{SessionError, SessionResult};
use crate::fanout::{Publication, SubscriptionChange};
use crate::subscriber::{ReceivedNotification, SubscriberEvent, SubscriberSession};
use crate::transport::{FrameTransport, receive_within};

/// Serves one subscriber connection until it closes.
///
/// Frames from the subscriber and publications from `deliveries` are
/// interleaved. A quiet subscriber is served indefinitely; the configured
/// receive timeout only runs while it owes a reply. Any error ends the
/// connection and is logged at `warn`; a clean close returns `Ok(())`.
pub async fn serve_subscriber<T: FrameTransport>(
    transport: T,
    session: BroadcasterSession,
    deliveries: mpsc::UnboundedReceiver<Publication>,
) -> SessionResult<()> {
    let result = run_broadcaster(transport, session, deliveries).await;
    if let Err(e) = &result {
        warn!(error = %e, "Subscriber connection ended with error");
    }
    result
}

async fn run_broadcaster<T: FrameTransport>(
    mut transport: T,
    mut session: BroadcasterSession,
    mut deliveries: mpsc::UnboundedReceiver<Publication>,
) -> SessionResult<()> {
    let minimal = session.config().minimal_headers;
    let reply_timeout = session.config().receive_timeout;
    let mut deliveries_open = true;
    info!("Serving subscriber");

    loop {
        let deadline = session.awaiting_reply().then_some(reply_timeout);
        let replies = tokio::select! {
            frame = receive_within(&mut transport, deadline) => match frame? {
                Some(frame) => session.handle(parse_s2b_frame(&frame)?)?,
                None => {
                    info!("Subscriber disconnected");
                    return Ok(());
                }
            },
            delivery = deliveries.recv(), if deliveries_open => match delivery {
                Some(publication) => session.enqueue_delivery(publication)?,
                None => {
                    debug!("Delivery channel closed");
                    deliveries_open = false;
                    Vec::new()
                }
            },
        };

        for reply in replies {
            debug!(kind = %reply.kind(), "Sending frame");
            transport.send_frame(reply.serialize(minimal)?).await?;
        }
    }
}

/// Async wrapper driving a [`SubscriberSession`] over a transport.
///
/// Each call sends its frames and then reads until the matching
/// confirmation arrives. Events that arrive meanwhile (notifications,
/// compressor announcements) are buffered for [`Self::next_event`].
pub struct SubscriberClient<T> {
    transport: T,
    session: SubscriberSession,
    events: VecDeque<SubscriberEvent>,
}

impl<T: FrameTransport> SubscriberClient<T> {
    /// Performs the CONFIGURE handshake.
    pub async fn connect(transport: T, session: SubscriberSession) -> SessionResult<Self> {
        let mut client = Self {
            transport,
            session,
            events: VecDeque::new(),
        };
        let configure = client.session.configure()?;
        client.send_all(vec![configure]).await?;
        client
            .wait_for(|event| matches!(event, SubscriberEvent::Configured))
            .await?;
        info!("Subscriber connected");
        Ok(client)
    }

    /// The underlying session.
    pub fn session(&self) -> &SubscriberSession {
        &self.session
    }

    async fn send_all(&mut self, messages: Vec<S2bMessage>) -> SessionResult<()> {
        let minimal = self.session.config().minimal_headers;
        for message in messages {
            debug!(kind = %message.kind(), "Sending frame");
            self.transport
                .send_frame(message.serialize(minimal)?)
                .await?;
        }
        Ok(())
    }

    async fn read_one(&mut self) -> SessionResult<()> {
        let deadline = self
            .session
            .awaiting_reply()
            .then_some(self.session.config().receive_timeout);
        let frame: Bytes = receive_within(&mut self.transport, deadline)
            .await?
            .ok_or(SessionError::Closed)?;
        let output = self.session.handle(parse_b2s_frame(&frame)?)?;
        self.send_all(output.replies).await?;
        self.events.extend(output.events);
        Ok(())
    }

    async fn wait_for(
        &mut self,
        wanted: impl Fn(&SubscriberEvent) -> bool,
    ) -> SessionResult<SubscriberEvent> {
        loop {
            if let Some(index) = self.events.iter().position(&wanted)
                && let Some(event) = self.events.remove(index)
            {
                return Ok(event);
            }
            self.read_one().await?;
        }
    }

    async fn change(&mut self, request: S2bMessage, change: SubscriptionChange) -> SessionResult<()> {
        self.send_all(vec![request]).await?;
        self.wait_for(|event| {
            matches!(event, SubscriberEvent::SubscriptionConfirmed(confirmed) if *confirmed == change)
        })
        .await?;
        Ok(())
    }

    /// Subscribes to an exact topic and waits for the confirmation.
    pub async fn subscribe_exact(&mut self, topic: impl Into<Bytes>) -> SessionResult<()> {
        let topic = topic.into();
        let request = self.session.subscribe_exact(topic.clone())?;
        let change = SubscriptionChange::Exact {
            action: SubscriptionAction::Subscribe,
            topic,
        };
        self.change(request, change).await
    }

    /// Unsubscribes from an exact topic and waits for the confirmation.
    pub async fn unsubscribe_exact(&mut self, topic: impl Into<Bytes>) -> SessionResult<()> {
        let topic = topic.into();
        let request = self.session.unsubscribe_exact(topic.clone())?;
        let change = SubscriptionChange::Exact {
            action: SubscriptionAction::Unsubscribe,
            topic,
        };
        self.change(request, change).await
    }

    /// Subscribes to a glob pattern and waits for the confirmation.
    pub async fn subscribe_glob(&mut self, glob: impl Into<String>) -> SessionResult<()> {
        let glob = glob.into();
        let request = self.session.subscribe_glob(glob.clone())?;
        let change = SubscriptionChange::Glob {
            action: SubscriptionAction::Subscribe,
            glob,
        };
        self.change(request, change).await
    }

    /// Unsubscribes from a glob pattern and waits for the confirmation.
    pub async fn unsubscribe_glob(&mut self, glob: impl Into<String>) -> SessionResult<()> {
        let glob = glob.into();
        let request = self.session.unsubscribe_glob(glob.clone())?;
        let change = SubscriptionChange::Glob {
            action: SubscriptionAction::Unsubscribe,
            glob,
        };
        self.change(request, change).await
    }

    /// Publishes a notification and returns how many subscribers it reached.
    pub async fn notify(
        &mut self,
        topic: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> SessionResult<u64> {
        let frames = self.session.notify(topic, payload)?;
        self.send_all(frames).await?;
        match self
            .wait_for(|event| matches!(event, SubscriberEvent::NotifyConfirmed { .. }))
            .await?
        {
            SubscriberEvent::NotifyConfirmed { subscribers, .. } => Ok(subscribers),
            other => Err(SessionError::violation(format!(
                "unexpected event {other:?}"
            ))),
        }
    }

    /// Waits for the next notification on a subscribed topic.
    pub async fn next_notification(&mut self) -> SessionResult<ReceivedNotification> {
        match self
            .wait_for(|event| matches!(event, SubscriberEvent::Received(_)))
            .await?
        {
            SubscriberEvent::Received(received) => Ok(received),
            other => Err(SessionError::violation(format!(
                "unexpected event {other:?}"
            ))),
        }
    }

    /// Next buffered or incoming event of any kind.
    pub async fn next_event(&mut self) -> SessionResult<SubscriberEvent> {
        self.wait_for(|_| true).await
    }
}
