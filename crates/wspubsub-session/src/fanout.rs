//! Fan-out collaborator.
//!
//! The session only tells the fan-out layer which topics a connection
//! wants and hands it verified notifications; routing is up to the
//! implementation. [`LocalHub`] is an in-process one for tests and the
//! CLI simulation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;
use wspubsub_protocol::{SubscriptionAction, compile_glob};

use crate::error::SessionResult;

/// A notification on its way to subscribers, uncompressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: Bytes,
    pub payload: Bytes,
}

/// A confirmed subscription change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionChange {
    Exact {
        action: SubscriptionAction,
        topic: Bytes,
    },
    Glob {
        action: SubscriptionAction,
        glob: String,
    },
}

/// Connection-scoped handle into the fan-out layer.
pub trait FanOut: Send {
    /// Records a subscription change for this connection.
    fn update(&mut self, change: &SubscriptionChange) -> SessionResult<()>;

    /// Delivers a notification; returns how many subscribers it reached.
    fn publish(&mut self, publication: Publication) -> SessionResult<u64>;
}

/// Fan-out that drops everything. For connections that only subscribe.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFanOut;

impl FanOut for NoFanOut {
    fn update(&mut self, _change: &SubscriptionChange) -> SessionResult<()> {
        Ok(())
    }

    fn publish(&mut self, _publication: Publication) -> SessionResult<u64> {
        Ok(0)
    }
}

#[derive(Debug, Default)]
struct Member {
    exact: HashSet<Bytes>,
    /// Compiled once at subscribe time, keyed by the pattern as sent.
    globs: HashMap<String, glob::Pattern>,
    deliveries: Option<mpsc::UnboundedSender<Publication>>,
}

impl Member {
    /// One delivery per connection, however many subscriptions match.
    fn wants(&self, topic: &[u8]) -> bool {
        if self.exact.contains(topic) {
            return true;
        }
        // Non-UTF-8 topics can only be subscribed to exactly.
        std::str::from_utf8(topic)
            .is_ok_and(|topic| self.globs.values().any(|pattern| pattern.matches(topic)))
    }
}

#[derive(Debug, Default)]
struct HubInner {
    next_id: u64,
    members: HashMap<u64, Member>,
}

/// In-process fan-out shared by every connection of one broadcaster.
#[derive(Debug, Clone, Default)]
pub struct LocalHub {
    inner: Arc<Mutex<HubInner>>,
}

fn lock(inner: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LocalHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. Publications for it arrive on the returned
    /// receiver, which the driver feeds into the broadcaster session.
    pub fn connect(&self) -> (HubHandle, mpsc::UnboundedReceiver<Publication>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.members.insert(
            id,
            Member {
                deliveries: Some(tx),
                ..Member::default()
            },
        );
        debug!(connection = id, "Connection joined hub");
        (
            HubHandle {
                id,
                inner: Arc::clone(&self.inner),
            },
            rx,
        )
    }

    /// Number of registered connections.
    pub fn connections(&self) -> usize {
        lock(&self.inner).members.len()
    }
}

/// One connection's view of a [`LocalHub`]. Leaves the hub when dropped.
#[derive(Debug)]
pub struct HubHandle {
    id: u64,
    inner: Arc<Mutex<HubInner>>,
}

impl FanOut for HubHandle {
    fn update(&mut self, change: &SubscriptionChange) -> SessionResult<()> {
        let mut inner = lock(&self.inner);
        let Some(member) = inner.members.get_mut(&self.id) else {
            return Ok(());
        };
        match change {
            SubscriptionChange::Exact { action, topic } => match action {
                SubscriptionAction::Subscribe => {
                    member.exact.insert(topic.clone());
                }
                SubscriptionAction::Unsubscribe => {
                    member.exact.remove(topic);
                }
            },
            SubscriptionChange::Glob { action, glob } => match action {
                SubscriptionAction::Subscribe => {
                    member.globs.insert(glob.clone(), compile_glob(glob)?);
                }
                SubscriptionAction::Unsubscribe => {
                    member.globs.remove(glob);
                }
            },
        }
        Ok(())
    }

    fn publish(&mut self, publication: Publication) -> SessionResult<u64> {
        let inner = lock(&self.inner);
        let mut reached = 0;
        for member in inner.members.values() {
            if !member.wants(&publication.topic) {
                continue;
            }
            if let Some(deliveries) = &member.deliveries
                && deliveries.send(publication.clone()).is_ok()
            {
                reached += 1;
            }
        }
        debug!(
            topic = %String::from_utf8_lossy(&publication.topic),
            reached,
            "Publication fanned out"
        );
        Ok(reached)
    }
}

impl Drop for HubHandle {
    fn drop(&mut self) {
        lock(&self.inner).members.remove(&self.id);
        debug!(connection = self.id, "Connection left hub");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use wspubsub_protocol::ProtocolError;

    fn publication(topic: &'static [u8]) -> Publication {
        Publication {
            topic: Bytes::from_static(topic),
            payload: Bytes::from_static(b"payload"),
        }
    }

    fn subscribe_glob(handle: &mut HubHandle, glob: &str) -> SessionResult<()> {
        handle.update(&SubscriptionChange::Glob {
            action: SubscriptionAction::Subscribe,
            glob: glob.to_owned(),
        })
    }

    #[test]
    fn glob_classes_and_segments() {
        let hub = LocalHub::new();
        let (mut handle, _rx) = hub.connect();
        subscribe_glob(&mut handle, "orders/[0-9]").unwrap();
        subscribe_glob(&mut handle, "*/eu/*").unwrap();

        assert_eq!(handle.publish(publication(b"orders/4")).unwrap(), 1);
        assert_eq!(handle.publish(publication(b"orders/x")).unwrap(), 0);
        assert_eq!(handle.publish(publication(b"trades/eu/42")).unwrap(), 1);
        assert_eq!(handle.publish(publication(b"trades/us/42")).unwrap(), 0);
    }

    #[test]
    fn star_matches_empty_topic() {
        let hub = LocalHub::new();
        let (mut handle, _rx) = hub.connect();
        subscribe_glob(&mut handle, "orders/*").unwrap();
        assert_eq!(handle.publish(publication(b"")).unwrap(), 0);
        subscribe_glob(&mut handle, "*").unwrap();
        assert_eq!(handle.publish(publication(b"")).unwrap(), 1);
    }

    #[test]
    fn invalid_glob_is_rejected_by_hub() {
        let hub = LocalHub::new();
        let (mut handle, _rx) = hub.connect();
        assert!(matches!(
            subscribe_glob(&mut handle, "orders/[0-9"),
            Err(SessionError::Protocol(ProtocolError::MalformedMessage { .. }))
        ));
        assert_eq!(handle.publish(publication(b"orders/[0-9")).unwrap(), 0);
    }

    #[test]
    fn overlapping_globs_deliver_once() {
        let hub = LocalHub::new();
        let (mut handle, mut rx) = hub.connect();
        subscribe_glob(&mut handle, "foo/*").unwrap();
        subscribe_glob(&mut handle, "foo/bar/*").unwrap();

        assert_eq!(handle.publish(publication(b"foo/bar/123")).unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), publication(b"foo/bar/123"));
        assert!(rx.try_recv().is_err());

        handle
            .update(&SubscriptionChange::Glob {
                action: SubscriptionAction::Unsubscribe,
                glob: "foo/*".to_owned(),
            })
            .unwrap();
        assert_eq!(handle.publish(publication(b"foo/bar/123")).unwrap(), 1);
        assert_eq!(handle.publish(publication(b"foo/baz")).unwrap(), 0);
    }

    #[test]
    fn hub_routes_by_exact_and_glob() {
        let hub = LocalHub::new();
        let (mut exact, mut exact_rx) = hub.connect();
        let (mut glob, mut glob_rx) = hub.connect();

        exact
            .update(&SubscriptionChange::Exact {
                action: SubscriptionAction::Subscribe,
                topic: Bytes::from_static(b"orders"),
            })
            .unwrap();
        glob.update(&SubscriptionChange::Glob {
            action: SubscriptionAction::Subscribe,
            glob: "ord*".to_owned(),
        })
        .unwrap();

        assert_eq!(exact.publish(publication(b"orders")).unwrap(), 2);
        assert_eq!(exact.publish(publication(b"ordinal")).unwrap(), 1);
        assert_eq!(exact_rx.try_recv().unwrap(), publication(b"orders"));
        assert!(exact_rx.try_recv().is_err());
        assert_eq!(glob_rx.try_recv().unwrap(), publication(b"orders"));
        assert_eq!(glob_rx.try_recv().unwrap(), publication(b"ordinal"));
    }

    #[test]
    fn dropped_handle_leaves_hub() {
        let hub = LocalHub::new();
        let (handle, _rx) = hub.connect();
        assert_eq!(hub.connections(), 1);
        drop(handle);
        assert_eq!(hub.connections(), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let hub = LocalHub::new();
        let (mut handle, mut rx) = hub.connect();
        let change = |action| SubscriptionChange::Exact {
            action,
            topic: Bytes::from_static(b"orders"),
        };
        handle.update(&change(SubscriptionAction::Subscribe)).unwrap();
        handle.update(&change(SubscriptionAction::Unsubscribe)).unwrap();
        assert_eq!(handle.publish(publication(b"orders")).unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }
}
