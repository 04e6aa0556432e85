//! Frame transport seam.
//!
//! The protocol rides on a message-oriented connection that already
//! delivers whole frames. [`FrameTransport`] is that connection;
//! [`ChannelTransport`] is an in-process implementation over tokio mpsc
//! channels used by tests and the CLI simulation. Transports never time
//! out on their own; callers pass a deadline to [`receive_within`] while a
//! reply is owed.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{SessionError, SessionResult};

/// A connection carrying one protocol frame per message.
pub trait FrameTransport: Send {
    /// Sends one frame.
    fn send_frame(&mut self, frame: Bytes) -> impl Future<Output = SessionResult<()>> + Send;

    /// Waits for the next frame. `Ok(None)` means the peer closed cleanly.
    fn receive_frame(&mut self) -> impl Future<Output = SessionResult<Option<Bytes>>> + Send;
}

/// Reads the next frame, failing with [`SessionError::Timeout`] when
/// `deadline` is set and passes first. `None` waits as long as the peer
/// stays connected.
pub async fn receive_within<T: FrameTransport>(
    transport: &mut T,
    deadline: Option<Duration>,
) -> SessionResult<Option<Bytes>> {
    let Some(deadline) = deadline else {
        return transport.receive_frame().await;
    };
    tokio::time::timeout(deadline, transport.receive_frame())
        .await
        .map_err(|_| SessionError::timeout("receive frame"))?
}

/// One end of an in-memory connection.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Bytes>,
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelTransport {
    /// Creates both ends of a connection. Each direction buffers up to
    /// `capacity` frames.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (Self { tx: a_tx, rx: a_rx }, Self { tx: b_tx, rx: b_rx })
    }
}

impl FrameTransport for ChannelTransport {
    async fn send_frame(&mut self, frame: Bytes) -> SessionResult<()> {
        self.tx.send(frame).await.map_err(|_| SessionError::Closed)
    }

    async fn receive_frame(&mut self) -> SessionResult<Option<Bytes>> {
        Ok(self.rx.recv().await)
    }
}
