//! Transport wrapper that keeps a transcript of every frame.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::debug;
use wspubsub_protocol::Direction;
use wspubsub_session::{FrameTransport, SessionResult};

/// One frame seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFrame {
    pub direction: Direction,
    pub frame: Bytes,
}

/// Shared, append-only list of frames.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    frames: Arc<Mutex<Vec<RecordedFrame>>>,
}

impl Transcript {
    fn lock(&self) -> MutexGuard<'_, Vec<RecordedFrame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, direction: Direction, frame: &Bytes) {
        debug!(?direction, len = frame.len(), "Frame recorded");
        self.lock().push(RecordedFrame {
            direction,
            frame: frame.clone(),
        });
    }

    /// Frames recorded so far, in order.
    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.lock().clone()
    }
}

/// Records frames crossing a subscriber-side transport.
///
/// Sent frames are subscriber to broadcaster, received frames the reverse.
#[derive(Debug)]
pub struct RecordingTransport<T> {
    inner: T,
    transcript: Transcript,
}

impl<T> RecordingTransport<T> {
    /// Wraps `inner`, appending to `transcript`.
    pub fn new(inner: T, transcript: Transcript) -> Self {
        Self { inner, transcript }
    }
}

impl<T: FrameTransport> FrameTransport for RecordingTransport<T> {
    async fn send_frame(&mut self, frame: Bytes) -> SessionResult<()> {
        self.transcript
            .push(Direction::SubscriberToBroadcaster, &frame);
        self.inner.send_frame(frame).await
    }

    async fn receive_frame(&mut self) -> SessionResult<Option<Bytes>> {
        let frame = self.inner.receive_frame().await?;
        if let Some(frame) = &frame {
            self.transcript
                .push(Direction::BroadcasterToSubscriber, frame);
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use wspubsub_session::ChannelTransport;

    use super::*;

    #[tokio::test]
    async fn records_both_directions() {
        let (a, mut b) = ChannelTransport::pair(4);
        let transcript = Transcript::default();
        let mut recording = RecordingTransport::new(a, transcript.clone());

        recording
            .send_frame(Bytes::from_static(b"\x00\x01"))
            .await
            .unwrap();
        b.send_frame(Bytes::from_static(b"\x00\x02")).await.unwrap();
        recording.receive_frame().await.unwrap();

        let frames = transcript.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].direction, Direction::SubscriberToBroadcaster);
        assert_eq!(&frames[1].frame[..], b"\x00\x02");
    }
}
