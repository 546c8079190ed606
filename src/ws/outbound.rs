//! Per-connection outbound queue for the reliable channel

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::protocol::Frame;

/// Default bound on queued frames per connection
pub const DEFAULT_RELIABLE_CAPACITY: usize = 256;

/// Sending half bound to a player. Cloned into broadcast snapshots; the
/// connection's writer task owns the receiving half.
#[derive(Debug, Clone)]
pub struct ReliableHandle {
    tx: mpsc::Sender<Frame>,
    kick: Arc<Notify>,
}

impl ReliableHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            tx,
            kick: Arc::new(Notify::new()),
        };
        (handle, rx)
    }

    /// Queue a frame without waiting. Gameplay events are never dropped: a
    /// peer whose queue is full gets disconnected instead.
    pub fn send(&self, frame: &Frame) {
        match self.tx.try_send(Arc::clone(frame)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Reliable queue full, disconnecting slow peer");
                self.kick.notify_one();
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Reliable channel already closed, skipping frame");
            }
        }
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Resolves once this connection has been marked for disconnect
    pub async fn kicked(&self) {
        self.kick.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn frames_arrive_in_order() {
        let (handle, mut rx) = ReliableHandle::channel(8);
        handle.send(&Frame::from("one"));
        handle.send(&Frame::from("two"));

        assert_eq!(&*rx.recv().await.unwrap(), "one");
        assert_eq!(&*rx.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn full_queue_kicks_instead_of_dropping_silently() {
        let (handle, _rx) = ReliableHandle::channel(1);
        handle.send(&Frame::from("fills the queue"));
        handle.send(&Frame::from("overflows"));

        let kicked = tokio::time::timeout(Duration::from_millis(100), handle.kicked()).await;
        assert!(kicked.is_ok(), "slow peer should be kicked");
    }

    #[tokio::test]
    async fn sending_to_closed_channel_is_a_noop() {
        let (handle, rx) = ReliableHandle::channel(1);
        drop(rx);
        assert!(!handle.is_open());
        handle.send(&Frame::from("nobody listening"));

        let kicked = tokio::time::timeout(Duration::from_millis(50), handle.kicked()).await;
        assert!(kicked.is_err());
    }
}
