//! Learned return address of a player's transform traffic

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace};

/// Default number of snapshots queued per player before the oldest is dropped
pub const DEFAULT_TRANSFORM_CAPACITY: usize = 4;

/// Outbound snapshot queue for one player. Each snapshot fully supersedes the
/// previous one, so an overloaded queue drops its oldest entries rather than
/// stalling the room.
#[derive(Debug, Clone)]
pub struct TransformEndpoint {
    addr: SocketAddr,
    tx: broadcast::Sender<Bytes>,
}

impl TransformEndpoint {
    /// Spawn the writer task for `addr`. It stops once every copy of the
    /// endpoint has been dropped.
    pub fn bind(socket: Arc<UdpSocket>, addr: SocketAddr, capacity: usize) -> Self {
        let (tx, mut rx) = broadcast::channel::<Bytes>(capacity.max(1));

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(datagram) => {
                        if let Err(e) = socket.send_to(&datagram, addr).await {
                            debug!(%addr, error = %e, "Transform send failed");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        trace!(%addr, skipped, "Dropped stale transform snapshots");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(%addr, "Transform writer stopped");
        });

        Self { addr, tx }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn push(&self, datagram: Bytes) {
        // Only fails when the writer is gone, which is a no-op by contract
        let _ = self.tx.send(datagram);
    }
}
