//! Datagram receive loop

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{error, info};

use crate::game::TransformSync;

/// Largest transform datagram accepted
const MAX_DATAGRAM: usize = 2048;

/// Receive datagrams forever, handing each one to its own task so a slow
/// room never delays the others.
pub async fn run_listener(socket: Arc<UdpSocket>, sync: Arc<TransformSync>) {
    if let Ok(addr) = socket.local_addr() {
        info!("Transform channel listening on {}", addr);
    }

    let mut buffer = [0u8; MAX_DATAGRAM];
    loop {
        match socket.recv_from(&mut buffer).await {
            Ok((len, source)) => {
                let datagram = buffer[..len].to_vec();
                let sync = Arc::clone(&sync);
                tokio::spawn(async move {
                    sync.handle_datagram(&datagram, source);
                });
            }
            Err(e) => {
                error!("Error receiving datagram: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}
