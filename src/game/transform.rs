//! Transform sync over the loss-tolerant channel

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, trace};

use super::broadcast::broadcast_unreliable;
use super::registry::Registry;
use crate::udp::endpoint::TransformEndpoint;
use crate::ws::decode::TransformUpdate;
use crate::ws::protocol::ServerMsg;

pub struct TransformSync {
    registry: Arc<Registry>,
    socket: Arc<UdpSocket>,
    capacity: usize,
}

impl TransformSync {
    pub fn new(registry: Arc<Registry>, socket: Arc<UdpSocket>, capacity: usize) -> Self {
        Self {
            registry,
            socket,
            capacity,
        }
    }

    /// Apply one pose update, then fan the room's snapshot out to every member
    /// with a known endpoint. Anything undecodable or addressed to an unknown
    /// room or player is dropped.
    pub fn handle_datagram(&self, data: &[u8], source: SocketAddr) {
        let update = match TransformUpdate::decode(data) {
            Ok(Some(update)) => update,
            Ok(None) => {
                trace!(%source, "Ignoring non-transform datagram");
                return;
            }
            Err(e) => {
                debug!(%source, error = %e, "Dropping bad datagram");
                return;
            }
        };

        let snapshot = self.registry.with_room(&update.room_code, |room| {
            let player = room.player_mut(update.player_id)?;
            if player.transform.is_none() {
                let endpoint = TransformEndpoint::bind(Arc::clone(&self.socket), source, self.capacity);
                debug!(player_id = %update.player_id, addr = %endpoint.addr(), "Transform endpoint bound");
                player.transform = Some(endpoint);
            }
            player.pose = Some(update.pose);

            let dict: BTreeMap<String, _> = room
                .roster
                .values()
                .filter(|p| p.is_connected() && p.alive)
                .filter_map(|p| p.pose.clone().map(|pose| (p.id.to_string(), pose)))
                .collect();
            Some(dict)
        });

        if let Some(dict) = snapshot.flatten() {
            broadcast_unreliable(
                &self.registry,
                &update.room_code,
                &ServerMsg::UpdatePlayerTransform {
                    all_player_transform_dict: dict,
                },
            );
        }
    }
}
