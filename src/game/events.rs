//! Reliable event state machine
//!
//! One [`EventProcessor`] is shared by every connection task; each task feeds
//! it its own events strictly in order. State changes happen inside the
//! affected room's critical section and the resulting messages are sent after
//! the lock is released.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::broadcast::{broadcast_raw, broadcast_reliable, relay_all, send_all, send_to};
use super::player::{Loadout, PlayerId, PlayerSummary};
use super::registry::{Admission, Departure, Registry, RoomError};
use super::room::RoomRules;
use crate::store::NameProvider;
use crate::ws::decode::{ClientEvent, Shot};
use crate::ws::outbound::ReliableHandle;
use crate::ws::protocol::{Frame, ServerMsg};

/// Winner type reported in `GameOver`
const SINGLE_WINNER: &str = "Single";

pub struct EventProcessor {
    registry: Arc<Registry>,
    names: Arc<NameProvider>,
}

/// What a `playerDied` event turned into
enum DeathOutcome {
    GameOver(Vec<ReliableHandle>),
    Died {
        victim: Option<ReliableHandle>,
        recipients: Vec<ReliableHandle>,
    },
    Ignored,
}

impl EventProcessor {
    pub fn new(registry: Arc<Registry>, names: Arc<NameProvider>) -> Self {
        Self { registry, names }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Decode and apply one text frame received from `sender`
    pub fn handle_text(&self, sender: &ReliableHandle, connection: PlayerId, text: &str) {
        match ClientEvent::decode(text) {
            Ok(Some(event)) => self.apply(sender, event),
            Ok(None) => debug!(player_id = %connection, "Ignoring unknown event type"),
            Err(e) if e.is_reportable() => {
                warn!(player_id = %connection, error = %e, "Rejected invalid event");
                send_to(sender, &ServerMsg::error(e.to_string()));
            }
            Err(e) => warn!(player_id = %connection, error = %e, "Dropping malformed message"),
        }
    }

    pub fn apply(&self, sender: &ReliableHandle, event: ClientEvent) {
        match event {
            ClientEvent::CreateRoom {
                player_id,
                loadout,
                scene_index,
                rules,
            } => self.create_room(sender, player_id, loadout, scene_index, rules),
            ClientEvent::JoinRoom {
                player_id,
                room_code,
                loadout,
            } => self.join_room(sender, &room_code, player_id, loadout),
            ClientEvent::SetReady {
                room_code,
                player_id,
                ready,
                raw,
            } => self.set_ready(&room_code, player_id, ready, &raw),
            ClientEvent::StartGame { room_code, raw } => self.start_game(&room_code, &raw),
            ClientEvent::Rejoin {
                room_code,
                player_id,
                new_health,
            } => self.rejoin(&room_code, player_id, new_health),
            ClientEvent::TargetLocked { room_code, raw } => {
                broadcast_raw(&self.registry, &room_code, &raw)
            }
            ClientEvent::ShootBullet { room_code, shot } => {
                broadcast_reliable(&self.registry, &room_code, &bullet_shot(shot))
            }
            ClientEvent::ShootRocket {
                room_code,
                shot,
                target,
            } => broadcast_reliable(&self.registry, &room_code, &rocket_shot(shot, target)),
            ClientEvent::PlayerHit {
                room_code,
                target,
                damage,
            } => self.player_hit(&room_code, target, damage),
            ClientEvent::PlayerDied {
                room_code,
                victim,
                shooter,
            } => self.player_died(&room_code, victim, shooter),
            ClientEvent::ClientDisconnected {
                room_code,
                player_id,
                was_owner,
            } => {
                if let Some(departure) = self.registry.disconnect(&room_code, player_id, was_owner) {
                    announce_departure(departure);
                }
            }
            ClientEvent::CompleteDelete {
                player_id,
                room_code,
            } => {
                info!(player_id = %player_id, "Client quit the game");
                if let Some(departure) = self.registry.complete_delete(player_id, room_code.as_deref())
                {
                    announce_departure(departure);
                }
            }
        }
    }

    /// The connection's transport closed
    pub fn connection_lost(&self, id: PlayerId) {
        if let Some(departure) = self.registry.connection_lost(id) {
            announce_departure(departure);
        }
    }

    fn with_name(&self, mut loadout: Loadout) -> Loadout {
        if loadout.name.is_empty() {
            loadout.name = self.names.next_fallback_name();
        }
        loadout
    }

    fn create_room(
        &self,
        sender: &ReliableHandle,
        id: PlayerId,
        loadout: Loadout,
        scene_index: String,
        rules: RoomRules,
    ) {
        let loadout = self.with_name(loadout);
        match self.registry.create_room(id, loadout, scene_index, rules) {
            Ok(admission) => {
                let Some(creator) = admission.newcomer.as_ref() else {
                    return;
                };
                send_to(creator, &client_connected(&admission));
                send_to(
                    creator,
                    &ServerMsg::CreatedRoom {
                        new_room_id: admission.room_code.clone(),
                        start_health: admission.start_health,
                        scene_index: admission.scene_index.clone(),
                    },
                );
            }
            Err(e) => reject(sender, id, e),
        }
    }

    fn join_room(&self, sender: &ReliableHandle, code: &str, id: PlayerId, loadout: Loadout) {
        let loadout = self.with_name(loadout);
        match self.registry.join_room(code, id, loadout) {
            Ok(admission) => {
                send_all(&admission.recipients, &client_connected(&admission));
                if let Some(joiner) = admission.newcomer.as_ref() {
                    send_to(
                        joiner,
                        &ServerMsg::JoinSuccess {
                            new_room_id: admission.room_code.clone(),
                            start_health: admission.start_health,
                            scene_index: admission.scene_index.clone(),
                            game_mode: admission.game_mode.clone(),
                            other_clients: admission.members.clone(),
                        },
                    );
                }
            }
            Err(e) => reject(sender, id, e),
        }
    }

    fn set_ready(&self, code: &str, id: PlayerId, ready: bool, raw: &Frame) {
        let recipients = self.registry.with_room(code, |room| {
            let player = room.player_mut(id)?;
            player.ready = ready;
            Some(room.reliable_recipients())
        });
        if let Some(recipients) = recipients.flatten() {
            relay_all(&recipients, raw);
        }
    }

    /// Closing a room to joins is one-way
    fn start_game(&self, code: &str, raw: &Frame) {
        let recipients = self.registry.with_room(code, |room| {
            room.open = false;
            room.reliable_recipients()
        });
        if let Some(recipients) = recipients {
            info!(room = %code, "Game started");
            relay_all(&recipients, raw);
        }
    }

    fn rejoin(&self, code: &str, id: PlayerId, new_health: i64) {
        let recipients = self.registry.with_room(code, |room| {
            let player = room.player_mut(id)?;
            if player.alive {
                debug!(room = %code, player_id = %id, "Ignoring rejoin of a living player");
                return None;
            }
            player.health = new_health;
            player.alive = true;
            Some(room.reliable_recipients())
        });
        if let Some(recipients) = recipients.flatten() {
            send_all(
                &recipients,
                &ServerMsg::Rejoin {
                    player_id: id,
                    new_health,
                },
            );
        }
    }

    fn player_hit(&self, code: &str, target: PlayerId, damage: i64) {
        let outcome = self.registry.with_room(code, |room| {
            let player = room.player_mut(target)?;
            player.health = player.health.saturating_sub(damage);
            let health = player.health;
            Some((health, room.reliable_recipients()))
        });
        if let Some((new_health, recipients)) = outcome.flatten() {
            send_all(
                &recipients,
                &ServerMsg::PlayerHit {
                    hit_player_id: target,
                    new_health,
                },
            );
        }
    }

    /// Credit the shooter; if that reaches the kill threshold the game is over
    /// and the victim is left untouched, otherwise the victim dies.
    fn player_died(&self, code: &str, victim: PlayerId, shooter: PlayerId) {
        let outcome = self.registry.with_room(code, |room| {
            let threshold = room.rules.kills_to_win;
            if let Some(killer) = room.player_mut(shooter).filter(|p| p.is_connected()) {
                killer.kills = killer.kills.saturating_add(1);
                debug!(room = %code, player_id = %shooter, kills = killer.kills, "Kill credited");
                if threshold.is_some_and(|needed| killer.kills >= needed) {
                    return DeathOutcome::GameOver(room.reliable_recipients());
                }
            }

            match room.player_mut(victim).filter(|p| p.is_connected()) {
                Some(dead) => {
                    dead.alive = false;
                    let victim = dead.reliable.clone();
                    DeathOutcome::Died {
                        victim,
                        recipients: room.reliable_recipients(),
                    }
                }
                None => DeathOutcome::Ignored,
            }
        });

        match outcome {
            Some(DeathOutcome::GameOver(recipients)) => {
                info!(room = %code, winner = %shooter, "Kill threshold reached");
                send_all(
                    &recipients,
                    &ServerMsg::GameOver {
                        winner_type: SINGLE_WINNER.to_string(),
                        winner: shooter,
                        last_kill: victim,
                    },
                );
            }
            Some(DeathOutcome::Died {
                victim: direct,
                recipients,
            }) => {
                let msg = ServerMsg::PlayerDied {
                    dead_player: victim,
                    killer: shooter,
                };
                if let Some(direct) = direct.as_ref() {
                    send_to(direct, &msg);
                }
                send_all(&recipients, &msg);
            }
            Some(DeathOutcome::Ignored) | None => {}
        }
    }
}

fn client_connected(admission: &Admission) -> ServerMsg {
    let PlayerSummary {
        name,
        team,
        plane_type,
        player_health,
        is_ready,
        ..
    } = admission.player.clone();
    ServerMsg::ClientConnected {
        id: admission.player_id,
        name,
        team,
        is_ready,
        plane_type,
        player_health,
    }
}

fn bullet_shot(shot: Shot) -> ServerMsg {
    ServerMsg::BulletShot {
        bullet_type: shot.kind,
        shooter: shot.shooter,
        start_pos: shot.start_position,
        velocity: shot.velocity,
        plane_facing_direction: shot.facing_direction,
    }
}

fn rocket_shot(shot: Shot, target: String) -> ServerMsg {
    ServerMsg::RocketShot {
        rocket_type: shot.kind,
        shooter: shot.shooter,
        start_pos: shot.start_position,
        velocity: shot.velocity,
        facing_angle: shot.facing_direction,
        target_id: target,
    }
}

fn reject(sender: &ReliableHandle, id: PlayerId, error: RoomError) {
    if error.is_reported() {
        info!(player_id = %id, error = %error, "Room request rejected");
        send_to(sender, &ServerMsg::error(error.to_string()));
    } else {
        debug!(player_id = %id, error = %error, "Ignoring request for unknown player");
    }
}

fn announce_departure(departure: Departure) {
    debug!(
        room = %departure.room_code,
        player_id = %departure.player_id,
        room_removed = departure.room_removed,
        "Announcing departure"
    );
    send_all(
        &departure.recipients,
        &ServerMsg::ClientDisconnected {
            id: departure.player_id,
        },
    );
    if let Some(change) = departure.new_owner {
        send_all(
            &change.recipients,
            &ServerMsg::TransferOwnership {
                new_owner: change.owner,
            },
        );
    }
}
