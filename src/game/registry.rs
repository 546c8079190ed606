//! Identity registry, lobby and room store
//!
//! Rooms live behind their own mutex so unrelated rooms never contend.
//! Lock order is room, then lobby, then store shard; store lookups clone the
//! room handle and release the shard before the room is locked. The
//! player-to-room index is only written inside the room's critical section.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::broadcast;
use super::player::{Loadout, Player, PlayerId, PlayerSummary, FIRST_PLAYER_ID};
use super::room::{draw_team, generate_room_code, Room, RoomCodePolicy, RoomRules};
use crate::ws::outbound::ReliableHandle;
use crate::ws::protocol::ServerMsg;

pub type RoomHandle = Arc<Mutex<Room>>;

/// Failures of room admission
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("No room with such Id exists")]
    NoSuchRoom,

    #[error("The game in this room has already started")]
    RoomClosed,

    #[error("The room is full")]
    RoomFull,

    #[error("A room with that room Id was already created")]
    AlreadyExists,

    #[error("Player is not waiting in the lobby")]
    NotInLobby,
}

impl RoomError {
    /// Whether the requester gets an `Error` reply. Unknown players are
    /// dropped without one.
    pub fn is_reported(&self) -> bool {
        !matches!(self, Self::NotInLobby)
    }
}

/// Result of a successful create or join
#[derive(Debug)]
pub struct Admission {
    pub room_code: String,
    pub player_id: PlayerId,
    pub player: PlayerSummary,
    pub start_health: i64,
    pub scene_index: String,
    pub game_mode: String,
    /// Every member after admission, the newcomer included
    pub members: Vec<PlayerSummary>,
    /// Room-wide recipients after admission
    pub recipients: Vec<ReliableHandle>,
    pub newcomer: Option<ReliableHandle>,
}

/// Result of removing a player from a room
#[derive(Debug)]
pub struct Departure {
    pub player_id: PlayerId,
    pub room_code: String,
    /// Captured before removal, so the leaver is notified as well
    pub recipients: Vec<ReliableHandle>,
    pub new_owner: Option<OwnerChange>,
    pub room_removed: bool,
}

#[derive(Debug)]
pub struct OwnerChange {
    pub owner: PlayerId,
    pub recipients: Vec<ReliableHandle>,
}

/// Shared session state for both channels
pub struct Registry {
    next_id: AtomicU64,
    lobby: Mutex<HashMap<PlayerId, Player>>,
    rooms: DashMap<String, RoomHandle>,
    /// Room each seated player currently sits in
    seats: DashMap<PlayerId, String>,
    code_policy: RoomCodePolicy,
}

impl Registry {
    pub fn new(code_policy: RoomCodePolicy) -> Self {
        Self {
            next_id: AtomicU64::new(FIRST_PLAYER_ID),
            lobby: Mutex::new(HashMap::new()),
            rooms: DashMap::new(),
            seats: DashMap::new(),
            code_policy,
        }
    }

    /// Issue an id for a new connection. `setId` is queued on the channel
    /// before the player becomes reachable through the lobby.
    pub fn register(&self, reliable: ReliableHandle) -> PlayerId {
        let id = PlayerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        broadcast::send_to(&reliable, &ServerMsg::SetId { new_id: id });
        self.lobby.lock().insert(id, Player::new(id, reliable));
        info!(player_id = %id, "Player registered");
        id
    }

    pub fn room(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.get(code).map(|entry| Arc::clone(entry.value()))
    }

    /// Run `f` inside the room's critical section. Retired rooms read as absent.
    pub fn with_room<R>(&self, code: &str, f: impl FnOnce(&mut Room) -> R) -> Option<R> {
        let handle = self.room(code)?;
        let mut room = handle.lock();
        if room.retired {
            return None;
        }
        Some(f(&mut room))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn lobby_len(&self) -> usize {
        self.lobby.lock().len()
    }

    pub fn create_room(
        &self,
        id: PlayerId,
        loadout: Loadout,
        scene_index: String,
        rules: RoomRules,
    ) -> Result<Admission, RoomError> {
        let mut player = self
            .lobby
            .lock()
            .remove(&id)
            .ok_or(RoomError::NotInLobby)?;

        let vacancy = loop {
            let code = match &self.code_policy {
                RoomCodePolicy::Random => generate_room_code(),
                RoomCodePolicy::Fixed(code) => code.clone(),
            };
            match self.rooms.entry(code) {
                Entry::Vacant(vacancy) => break Some(vacancy),
                Entry::Occupied(_) if self.code_policy == RoomCodePolicy::Random => continue,
                Entry::Occupied(_) => break None,
            }
        };

        let Some(vacancy) = vacancy else {
            self.lobby.lock().insert(id, player);
            return Err(RoomError::AlreadyExists);
        };

        let code = vacancy.key().clone();
        player.enter_room(loadout, draw_team(&rules.teams));
        let summary = player.summary();
        let newcomer = player.reliable.clone();
        let admission = Admission {
            room_code: code.clone(),
            player_id: id,
            start_health: player.health,
            scene_index: scene_index.clone(),
            game_mode: rules.game_mode.clone(),
            members: vec![summary.clone()],
            player: summary,
            recipients: newcomer.iter().cloned().collect(),
            newcomer,
        };

        self.seats.insert(id, code.clone());
        vacancy.insert(Arc::new(Mutex::new(Room::new(
            code.clone(),
            scene_index,
            rules,
            player,
        ))));
        info!(room = %code, player_id = %id, "Room created");

        Ok(admission)
    }

    /// Checks, in order: room exists, room is open, room has space.
    pub fn join_room(
        &self,
        code: &str,
        id: PlayerId,
        loadout: Loadout,
    ) -> Result<Admission, RoomError> {
        let handle = self.room(code).ok_or(RoomError::NoSuchRoom)?;
        let mut room = handle.lock();

        if room.retired {
            return Err(RoomError::NoSuchRoom);
        }
        if !room.open {
            return Err(RoomError::RoomClosed);
        }
        if room.is_full() {
            return Err(RoomError::RoomFull);
        }

        let mut player = self
            .lobby
            .lock()
            .remove(&id)
            .ok_or(RoomError::NotInLobby)?;
        player.enter_room(loadout, room.draw_team());

        let summary = player.summary();
        let start_health = player.health;
        let newcomer = player.reliable.clone();
        room.roster.insert(id, player);
        self.seats.insert(id, room.code.clone());
        info!(room = %code, player_id = %id, members = room.roster.len(), "Player joined room");

        Ok(Admission {
            room_code: room.code.clone(),
            player_id: id,
            player: summary,
            start_health,
            scene_index: room.scene_index.clone(),
            game_mode: room.rules.game_mode.clone(),
            members: room.summaries(),
            recipients: room.reliable_recipients(),
            newcomer,
        })
    }

    /// Demote a member back to the lobby, keeping its stats. The room is
    /// dropped when its roster empties; otherwise ownership moves on if the
    /// leaver owned the room.
    pub fn disconnect(&self, code: &str, id: PlayerId, was_owner: bool) -> Option<Departure> {
        let handle = self.room(code)?;
        let mut room = handle.lock();

        let recipients = room.reliable_recipients();
        let player = room.roster.remove(&id)?;
        self.lobby.lock().insert(id, player);
        self.seats.remove_if(&id, |_, seat| seat == code);

        let was_owner = was_owner || room.owner == Some(id);
        let mut departure = Departure {
            player_id: id,
            room_code: room.code.clone(),
            recipients,
            new_owner: None,
            room_removed: false,
        };

        if room.roster.is_empty() {
            room.retired = true;
            self.rooms
                .remove_if(code, |_, stored| Arc::ptr_eq(stored, &handle));
            departure.room_removed = true;
            info!(room = %code, "Room emptied and removed");
        } else if was_owner {
            room.owner = room.next_owner();
            departure.new_owner = room.owner.map(|owner| OwnerChange {
                owner,
                recipients: room.reliable_recipients(),
            });
            debug!(room = %code, new_owner = ?room.owner, "Ownership transferred");
        }

        info!(room = %code, player_id = %id, "Player left room");
        Some(departure)
    }

    /// Leave the room (if any) and forget the player entirely. Without a
    /// room code the player's current seat is used.
    pub fn complete_delete(&self, id: PlayerId, code: Option<&str>) -> Option<Departure> {
        let code = code.map(str::to_string).or_else(|| self.seat(id));
        let departure = code.and_then(|code| self.disconnect(&code, id, false));
        if self.lobby.lock().remove(&id).is_some() {
            info!(player_id = %id, "Player deleted");
        }
        departure
    }

    /// Transport closed: leave the current room and fall back to the lobby.
    /// The player keeps its closed channel, so it no longer receives
    /// broadcasts, appears in snapshots or inherits ownership. Only
    /// `complete_delete` forgets it.
    pub fn connection_lost(&self, id: PlayerId) -> Option<Departure> {
        let Some(code) = self.seat(id) else {
            debug!(player_id = %id, "Connection lost while in the lobby");
            return None;
        };
        self.disconnect(&code, id, false)
    }

    fn seat(&self, id: PlayerId) -> Option<String> {
        self.seats.get(&id).map(|seat| seat.value().clone())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RoomCodePolicy::default())
    }
}
