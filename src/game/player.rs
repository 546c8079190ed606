//! Player identity and per-player session state

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::udp::endpoint::TransformEndpoint;
use crate::ws::outbound::ReliableHandle;

/// First id handed out by the identity registry.
pub const FIRST_PLAYER_ID: u64 = 69;

/// Process-unique player identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Values a create/join request applies to the player entering a room
#[derive(Debug, Clone)]
pub struct Loadout {
    pub name: String,
    pub plane_type: String,
    pub start_health: i64,
}

/// A connected player, owned by the lobby or by exactly one room roster
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub plane_type: String,
    pub team: String,
    /// Signed: damage is applied without clamping
    pub health: i64,
    pub kills: u32,
    pub alive: bool,
    pub ready: bool,
    /// True until the player is first placed into a room
    pub is_new: bool,
    /// Last pose received over the transform channel
    pub pose: Option<Value>,
    pub reliable: Option<ReliableHandle>,
    pub transform: Option<TransformEndpoint>,
}

impl Player {
    pub fn new(id: PlayerId, reliable: ReliableHandle) -> Self {
        Self {
            id,
            name: String::new(),
            plane_type: String::new(),
            team: String::new(),
            health: 0,
            kills: 0,
            alive: true,
            ready: false,
            is_new: true,
            pose: None,
            reliable: Some(reliable),
            transform: None,
        }
    }

    /// Apply a create/join request. A returning player keeps kills, pose and
    /// life state; a new one starts from a clean slate.
    pub fn enter_room(&mut self, loadout: Loadout, team: String) {
        if self.is_new {
            self.kills = 0;
            self.alive = true;
            self.ready = false;
            self.pose = None;
            self.is_new = false;
        }
        self.name = loadout.name;
        self.plane_type = loadout.plane_type;
        self.health = loadout.start_health;
        self.team = team;
    }

    /// Whether a live reliable connection is bound to this player
    pub fn is_connected(&self) -> bool {
        self.reliable.as_ref().is_some_and(ReliableHandle::is_open)
    }

    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            id: self.id.to_string(),
            name: self.name.clone(),
            team: self.team.clone(),
            plane_type: self.plane_type.clone(),
            player_health: self.health,
            is_ready: self.ready,
        }
    }
}

/// Public view of a room member, as listed in `joinSuccess`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSummary {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Team")]
    pub team: String,
    #[serde(rename = "PlaneType")]
    pub plane_type: String,
    #[serde(rename = "PlayerHealth")]
    pub player_health: i64,
    #[serde(rename = "IsReady")]
    pub is_ready: bool,
}
