//! Server-originated wire messages
//! Every message is a tagged variant rendered to JSON text in one place

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::game::player::{PlayerId, PlayerSummary};

/// Encoded message text, shared between all recipients of a broadcast
pub type Frame = Arc<str>;

/// Scalars are rendered as JSON strings, which is what deployed clients parse
fn as_text<T: fmt::Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// First message on every new connection
    #[serde(rename_all = "camelCase")]
    SetId {
        #[serde(serialize_with = "as_text")]
        new_id: PlayerId,
    },

    /// Confirmation to the creator of a room
    #[serde(rename_all = "camelCase")]
    CreatedRoom {
        new_room_id: String,
        #[serde(serialize_with = "as_text")]
        start_health: i64,
        scene_index: String,
    },

    /// Direct reply to a player who joined a room
    #[serde(rename_all = "camelCase")]
    JoinSuccess {
        new_room_id: String,
        #[serde(serialize_with = "as_text")]
        start_health: i64,
        scene_index: String,
        game_mode: String,
        other_clients: Vec<PlayerSummary>,
    },

    /// A player entered the room
    #[serde(rename_all = "PascalCase")]
    ClientConnected {
        #[serde(serialize_with = "as_text")]
        id: PlayerId,
        name: String,
        team: String,
        #[serde(serialize_with = "as_text")]
        is_ready: bool,
        plane_type: String,
        #[serde(serialize_with = "as_text")]
        player_health: i64,
    },

    /// A player left the room
    #[serde(rename_all = "PascalCase")]
    ClientDisconnected {
        #[serde(serialize_with = "as_text")]
        id: PlayerId,
    },

    /// A dead player respawned
    #[serde(rename_all = "camelCase")]
    Rejoin {
        #[serde(serialize_with = "as_text")]
        player_id: PlayerId,
        #[serde(serialize_with = "as_text")]
        new_health: i64,
    },

    #[serde(rename_all = "camelCase")]
    BulletShot {
        bullet_type: String,
        shooter: String,
        start_pos: Value,
        velocity: Value,
        plane_facing_direction: Value,
    },

    #[serde(rename_all = "camelCase")]
    RocketShot {
        rocket_type: String,
        shooter: String,
        start_pos: Value,
        velocity: Value,
        facing_angle: Value,
        target_id: String,
    },

    #[serde(rename_all = "camelCase")]
    PlayerHit {
        #[serde(serialize_with = "as_text")]
        hit_player_id: PlayerId,
        #[serde(serialize_with = "as_text")]
        new_health: i64,
    },

    #[serde(rename_all = "camelCase")]
    PlayerDied {
        #[serde(serialize_with = "as_text")]
        dead_player: PlayerId,
        #[serde(serialize_with = "as_text")]
        killer: PlayerId,
    },

    /// Kill threshold reached
    #[serde(rename = "GameOver", rename_all = "camelCase")]
    GameOver {
        winner_type: String,
        #[serde(serialize_with = "as_text")]
        winner: PlayerId,
        #[serde(serialize_with = "as_text")]
        last_kill: PlayerId,
    },

    #[serde(rename_all = "camelCase")]
    TransferOwnership {
        #[serde(serialize_with = "as_text")]
        new_owner: PlayerId,
    },

    /// Error message
    #[serde(rename = "Error")]
    Error { value: String },

    /// Pose snapshot for a whole room, sent over UDP
    #[serde(rename_all = "camelCase")]
    UpdatePlayerTransform {
        all_player_transform_dict: BTreeMap<String, Value>,
    },
}

impl ServerMsg {
    pub fn error(value: impl Into<String>) -> Self {
        Self::Error {
            value: value.into(),
        }
    }

    pub fn encode(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}
