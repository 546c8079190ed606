//! Inbound message decoding
//!
//! Both channels carry self-describing JSON objects with a `type`
//! discriminator. Each known event is read field by field; a missing or
//! ill-typed field fails with a [`DecodeError`] naming it instead of being
//! coerced into a default. Ids and numbers are accepted either as JSON
//! integers or as numeric strings, since the server itself renders them as
//! strings.

use serde_json::{Map, Value};

use crate::game::player::{Loadout, PlayerId};
use crate::game::room::RoomRules;
use crate::ws::protocol::Frame;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("message is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message is not a JSON object with a string `type`")]
    NotAnObject,

    #[error("{event}: missing field `{field}`")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },

    #[error("{event}: field `{field}` must be {expected}")]
    InvalidField {
        event: &'static str,
        field: &'static str,
        expected: &'static str,
    },
}

impl DecodeError {
    /// Schema errors are reported back to the sender; unparseable payloads
    /// are only logged.
    pub fn is_reportable(&self) -> bool {
        matches!(self, Self::MissingField { .. } | Self::InvalidField { .. })
    }
}

/// Projectile data relayed as-is; the server never validates trajectories
#[derive(Debug, Clone, PartialEq)]
pub struct Shot {
    pub kind: String,
    pub shooter: String,
    pub start_position: Value,
    pub velocity: Value,
    pub facing_direction: Value,
}

/// Reliable-channel events
#[derive(Debug, Clone)]
pub enum ClientEvent {
    CreateRoom {
        player_id: PlayerId,
        loadout: Loadout,
        scene_index: String,
        rules: RoomRules,
    },
    JoinRoom {
        player_id: PlayerId,
        room_code: String,
        loadout: Loadout,
    },
    SetReady {
        room_code: String,
        player_id: PlayerId,
        ready: bool,
        raw: Frame,
    },
    StartGame {
        room_code: String,
        raw: Frame,
    },
    Rejoin {
        room_code: String,
        player_id: PlayerId,
        new_health: i64,
    },
    TargetLocked {
        room_code: String,
        raw: Frame,
    },
    ShootBullet {
        room_code: String,
        shot: Shot,
    },
    ShootRocket {
        room_code: String,
        shot: Shot,
        target: String,
    },
    PlayerHit {
        room_code: String,
        target: PlayerId,
        damage: i64,
    },
    PlayerDied {
        room_code: String,
        victim: PlayerId,
        shooter: PlayerId,
    },
    ClientDisconnected {
        room_code: String,
        player_id: PlayerId,
        was_owner: bool,
    },
    CompleteDelete {
        player_id: PlayerId,
        room_code: Option<String>,
    },
}

impl ClientEvent {
    /// Decode one reliable-channel message. Unknown `type` values yield
    /// `Ok(None)`.
    pub fn decode(text: &str) -> Result<Option<Self>, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        let (kind, map) = split_type(&value)?;

        let event = match kind {
            "createRoom" => {
                let f = Fields::new("createRoom", map);
                Self::CreateRoom {
                    player_id: f.player_id("Id")?,
                    loadout: loadout(&f)?,
                    scene_index: f.text("worldIndex")?,
                    rules: rules(&f)?,
                }
            }
            "joinRoom" => {
                let f = Fields::new("joinRoom", map);
                Self::JoinRoom {
                    player_id: f.player_id("Id")?,
                    room_code: f.text("roomId")?,
                    loadout: loadout(&f)?,
                }
            }
            "ready" => set_ready(&Fields::new("ready", map), true, text)?,
            "unready" => set_ready(&Fields::new("unready", map), false, text)?,
            "startGame" => {
                let f = Fields::new("startGame", map);
                Self::StartGame {
                    room_code: f.text("roomId")?,
                    raw: Frame::from(text),
                }
            }
            "rejoin" => {
                let f = Fields::new("rejoin", map);
                Self::Rejoin {
                    room_code: f.text("roomId")?,
                    player_id: f.player_id("playerId")?,
                    new_health: f.int("newHealth")?,
                }
            }
            "targetLocked" => {
                let f = Fields::new("targetLocked", map);
                Self::TargetLocked {
                    room_code: f.text("roomId")?,
                    raw: Frame::from(text),
                }
            }
            "shootBulletRequest" => {
                let f = Fields::new("shootBulletRequest", map);
                Self::ShootBullet {
                    room_code: f.text("roomId")?,
                    shot: shot(&f, "bulletType")?,
                }
            }
            "shootRocketRequest" => {
                let f = Fields::new("shootRocketRequest", map);
                Self::ShootRocket {
                    room_code: f.text("roomId")?,
                    shot: shot(&f, "rocketType")?,
                    target: f.text("target")?,
                }
            }
            "playerHit" => {
                let f = Fields::new("playerHit", map);
                Self::PlayerHit {
                    room_code: f.text("roomId")?,
                    target: f.player_id("playerId")?,
                    damage: f.int("damage")?,
                }
            }
            "playerDied" => {
                let f = Fields::new("playerDied", map);
                Self::PlayerDied {
                    room_code: f.text("roomId")?,
                    victim: f.player_id("playerId")?,
                    shooter: f.player_id("shooterId")?,
                }
            }
            "clientDisconnected" => {
                let f = Fields::new("clientDisconnected", map);
                Self::ClientDisconnected {
                    room_code: f.text("roomId")?,
                    player_id: f.player_id("Id")?,
                    was_owner: f.flag("wasOwner")?,
                }
            }
            "completeDelete" => {
                let f = Fields::new("completeDelete", map);
                Self::CompleteDelete {
                    player_id: f.player_id("playerId")?,
                    room_code: f.opt_text("roomId")?.filter(|code| !code.is_empty()),
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }
}

/// Loss-tolerant pose update
#[derive(Debug, Clone, PartialEq)]
pub struct TransformUpdate {
    pub player_id: PlayerId,
    pub room_code: String,
    pub pose: Value,
}

impl TransformUpdate {
    pub fn decode(data: &[u8]) -> Result<Option<Self>, DecodeError> {
        let value: Value = serde_json::from_slice(data)?;
        let (kind, map) = split_type(&value)?;
        if kind != "transformUpdate" {
            return Ok(None);
        }

        let f = Fields::new("transformUpdate", map);
        Ok(Some(Self {
            player_id: f.player_id("playerId")?,
            room_code: f.text("roomId")?,
            pose: f.required("newTransform")?.clone(),
        }))
    }
}

fn split_type(value: &Value) -> Result<(&str, &Map<String, Value>), DecodeError> {
    let map = value.as_object().ok_or(DecodeError::NotAnObject)?;
    let kind = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::NotAnObject)?;
    Ok((kind, map))
}

fn set_ready(f: &Fields<'_>, ready: bool, text: &str) -> Result<ClientEvent, DecodeError> {
    Ok(ClientEvent::SetReady {
        room_code: f.text("roomId")?,
        player_id: f.player_id("Id")?,
        ready,
        raw: Frame::from(text),
    })
}

fn loadout(f: &Fields<'_>) -> Result<Loadout, DecodeError> {
    Ok(Loadout {
        name: f.opt_text("name")?.unwrap_or_default(),
        plane_type: f.opt_text("planeType")?.unwrap_or_default(),
        start_health: f.int("startHealth")?,
    })
}

fn shot(f: &Fields<'_>, kind_field: &'static str) -> Result<Shot, DecodeError> {
    Ok(Shot {
        kind: f.text(kind_field)?,
        shooter: f.text("shooter")?,
        start_position: f.vector("bulletStartPosition")?,
        velocity: f.vector("velocity")?,
        facing_direction: f.vector("planeFacingDirection")?,
    })
}

fn rules(f: &Fields<'_>) -> Result<RoomRules, DecodeError> {
    let info = f.object("gameModeInfo")?;

    let max_players = if info.flag("hasMaxPlayers")? {
        Some(info.count("maxPlayerCount", "gameModeInfo.maxPlayerCount")?)
    } else {
        None
    };
    let kills_to_win = if info.flag("useKills")? {
        let kills = info.count("killsToWin", "gameModeInfo.killsToWin")?;
        Some(u32::try_from(kills).unwrap_or(u32::MAX))
    } else {
        None
    };

    Ok(RoomRules {
        max_players,
        kills_to_win,
        game_mode: info.opt_text("gameModeType")?.unwrap_or_default(),
        teams: info.teams("teamColors")?,
    })
}

/// Typed access to the fields of one event object
struct Fields<'a> {
    event: &'static str,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn new(event: &'static str, map: &'a Map<String, Value>) -> Self {
        Self { event, map }
    }

    fn invalid(&self, field: &'static str, expected: &'static str) -> DecodeError {
        DecodeError::InvalidField {
            event: self.event,
            field,
            expected,
        }
    }

    /// Null counts as absent
    fn get(&self, field: &str) -> Option<&'a Value> {
        self.map.get(field).filter(|v| !v.is_null())
    }

    fn required(&self, field: &'static str) -> Result<&'a Value, DecodeError> {
        self.get(field).ok_or(DecodeError::MissingField {
            event: self.event,
            field,
        })
    }

    fn player_id(&self, field: &'static str) -> Result<PlayerId, DecodeError> {
        let parsed = match self.required(field)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed
            .map(PlayerId)
            .ok_or_else(|| self.invalid(field, "a player id"))
    }

    fn int(&self, field: &'static str) -> Result<i64, DecodeError> {
        parse_int(self.required(field)?).ok_or_else(|| self.invalid(field, "an integer"))
    }

    /// Non-negative integer; `label` is the field name reported on error
    fn count(&self, field: &'static str, label: &'static str) -> Result<usize, DecodeError> {
        let value = self.get(field).ok_or(DecodeError::MissingField {
            event: self.event,
            field: label,
        })?;
        parse_int(value)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| self.invalid(label, "a non-negative integer"))
    }

    fn text(&self, field: &'static str) -> Result<String, DecodeError> {
        render_text(self.required(field)?).ok_or_else(|| self.invalid(field, "a string"))
    }

    fn opt_text(&self, field: &'static str) -> Result<Option<String>, DecodeError> {
        match self.get(field) {
            None => Ok(None),
            Some(value) => render_text(value)
                .map(Some)
                .ok_or_else(|| self.invalid(field, "a string")),
        }
    }

    /// Absent flags read as false
    fn flag(&self, field: &'static str) -> Result<bool, DecodeError> {
        match self.get(field) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.trim() {
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
                _ => Err(self.invalid(field, "a boolean")),
            },
            Some(_) => Err(self.invalid(field, "a boolean")),
        }
    }

    fn vector(&self, field: &'static str) -> Result<Value, DecodeError> {
        match self.required(field)? {
            value @ Value::Array(_) => Ok(value.clone()),
            _ => Err(self.invalid(field, "an array")),
        }
    }

    fn object(&self, field: &'static str) -> Result<Fields<'a>, DecodeError> {
        match self.required(field)? {
            Value::Object(map) => Ok(Fields::new(self.event, map)),
            _ => Err(self.invalid(field, "an object")),
        }
    }

    /// Either a JSON array of names or a bracketed, space separated string
    /// such as `[red blue]`.
    fn teams(&self, field: &'static str) -> Result<Vec<String>, DecodeError> {
        match self.get(field) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    render_text(item).ok_or_else(|| self.invalid(field, "a list of team names"))
                })
                .collect(),
            Some(Value::String(s)) => Ok(s
                .split(|c: char| c.is_whitespace() || matches!(c, ',' | '[' | ']' | '"'))
                .filter(|team| !team.is_empty())
                .map(str::to_string)
                .collect()),
            Some(_) => Err(self.invalid(field, "a list of team names")),
        }
    }
}

fn parse_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn render_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> Result<Option<ClientEvent>, DecodeError> {
        ClientEvent::decode(&value.to_string())
    }

    #[test]
    fn create_room_reads_rules_and_loadout() {
        let event = decode(json!({
            "type": "createRoom",
            "Id": "69",
            "name": "",
            "planeType": "F14",
            "startHealth": 200,
            "worldIndex": 2,
            "gameModeInfo": {
                "hasMaxPlayers": "true",
                "maxPlayerCount": "4",
                "useKills": true,
                "killsToWin": 3,
                "gameModeType": "deathmatch",
                "teamColors": "[red blue]"
            }
        }))
        .unwrap()
        .unwrap();

        let ClientEvent::CreateRoom {
            player_id,
            loadout,
            scene_index,
            rules,
        } = event
        else {
            panic!("expected createRoom");
        };
        assert_eq!(player_id, PlayerId(69));
        assert_eq!(loadout.start_health, 200);
        assert!(loadout.name.is_empty());
        assert_eq!(scene_index, "2");
        assert_eq!(rules.max_players, Some(4));
        assert_eq!(rules.kills_to_win, Some(3));
        assert_eq!(rules.game_mode, "deathmatch");
        assert_eq!(rules.teams, vec!["red", "blue"]);
    }

    #[test]
    fn team_colors_accept_json_arrays() {
        let event = decode(json!({
            "type": "createRoom", "Id": 69, "startHealth": 100, "worldIndex": "1",
            "gameModeInfo": {"teamColors": ["red", "green"]}
        }))
        .unwrap()
        .unwrap();
        let ClientEvent::CreateRoom { rules, .. } = event else {
            panic!("expected createRoom");
        };
        assert_eq!(rules.teams, vec!["red", "green"]);
        assert_eq!(rules.max_players, None);
        assert_eq!(rules.kills_to_win, None);
    }

    #[test]
    fn non_numeric_id_is_rejected_not_zeroed() {
        let err = decode(json!({
            "type": "playerHit", "roomId": "ABCDEF", "playerId": "abc", "damage": 10
        }))
        .unwrap_err();

        assert!(err.is_reportable());
        assert!(matches!(
            err,
            DecodeError::InvalidField { event: "playerHit", field: "playerId", .. }
        ));
    }

    #[test]
    fn missing_field_is_named() {
        let err = decode(json!({"type": "playerDied", "roomId": "ABCDEF", "playerId": 70}))
            .unwrap_err();
        assert_eq!(err.to_string(), "playerDied: missing field `shooterId`");
    }

    #[test]
    fn kill_rule_without_threshold_is_rejected() {
        let err = decode(json!({
            "type": "createRoom", "Id": 69, "startHealth": 100, "worldIndex": "1",
            "gameModeInfo": {"useKills": true}
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MissingField { field: "gameModeInfo.killsToWin", .. }
        ));
    }

    #[test]
    fn unknown_type_is_ignored() {
        assert!(decode(json!({"type": "danceParty", "roomId": "X"})).unwrap().is_none());
    }

    #[test]
    fn garbage_is_malformed_and_not_reportable() {
        let err = ClientEvent::decode("{not json").unwrap_err();
        assert!(!err.is_reportable());
        let err = ClientEvent::decode("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject));
    }

    #[test]
    fn raw_relays_keep_inbound_text() {
        let text = r#"{"type":"ready","roomId":"ABCDEF","Id":"69","extra":true}"#;
        let Some(ClientEvent::SetReady { ready, raw, .. }) = ClientEvent::decode(text).unwrap()
        else {
            panic!("expected ready");
        };
        assert!(ready);
        assert_eq!(&*raw, text);
    }

    #[test]
    fn unready_names_its_own_event_in_errors() {
        let Some(ClientEvent::SetReady { ready, .. }) =
            decode(json!({"type": "unready", "roomId": "ABCDEF", "Id": 69})).unwrap()
        else {
            panic!("expected unready");
        };
        assert!(!ready);

        let err = decode(json!({"type": "unready", "roomId": "ABCDEF"})).unwrap_err();
        assert_eq!(err.to_string(), "unready: missing field `Id`");
    }

    #[test]
    fn shoot_requests_require_vectors() {
        let err = decode(json!({
            "type": "shootBulletRequest", "roomId": "ABCDEF", "bulletType": "mg",
            "shooter": "69", "bulletStartPosition": "0,0,0",
            "velocity": [1, 2, 3], "planeFacingDirection": [0, 0, 1]
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidField { field: "bulletStartPosition", .. }
        ));
    }

    #[test]
    fn complete_delete_treats_empty_room_as_absent() {
        let Some(ClientEvent::CompleteDelete { room_code, .. }) =
            decode(json!({"type": "completeDelete", "playerId": "69", "roomId": ""})).unwrap()
        else {
            panic!("expected completeDelete");
        };
        assert_eq!(room_code, None);
    }

    #[test]
    fn transform_update_keeps_pose_opaque() {
        let data = json!({
            "type": "transformUpdate", "playerId": "69", "roomId": "ABCDEF",
            "newTransform": {"pos": [1, 2, 3], "rot": [0, 0, 0, 1]}
        })
        .to_string();
        let update = TransformUpdate::decode(data.as_bytes()).unwrap().unwrap();
        assert_eq!(update.player_id, PlayerId(69));
        assert_eq!(update.pose["pos"], json!([1, 2, 3]));
    }
}
