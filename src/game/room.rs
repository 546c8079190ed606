//! Room state: roster, rule set, open flag

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use super::player::{Player, PlayerId, PlayerSummary};
use crate::udp::endpoint::TransformEndpoint;
use crate::ws::outbound::ReliableHandle;

/// Length of generated room codes
pub const ROOM_CODE_LEN: usize = 6;

/// Rule set chosen by the room's creator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomRules {
    /// Player limit, when the limit rule is enabled
    pub max_players: Option<usize>,
    /// Kill-count win threshold, when the kill rule is enabled
    pub kills_to_win: Option<u32>,
    pub game_mode: String,
    pub teams: Vec<String>,
}

/// How new room codes are chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomCodePolicy {
    /// Random uppercase letters, regenerated until unused
    Random,
    /// Always the same code; a second room fails to be created (debugging aid)
    Fixed(String),
}

impl Default for RoomCodePolicy {
    fn default() -> Self {
        Self::Random
    }
}

pub fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
        .collect()
}

/// A live match
#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub scene_index: String,
    pub rules: RoomRules,
    /// Accepting joins; cleared once at game start
    pub open: bool,
    pub owner: Option<PlayerId>,
    /// Set when the last member leaves and the room is dropped from the store
    pub retired: bool,
    /// Ordered by id so "first remaining member" is deterministic
    pub roster: BTreeMap<PlayerId, Player>,
}

impl Room {
    pub fn new(code: String, scene_index: String, rules: RoomRules, owner: Player) -> Self {
        let owner_id = owner.id;
        let mut roster = BTreeMap::new();
        roster.insert(owner_id, owner);
        Self {
            code,
            scene_index,
            rules,
            open: true,
            owner: Some(owner_id),
            retired: false,
            roster,
        }
    }

    /// Uniform random pick from the configured teams, no balancing
    pub fn draw_team(&self) -> String {
        draw_team(&self.rules.teams)
    }

    pub fn is_full(&self) -> bool {
        self.rules
            .max_players
            .is_some_and(|limit| self.roster.len() >= limit)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.roster.get_mut(&id)
    }

    /// Members with a live reliable channel
    pub fn reliable_recipients(&self) -> Vec<ReliableHandle> {
        self.roster
            .values()
            .filter(|p| p.is_connected())
            .filter_map(|p| p.reliable.clone())
            .collect()
    }

    /// Members whose transform endpoint has been learned
    pub fn transform_recipients(&self) -> Vec<TransformEndpoint> {
        self.roster
            .values()
            .filter_map(|p| p.transform.clone())
            .collect()
    }

    pub fn summaries(&self) -> Vec<PlayerSummary> {
        self.roster.values().map(Player::summary).collect()
    }

    /// First remaining member that still has a live reliable channel
    pub fn next_owner(&self) -> Option<PlayerId> {
        self.roster
            .values()
            .find(|p| p.is_connected())
            .map(|p| p.id)
    }
}

pub fn draw_team(teams: &[String]) -> String {
    teams
        .choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Room {
        pub(crate) fn player(&self, id: PlayerId) -> Option<&Player> {
            self.roster.get(&id)
        }
    }

    fn member(id: u64) -> (Player, tokio::sync::mpsc::Receiver<crate::ws::protocol::Frame>) {
        let (handle, rx) = ReliableHandle::channel(8);
        (Player::new(PlayerId(id), handle), rx)
    }

    #[test]
    fn generated_codes_are_six_uppercase_letters() {
        for _ in 0..100 {
            let code = generate_room_code();
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn team_is_drawn_from_configured_list() {
        let teams = vec!["red".to_string(), "blue".to_string()];
        for _ in 0..50 {
            assert!(teams.contains(&draw_team(&teams)));
        }
        assert_eq!(draw_team(&[]), "");
    }

    #[test]
    fn limit_only_applies_when_enabled() {
        let (owner, _rx) = member(69);
        let mut room = Room::new("ABCDEF".into(), "1".into(), RoomRules::default(), owner);
        assert!(!room.is_full());

        room.rules.max_players = Some(1);
        assert!(room.is_full());
    }

    #[test]
    fn next_owner_skips_members_without_live_channel() {
        let (owner, _owner_rx) = member(69);
        let mut room = Room::new("ABCDEF".into(), "1".into(), RoomRules::default(), owner);
        let (gone, gone_rx) = member(70);
        let (live, _live_rx) = member(71);
        room.roster.insert(gone.id, gone);
        room.roster.insert(live.id, live);
        room.roster.remove(&PlayerId(69));
        drop(gone_rx);

        assert_eq!(room.next_owner(), Some(PlayerId(71)));
        assert_eq!(room.reliable_recipients().len(), 1);
    }
}
