//! Room registry: lobby, game rooms, membership and chat logs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::ws::protocol::{ChatMessage, RoomSummary};

use super::arena::GameState;
use super::MAX_ROOM_PLAYERS;

/// Most recent chat lines kept per room
pub const CHAT_HISTORY_LIMIT: usize = 100;

const LOBBY_ID: &str = "lobby";

/// Room identity. The lobby is `"lobby"` on the wire; game rooms are UUID strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoomId {
    Lobby,
    Game(Uuid),
}

impl RoomId {
    pub fn is_lobby(&self) -> bool {
        matches!(self, RoomId::Lobby)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::Lobby => f.write_str(LOBBY_ID),
            RoomId::Game(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for RoomId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == LOBBY_ID {
            return Ok(RoomId::Lobby);
        }
        Uuid::parse_str(s).map(RoomId::Game)
    }
}

impl TryFrom<String> for RoomId {
    type Error = uuid::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.to_string()
    }
}

/// Room-level request failures. All of them are dropped by the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room {0} does not exist")]
    UnknownRoom(RoomId),

    #[error("room {0} is full")]
    RoomFull(RoomId),

    #[error("user is already in room {0}")]
    AlreadyMember(RoomId),

    #[error("user is not in room {0}")]
    NotMember(RoomId),
}

/// Lobby or game room payload
pub enum RoomKind {
    Lobby,
    Game(Box<GameState>),
}

pub struct Room {
    pub id: RoomId,
    pub name: String,
    /// Members in join order
    pub members: Vec<Uuid>,
    pub chat: Vec<ChatMessage>,
    pub kind: RoomKind,
    /// Creation order, used to sort listings
    seq: u64,
}

impl Room {
    pub fn game(&self) -> Option<&GameState> {
        match &self.kind {
            RoomKind::Game(state) => Some(&**state),
            RoomKind::Lobby => None,
        }
    }

    pub fn game_mut(&mut self) -> Option<&mut GameState> {
        match &mut self.kind {
            RoomKind::Game(state) => Some(&mut **state),
            RoomKind::Lobby => None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.game()
            .is_some_and(|game| game.player_count() >= MAX_ROOM_PLAYERS)
    }

    pub fn summary(&self) -> RoomSummary {
        let count = self.game().map_or(self.members.len(), GameState::player_count);
        RoomSummary {
            id: self.id,
            name: self.name.clone(),
            players: format!("{count} / {MAX_ROOM_PLAYERS}"),
        }
    }

    /// Append a chat line, keeping the log bounded
    pub fn push_chat(&mut self, message: ChatMessage) {
        self.chat.push(message);
        if self.chat.len() > CHAT_HISTORY_LIMIT {
            let excess = self.chat.len() - CHAT_HISTORY_LIMIT;
            self.chat.drain(..excess);
        }
    }
}

/// Result of a successful leave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// The room emptied and was deleted
    pub room_deleted: bool,
}

/// Registry of the lobby and every game room
pub struct RoomRegistry {
    rooms: BTreeMap<RoomId, Room>,
    /// Current room of every member
    locations: HashMap<Uuid, RoomId>,
    next_seq: u64,
}

impl RoomRegistry {
    pub fn new() -> Self {
        let mut rooms = BTreeMap::new();
        rooms.insert(
            RoomId::Lobby,
            Room {
                id: RoomId::Lobby,
                name: "Lobby".to_string(),
                members: Vec::new(),
                chat: Vec::new(),
                kind: RoomKind::Lobby,
                seq: 0,
            },
        );
        Self {
            rooms,
            locations: HashMap::new(),
            next_seq: 1,
        }
    }

    /// Display name for the next game room
    pub fn next_room_name(&self) -> String {
        format!("Cool Room #{}", self.rooms.len())
    }

    /// Create an empty game room with generated terrain
    pub fn create_room(&mut self, name: String) -> RoomId {
        let id = RoomId::Game(Uuid::new_v4());
        let state = GameState::new(&name);
        info!(
            room_id = %id,
            name = %name,
            scenery = state.scenery_count(),
            "Game room created"
        );

        self.rooms.insert(
            id,
            Room {
                id,
                name,
                members: Vec::new(),
                chat: Vec::new(),
                kind: RoomKind::Game(Box::new(state)),
                seq: self.next_seq,
            },
        );
        self.next_seq += 1;
        id
    }

    /// Add a user to a room, spawning their player if it is a game room
    pub fn join<R: Rng>(
        &mut self,
        user_id: Uuid,
        username: &str,
        room_id: RoomId,
        rng: &mut R,
    ) -> Result<(), RoomError> {
        if let Some(current) = self.locations.get(&user_id) {
            return Err(RoomError::AlreadyMember(*current));
        }
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::UnknownRoom(room_id))?;
        if room.is_full() {
            return Err(RoomError::RoomFull(room_id));
        }

        if let Some(game) = room.game_mut() {
            game.spawn_player(user_id, username, rng);
        }
        room.members.push(user_id);
        self.locations.insert(user_id, room_id);
        Ok(())
    }

    /// Remove a user from a room, deleting the room if it is an empty game room
    pub fn leave(&mut self, user_id: Uuid, room_id: RoomId) -> Result<LeaveOutcome, RoomError> {
        if self.locations.get(&user_id) != Some(&room_id) {
            return Err(RoomError::NotMember(room_id));
        }
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::UnknownRoom(room_id))?;

        room.members.retain(|member| *member != user_id);
        if let Some(game) = room.game_mut() {
            game.remove_player(user_id);
        }
        self.locations.remove(&user_id);

        let room_deleted = !room_id.is_lobby() && room.members.is_empty();
        if room_deleted {
            self.rooms.remove(&room_id);
            info!(room_id = %room_id, "Game room deleted");
        }
        Ok(LeaveOutcome { room_deleted })
    }

    /// Summary of one room
    pub fn get_roster(&self, room_id: RoomId) -> Option<RoomSummary> {
        self.rooms.get(&room_id).map(Room::summary)
    }

    /// Game rooms in creation order (lobby excluded)
    pub fn listing(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<&Room> = self
            .rooms
            .values()
            .filter(|room| !room.id.is_lobby())
            .collect();
        rooms.sort_by_key(|room| room.seq);
        rooms.into_iter().map(Room::summary).collect()
    }

    pub fn room(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    pub fn room_mut(&mut self, room_id: RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(&room_id)
    }

    /// Room the user is currently in
    pub fn room_of(&self, user_id: Uuid) -> Option<RoomId> {
        self.locations.get(&user_id).copied()
    }

    pub fn lobby_members(&self) -> Vec<Uuid> {
        self.rooms
            .get(&RoomId::Lobby)
            .map(|lobby| lobby.members.clone())
            .unwrap_or_default()
    }

    /// Every game room, for the tick loop
    pub fn game_rooms_mut(&mut self) -> impl Iterator<Item = &mut Room> {
        self.rooms.values_mut().filter(|room| !room.id.is_lobby())
    }

    pub fn game_room_count(&self) -> usize {
        self.rooms.len() - 1
    }

    pub fn simulated_players(&self) -> usize {
        self.rooms
            .values()
            .filter_map(Room::game)
            .map(GameState::player_count)
            .sum()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
