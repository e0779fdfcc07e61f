//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::room::RoomId;
use crate::game::terrain::SceneryKind;

/// A single control intent sent by the client.
///
/// Movement, jump and fire carry a pressed/released flag; facing carries the
/// camera orientation in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum Command {
    #[serde(rename = "up")]
    MoveUp(bool),
    #[serde(rename = "down")]
    MoveDown(bool),
    #[serde(rename = "left")]
    MoveLeft(bool),
    #[serde(rename = "right")]
    MoveRight(bool),
    Jump(bool),
    Fire(bool),
    Facing { yaw: f32, pitch: f32 },
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Create a new game room and move into it
    CreateRoom,

    /// Move to another room (lobby or game room)
    ChangeRoom { room_id: RoomId },

    /// Request the current game room listing
    GetRooms,

    /// Set or clear one control intent
    Control { command: Command },

    /// Cosmetic highlight of another player
    Hover { target_id: Uuid, value: bool },

    /// Chat message for the current room
    Message { text: String },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { user_id: Uuid, server_time: u64 },

    /// The room the recipient is currently in
    Room { room_id: RoomId },

    /// Listing of game rooms (lobby excluded)
    Rooms { rooms: Vec<RoomSummary> },

    /// Full chat log of the recipient's room
    Message { messages: Vec<ChatMessage> },

    /// Terrain mesh and scenery for the recipient's game room
    Terrain {
        /// Flat `[x, y, z, x, y, z, ...]` vertex positions
        vertices: Vec<f32>,
        /// Triangle list into `vertices`
        indices: Vec<u32>,
        scenery: Vec<SceneryView>,
    },

    /// Per-tick simulation state of the recipient's game room
    Update {
        tick: u64,
        players: Vec<PlayerView>,
        bullets: Vec<BulletView>,
        /// Score keyed by display name
        scores: BTreeMap<String, u32>,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Game room entry in a `rooms` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    /// Occupancy, formatted as `"<count> / 16"`
    pub players: String,
}

/// One line of room chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Presentation state derived from health and cooldowns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Normal,
    Damaged,
    Dead,
}

/// Player state in an update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub user_id: Uuid,
    pub username: String,
    pub position: Vec3,
    /// Euler rotation, yaw in `y`
    pub rotation: Vec3,
    pub velocity: Vec3,
    pub health: i32,
    pub status: PlayerStatus,
    pub is_jumping: bool,
    /// Weapon is ready to fire
    pub can_fire: bool,
    pub hovered: bool,
}

/// Projectile state in an update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletView {
    pub id: u64,
    pub owner_id: Uuid,
    pub position: Vec3,
    /// Euler rotation `(pitch, yaw, 0)`
    pub rotation: Vec3,
}

/// Static scenery object for client rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneryView {
    pub kind: SceneryKind,
    pub position: Vec3,
    pub rotation: Vec3,
}
