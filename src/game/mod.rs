//! Game simulation modules

pub mod arena;
pub mod combat;
pub mod movement;
pub mod physics;
pub mod player;
pub mod room;
pub mod simulation;
pub mod snapshot;
pub mod terrain;

pub use simulation::{Outbound, Simulation, SimulationStats};

use crate::ws::protocol::ClientMsg;
use uuid::Uuid;

/// Half-extent of the playable map along x
pub const MAP_WIDTH: f32 = 100.0;
/// Half-extent of the playable map along z
pub const MAP_DEPTH: f32 = 100.0;
/// Simulated players allowed in one game room
pub const MAX_ROOM_PLAYERS: usize = 16;

/// Network event forwarded from a connection to the simulation task
#[derive(Debug, Clone)]
pub struct SimInput {
    pub user_id: Uuid,
    pub kind: InputKind,
    pub received_at: u64,
}

#[derive(Debug, Clone)]
pub enum InputKind {
    /// A new authenticated connection for this identity
    Connect { username: String },
    /// A parsed client message
    Client(ClientMsg),
    /// One connection of this identity closed
    Disconnect,
}
