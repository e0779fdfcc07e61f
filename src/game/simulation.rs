//! Simulation owner: rooms, connected roster and the authoritative tick loop
//!
//! One task owns the `Simulation`. Network events are queued and applied
//! between ticks, so a tick never observes a half-applied room change.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::{tick_delta, tick_duration, unix_millis};
use crate::ws::hub::ClientHub;
use crate::ws::protocol::{ChatMessage, ClientMsg, RoomSummary, ServerMsg};

use super::room::{RoomId, RoomRegistry};
use super::{InputKind, SimInput};

/// Longest chat line accepted, in characters
pub const MAX_CHAT_LENGTH: usize = 500;

/// Queue delay above which an input is reported
const SLOW_INPUT_MILLIS: u64 = 100;

/// A message and the identities it goes to
#[derive(Debug, Clone)]
pub struct Outbound {
    pub recipients: Vec<Uuid>,
    pub msg: ServerMsg,
}

impl Outbound {
    pub fn to_user(user_id: Uuid, msg: ServerMsg) -> Self {
        Self {
            recipients: vec![user_id],
            msg,
        }
    }
}

/// A connected identity
#[derive(Debug, Clone)]
struct Connected {
    username: String,
    connections: usize,
}

/// All simulation state, advanced explicitly by `handle_input` and `tick`
pub struct Simulation {
    rooms: RoomRegistry,
    roster: BTreeMap<Uuid, Connected>,
    rng: ChaCha8Rng,
    tick: u64,
}

impl Simulation {
    pub fn new(seed: u64) -> Self {
        Self {
            rooms: RoomRegistry::new(),
            roster: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            tick: 0,
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn connected_users(&self) -> usize {
        self.roster.len()
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.roster.contains_key(&user_id)
    }

    /// Apply one network event
    pub fn handle_input(&mut self, input: SimInput) -> Vec<Outbound> {
        let mut out = Vec::new();
        let user_id = input.user_id;

        match input.kind {
            InputKind::Connect { username } => self.connect(user_id, username, &mut out),
            InputKind::Disconnect => self.disconnect(user_id, &mut out),
            InputKind::Client(msg) => {
                if self.roster.contains_key(&user_id) {
                    self.handle_client(user_id, msg, &mut out);
                } else {
                    debug!(user_id = %user_id, "Message from unknown user ignored");
                }
            }
        }

        out
    }

    fn connect(&mut self, user_id: Uuid, username: String, out: &mut Vec<Outbound>) {
        if let Some(connected) = self.roster.get_mut(&user_id) {
            connected.connections += 1;
            debug!(
                user_id = %user_id,
                connections = connected.connections,
                "Additional connection"
            );
            if let Some(room_id) = self.rooms.room_of(user_id) {
                self.room_entry_messages(user_id, room_id, out);
            }
            return;
        }

        info!(user_id = %user_id, username = %username, "User connected");
        self.roster.insert(
            user_id,
            Connected {
                username: username.clone(),
                connections: 1,
            },
        );
        match self.rooms.join(user_id, &username, RoomId::Lobby, &mut self.rng) {
            Ok(()) => self.room_entry_messages(user_id, RoomId::Lobby, out),
            Err(e) => debug!(user_id = %user_id, error = %e, "Lobby join ignored"),
        }
    }

    fn disconnect(&mut self, user_id: Uuid, out: &mut Vec<Outbound>) {
        let Some(connected) = self.roster.get_mut(&user_id) else {
            return;
        };
        connected.connections = connected.connections.saturating_sub(1);
        if connected.connections > 0 {
            return;
        }

        if self.rooms.room_of(user_id) != Some(RoomId::Lobby) {
            self.move_user(user_id, RoomId::Lobby, out);
        }
        if let Err(e) = self.rooms.leave(user_id, RoomId::Lobby) {
            debug!(user_id = %user_id, error = %e, "Lobby leave ignored");
        }
        self.roster.remove(&user_id);

        // Nothing left to receive the room switch
        out.retain(|o| !(o.recipients.len() == 1 && o.recipients[0] == user_id));
        info!(user_id = %user_id, "User disconnected");
    }

    fn handle_client(&mut self, user_id: Uuid, msg: ClientMsg, out: &mut Vec<Outbound>) {
        match msg {
            ClientMsg::CreateRoom => self.create_room(user_id, out),
            ClientMsg::ChangeRoom { room_id } => self.change_room(user_id, room_id, out),
            ClientMsg::GetRooms => out.push(Outbound::to_user(
                user_id,
                ServerMsg::Rooms {
                    rooms: self.rooms.listing(),
                },
            )),
            ClientMsg::Control { command } => {
                match self.player_room(user_id) {
                    Some(room_id) => {
                        if let Some(player) = self
                            .rooms
                            .room_mut(room_id)
                            .and_then(|room| room.game_mut())
                            .and_then(|game| game.players.get_mut(&user_id))
                        {
                            player.commands.apply(command);
                        }
                    }
                    None => debug!(user_id = %user_id, "Control without a player ignored"),
                }
            }
            ClientMsg::Hover { target_id, value } => {
                let hovered = self
                    .player_room(user_id)
                    .and_then(|room_id| self.rooms.room_mut(room_id))
                    .and_then(|room| room.game_mut())
                    .is_some_and(|game| game.set_hovered(target_id, value));
                if !hovered {
                    debug!(user_id = %user_id, target_id = %target_id, "Hover target not in room");
                }
            }
            ClientMsg::Message { text } => self.chat(user_id, text, out),
            ClientMsg::Ping { t } => out.push(Outbound::to_user(user_id, ServerMsg::Pong { t })),
        }
    }

    /// Game room in which the user has a simulated player
    fn player_room(&self, user_id: Uuid) -> Option<RoomId> {
        self.rooms.room_of(user_id).filter(|id| !id.is_lobby())
    }

    fn create_room(&mut self, user_id: Uuid, out: &mut Vec<Outbound>) {
        let name = self.rooms.next_room_name();
        let room_id = self.rooms.create_room(name);
        self.move_user(user_id, room_id, out);
        self.broadcast_listing(out);
    }

    fn change_room(&mut self, user_id: Uuid, target: RoomId, out: &mut Vec<Outbound>) {
        let Some(room) = self.rooms.room(target) else {
            debug!(user_id = %user_id, room_id = %target, "Change to unknown room ignored");
            return;
        };
        if room.is_full() {
            debug!(user_id = %user_id, room_id = %target, "Change to full room ignored");
            return;
        }
        if self.rooms.room_of(user_id) == Some(target) {
            return;
        }
        self.move_user(user_id, target, out);
    }

    /// Leave the current room, then join `target`
    fn move_user(&mut self, user_id: Uuid, target: RoomId, out: &mut Vec<Outbound>) {
        let Some(username) = self.roster.get(&user_id).map(|c| c.username.clone()) else {
            return;
        };

        if let Some(current) = self.rooms.room_of(user_id) {
            match self.rooms.leave(user_id, current) {
                Ok(outcome) if outcome.room_deleted => self.broadcast_listing(out),
                Ok(_) => {}
                Err(e) => debug!(user_id = %user_id, error = %e, "Leave ignored"),
            }
        }

        match self.rooms.join(user_id, &username, target, &mut self.rng) {
            Ok(()) => {
                let occupancy = self.rooms.get_roster(target).map(|summary| summary.players);
                debug!(user_id = %user_id, room_id = %target, ?occupancy, "User entered room");
                self.room_entry_messages(user_id, target, out);
            }
            Err(e) => debug!(user_id = %user_id, error = %e, "Join ignored"),
        }
    }

    /// `room`, chat replay and (for game rooms) terrain for a user entering a room
    fn room_entry_messages(&self, user_id: Uuid, room_id: RoomId, out: &mut Vec<Outbound>) {
        let Some(room) = self.rooms.room(room_id) else {
            return;
        };
        out.push(Outbound::to_user(user_id, ServerMsg::Room { room_id }));
        out.push(Outbound::to_user(
            user_id,
            ServerMsg::Message {
                messages: room.chat.clone(),
            },
        ));
        if let Some(game) = room.game() {
            out.push(Outbound::to_user(user_id, game.terrain().to_message()));
        }
    }

    fn broadcast_listing(&self, out: &mut Vec<Outbound>) {
        out.push(Outbound {
            recipients: self.rooms.lobby_members(),
            msg: ServerMsg::Rooms {
                rooms: self.rooms.listing(),
            },
        });
    }

    fn chat(&mut self, user_id: Uuid, text: String, out: &mut Vec<Outbound>) {
        let content = text.trim();
        if content.is_empty() {
            return;
        }
        let content: String = content.chars().take(MAX_CHAT_LENGTH).collect();

        let Some(username) = self.roster.get(&user_id).map(|c| c.username.clone()) else {
            return;
        };
        let Some(room) = self
            .rooms
            .room_of(user_id)
            .and_then(|room_id| self.rooms.room_mut(room_id))
        else {
            return;
        };

        room.push_chat(ChatMessage {
            user: username,
            content,
            sent_at: Utc::now(),
        });
        out.push(Outbound {
            recipients: room.members.clone(),
            msg: ServerMsg::Message {
                messages: room.chat.clone(),
            },
        });
    }

    /// Advance every game room by `dt`. Yields one update per game room.
    pub fn tick(&mut self, dt: f32) -> Vec<Outbound> {
        self.tick += 1;
        let tick = self.tick;
        let rng = &mut self.rng;

        self.rooms
            .game_rooms_mut()
            .filter_map(|room| {
                let recipients = room.members.clone();
                let game = room.game_mut()?;
                Some(Outbound {
                    recipients,
                    msg: game.tick(dt, &mut *rng, tick),
                })
            })
            .collect()
    }

    /// Run the authoritative tick loop until the input channel closes
    pub async fn run(
        mut self,
        mut input_rx: mpsc::Receiver<SimInput>,
        hub: Arc<ClientHub>,
        stats: Arc<SimulationStats>,
    ) {
        info!("Simulation started");

        let mut tick_interval = interval(tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            // Drain input queue
            loop {
                match input_rx.try_recv() {
                    Ok(input) => {
                        let queued_ms = unix_millis().saturating_sub(input.received_at);
                        if queued_ms > SLOW_INPUT_MILLIS {
                            warn!(user_id = %input.user_id, queued_ms, "Input waited past a tick");
                        }
                        hub.dispatch(self.handle_input(input));
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        info!("Input channel closed, stopping simulation");
                        return;
                    }
                }
            }

            let updates = self.tick(tick_delta());
            hub.dispatch(updates);

            stats.publish(&self);
        }
    }
}

/// Counters published by the simulation task for HTTP handlers
#[derive(Debug, Default)]
pub struct SimulationStats {
    tick: AtomicU64,
    game_rooms: AtomicUsize,
    connected_users: AtomicUsize,
    simulated_players: AtomicUsize,
    listing: RwLock<Vec<RoomSummary>>,
}

impl SimulationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, sim: &Simulation) {
        self.tick.store(sim.tick_count(), Ordering::Relaxed);
        self.game_rooms
            .store(sim.rooms.game_room_count(), Ordering::Relaxed);
        self.connected_users
            .store(sim.connected_users(), Ordering::Relaxed);
        self.simulated_players
            .store(sim.rooms.simulated_players(), Ordering::Relaxed);
        *self.listing.write() = sim.rooms.listing();
    }

    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }

    pub fn game_rooms(&self) -> usize {
        self.game_rooms.load(Ordering::Relaxed)
    }

    pub fn connected_users(&self) -> usize {
        self.connected_users.load(Ordering::Relaxed)
    }

    pub fn simulated_players(&self) -> usize {
        self.simulated_players.load(Ordering::Relaxed)
    }

    pub fn listing(&self) -> Vec<RoomSummary> {
        self.listing.read().clone()
    }
}
