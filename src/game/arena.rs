//! Simulation state of one game room and its ordered tick pipeline

use std::collections::BTreeMap;

use rand::Rng;
use rapier3d::prelude::RigidBodyHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

use super::combat::{Bullet, BulletId, CombatSystem, HitResult, PendingEffects};
use super::movement;
use super::physics::{ContactEvent, PhysicsWorld};
use super::player::Player;
use super::snapshot::SnapshotBuilder;
use super::terrain::Terrain;
use super::{MAP_DEPTH, MAP_WIDTH};

/// Authoritative state of a game room (owned by the simulation task)
pub struct GameState {
    pub players: BTreeMap<Uuid, Player>,
    pub bullets: Vec<Bullet>,
    pub scores: BTreeMap<Uuid, u32>,
    pub pending: PendingEffects,
    terrain: Terrain,
    physics: PhysicsWorld,
    scenery_bodies: Vec<RigidBodyHandle>,
    next_bullet_id: BulletId,
}

impl GameState {
    /// Generate terrain and static bodies for a room with this name
    pub fn new(room_name: &str) -> Self {
        let terrain = Terrain::generate(room_name);
        let mut physics = PhysicsWorld::new();
        physics.add_terrain(&terrain);
        let scenery_bodies = terrain
            .scenery()
            .iter()
            .map(|object| physics.add_scenery(object))
            .collect();

        Self {
            players: BTreeMap::new(),
            bullets: Vec::new(),
            scores: BTreeMap::new(),
            pending: PendingEffects::default(),
            terrain,
            physics,
            scenery_bodies,
            next_bullet_id: 1,
        }
    }

    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn scenery_count(&self) -> usize {
        self.scenery_bodies.len()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Spawn a player at a terrain spawn point and open their score entry.
    /// Returns false if the player is already simulated here.
    pub fn spawn_player<R: Rng>(&mut self, user_id: Uuid, username: &str, rng: &mut R) -> bool {
        if self.players.contains_key(&user_id) {
            return false;
        }
        let position = self.terrain.spawn_point(rng);
        let body = self.physics.add_player(user_id, position);
        self.players
            .insert(user_id, Player::new(user_id, username.to_string(), position, body));
        self.scores.entry(user_id).or_insert(0);
        true
    }

    /// Remove a player, their body, cooldowns and score entry.
    /// Projectiles already in flight stay in the world.
    pub fn remove_player(&mut self, user_id: Uuid) -> Option<Player> {
        let player = self.players.remove(&user_id)?;
        self.physics.remove_body(player.body);
        self.scores.remove(&user_id);
        self.pending.players_to_harm.retain(|id| *id != user_id);
        self.pending.players_to_remove.retain(|id| *id != user_id);
        Some(player)
    }

    /// Toggle the cosmetic highlight of a player. Returns false if the target is not here.
    pub fn set_hovered(&mut self, target_id: Uuid, value: bool) -> bool {
        match self.players.get_mut(&target_id) {
            Some(player) => {
                player.hovered = value;
                true
            }
            None => false,
        }
    }

    /// Apply queued harm from the previous step
    fn apply_pending_harm(&mut self) {
        let harmed = std::mem::take(&mut self.pending.players_to_harm);
        for user_id in &harmed {
            let Some(player) = self.players.get_mut(user_id) else {
                continue;
            };
            let outcome = CombatSystem::apply_harm(player, &mut self.scores);
            if outcome.killed {
                info!(
                    user_id = %user_id,
                    attacker = ?outcome.credited,
                    "Player killed"
                );
            }
        }
        self.pending.players_to_harm = harmed;
    }

    /// Replace every player whose death cooldown expired with a fresh entity
    fn respawn_expired<R: Rng>(&mut self, rng: &mut R) {
        let expired = std::mem::take(&mut self.pending.players_to_remove);
        for user_id in &expired {
            let Some(old) = self.players.remove(user_id) else {
                continue;
            };
            self.physics.remove_body(old.body);

            let position = self.terrain.spawn_point(rng);
            let body = self.physics.add_player(*user_id, position);
            let mut fresh = Player::new(*user_id, old.username, position, body);
            fresh.commands = old.commands;
            fresh.hovered = old.hovered;
            self.players.insert(*user_id, fresh);

            debug!(user_id = %user_id, "Player respawned");
        }
        self.pending.players_to_remove = expired;
    }

    /// Interpret contacts from the last physics step
    pub fn resolve_contacts(&mut self, contacts: &[ContactEvent]) {
        for contact in contacts {
            let result = CombatSystem::resolve_contact(
                contact,
                &mut self.bullets,
                &mut self.players,
                &mut self.physics,
                &mut self.pending,
            );
            if let HitResult::Damaged { victim, attacker } = result {
                debug!(victim = %victim, attacker = %attacker, "Projectile hit");
            }
        }
    }

    /// Movement, firing and cooldowns for every player
    fn update_players<R: Rng>(&mut self, dt: f32, rng: &mut R) {
        for player in self.players.values_mut() {
            movement::integrate(player, &self.terrain, &mut self.physics, dt);

            if player.commands.fire && player.can_fire() {
                let id = self.next_bullet_id;
                self.next_bullet_id += 1;
                let bullet = CombatSystem::fire(player, id, &mut self.physics, rng);
                self.bullets.push(bullet);
            }

            if player.cooldowns.tick(dt) {
                self.pending.remove_player(player.user_id);
            }
        }
    }

    /// Refresh projectile positions and flag those outside the map
    fn update_bullets(&mut self) {
        for bullet in &mut self.bullets {
            if let Some(position) = self.physics.translation(bullet.body) {
                bullet.position = position;
            }
            if bullet.position.x.abs() > MAP_WIDTH || bullet.position.z.abs() > MAP_DEPTH {
                self.pending.remove_bullet(bullet.id);
            }
        }
    }

    /// Remove flagged projectiles from the world and the room
    pub fn remove_flagged_bullets(&mut self) {
        if self.pending.bullets_to_remove.is_empty() {
            return;
        }
        let flagged = &self.pending.bullets_to_remove;
        let physics = &mut self.physics;
        self.bullets.retain(|bullet| {
            if flagged.contains(&bullet.id) {
                physics.remove_body(bullet.body);
                false
            } else {
                true
            }
        });
    }

    /// Run one tick and return this room's update.
    ///
    /// Harm and respawns recorded during the previous tick are applied before
    /// the world is stepped, so a player is harmed at most once per tick and a
    /// replaced body never receives this step's impulses.
    pub fn tick<R: Rng>(&mut self, dt: f32, rng: &mut R, tick: u64) -> ServerMsg {
        self.apply_pending_harm();
        self.respawn_expired(rng);
        self.pending.clear();

        let contacts = self.physics.step(dt);
        self.resolve_contacts(&contacts);

        self.update_players(dt, rng);
        self.update_bullets();
        self.remove_flagged_bullets();

        SnapshotBuilder::build(tick, &self.players, &self.bullets, &self.scores)
    }
}
