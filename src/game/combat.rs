//! Combat system - projectiles, hit resolution, damage and scoring

use std::collections::BTreeMap;

use glam::Vec3;
use rand::Rng;
use rapier3d::prelude::RigidBodyHandle;
use uuid::Uuid;

use super::physics::{ContactEvent, ContactTarget, PhysicsWorld, PLAYER_RADIUS};
use super::player::Player;

/// Identifier of a projectile, unique within its room
pub type BulletId = u64;

/// Health removed by one hit
pub const DAMAGE_PER_HIT: i32 = 1;

/// Seconds between shots
pub const FIRE_COOLDOWN: f32 = 0.25;
/// Seconds of damage immunity after a hit
pub const DAMAGE_COOLDOWN: f32 = 0.5;
/// Seconds a dead player waits before respawning
pub const DEATH_COOLDOWN: f32 = 3.0;

/// Maximum random deviation applied to pitch and yaw when firing (radians)
pub const AIM_CONE: f32 = 0.05;
/// Impulse given to a projectile when fired
pub const BULLET_IMPULSE: f32 = 40.0;
pub const BULLET_MASS: f32 = 1.0;
pub const BULLET_HALF_EXTENT: f32 = 0.3;
/// Impulse applied to a player struck by a projectile
pub const KNOCKBACK_IMPULSE: f32 = 25.0;
/// Seconds a knocked-back player keeps its planar physics velocity
pub const KNOCKBACK_DURATION: f32 = 0.5;

/// Height above the feet where projectiles leave the player
const MUZZLE_HEIGHT: f32 = 0.75;

/// Active projectile in a game room
#[derive(Debug, Clone)]
pub struct Bullet {
    pub id: BulletId,
    pub owner_id: Uuid,
    pub position: Vec3,
    /// Euler rotation `(pitch, yaw, 0)`
    pub rotation: Vec3,
    /// Unit heading at launch
    pub direction: Vec3,
    /// Set once the first valid hit is honoured
    pub collided: bool,
    pub body: RigidBodyHandle,
}

/// Effects recorded during a physics step and applied at the next tick boundary
#[derive(Debug, Default)]
pub struct PendingEffects {
    pub players_to_harm: Vec<Uuid>,
    pub players_to_remove: Vec<Uuid>,
    pub bullets_to_remove: Vec<BulletId>,
}

impl PendingEffects {
    pub fn harm(&mut self, user_id: Uuid) {
        if !self.players_to_harm.contains(&user_id) {
            self.players_to_harm.push(user_id);
        }
    }

    pub fn remove_player(&mut self, user_id: Uuid) {
        if !self.players_to_remove.contains(&user_id) {
            self.players_to_remove.push(user_id);
        }
    }

    pub fn remove_bullet(&mut self, bullet_id: BulletId) {
        if !self.bullets_to_remove.contains(&bullet_id) {
            self.bullets_to_remove.push(bullet_id);
        }
    }

    pub fn clear(&mut self) {
        self.players_to_harm.clear();
        self.players_to_remove.clear();
        self.bullets_to_remove.clear();
    }
}

/// How a contact was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitResult {
    /// Victim queued for damage
    Damaged { victim: Uuid, attacker: Uuid },
    /// Projectile consumed without damage (immunity window, dead or already queued)
    Absorbed,
    /// Projectile struck terrain or scenery
    Static,
    /// Attacker's own projectile touching the attacker
    SelfHit,
    /// Projectile already honoured a hit or no longer exists
    Stale,
}

/// Result of applying one queued harm record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarmOutcome {
    pub killed: bool,
    /// Attacker credited with the kill
    pub credited: Option<Uuid>,
}

/// Combat system for firing, contact resolution and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Unit forward vector for a facing. Yaw 0 looks down -z, positive pitch looks up.
    pub fn aim_direction(yaw: f32, pitch: f32) -> Vec3 {
        Vec3::new(
            -yaw.sin() * pitch.cos(),
            pitch.sin(),
            -yaw.cos() * pitch.cos(),
        )
    }

    /// Apply the recoil cone to a facing
    pub fn perturb_aim<R: Rng>(rng: &mut R, yaw: f32, pitch: f32) -> (f32, f32) {
        (
            yaw + rng.gen_range(-AIM_CONE..=AIM_CONE),
            pitch + rng.gen_range(-AIM_CONE..=AIM_CONE),
        )
    }

    /// Spawn a projectile for `shooter` and reset its fire cooldown
    pub fn fire<R: Rng>(
        shooter: &mut Player,
        id: BulletId,
        physics: &mut PhysicsWorld,
        rng: &mut R,
    ) -> Bullet {
        let (yaw, pitch) =
            Self::perturb_aim(rng, shooter.commands.yaw, shooter.commands.pitch);
        let direction = Self::aim_direction(yaw, pitch);

        let muzzle = shooter.position
            + Vec3::Y * MUZZLE_HEIGHT
            + direction * (PLAYER_RADIUS + BULLET_HALF_EXTENT);
        let body = physics.add_bullet(id, muzzle, direction);

        shooter.cooldowns.fire = FIRE_COOLDOWN;

        Bullet {
            id,
            owner_id: shooter.user_id,
            position: muzzle,
            rotation: Vec3::new(pitch, yaw, 0.0),
            direction,
            collided: false,
            body,
        }
    }

    /// Interpret one contact from the last physics step.
    ///
    /// Knockback is applied immediately; damage is only queued.
    pub fn resolve_contact(
        contact: &ContactEvent,
        bullets: &mut [Bullet],
        players: &mut BTreeMap<Uuid, Player>,
        physics: &mut PhysicsWorld,
        pending: &mut PendingEffects,
    ) -> HitResult {
        let Some(bullet) = bullets.iter_mut().find(|b| b.id == contact.bullet) else {
            return HitResult::Stale;
        };
        if bullet.collided {
            return HitResult::Stale;
        }

        let victim_id = match contact.target {
            ContactTarget::Static => {
                bullet.collided = true;
                pending.remove_bullet(bullet.id);
                return HitResult::Static;
            }
            ContactTarget::Player(victim_id) => victim_id,
        };

        if victim_id == bullet.owner_id {
            return HitResult::SelfHit;
        }

        bullet.collided = true;
        pending.remove_bullet(bullet.id);

        let Some(victim) = players.get_mut(&victim_id) else {
            return HitResult::Absorbed;
        };

        let immune = victim.cooldowns.damage > 0.0
            || !victim.is_alive()
            || pending.players_to_harm.contains(&victim_id);
        if immune {
            return HitResult::Absorbed;
        }

        physics.apply_impulse(victim.body, bullet.direction.normalize_or_zero() * KNOCKBACK_IMPULSE);
        victim.cooldowns.knockback = KNOCKBACK_DURATION;
        victim.last_hit_by = Some(bullet.owner_id);
        pending.harm(victim_id);

        HitResult::Damaged {
            victim: victim_id,
            attacker: bullet.owner_id,
        }
    }

    /// Apply one queued harm record: start the immunity window, remove health and
    /// credit the attacker if this hit is the one that kills.
    pub fn apply_harm(player: &mut Player, scores: &mut BTreeMap<Uuid, u32>) -> HarmOutcome {
        player.cooldowns.damage = DAMAGE_COOLDOWN;
        player.health = (player.health - DAMAGE_PER_HIT).max(0);

        if player.health > 0 || player.cooldowns.death > 0.0 {
            return HarmOutcome {
                killed: false,
                credited: None,
            };
        }

        let credited = player
            .last_hit_by
            .filter(|attacker| match scores.get_mut(attacker) {
                Some(score) => {
                    *score += 1;
                    true
                }
                None => false,
            });
        player.cooldowns.death = DEATH_COOLDOWN;

        HarmOutcome {
            killed: true,
            credited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    struct Arena {
        physics: PhysicsWorld,
        players: BTreeMap<Uuid, Player>,
        bullets: Vec<Bullet>,
        pending: PendingEffects,
        attacker: Uuid,
        victim: Uuid,
    }

    impl Arena {
        fn new() -> Self {
            let mut physics = PhysicsWorld::new();
            let mut players = BTreeMap::new();
            let attacker = Uuid::new_v4();
            let victim = Uuid::new_v4();
            for (id, x) in [(attacker, 0.0), (victim, 5.0)] {
                let position = Vec3::new(x, 10.0, 0.0);
                let body = physics.add_player(id, position);
                players.insert(id, Player::new(id, format!("p{x}"), position, body));
            }
            Self {
                physics,
                players,
                bullets: Vec::new(),
                pending: PendingEffects::default(),
                attacker,
                victim,
            }
        }

        fn shoot(&mut self, id: BulletId) -> BulletId {
            let mut rng = ChaCha8Rng::seed_from_u64(id);
            let shooter = self.players.get_mut(&self.attacker).unwrap();
            let bullet = CombatSystem::fire(shooter, id, &mut self.physics, &mut rng);
            self.bullets.push(bullet);
            id
        }

        fn resolve(&mut self, bullet: BulletId, target: ContactTarget) -> HitResult {
            CombatSystem::resolve_contact(
                &ContactEvent { bullet, target },
                &mut self.bullets,
                &mut self.players,
                &mut self.physics,
                &mut self.pending,
            )
        }
    }

    #[test]
    fn aim_direction_is_unit_and_faces_negative_z_at_rest() {
        let forward = CombatSystem::aim_direction(0.0, 0.0);
        assert!((forward - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-6);

        let up = CombatSystem::aim_direction(0.3, std::f32::consts::FRAC_PI_2);
        assert!((up.length() - 1.0).abs() < 1e-5);
        assert!(up.y > 0.99);
    }

    #[test]
    fn aim_cone_is_bounded() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..200 {
            let (yaw, pitch) = CombatSystem::perturb_aim(&mut rng, 1.0, -0.5);
            assert!((yaw - 1.0).abs() <= AIM_CONE + 1e-6);
            assert!((pitch + 0.5).abs() <= AIM_CONE + 1e-6);
        }
    }

    #[test]
    fn firing_resets_cooldown_and_creates_body() {
        let mut arena = Arena::new();
        let bodies = arena.physics.body_count();
        arena.shoot(1);

        assert_eq!(arena.physics.body_count(), bodies + 1);
        assert_eq!(arena.players[&arena.attacker].cooldowns.fire, FIRE_COOLDOWN);
        assert_eq!(arena.bullets[0].owner_id, arena.attacker);
        assert!(!arena.bullets[0].collided);
    }

    #[test]
    fn hit_queues_harm_and_records_attacker() {
        let mut arena = Arena::new();
        let bullet = arena.shoot(1);
        let victim = arena.victim;

        let result = arena.resolve(bullet, ContactTarget::Player(victim));

        assert_eq!(
            result,
            HitResult::Damaged {
                victim,
                attacker: arena.attacker
            }
        );
        assert_eq!(arena.pending.players_to_harm, vec![victim]);
        assert_eq!(arena.pending.bullets_to_remove, vec![bullet]);
        assert_eq!(arena.players[&victim].last_hit_by, Some(arena.attacker));
        assert_eq!(arena.players[&victim].cooldowns.knockback, KNOCKBACK_DURATION);
        // Damage itself waits for the next tick
        assert_eq!(arena.players[&victim].health, super::super::player::PLAYER_MAX_HEALTH);
    }

    #[test]
    fn self_hit_is_ignored() {
        let mut arena = Arena::new();
        let bullet = arena.shoot(1);
        let attacker = arena.attacker;

        assert_eq!(arena.resolve(bullet, ContactTarget::Player(attacker)), HitResult::SelfHit);
        assert!(!arena.bullets[0].collided);
        assert!(arena.pending.players_to_harm.is_empty());
        assert!(arena.pending.bullets_to_remove.is_empty());
    }

    #[test]
    fn only_first_contact_of_a_bullet_counts() {
        let mut arena = Arena::new();
        let bullet = arena.shoot(1);
        let victim = arena.victim;

        arena.resolve(bullet, ContactTarget::Static);
        assert_eq!(arena.resolve(bullet, ContactTarget::Player(victim)), HitResult::Stale);
        assert!(arena.pending.players_to_harm.is_empty());
        assert_eq!(arena.pending.bullets_to_remove, vec![bullet]);
    }

    #[test]
    fn damage_cooldown_absorbs_hits() {
        let mut arena = Arena::new();
        let bullet = arena.shoot(1);
        let victim = arena.victim;
        arena.players.get_mut(&victim).unwrap().cooldowns.damage = 0.3;

        assert_eq!(arena.resolve(bullet, ContactTarget::Player(victim)), HitResult::Absorbed);
        assert!(arena.pending.players_to_harm.is_empty());
        // The projectile is still destroyed
        assert_eq!(arena.pending.bullets_to_remove, vec![bullet]);
    }

    #[test]
    fn many_hits_in_one_step_queue_one_harm() {
        let mut arena = Arena::new();
        let first = arena.shoot(1);
        arena.players.get_mut(&arena.attacker).unwrap().cooldowns.fire = 0.0;
        let second = arena.shoot(2);
        let victim = arena.victim;

        arena.resolve(first, ContactTarget::Player(victim));
        assert_eq!(arena.resolve(second, ContactTarget::Player(victim)), HitResult::Absorbed);
        assert_eq!(arena.pending.players_to_harm, vec![victim]);
        assert_eq!(arena.pending.bullets_to_remove, vec![first, second]);
    }

    #[test]
    fn kill_credits_attacker_exactly_once() {
        let mut arena = Arena::new();
        let attacker = arena.attacker;
        let mut scores = BTreeMap::from([(attacker, 0), (arena.victim, 0)]);
        let victim = arena.players.get_mut(&arena.victim).unwrap();
        victim.health = 2;
        victim.last_hit_by = Some(attacker);

        let first = CombatSystem::apply_harm(victim, &mut scores);
        assert!(!first.killed);
        assert_eq!(victim.health, 1);
        assert_eq!(victim.cooldowns.damage, DAMAGE_COOLDOWN);

        let second = CombatSystem::apply_harm(victim, &mut scores);
        assert_eq!(
            second,
            HarmOutcome {
                killed: true,
                credited: Some(attacker)
            }
        );
        assert_eq!(victim.health, 0);
        assert_eq!(victim.cooldowns.death, DEATH_COOLDOWN);

        let third = CombatSystem::apply_harm(victim, &mut scores);
        assert!(!third.killed);
        assert_eq!(victim.health, 0);
        assert_eq!(scores[&attacker], 1);
    }

    #[test]
    fn kill_without_known_attacker_scores_nobody() {
        let mut arena = Arena::new();
        let mut scores = BTreeMap::from([(arena.attacker, 0)]);
        let victim = arena.players.get_mut(&arena.victim).unwrap();
        victim.health = 1;

        let outcome = CombatSystem::apply_harm(victim, &mut scores);
        assert!(outcome.killed);
        assert_eq!(outcome.credited, None);
        assert_eq!(scores[&arena.attacker], 0);
    }
}
