//! Player entity, control intents and cooldown timers

use glam::Vec3;
use rapier3d::prelude::RigidBodyHandle;
use uuid::Uuid;

use crate::ws::protocol::{Command, PlayerStatus};

/// Health of a freshly spawned player
pub const PLAYER_MAX_HEALTH: i32 = 10;

/// Latest control intents reported by the client
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CommandSet {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub fire: bool,
    /// Facing yaw in radians
    pub yaw: f32,
    /// Facing pitch in radians (positive looks up)
    pub pitch: f32,
}

impl CommandSet {
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::MoveUp(pressed) => self.up = pressed,
            Command::MoveDown(pressed) => self.down = pressed,
            Command::MoveLeft(pressed) => self.left = pressed,
            Command::MoveRight(pressed) => self.right = pressed,
            Command::Jump(pressed) => self.jump = pressed,
            Command::Fire(pressed) => self.fire = pressed,
            Command::Facing { yaw, pitch } => {
                if yaw.is_finite() && pitch.is_finite() {
                    self.yaw = yaw;
                    self.pitch = pitch;
                }
            }
        }
    }
}

/// Per-player countdowns in seconds. Zero means inactive.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cooldowns {
    pub fire: f32,
    pub damage: f32,
    pub death: f32,
    /// Physics owns planar velocity while this runs
    pub knockback: f32,
}

impl Cooldowns {
    /// Count every running cooldown down by `dt`.
    ///
    /// Returns true on the tick the death cooldown reaches zero.
    pub fn tick(&mut self, dt: f32) -> bool {
        count_down(&mut self.fire, dt);
        count_down(&mut self.damage, dt);
        count_down(&mut self.knockback, dt);
        count_down(&mut self.death, dt)
    }
}

/// Returns true when the countdown crosses to zero this call
fn count_down(value: &mut f32, dt: f32) -> bool {
    if *value <= 0.0 {
        *value = 0.0;
        return false;
    }
    *value -= dt;
    if *value <= 0.0 {
        *value = 0.0;
        return true;
    }
    false
}

/// Player state in a game room (authoritative)
#[derive(Debug, Clone)]
pub struct Player {
    pub user_id: Uuid,
    pub username: String,

    // Position and movement
    pub position: Vec3,
    /// Euler rotation, only yaw (`y`) is driven
    pub rotation: Vec3,
    pub velocity: Vec3,
    pub is_jumping: bool,

    // Combat
    pub health: i32,
    pub cooldowns: Cooldowns,
    pub last_hit_by: Option<Uuid>,

    // Input
    pub commands: CommandSet,

    /// Cosmetic highlight toggled by other clients
    pub hovered: bool,

    pub body: RigidBodyHandle,
}

impl Player {
    pub fn new(user_id: Uuid, username: String, position: Vec3, body: RigidBodyHandle) -> Self {
        Self {
            user_id,
            username,
            position,
            rotation: Vec3::ZERO,
            velocity: Vec3::ZERO,
            is_jumping: false,
            health: PLAYER_MAX_HEALTH,
            cooldowns: Cooldowns::default(),
            last_hit_by: None,
            commands: CommandSet::default(),
            hovered: false,
            body,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn can_fire(&self) -> bool {
        self.is_alive() && self.cooldowns.fire <= 0.0
    }

    pub fn status(&self) -> PlayerStatus {
        if !self.is_alive() {
            PlayerStatus::Dead
        } else if self.cooldowns.damage > 0.0 {
            PlayerStatus::Damaged
        } else {
            PlayerStatus::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_player() -> Player {
        Player::new(
            Uuid::new_v4(),
            "tester".to_string(),
            Vec3::ZERO,
            RigidBodyHandle::invalid(),
        )
    }

    #[test]
    fn commands_set_and_clear() {
        let mut commands = CommandSet::default();
        commands.apply(Command::MoveLeft(true));
        commands.apply(Command::Fire(true));
        assert!(commands.left && commands.fire);

        commands.apply(Command::MoveLeft(false));
        assert!(!commands.left);
        assert!(commands.fire);
    }

    #[test]
    fn non_finite_facing_is_ignored() {
        let mut commands = CommandSet::default();
        commands.apply(Command::Facing { yaw: 1.0, pitch: 0.5 });
        commands.apply(Command::Facing {
            yaw: f32::NAN,
            pitch: 0.0,
        });
        assert_eq!(commands.yaw, 1.0);
        assert_eq!(commands.pitch, 0.5);
    }

    #[test]
    fn cooldown_clamps_to_zero_and_reports_death_once() {
        let mut cooldowns = Cooldowns {
            fire: 0.01,
            damage: 0.0,
            death: 0.03,
            knockback: 0.02,
        };
        let dt = 1.0 / 60.0;

        assert!(!cooldowns.tick(dt));
        assert_eq!(cooldowns.fire, 0.0);
        assert!(cooldowns.death > 0.0);

        assert!(cooldowns.tick(dt));
        assert_eq!(cooldowns.death, 0.0);

        // Already at zero: no second crossing
        assert!(!cooldowns.tick(dt));
        assert_eq!(cooldowns, Cooldowns::default());
    }

    #[test]
    fn status_is_derived_from_health_and_damage_cooldown() {
        let mut player = test_player();
        assert_eq!(player.status(), PlayerStatus::Normal);

        player.cooldowns.damage = 0.2;
        assert_eq!(player.status(), PlayerStatus::Damaged);

        player.health = 0;
        assert_eq!(player.status(), PlayerStatus::Dead);
        assert!(!player.can_fire());
    }
}
