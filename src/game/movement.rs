//! Player locomotion: planar intent, jumping and map bounds

use glam::{Vec2, Vec3};

use super::physics::PhysicsWorld;
use super::player::{CommandSet, Player};
use super::terrain::Terrain;
use super::{MAP_DEPTH, MAP_WIDTH};

/// Planar speed in units per second
pub const MOVE_SPEED: f32 = 10.0;
/// Upward impulse of a jump
pub const JUMP_IMPULSE: f32 = 30.0;
/// Feet within this distance of the surface count as grounded
pub const GROUND_THRESHOLD: f32 = 0.25;

/// Unit planar intent in view space: `x` strafes right, `y` is +z (backwards).
/// Opposite keys cancel; diagonals are normalised.
pub fn planar_intent(commands: &CommandSet) -> Vec2 {
    let mut intent = Vec2::ZERO;
    if commands.up {
        intent.y -= 1.0;
    }
    if commands.down {
        intent.y += 1.0;
    }
    if commands.left {
        intent.x -= 1.0;
    }
    if commands.right {
        intent.x += 1.0;
    }
    intent.normalize_or_zero()
}

/// Rotate a view-space intent by the facing yaw into world x/z
pub fn world_velocity(intent: Vec2, yaw: f32) -> Vec3 {
    let (sin, cos) = yaw.sin_cos();
    Vec3::new(
        cos * intent.x + sin * intent.y,
        0.0,
        cos * intent.y - sin * intent.x,
    )
}

/// Advance one player's controlled motion by `dt`.
///
/// Planar motion moves the body directly; vertical motion, knockback and
/// gravity stay with the physics world. A grounded player outside its
/// knockback window has no planar physics velocity, so it never slides.
pub fn integrate(player: &mut Player, terrain: &Terrain, physics: &mut PhysicsWorld, dt: f32) {
    let body = player.body;
    let position = physics.translation(body).unwrap_or(player.position);
    let vertical = physics.linvel(body).map_or(0.0, |v| v.y);

    if !player.is_alive() {
        player.velocity = Vec3::ZERO;
        physics.set_linvel(body, Vec3::new(0.0, vertical, 0.0));
        player.position = position;
        return;
    }

    let yaw = player.commands.yaw;
    player.rotation.y = yaw;

    let ground = terrain.height(position.x, position.z);
    let grounded = position.y - ground <= GROUND_THRESHOLD;

    let mut jumped = false;
    if player.commands.jump && grounded && !player.is_jumping {
        physics.apply_impulse(body, Vec3::Y * JUMP_IMPULSE);
        player.is_jumping = true;
        jumped = true;
    }
    if player.is_jumping && !jumped && grounded && vertical <= 0.0 {
        player.is_jumping = false;
    }
    if grounded && !jumped && player.cooldowns.knockback <= 0.0 {
        physics.set_linvel(body, Vec3::new(0.0, vertical, 0.0));
    }

    let mut velocity = world_velocity(planar_intent(&player.commands), yaw) * MOVE_SPEED;
    let mut next = position + velocity * dt;

    if next.x.abs() > MAP_WIDTH {
        next.x = next.x.clamp(-MAP_WIDTH, MAP_WIDTH);
        velocity.x = 0.0;
    }
    if next.z.abs() > MAP_DEPTH {
        next.z = next.z.clamp(-MAP_DEPTH, MAP_DEPTH);
        velocity.z = 0.0;
    }
    next.y = next.y.max(terrain.height(next.x, next.z));

    physics.set_translation(body, next);
    player.position = next;
    player.velocity = Vec3::new(velocity.x, vertical, velocity.z);
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const DT: f32 = 1.0 / 60.0;

    fn spawn(physics: &mut PhysicsWorld, terrain: &Terrain, x: f32, z: f32) -> Player {
        let id = Uuid::new_v4();
        let position = Vec3::new(x, terrain.height(x, z), z);
        let body = physics.add_player(id, position);
        Player::new(id, "runner".to_string(), position, body)
    }

    #[test]
    fn opposite_keys_cancel() {
        let commands = CommandSet {
            left: true,
            right: true,
            up: true,
            down: true,
            ..Default::default()
        };
        assert_eq!(planar_intent(&commands), Vec2::ZERO);
    }

    #[test]
    fn diagonal_is_normalised() {
        let commands = CommandSet {
            up: true,
            right: true,
            ..Default::default()
        };
        let intent = planar_intent(&commands);
        assert!((intent.length() - 1.0).abs() < 1e-6);
        assert!(intent.x > 0.0 && intent.y < 0.0);
    }

    #[test]
    fn forward_follows_yaw() {
        let forward = Vec2::new(0.0, -1.0);

        let at_rest = world_velocity(forward, 0.0);
        assert!((at_rest - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-6);

        let quarter = world_velocity(forward, std::f32::consts::FRAC_PI_2);
        assert!((quarter - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-6);

        let strafe = world_velocity(Vec2::new(1.0, 0.0), 0.0);
        assert!((strafe - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn walking_moves_the_body() {
        let terrain = Terrain::generate("walk");
        let mut physics = PhysicsWorld::new();
        let mut player = spawn(&mut physics, &terrain, 0.0, 0.0);
        player.commands.up = true;

        integrate(&mut player, &terrain, &mut physics, DT);

        let expected_z = -MOVE_SPEED * DT;
        assert!((player.position.z - expected_z).abs() < 1e-4);
        assert_eq!(physics.translation(player.body).unwrap().z, player.position.z);
        assert!((player.velocity.z + MOVE_SPEED).abs() < 1e-4);
    }

    #[test]
    fn dead_players_do_not_move() {
        let terrain = Terrain::generate("dead");
        let mut physics = PhysicsWorld::new();
        let mut player = spawn(&mut physics, &terrain, 10.0, 10.0);
        let start = player.position;
        player.health = 0;
        player.commands.right = true;
        player.commands.jump = true;

        integrate(&mut player, &terrain, &mut physics, DT);

        assert_eq!(player.velocity, Vec3::ZERO);
        assert_eq!(player.position, start);
        assert!(!player.is_jumping);
    }

    #[test]
    fn position_is_clamped_to_the_map() {
        let terrain = Terrain::generate("edge");
        let mut physics = PhysicsWorld::new();
        let mut player = spawn(&mut physics, &terrain, MAP_WIDTH - 0.01, 0.0);
        player.commands.right = true;

        integrate(&mut player, &terrain, &mut physics, DT);

        assert_eq!(player.position.x, MAP_WIDTH);
        assert_eq!(player.velocity.x, 0.0);
    }

    #[test]
    fn jump_requires_ground_and_is_not_repeated() {
        let terrain = Terrain::generate("jump");
        let mut physics = PhysicsWorld::new();
        physics.add_terrain(&terrain);
        let mut player = spawn(&mut physics, &terrain, 0.0, 0.0);
        // Mass properties are only computed once the body has been stepped
        physics.step(DT);
        player.commands.jump = true;

        integrate(&mut player, &terrain, &mut physics, DT);
        assert!(player.is_jumping);
        let vy = physics.linvel(player.body).unwrap().y;
        assert!(vy > 0.0);

        // Still on the ground this frame but already jumping: no second impulse
        integrate(&mut player, &terrain, &mut physics, DT);
        assert!(player.is_jumping);
        assert_eq!(physics.linvel(player.body).unwrap().y, vy);
    }

    #[test]
    fn idle_player_holds_position_on_a_slope() {
        let terrain = Terrain::generate("Cool Room #1");
        let mut physics = PhysicsWorld::new();
        physics.add_terrain(&terrain);

        let slope = |x: f32, z: f32| {
            let dx = terrain.height(x + 1.0, z) - terrain.height(x - 1.0, z);
            let dz = terrain.height(x, z + 1.0) - terrain.height(x, z - 1.0);
            (dx * dx + dz * dz).sqrt()
        };
        let mut steepest = (0.0, 0.0);
        for ix in -20..=20 {
            for iz in -20..=20 {
                let (x, z) = (ix as f32 * 4.0, iz as f32 * 4.0);
                if slope(x, z) > slope(steepest.0, steepest.1) {
                    steepest = (x, z);
                }
            }
        }
        assert!(slope(steepest.0, steepest.1) > 0.1);

        let mut player = spawn(&mut physics, &terrain, steepest.0, steepest.1);
        let mut run = |player: &mut Player, ticks: usize| {
            for _ in 0..ticks {
                physics.step(DT);
                integrate(player, &terrain, &mut physics, DT);
            }
        };

        run(&mut player, 30);
        let settled = player.position;
        run(&mut player, 180);

        let drift = Vec2::new(player.position.x - settled.x, player.position.z - settled.z);
        assert!(drift.length() < 0.1, "slid {} units", drift.length());
        assert_eq!(player.velocity.x, 0.0);
        assert_eq!(player.velocity.z, 0.0);
    }

    #[test]
    fn airborne_players_cannot_jump() {
        let terrain = Terrain::generate("air");
        let mut physics = PhysicsWorld::new();
        let mut player = spawn(&mut physics, &terrain, 0.0, 0.0);
        let lifted = player.position + Vec3::Y * 5.0;
        physics.set_translation(player.body, lifted);
        player.commands.jump = true;

        integrate(&mut player, &terrain, &mut physics, DT);
        assert!(!player.is_jumping);
    }
}
