//! Snapshot building for per-tick `update` messages

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::ws::protocol::{BulletView, PlayerView, ServerMsg};

use super::combat::Bullet;
use super::player::Player;

/// Builds `update` messages from authoritative room state.
///
/// Only presentation fields leave the server: no physics handles, timers or
/// pending effects.
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    pub fn player_view(player: &Player) -> PlayerView {
        PlayerView {
            user_id: player.user_id,
            username: player.username.clone(),
            position: player.position,
            rotation: player.rotation,
            velocity: player.velocity,
            health: player.health,
            status: player.status(),
            is_jumping: player.is_jumping,
            can_fire: player.can_fire(),
            hovered: player.hovered,
        }
    }

    pub fn bullet_view(bullet: &Bullet) -> BulletView {
        BulletView {
            id: bullet.id,
            owner_id: bullet.owner_id,
            position: bullet.position,
            rotation: bullet.rotation,
        }
    }

    /// Build an update message. Scores are keyed by display name.
    pub fn build(
        tick: u64,
        players: &BTreeMap<Uuid, Player>,
        bullets: &[Bullet],
        scores: &BTreeMap<Uuid, u32>,
    ) -> ServerMsg {
        let scores = scores
            .iter()
            .filter_map(|(user_id, score)| {
                players
                    .get(user_id)
                    .map(|player| (player.username.clone(), *score))
            })
            .collect();

        ServerMsg::Update {
            tick,
            players: players.values().map(Self::player_view).collect(),
            bullets: bullets.iter().map(Self::bullet_view).collect(),
            scores,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use rapier3d::prelude::RigidBodyHandle;

    use crate::ws::protocol::PlayerStatus;

    #[test]
    fn update_lists_players_and_named_scores() {
        let id = Uuid::new_v4();
        let mut player = Player::new(
            id,
            "alice".to_string(),
            Vec3::new(1.0, 2.0, 3.0),
            RigidBodyHandle::invalid(),
        );
        player.cooldowns.damage = 0.1;
        let players = BTreeMap::from([(id, player)]);
        let scores = BTreeMap::from([(id, 4), (Uuid::new_v4(), 9)]);

        let msg = SnapshotBuilder::build(12, &players, &[], &scores);
        let ServerMsg::Update {
            tick,
            players,
            bullets,
            scores,
        } = msg
        else {
            panic!("expected update");
        };

        assert_eq!(tick, 12);
        assert!(bullets.is_empty());
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].status, PlayerStatus::Damaged);
        assert_eq!(players[0].position, Vec3::new(1.0, 2.0, 3.0));
        // Entries without a player in the room are dropped
        assert_eq!(scores, BTreeMap::from([("alice".to_string(), 4)]));
    }

    #[test]
    fn serialized_update_has_no_internal_fields() {
        let id = Uuid::new_v4();
        let players = BTreeMap::from([(
            id,
            Player::new(id, "bob".to_string(), Vec3::ZERO, RigidBodyHandle::invalid()),
        )]);
        let msg = SnapshotBuilder::build(1, &players, &[], &BTreeMap::new());
        let json = serde_json::to_value(&msg).unwrap();
        let player = &json["players"][0];

        assert!(player.get("body").is_none());
        assert!(player.get("cooldowns").is_none());
        assert_eq!(player["can_fire"], true);
        assert_eq!(player["status"], "normal");
    }
}
