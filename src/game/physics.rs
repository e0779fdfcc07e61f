//! Rigid-body world for a game room, backed by Rapier
//!
//! The world never calls back into game state. `step` returns the contacts
//! that started during the step and the combat resolver interprets them.

use std::collections::HashMap;

use glam::Vec3;
use rapier3d::prelude::*;
use uuid::Uuid;

use super::combat::{BulletId, BULLET_HALF_EXTENT, BULLET_IMPULSE, BULLET_MASS};
use super::terrain::{SceneryKind, SceneryObject, Terrain};

pub const GRAVITY: f32 = -9.82;

pub const PLAYER_RADIUS: f32 = 0.5;
pub const PLAYER_MASS: f32 = 5.0;
/// Player feet grip on any surface, combined with `Max`
pub const PLAYER_FRICTION: f32 = 1.0;
pub const TERRAIN_FRICTION: f32 = 0.3;

/// Collision filter groups
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionGroup {
    /// Terrain and scenery
    Static = 1 << 0,
    Player = 1 << 1,
    Projectile = 1 << 2,
}

impl CollisionGroup {
    /// Membership and filter for colliders of this group.
    /// Projectiles never interact with other projectiles.
    pub fn interaction_groups(self) -> InteractionGroups {
        let filter = match self {
            CollisionGroup::Static => CollisionGroup::Player as u32 | CollisionGroup::Projectile as u32,
            CollisionGroup::Player => {
                CollisionGroup::Static as u32
                    | CollisionGroup::Player as u32
                    | CollisionGroup::Projectile as u32
            }
            CollisionGroup::Projectile => CollisionGroup::Static as u32 | CollisionGroup::Player as u32,
        };
        InteractionGroups::new(
            Group::from_bits_retain(self as u32),
            Group::from_bits_retain(filter),
        )
    }
}

/// What a collider belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyTag {
    Static,
    Player(Uuid),
    Bullet(BulletId),
}

/// The non-projectile side of a projectile contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContactTarget {
    Player(Uuid),
    Static,
}

/// A projectile started touching something during the last step
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContactEvent {
    pub bullet: BulletId,
    pub target: ContactTarget,
}

/// Physics world containing all simulation bodies of one room
pub struct PhysicsWorld {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub gravity: Vector<Real>,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    tags: HashMap<ColliderHandle, BodyTag>,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            gravity: vector![0.0, GRAVITY, 0.0],
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            tags: HashMap::new(),
        }
    }

    /// Step the simulation by `dt` and return projectile contacts that started,
    /// sorted and deduplicated.
    pub fn step(&mut self, dt: f32) -> Vec<ContactEvent> {
        self.integration_parameters.dt = dt;

        let (collision_send, collision_recv) = rapier3d::crossbeam::channel::unbounded();
        let (force_send, _force_recv) = rapier3d::crossbeam::channel::unbounded();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &event_handler,
        );

        let mut contacts = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            if let CollisionEvent::Started(h1, h2, _flags) = event {
                if let Some(contact) = self.classify(h1, h2) {
                    contacts.push(contact);
                }
            }
        }

        // Channel delivery order is not stable across runs
        contacts.sort_unstable();
        contacts.dedup();
        contacts
    }

    fn classify(&self, h1: ColliderHandle, h2: ColliderHandle) -> Option<ContactEvent> {
        let a = self.tags.get(&h1).copied()?;
        let b = self.tags.get(&h2).copied()?;

        let (bullet, other) = match (a, b) {
            (BodyTag::Bullet(bullet), other) | (other, BodyTag::Bullet(bullet)) => (bullet, other),
            _ => return None,
        };

        let target = match other {
            BodyTag::Player(user_id) => ContactTarget::Player(user_id),
            BodyTag::Static => ContactTarget::Static,
            BodyTag::Bullet(_) => return None,
        };

        Some(ContactEvent { bullet, target })
    }

    /// Add the terrain as a static triangle mesh matching the render mesh
    pub fn add_terrain(&mut self, terrain: &Terrain) -> ColliderHandle {
        let mesh = terrain.mesh();
        let vertices: Vec<Point<Real>> = mesh
            .vertices
            .chunks_exact(3)
            .map(|v| point![v[0], v[1], v[2]])
            .collect();
        let indices: Vec<[u32; 3]> = mesh
            .indices
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();

        let collider = ColliderBuilder::trimesh(vertices, indices)
            .collision_groups(CollisionGroup::Static.interaction_groups())
            .friction(TERRAIN_FRICTION)
            .restitution(0.0)
            .build();
        let handle = self.collider_set.insert(collider);
        self.tags.insert(handle, BodyTag::Static);
        handle
    }

    /// Add a fixed body for a tree or rock
    pub fn add_scenery(&mut self, object: &SceneryObject) -> RigidBodyHandle {
        let p = object.position;
        let body = RigidBodyBuilder::fixed()
            .translation(vector![p.x, p.y, p.z])
            .build();
        let handle = self.rigid_body_set.insert(body);

        let collider = match object.kind {
            // Trunk stands on the surface
            SceneryKind::Tree => ColliderBuilder::cylinder(6.0, 1.0).translation(vector![0.0, 6.0, 0.0]),
            SceneryKind::Rock => ColliderBuilder::ball(0.3),
        }
        .collision_groups(CollisionGroup::Static.interaction_groups())
        .restitution(0.0)
        .build();

        self.insert_collider(collider, handle, BodyTag::Static);
        handle
    }

    /// Add a player capsule with its origin at the feet
    pub fn add_player(&mut self, user_id: Uuid, position: Vec3) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![position.x, position.y, position.z])
            .linear_damping(0.8)
            .lock_rotations()
            .additional_mass(PLAYER_MASS)
            .build();
        let handle = self.rigid_body_set.insert(body);

        let half_height = PLAYER_RADIUS / 2.0;
        let collider = ColliderBuilder::capsule_y(half_height, PLAYER_RADIUS)
            .translation(vector![0.0, half_height + PLAYER_RADIUS, 0.0])
            .density(0.0)
            .friction(PLAYER_FRICTION)
            .friction_combine_rule(CoefficientCombineRule::Max)
            .restitution(0.0)
            .collision_groups(CollisionGroup::Player.interaction_groups())
            .build();

        self.insert_collider(collider, handle, BodyTag::Player(user_id));
        handle
    }

    /// Add a projectile sensor already travelling along `direction`
    pub fn add_bullet(&mut self, id: BulletId, position: Vec3, direction: Vec3) -> RigidBodyHandle {
        let velocity = direction.normalize_or_zero() * (BULLET_IMPULSE / BULLET_MASS);
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![position.x, position.y, position.z])
            .linvel(vector![velocity.x, velocity.y, velocity.z])
            .linear_damping(0.4)
            .additional_mass(BULLET_MASS)
            .ccd_enabled(true)
            .build();
        let handle = self.rigid_body_set.insert(body);

        let collider = ColliderBuilder::cuboid(BULLET_HALF_EXTENT, BULLET_HALF_EXTENT, BULLET_HALF_EXTENT)
            .sensor(true)
            .density(0.0)
            .collision_groups(CollisionGroup::Projectile.interaction_groups())
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();

        self.insert_collider(collider, handle, BodyTag::Bullet(id));
        handle
    }

    fn insert_collider(&mut self, collider: Collider, parent: RigidBodyHandle, tag: BodyTag) {
        let handle = self
            .collider_set
            .insert_with_parent(collider, parent, &mut self.rigid_body_set);
        self.tags.insert(handle, tag);
    }

    /// Remove a rigid body and its colliders
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        if let Some(body) = self.rigid_body_set.get(handle) {
            for collider in body.colliders() {
                self.tags.remove(collider);
            }
        }
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
    }

    pub fn translation(&self, handle: RigidBodyHandle) -> Option<Vec3> {
        self.rigid_body_set.get(handle).map(|body| {
            let t = body.translation();
            Vec3::new(t.x, t.y, t.z)
        })
    }

    pub fn set_translation(&mut self, handle: RigidBodyHandle, position: Vec3) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.set_translation(vector![position.x, position.y, position.z], true);
        }
    }

    pub fn linvel(&self, handle: RigidBodyHandle) -> Option<Vec3> {
        self.rigid_body_set.get(handle).map(|body| {
            let v = body.linvel();
            Vec3::new(v.x, v.y, v.z)
        })
    }

    pub fn set_linvel(&mut self, handle: RigidBodyHandle, velocity: Vec3) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.set_linvel(vector![velocity.x, velocity.y, velocity.z], true);
        }
    }

    pub fn apply_impulse(&mut self, handle: RigidBodyHandle, impulse: Vec3) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.apply_impulse(vector![impulse.x, impulse.y, impulse.z], true);
        }
    }

    /// Number of rigid bodies (scenery, players and projectiles)
    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }

    #[cfg(test)]
    pub fn tag_of(&self, handle: RigidBodyHandle) -> Option<BodyTag> {
        let body = self.rigid_body_set.get(handle)?;
        body.colliders().first().and_then(|c| self.tags.get(c).copied())
    }
}
