//! Procedural terrain: heightmap, render mesh, scenery placement and spawn points
//!
//! Everything here is a pure function of the room name, so every process that
//! generates terrain for the same room gets the same heights and scenery.

use glam::Vec3;
use noise::{NoiseFn, Simplex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::ws::protocol::{SceneryView, ServerMsg};

use super::{MAP_DEPTH, MAP_WIDTH};

/// Height of a spawned player's feet above the terrain surface
pub const SPAWN_CLEARANCE: f32 = 2.0;

/// Terrain generation parameters
#[derive(Debug, Clone)]
pub struct TerrainConfig {
    /// Full extent along x (terrain spans -width/2..width/2)
    pub width: f32,
    /// Full extent along z
    pub depth: f32,
    /// Grid segments along x
    pub segments_x: usize,
    /// Grid segments along z
    pub segments_z: usize,
    /// Base noise frequency
    pub frequency: f64,
    /// Height amplitude, also used as the constant offset
    pub amplitude: f32,
    /// Weight of each octave; frequency doubles per octave
    pub octave_weights: [f32; 3],
    /// Minimum suitability noise for a scenery cell
    pub suitability_threshold: f64,
    /// Suitability above which scenery is a tree instead of a rock
    pub tree_threshold: f64,
    /// Maximum central-difference slope for scenery
    pub max_slope: f32,
    /// Fraction of suitable cells that receive scenery
    pub scenery_density: f64,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            width: MAP_WIDTH * 2.0,
            depth: MAP_DEPTH * 2.0,
            segments_x: 64,
            segments_z: 64,
            frequency: 0.02,
            amplitude: 5.0,
            octave_weights: [0.6, 0.3, 0.15],
            suitability_threshold: 0.4,
            tree_threshold: 0.6,
            max_slope: 1.5,
            scenery_density: 0.5,
        }
    }
}

/// Kind of static scenery object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneryKind {
    Tree,
    Rock,
}

/// A placed scenery object
#[derive(Debug, Clone, PartialEq)]
pub struct SceneryObject {
    pub kind: SceneryKind,
    pub position: Vec3,
    pub rotation: Vec3,
}

/// Triangulated render mesh
#[derive(Debug, Clone, Default)]
pub struct TerrainMesh {
    /// Flat `[x, y, z, ...]` positions, row-major over z then x
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

/// Generated terrain for one game room
pub struct Terrain {
    config: TerrainConfig,
    height_noise: Simplex,
    mesh: TerrainMesh,
    scenery: Vec<SceneryObject>,
}

impl Terrain {
    /// Generate terrain seeded from a room name
    pub fn generate(room_name: &str) -> Self {
        Self::with_config(room_name, TerrainConfig::default())
    }

    pub fn with_config(room_name: &str, config: TerrainConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed_from_name(room_name));
        let height_noise = Simplex::new(rng.gen());

        let mut terrain = Self {
            config,
            height_noise,
            mesh: TerrainMesh::default(),
            scenery: Vec::new(),
        };
        terrain.build_mesh();
        terrain.scenery = terrain.place_scenery(room_name);
        terrain
    }

    /// Terrain surface height at a world position
    pub fn height(&self, x: f32, z: f32) -> f32 {
        let amplitude = self.config.amplitude;
        let nx = x as f64 * self.config.frequency;
        let nz = z as f64 * self.config.frequency;

        let mut y = 0.0;
        let mut scale = 1.0;
        for weight in self.config.octave_weights {
            y += weight * self.height_noise.get([nx * scale, nz * scale]) as f32;
            scale *= 2.0;
        }

        amplitude * y + amplitude
    }

    /// Pick a random spawn point within the map, lifted above the surface
    pub fn spawn_point<R: Rng>(&self, rng: &mut R) -> Vec3 {
        let half_x = self.config.width / 2.0;
        let half_z = self.config.depth / 2.0;
        let x = rng.gen_range(-half_x..=half_x);
        let z = rng.gen_range(-half_z..=half_z);
        Vec3::new(x, self.height(x, z) + SPAWN_CLEARANCE, z)
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn mesh(&self) -> &TerrainMesh {
        &self.mesh
    }

    pub fn scenery(&self) -> &[SceneryObject] {
        &self.scenery
    }

    /// Build the `terrain` message for clients joining this room
    pub fn to_message(&self) -> ServerMsg {
        ServerMsg::Terrain {
            vertices: self.mesh.vertices.clone(),
            indices: self.mesh.indices.clone(),
            scenery: self
                .scenery
                .iter()
                .map(|object| SceneryView {
                    kind: object.kind,
                    position: object.position,
                    rotation: object.rotation,
                })
                .collect(),
        }
    }

    fn grid_point(&self, ix: usize, iz: usize) -> (f32, f32) {
        let dx = self.config.width / self.config.segments_x as f32;
        let dz = self.config.depth / self.config.segments_z as f32;
        (
            ix as f32 * dx - self.config.width / 2.0,
            iz as f32 * dz - self.config.depth / 2.0,
        )
    }

    fn build_mesh(&mut self) {
        let segments_x = self.config.segments_x;
        let segments_z = self.config.segments_z;
        let columns = segments_x + 1;

        let mut vertices = Vec::with_capacity(columns * (segments_z + 1) * 3);

        for iz in 0..=segments_z {
            for ix in 0..=segments_x {
                let (x, z) = self.grid_point(ix, iz);
                let y = self.height(x, z);
                vertices.extend_from_slice(&[x, y, z]);
            }
        }

        let mut indices = Vec::with_capacity(segments_x * segments_z * 6);
        for iz in 0..segments_z {
            for ix in 0..segments_x {
                let a = (ix + columns * iz) as u32;
                let b = (ix + columns * (iz + 1)) as u32;
                let c = (ix + 1 + columns * (iz + 1)) as u32;
                let d = (ix + 1 + columns * iz) as u32;

                indices.extend_from_slice(&[a, b, d]);
                indices.extend_from_slice(&[b, c, d]);
            }
        }

        self.mesh = TerrainMesh { vertices, indices };
    }

    fn slope(&self, x: f32, z: f32) -> f32 {
        let dx = (self.height(x + 1.0, z) - self.height(x - 1.0, z)).abs();
        let dz = (self.height(x, z + 1.0) - self.height(x, z - 1.0)).abs();
        (dx * dx + dz * dz).sqrt()
    }

    fn place_scenery(&self, room_name: &str) -> Vec<SceneryObject> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed_from_name(&format!("{room_name}_objects")));
        let suitability_noise = Simplex::new(rng.gen());
        let placement_noise = Simplex::new(rng.gen());

        let mut objects = Vec::new();

        for iz in 0..self.config.segments_z {
            for ix in 0..self.config.segments_x {
                let (x, z) = self.grid_point(ix, iz);

                let suitability = suitability_noise.get([x as f64 * 0.05, z as f64 * 0.05]);
                if suitability < self.config.suitability_threshold {
                    continue;
                }

                if self.slope(x, z) > self.config.max_slope {
                    continue;
                }

                let placement = (placement_noise.get([x as f64 * 0.2, z as f64 * 0.2]) + 1.0) / 2.0;
                if placement > self.config.scenery_density {
                    continue;
                }

                let kind = if suitability > self.config.tree_threshold {
                    SceneryKind::Tree
                } else {
                    SceneryKind::Rock
                };

                objects.push(SceneryObject {
                    kind,
                    position: Vec3::new(x, self.height(x, z), z),
                    rotation: Vec3::ZERO,
                });
            }
        }

        objects
    }
}

/// FNV-1a over the room name. Stable across processes and toolchains,
/// unlike `std`'s randomly keyed hasher.
fn seed_from_name(name: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    name.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(PRIME)
    })
}
