use crate::chunk::{Chunk, MIN_Y};
use noise::{NoiseFn, Perlin};

/// Pluggable world-generation collaborator. `populate` fills an empty chunk
/// in place; callers apply the diff overlay afterward. Implementations must
/// be deterministic in `(chunk_x, chunk_z)` — same coordinate, same output —
/// so concurrent single-flight callers never observe divergent chunks.
pub trait TerrainGenerator: Send + Sync {
    fn populate(&self, chunk: &mut Chunk);
}

fn resolve(name: &str) -> i32 {
    strata_data::block_name_to_default_state(name).unwrap_or(0)
}

/// Bedrock floor, stone fill, dirt/grass cap — the default "noise" generator
/// falls back to this shape and perturbs the surface height with Perlin
/// noise; `"flat"` uses it unperturbed.
struct Layers {
    bedrock: i32,
    stone: i32,
    dirt: i32,
    grass: i32,
}

impl Layers {
    fn resolve() -> Self {
        Self {
            bedrock: resolve("bedrock"),
            stone: resolve("stone"),
            dirt: resolve("dirt"),
            grass: resolve("grass_block"),
        }
    }
}

/// Flat-world generator: bedrock at y=-64, stone to a fixed depth, two dirt
/// layers, grass on top. The default terrain-generator id is `"noise"`; this
/// is selected by the `"flat"` id.
pub struct FlatGenerator {
    layers: Layers,
    surface_y: i32,
}

impl FlatGenerator {
    pub fn new(stone_depth: i32, floor_y: i32) -> Self {
        Self {
            layers: Layers::resolve(),
            surface_y: floor_y + stone_depth,
        }
    }
}

impl TerrainGenerator for FlatGenerator {
    fn populate(&self, chunk: &mut Chunk) {
        for x in 0..16 {
            for z in 0..16 {
                chunk.set_block(x, MIN_Y, z, self.layers.bedrock);
                let mut y = MIN_Y + 1;
                while y < self.surface_y - 2 {
                    chunk.set_block(x, y, z, self.layers.stone);
                    y += 1;
                }
                chunk.set_block(x, self.surface_y - 2, z, self.layers.dirt);
                chunk.set_block(x, self.surface_y - 1, z, self.layers.dirt);
                chunk.set_block(x, self.surface_y, z, self.layers.grass);
            }
        }
    }
}

/// The default `"noise"` terrain generator: a flat base shape with the
/// surface height perturbed by 2D Perlin noise, producing rolling terrain
/// instead of a perfectly flat world. Deterministic per-coordinate: the
/// underlying `noise` crate's `Perlin` is a pure function of its inputs, so
/// the same `(chunk_x, chunk_z)` always yields the same heightfield.
pub struct NoiseGenerator {
    layers: Layers,
    perlin: Perlin,
    base_y: i32,
    amplitude: f64,
}

impl NoiseGenerator {
    pub fn new(seed: u32, base_y: i32, amplitude: f64) -> Self {
        Self {
            layers: Layers::resolve(),
            perlin: Perlin::new(seed),
            base_y,
            amplitude,
        }
    }

    fn height_at(&self, world_x: i32, world_z: i32) -> i32 {
        let nx = world_x as f64 / 48.0;
        let nz = world_z as f64 / 48.0;
        let n = self.perlin.get([nx, nz]);
        self.base_y + (n * self.amplitude).round() as i32
    }
}

impl TerrainGenerator for NoiseGenerator {
    fn populate(&self, chunk: &mut Chunk) {
        for x in 0..16 {
            for z in 0..16 {
                let world_x = chunk.chunk_x * 16 + x;
                let world_z = chunk.chunk_z * 16 + z;
                let surface_y = self.height_at(world_x, world_z);

                chunk.set_block(x, MIN_Y, z, self.layers.bedrock);
                let mut y = MIN_Y + 1;
                while y < surface_y - 2 {
                    chunk.set_block(x, y, z, self.layers.stone);
                    y += 1;
                }
                chunk.set_block(x, surface_y - 2, z, self.layers.dirt);
                chunk.set_block(x, surface_y - 1, z, self.layers.dirt);
                chunk.set_block(x, surface_y, z, self.layers.grass);
            }
        }
    }
}

/// Construct the generator named on the CLI/config (`"flat"` or `"noise"`,
/// defaulting to `"noise"` for any unrecognized id).
pub fn build_generator(id: &str, seed: u32) -> Box<dyn TerrainGenerator> {
    match id {
        "flat" => Box::new(FlatGenerator::new(10, -54)),
        _ => Box::new(NoiseGenerator::new(seed, -51, 6.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_chunk_has_stone_fill_and_grass_cap() {
        let gen = FlatGenerator::new(10, -54);
        let mut chunk = Chunk::new(0, 0);
        gen.populate(&mut chunk);
        assert_eq!(chunk.get_block(0, MIN_Y, 0), gen.layers.bedrock);
        assert_eq!(chunk.get_block(0, -60, 0), gen.layers.stone);
        assert_eq!(chunk.get_block(0, gen.surface_y, 0), gen.layers.grass);
        assert_eq!(chunk.get_block(0, gen.surface_y + 1, 0), 0);
    }

    #[test]
    fn flat_chunk_heightmap_is_uniform() {
        let gen = FlatGenerator::new(10, -54);
        let mut chunk = Chunk::new(0, 0);
        gen.populate(&mut chunk);
        let heights = chunk.compute_heightmap();
        assert!(heights.iter().all(|&h| h == gen.surface_y + 1));
    }

    #[test]
    fn noise_generator_deterministic_per_coordinate() {
        let gen = NoiseGenerator::new(42, -51, 6.0);
        let mut a = Chunk::new(5, 5);
        let mut b = Chunk::new(5, 5);
        gen.populate(&mut a);
        gen.populate(&mut b);
        for y in MIN_Y..0 {
            for x in 0..16 {
                for z in 0..16 {
                    assert_eq!(a.get_block(x, y, z), b.get_block(x, y, z));
                }
            }
        }
    }

    #[test]
    fn noise_generator_varies_across_chunks() {
        let gen = NoiseGenerator::new(42, -51, 6.0);
        let mut a = Chunk::new(0, 0);
        let mut b = Chunk::new(40, 40);
        gen.populate(&mut a);
        gen.populate(&mut b);
        assert_ne!(a.compute_heightmap(), b.compute_heightmap());
    }
}
