mod chunk;
mod generator;
mod store;

pub use chunk::{Chunk, ChunkSection, SectionView, MAX_Y, MIN_Y, SECTION_COUNT};
pub use generator::{build_generator, FlatGenerator, NoiseGenerator, TerrainGenerator};
pub use store::{ChunkDiff, ChunkStore};
