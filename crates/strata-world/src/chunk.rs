use bytes::{BufMut, BytesMut};
use strata_nbt::{nbt_compound, NbtValue};
use strata_protocol_core::{ChunkLightData, InternalPacket};

/// Number of sections covering world-y in [-64, 319].
pub const SECTION_COUNT: usize = 24;
pub const MIN_Y: i32 = -64;
pub const MAX_Y: i32 = 319;

/// The codec-facing view of a section: the palette of distinct block-state
/// ids present, the 4096 indices into that palette (y outer, z, x inner),
/// and the non-air voxel count. `indices[i] < palette.len()` always holds.
pub struct SectionView {
    pub non_air_count: u16,
    pub palette: Vec<i32>,
    pub indices: [u16; 4096],
}

/// A 16x16x16 region of block-state ids. Either a single uniform id or a
/// dense array of 4096 ids.
#[derive(Clone)]
pub enum ChunkSection {
    Uniform(i32),
    Dense(Box<[i32; 4096]>),
}

fn voxel_index(lx: usize, ly: usize, lz: usize) -> usize {
    ly * 256 + lz * 16 + lx
}

impl ChunkSection {
    pub fn empty() -> Self {
        ChunkSection::Uniform(0)
    }

    pub fn get(&self, lx: usize, ly: usize, lz: usize) -> i32 {
        match self {
            ChunkSection::Uniform(id) => *id,
            ChunkSection::Dense(blocks) => blocks[voxel_index(lx, ly, lz)],
        }
    }

    pub fn set(&mut self, lx: usize, ly: usize, lz: usize, id: i32) {
        match self {
            ChunkSection::Uniform(existing) if *existing == id => {}
            ChunkSection::Uniform(existing) => {
                let mut blocks = Box::new([*existing; 4096]);
                blocks[voxel_index(lx, ly, lz)] = id;
                *self = ChunkSection::Dense(blocks);
            }
            ChunkSection::Dense(blocks) => {
                blocks[voxel_index(lx, ly, lz)] = id;
            }
        }
    }

    /// The codec-facing `(non_air_count, palette, indices)` view, built by
    /// iterating in y-outer, z, x-inner order and interning ids into a
    /// palette as they're seen.
    pub fn section_view(&self) -> SectionView {
        match self {
            ChunkSection::Uniform(id) => SectionView {
                non_air_count: if *id != 0 { 4096 } else { 0 },
                palette: vec![*id],
                indices: [0u16; 4096],
            },
            ChunkSection::Dense(blocks) => {
                let mut palette = Vec::new();
                let mut palette_map = std::collections::HashMap::new();
                let mut indices = [0u16; 4096];
                let mut non_air_count = 0u16;
                for ly in 0..16 {
                    for lz in 0..16 {
                        for lx in 0..16 {
                            let i = voxel_index(lx, ly, lz);
                            let id = blocks[i];
                            if id != 0 {
                                non_air_count += 1;
                            }
                            let idx = *palette_map.entry(id).or_insert_with(|| {
                                let idx = palette.len();
                                palette.push(id);
                                idx
                            });
                            indices[i] = idx as u16;
                        }
                    }
                }
                if palette.len() == 1 {
                    return SectionView {
                        non_air_count,
                        palette,
                        indices: [0u16; 4096],
                    };
                }
                SectionView {
                    non_air_count,
                    palette,
                    indices,
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ChunkSection::Uniform(0))
    }
}

/// A 16-wide, 384-tall, 16-deep chunk column identified by `(chunkX, chunkZ)`.
#[derive(Clone)]
pub struct Chunk {
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub sections: Vec<ChunkSection>,
}

impl Chunk {
    pub fn new(chunk_x: i32, chunk_z: i32) -> Self {
        Self {
            chunk_x,
            chunk_z,
            sections: (0..SECTION_COUNT).map(|_| ChunkSection::empty()).collect(),
        }
    }

    fn section_index(y: i32) -> Option<usize> {
        if y < MIN_Y || y > MAX_Y {
            return None;
        }
        Some(((y - MIN_Y) / 16) as usize)
    }

    pub fn get_block(&self, lx: i32, y: i32, lz: i32) -> i32 {
        let Some(si) = Self::section_index(y) else {
            return 0;
        };
        let ly = ((y - MIN_Y) % 16) as usize;
        self.sections[si].get(lx as usize, ly, lz as usize)
    }

    pub fn set_block(&mut self, lx: i32, y: i32, lz: i32, id: i32) {
        let Some(si) = Self::section_index(y) else {
            return;
        };
        let ly = ((y - MIN_Y) % 16) as usize;
        self.sections[si].set(lx as usize, ly, lz as usize, id);
    }

    pub fn section_view(&self, section_y: usize) -> SectionView {
        self.sections[section_y].section_view()
    }

    /// MOTION_BLOCKING heightmap: for each (x, z) column, the lowest y whose
    /// block and every block above it are air, reported as that y + 1.
    pub fn compute_heightmap(&self) -> [i32; 256] {
        let mut heights = [MIN_Y; 256];
        for x in 0..16 {
            for z in 0..16 {
                let mut top = None;
                for y in (MIN_Y..=MAX_Y).rev() {
                    if self.get_block(x, y, z) != 0 {
                        top = Some(y);
                        break;
                    }
                }
                heights[(z * 16 + x) as usize] = match top {
                    Some(y) => y + 1,
                    None => MIN_Y,
                };
            }
        }
        heights
    }

    /// Pack the heightmap into 9-bit little-endian fields in 64-bit words.
    pub fn pack_heightmap(heights: &[i32; 256]) -> Vec<i64> {
        const BITS: usize = 9;
        let entries_per_long = 64 / BITS;
        let longs_needed = (256 + entries_per_long - 1) / entries_per_long;
        let mask = (1u64 << BITS) - 1;
        let mut packed = vec![0i64; longs_needed];
        for (i, h) in heights.iter().enumerate() {
            let biased = (h - MIN_Y) as u64 & mask;
            let long_index = i / entries_per_long;
            let bit_index = (i % entries_per_long) * BITS;
            packed[long_index] |= (biased << bit_index) as i64;
        }
        packed
    }

    pub fn heightmap_nbt(&self) -> NbtValue {
        let heights = self.compute_heightmap();
        nbt_compound! {
            "MOTION_BLOCKING" => NbtValue::LongArray(Self::pack_heightmap(&heights))
        }
    }

    /// Build the clientbound chunk-data-and-light packet. Block-state
    /// palettes are written by the codec (`write_paletted_container_*`),
    /// never by world code, keeping the wire format's bit-packing in one
    /// place (C1's responsibility per the component split).
    pub fn to_packet(&self) -> InternalPacket {
        let mut data = BytesMut::new();
        for section_y in 0..SECTION_COUNT {
            let view = self.section_view(section_y);
            debug_assert!(view
                .indices
                .iter()
                .all(|&i| (i as usize) < view.palette.len().max(1)));
            data.put_i16(view.non_air_count as i16);
            strata_protocol_core::write_paletted_container_block_states(
                &mut data,
                &view.palette,
                &view.indices,
            );
            // Biomes: single-valued plains (id 0), per the minimal-viable contract.
            strata_protocol_core::write_paletted_container_biomes(&mut data, &[0], &[0u16; 64]);
        }

        InternalPacket::ChunkDataAndUpdateLight {
            chunk_x: self.chunk_x,
            chunk_z: self.chunk_z,
            heightmaps: self.heightmap_nbt(),
            data: data.to_vec(),
            block_entities: Vec::new(),
            light_data: minimal_light_data(),
        }
    }
}

/// All-15 sky light above the heightmap, all-0 below, per §6's
/// minimal-viable light contract: every section reports sky light present
/// and block light absent, so the client renders daylight rather than
/// guessing full-dark.
fn minimal_light_data() -> ChunkLightData {
    // One light section below the lowest block section and one above the
    // highest; all fit in a single 64-bit mask word for any realistic
    // `SECTION_COUNT`.
    const LIGHT_SECTIONS: usize = SECTION_COUNT + 2;
    let all_set: i64 = (1i64 << LIGHT_SECTIONS) - 1;
    ChunkLightData {
        sky_light_mask: vec![all_set],
        block_light_mask: vec![0],
        empty_sky_light_mask: vec![0],
        empty_block_light_mask: vec![all_set],
        sky_light_arrays: (0..LIGHT_SECTIONS).map(|_| vec![0xFFu8; 2048]).collect(),
        block_light_arrays: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_block_roundtrip() {
        let mut chunk = Chunk::new(0, 0);
        chunk.set_block(5, 64, 5, 42);
        assert_eq!(chunk.get_block(5, 64, 5), 42);
        assert_eq!(chunk.get_block(5, 65, 5), 0);
    }

    #[test]
    fn boundary_sections_dont_panic() {
        let mut chunk = Chunk::new(-1, -1);
        chunk.set_block(0, MIN_Y, 0, 7);
        chunk.set_block(15, MAX_Y, 15, 9);
        assert_eq!(chunk.get_block(0, MIN_Y, 0), 7);
        assert_eq!(chunk.get_block(15, MAX_Y, 15), 9);
    }

    #[test]
    fn out_of_range_y_reads_as_air() {
        let chunk = Chunk::new(0, 0);
        assert_eq!(chunk.get_block(0, MIN_Y - 1, 0), 0);
        assert_eq!(chunk.get_block(0, MAX_Y + 1, 0), 0);
    }

    #[test]
    fn section_view_indices_always_valid() {
        let mut chunk = Chunk::new(0, 0);
        for i in 0..50i32 {
            chunk.set_block(i % 16, MIN_Y + (i / 16), (i * 3) % 16, i + 1);
        }
        let view = chunk.section_view(0);
        for &idx in view.indices.iter() {
            assert!((idx as usize) < view.palette.len());
        }
    }

    #[test]
    fn uniform_section_has_single_palette_entry() {
        let chunk = Chunk::new(0, 0);
        let view = chunk.section_view(0);
        assert_eq!(view.palette.len(), 1);
        assert_eq!(view.palette[0], 0);
        assert_eq!(view.non_air_count, 0);
    }

    #[test]
    fn non_air_count_matches_resolved_indices() {
        let mut chunk = Chunk::new(0, 0);
        chunk.set_block(0, MIN_Y, 0, 1);
        chunk.set_block(1, MIN_Y, 0, 2);
        let view = chunk.section_view(0);
        let resolved_non_air = view
            .indices
            .iter()
            .filter(|&&i| view.palette[i as usize] != 0)
            .count();
        assert_eq!(view.non_air_count as usize, resolved_non_air);
    }

    #[test]
    fn heightmap_reports_top_plus_one() {
        let mut chunk = Chunk::new(0, 0);
        chunk.set_block(0, 5, 0, 1);
        chunk.set_block(0, 10, 0, 1);
        let heights = chunk.compute_heightmap();
        assert_eq!(heights[0], 11);
    }

    #[test]
    fn heightmap_all_air_column_reports_world_floor() {
        let chunk = Chunk::new(0, 0);
        let heights = chunk.compute_heightmap();
        assert_eq!(heights[0], MIN_Y);
    }
}
