use crate::chunk::Chunk;
use crate::generator::TerrainGenerator;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Per-chunk diff overlay: authoritative block overrides applied on top of
/// whatever the generator produces, last-write-wins, retained independently
/// of the chunk cache so an unloaded-and-reloaded chunk still sees them.
#[derive(Default)]
pub struct ChunkDiff {
    shards: DashMap<(i32, i32), DashMap<(i32, i32, i32), i32>>,
}

impl ChunkDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, world_x: i32, y: i32, world_z: i32, id: i32) {
        let key = (world_x >> 4, world_z >> 4);
        self.shards
            .entry(key)
            .or_default()
            .insert((world_x, y, world_z), id);
    }

    pub fn apply_to(&self, chunk: &mut Chunk) {
        let key = (chunk.chunk_x, chunk.chunk_z);
        if let Some(shard) = self.shards.get(&key) {
            for entry in shard.iter() {
                let (wx, y, wz) = *entry.key();
                chunk.set_block(wx & 15, y, wz & 15, *entry.value());
            }
        }
    }
}

/// A chunk cache cell: either still generating (single-flight) or resolved.
/// Readers await the same in-flight generation rather than racing it.
struct ChunkCell {
    chunk: AsyncMutex<Option<Arc<Chunk>>>,
}

/// Concurrent `(chunkX, chunkZ) -> Chunk` cache with per-coordinate
/// single-flight generation, backed by a diff overlay that survives
/// eviction.
pub struct ChunkStore {
    chunks: DashMap<(i32, i32), Arc<ChunkCell>>,
    pub diff: ChunkDiff,
    generator: Box<dyn TerrainGenerator>,
}

impl ChunkStore {
    pub fn new(generator: Box<dyn TerrainGenerator>) -> Self {
        Self {
            chunks: DashMap::new(),
            diff: ChunkDiff::new(),
            generator,
        }
    }

    /// Return the cached chunk, generating it (and applying the diff
    /// overlay) if absent. Concurrent callers for the same coordinate
    /// observe the same generated chunk.
    pub async fn get_or_create(&self, cx: i32, cz: i32) -> Arc<Chunk> {
        let cell = match self.chunks.entry((cx, cz)) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                let cell = Arc::new(ChunkCell {
                    chunk: AsyncMutex::new(None),
                });
                e.insert(cell.clone());
                cell
            }
        };

        let mut guard = cell.chunk.lock().await;
        if let Some(chunk) = guard.as_ref() {
            return chunk.clone();
        }
        let mut chunk = Chunk::new(cx, cz);
        self.generator.populate(&mut chunk);
        self.diff.apply_to(&mut chunk);
        let chunk = Arc::new(chunk);
        *guard = Some(chunk.clone());
        chunk
    }

    /// Read a single block, generating the chunk if it isn't cached yet.
    /// The cached chunk already reflects every diff applied so far.
    pub async fn get_block(&self, world_x: i32, y: i32, world_z: i32) -> i32 {
        let chunk = self.get_or_create(world_x >> 4, world_z >> 4).await;
        chunk.get_block(world_x & 15, y, world_z & 15)
    }

    /// Record a block edit in the diff overlay (retained regardless of
    /// cache residency) and, if the chunk is cached, mutate it in place.
    pub async fn set_block(&self, world_x: i32, y: i32, world_z: i32, id: i32) {
        self.diff.set(world_x, y, world_z, id);
        let key = (world_x >> 4, world_z >> 4);
        if let Some(cell) = self.chunks.get(&key) {
            let mut guard = cell.chunk.lock().await;
            if let Some(chunk) = guard.as_mut() {
                Arc::make_mut(chunk).set_block(world_x & 15, y, world_z & 15, id);
            }
        }
    }

    /// Drop a cached chunk (its diffs are retained independently).
    pub fn evict(&self, cx: i32, cz: i32) {
        self.chunks.remove(&(cx, cz));
    }

    pub fn cached_len(&self) -> usize {
        self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::FlatGenerator;

    fn flat_store() -> ChunkStore {
        ChunkStore::new(Box::new(FlatGenerator::new(1, 10)))
    }

    #[tokio::test]
    async fn get_or_create_caches() {
        let store = flat_store();
        let a = store.get_or_create(0, 0).await;
        let b = store.get_or_create(0, 0).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.cached_len(), 1);
    }

    #[tokio::test]
    async fn concurrent_generation_is_single_flight() {
        let store = Arc::new(flat_store());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.get_or_create(3, 3).await }));
        }
        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }
        for r in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], r));
        }
    }

    #[tokio::test]
    async fn set_block_persists_across_eviction() {
        let store = flat_store();
        store.set_block(5, 64, 5, 99).await;
        assert_eq!(store.get_block(5, 64, 5).await, 99);
        store.evict(0, 0);
        assert_eq!(store.get_block(5, 64, 5).await, 99);
    }

    #[tokio::test]
    async fn last_write_wins_per_position() {
        let store = flat_store();
        store.set_block(1, 64, 1, 5).await;
        store.set_block(1, 64, 1, 9).await;
        assert_eq!(store.get_block(1, 64, 1).await, 9);
    }

    #[tokio::test]
    async fn diff_does_not_leak_into_other_chunks() {
        let store = flat_store();
        store.set_block(0, 64, 0, 42).await;
        assert_ne!(store.get_block(20, 64, 0).await, 42);
    }
}
