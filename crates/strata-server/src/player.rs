use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;
use strata_protocol_core::InternalPacket;
use strata_types::{BlockPos, ChunkPos, GameMode, GameProfile, Inventory, Vec3d};
use tokio::sync::mpsc;

/// A block the player is currently mid-break on, tracked per §4.6's
/// destroy-state machine.
#[derive(Debug, Clone, Copy)]
pub struct DestroyState {
    pub position: BlockPos,
    pub start_tick: i64,
    pub required_ticks: i64,
}

/// Position/rotation, written only by the owning session's read task;
/// other tasks read through the same lock and tolerate a one-step-stale
/// value, matching §5's ownership note.
pub struct Transform {
    pub position: Vec3d,
    pub yaw: f32,
    pub pitch: f32,
    pub head_yaw: f32,
}

/// A connected player: identity, transform, chunk visibility sets, and
/// inventory. Held behind an `Arc` and shared between the session's read
/// task, its chunk-streaming pipeline, and the world's broadcast path.
pub struct Player {
    pub entity_id: i32,
    pub profile: GameProfile,
    pub transform: Mutex<Transform>,
    pub on_ground: AtomicBool,
    pub sneaking: AtomicBool,
    pub game_mode: Mutex<GameMode>,
    pub view_distance: AtomicU8,
    pub inventory: Mutex<Inventory>,
    /// Chunks currently loaded on the client.
    pub loaded_chunks: DashSet<ChunkPos>,
    /// Chunks the pipeline has requested but not yet confirmed loaded.
    pub loading_chunks: DashSet<ChunkPos>,
    /// Entity ids currently visible to this client.
    pub visible_entities: DashSet<i32>,
    pub destroying: Mutex<Option<DestroyState>>,
    /// This session's outbound queue, set once the Play phase has split the
    /// connection. Lets other sessions reach this player for scoped
    /// broadcasts (block updates, entity spawns) without routing through C3.
    pub outbound: Mutex<Option<mpsc::Sender<InternalPacket>>>,
}

impl Player {
    pub fn new(entity_id: i32, profile: GameProfile, spawn: Vec3d, view_distance: u8) -> Self {
        Self {
            entity_id,
            profile,
            transform: Mutex::new(Transform {
                position: spawn,
                yaw: 0.0,
                pitch: 0.0,
                head_yaw: 0.0,
            }),
            on_ground: AtomicBool::new(true),
            sneaking: AtomicBool::new(false),
            game_mode: Mutex::new(GameMode::Survival),
            view_distance: AtomicU8::new(view_distance),
            inventory: Mutex::new(Inventory::new()),
            loaded_chunks: DashSet::new(),
            loading_chunks: DashSet::new(),
            visible_entities: DashSet::new(),
            destroying: Mutex::new(None),
            outbound: Mutex::new(None),
        }
    }

    /// Attach this session's outbound queue so other sessions can reach it.
    pub fn set_outbound(&self, tx: mpsc::Sender<InternalPacket>) {
        *self.outbound.lock().expect("outbound lock poisoned") = Some(tx);
    }

    /// Best-effort send to this player; silently dropped if the session has
    /// since disconnected or its queue is full.
    pub fn try_send(&self, packet: InternalPacket) {
        if let Some(tx) = self.outbound.lock().expect("outbound lock poisoned").as_ref() {
            let _ = tx.try_send(packet);
        }
    }

    pub fn position(&self) -> Vec3d {
        self.transform.lock().expect("transform lock poisoned").position
    }

    pub fn chunk_pos(&self) -> ChunkPos {
        self.position().chunk_pos()
    }

    pub fn set_position(&self, pos: Vec3d, on_ground: bool) {
        let mut t = self.transform.lock().expect("transform lock poisoned");
        t.position = pos;
        self.on_ground.store(on_ground, Ordering::Relaxed);
    }

    pub fn set_rotation(&self, yaw: f32, pitch: f32, on_ground: bool) {
        let mut t = self.transform.lock().expect("transform lock poisoned");
        t.yaw = yaw;
        t.pitch = pitch;
        t.head_yaw = yaw;
        self.on_ground.store(on_ground, Ordering::Relaxed);
    }

    pub fn view_distance(&self) -> u8 {
        self.view_distance.load(Ordering::Relaxed)
    }
}
