use crate::player::Player;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_types::{ItemStack, Vec3d};
use strata_world::ChunkStore;
use tokio::sync::watch;
use uuid::Uuid;

/// Despawn age in ticks (5 minutes at 20 Hz), matching the reference
/// client's dropped-item lifetime.
const ITEM_DESPAWN_TICKS: u32 = 6000;
const GRAVITY_PER_TICK: f64 = 0.04;
const TERMINAL_VELOCITY: f64 = -1.96;

/// A dropped item entity: position, fall velocity, pickup-delay and age
/// counters. No collision against terrain is modeled — it falls until
/// despawn, matching the scope of §4.3's tick contract.
pub struct DroppedItem {
    pub item: ItemStack,
    pub position: Vec3d,
    pub velocity_y: f64,
    pub pickup_delay: u16,
    pub age: u32,
}

/// Monotonic tick counter plus wrapping time-of-day, advanced once per
/// world tick. Broadcasts happen only on join / explicit set-time, never
/// per tick, per §4.3.
#[derive(Default)]
pub struct TimeState {
    pub world_age: AtomicI64,
    pub time_of_day: AtomicI64,
}

impl TimeState {
    pub fn advance(&self) {
        self.world_age.fetch_add(1, Ordering::Relaxed);
        self.time_of_day
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |t| {
                Some((t + 1) % 24000)
            })
            .ok();
    }

    pub fn snapshot(&self) -> (i64, i64) {
        (
            self.world_age.load(Ordering::Relaxed),
            self.time_of_day.load(Ordering::Relaxed),
        )
    }
}

/// Owns every player, the entity-id counters, the shared chunk store and
/// time state — the one thing every session and the tick loop reach
/// through. Player/entity maps are concurrent; iteration snapshots a copy.
pub struct WorldState {
    pub players: DashMap<Uuid, Arc<Player>>,
    pub entities: DashMap<i32, Mutex<DroppedItem>>,
    next_player_eid: AtomicI32,
    next_entity_eid: AtomicI32,
    pub time: TimeState,
    pub chunks: ChunkStore,
}

impl WorldState {
    pub fn new(chunks: ChunkStore) -> Self {
        Self {
            players: DashMap::new(),
            entities: DashMap::new(),
            next_player_eid: AtomicI32::new(1),
            next_entity_eid: AtomicI32::new(1000),
            time: TimeState::default(),
            chunks,
        }
    }

    /// Spawns a dropped-item entity at `position` with the default
    /// 10-tick (0.5s) pickup delay self-drops use.
    pub fn spawn_dropped_item(&self, item: ItemStack, position: Vec3d) {
        let eid = self.alloc_entity_eid();
        self.entities.insert(
            eid,
            Mutex::new(DroppedItem {
                item,
                position,
                velocity_y: 0.0,
                pickup_delay: 10,
                age: 0,
            }),
        );
    }

    /// Advances dropped-item physics/age one tick and reaps anything that
    /// has either hit its despawn age.
    fn tick_entities(&self) {
        let mut expired = Vec::new();
        for entry in self.entities.iter() {
            let mut item = entry.value().lock().expect("dropped item lock poisoned");
            item.velocity_y = (item.velocity_y - GRAVITY_PER_TICK).max(TERMINAL_VELOCITY);
            item.position.y += item.velocity_y;
            item.pickup_delay = item.pickup_delay.saturating_sub(1);
            item.age += 1;
            if item.age >= ITEM_DESPAWN_TICKS {
                expired.push(*entry.key());
            }
        }
        for eid in expired {
            self.entities.remove(&eid);
        }
    }

    /// Allocate a player entity id in `[1, 1000)`.
    pub fn alloc_player_eid(&self) -> i32 {
        self.next_player_eid.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate a non-player entity id in `[1000, ..)`.
    pub fn alloc_entity_eid(&self) -> i32 {
        self.next_entity_eid.fetch_add(1, Ordering::Relaxed)
    }

    pub fn add_player(&self, player: Arc<Player>) {
        self.players.insert(player.profile.uuid, player);
    }

    pub fn remove_player(&self, uuid: &Uuid) {
        self.players.remove(uuid);
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Snapshot of every currently-connected player, for broadcast scoping.
    pub fn players_snapshot(&self) -> Vec<Arc<Player>> {
        self.players.iter().map(|e| e.value().clone()).collect()
    }
}

/// Drive the 20 Hz world tick until `shutdown` fires. Advances time and
/// steps dropped-item entities, matching §4.3's tick contract. Mob AI and
/// redstone stay out of scope per §1's gameplay-mechanics non-goal.
pub async fn run_tick_loop(world: Arc<WorldState>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_millis(50));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                world.time.advance();
                world.tick_entities();
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
