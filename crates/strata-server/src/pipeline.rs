use crate::player::Player;
use crate::world::WorldState;
use dashmap::DashMap;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use strata_protocol_core::InternalPacket;
use strata_types::ChunkPos;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

const DEBOUNCE: Duration = Duration::from_millis(150);
const CHUNK_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const STUCK_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_BACKOFF: Duration = Duration::from_secs(2);
const MAX_RETRIES: u32 = 3;
const HEALTH_INTERVAL: Duration = Duration::from_secs(1);
const WORKER_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Queued,
    Loading,
    Loaded,
    Cancelled,
    Failed,
    Retrying,
}

/// Immutable snapshot of a single chunk's load request. Any state change
/// produces a new snapshot, stored back into the request manager's map.
#[derive(Debug, Clone)]
pub struct ChunkLoadRequest {
    pub coord: (i32, i32),
    pub state: RequestState,
    pub priority: i64,
    pub created_at: Instant,
    pub started_at: Option<Instant>,
    pub retry_count: u32,
    pub last_retry_at: Option<Instant>,
    pub error: Option<String>,
}

impl ChunkLoadRequest {
    fn new(coord: (i32, i32), priority: i64) -> Self {
        Self {
            coord,
            state: RequestState::Pending,
            priority,
            created_at: Instant::now(),
            started_at: None,
            retry_count: 0,
            last_retry_at: None,
            error: None,
        }
    }
}

/// Computes load priority — higher loads sooner. Distance dominates;
/// retries penalize; age gives diminishing-return fairness.
fn compute_priority(coord: (i32, i32), player_chunk: (i32, i32), retry_count: u32, age: Duration, stable: bool) -> i64 {
    let dist = (coord.0 - player_chunk.0).unsigned_abs() as i64 + (coord.1 - player_chunk.1).unsigned_abs() as i64;
    let age_term = (10.0 * (1.0 + age.as_secs_f64()).ln()).floor().min(100.0) as i64;
    1_000_000 - 100 * dist - 500 * retry_count as i64 + age_term + if stable { 50 } else { 0 }
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    priority: i64,
    coord: (i32, i32),
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority.cmp(&other.priority).then_with(|| self.coord.cmp(&other.coord))
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Owns the desired set, the request map, and the priority heap workers
/// pull from. The heap and the request map are locked independently so
/// worker contention never blocks the desired-set update path.
pub struct RequestManager {
    requests: DashMap<(i32, i32), ChunkLoadRequest>,
    desired: Mutex<HashSet<(i32, i32)>>,
    heap: Mutex<BinaryHeap<HeapEntry>>,
    notify: Notify,
}

impl RequestManager {
    fn new() -> Self {
        Self {
            requests: DashMap::new(),
            desired: Mutex::new(HashSet::new()),
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
        }
    }

    fn push(&self, coord: (i32, i32), priority: i64) {
        self.heap.lock().expect("heap lock poisoned").push(HeapEntry { priority, coord });
        self.notify.notify_one();
    }

    /// Replace the desired set, transitioning requests as §4.4 describes.
    fn apply_desired(&self, new_set: &HashSet<(i32, i32)>, player_chunk: (i32, i32)) {
        let mut desired = self.desired.lock().expect("desired lock poisoned");
        for coord in desired.iter() {
            if !new_set.contains(coord) {
                if let Some(mut req) = self.requests.get_mut(coord) {
                    if !matches!(req.state, RequestState::Loading | RequestState::Loaded) {
                        req.state = RequestState::Cancelled;
                    }
                }
            }
        }
        for &coord in new_set.iter() {
            let age = Duration::ZERO;
            match self.requests.get_mut(&coord) {
                None => {
                    let priority = compute_priority(coord, player_chunk, 0, age, false);
                    self.requests.insert(coord, ChunkLoadRequest::new(coord, priority));
                    self.push(coord, priority);
                }
                Some(mut req) => {
                    if !matches!(req.state, RequestState::Loading | RequestState::Loaded) {
                        let was_cancelled = req.state == RequestState::Cancelled;
                        let elapsed = req.created_at.elapsed();
                        req.priority = compute_priority(coord, player_chunk, req.retry_count, elapsed, true);
                        if was_cancelled {
                            req.state = RequestState::Pending;
                        }
                        self.push(coord, req.priority);
                    }
                }
            }
        }
        *desired = new_set.clone();
    }

    fn in_desired_set(&self, coord: &(i32, i32)) -> bool {
        self.desired.lock().expect("desired lock poisoned").contains(coord)
    }

    fn pop(&self) -> Option<(i32, i32)> {
        self.heap.lock().expect("heap lock poisoned").pop().map(|e| e.coord)
    }

    async fn wait_for_work(&self) {
        self.notify.notified().await;
    }
}

/// One pipeline instance per session. Debounces desired-set updates,
/// runs a fixed worker pool against the priority heap, and a health
/// monitor for stuck/retry/orphan requests.
pub struct ChunkPipeline {
    manager: Arc<RequestManager>,
    desired_tx: mpsc::UnboundedSender<(HashSet<(i32, i32)>, (i32, i32))>,
    shutdown: Arc<AtomicBool>,
}

impl ChunkPipeline {
    /// Start the pipeline: debounce task, `WORKER_COUNT` workers, one
    /// health monitor. `outbound` is the session's single serializing
    /// write queue (see C5) that every worker writes chunk packets through.
    pub fn start(
        world: Arc<WorldState>,
        player: Arc<Player>,
        outbound: mpsc::Sender<InternalPacket>,
    ) -> Self {
        let manager = Arc::new(RequestManager::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let (desired_tx, mut desired_rx) = mpsc::unbounded_channel::<(HashSet<(i32, i32)>, (i32, i32))>();

        // Debounce task: first update applies immediately; later updates
        // collapse to the latest pending set and wait out the remainder
        // of the debounce interval since the last applied update.
        {
            let manager = manager.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut last_applied: Option<Instant> = None;
                while let Some((mut set, mut center)) = desired_rx.recv().await {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    if let Some(last) = last_applied {
                        let elapsed = last.elapsed();
                        if elapsed < DEBOUNCE {
                            let deadline = DEBOUNCE - elapsed;
                            tokio::select! {
                                _ = tokio::time::sleep(deadline) => {}
                                more = desired_rx.recv() => {
                                    match more {
                                        Some((s, c)) => { set = s; center = c; }
                                        None => break,
                                    }
                                }
                            }
                        }
                    }
                    manager.apply_desired(&set, center);
                    last_applied = Some(Instant::now());
                }
            });
        }

        for worker_id in 0..WORKER_COUNT {
            let manager = manager.clone();
            let world = world.clone();
            let player = player.clone();
            let outbound = outbound.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_worker(worker_id, manager, world, player, outbound, shutdown).await;
            });
        }

        {
            let manager = manager.clone();
            let player = player.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_health_monitor(manager, player, shutdown).await;
            });
        }

        Self {
            manager,
            desired_tx,
            shutdown,
        }
    }

    /// Recompute and submit the desired set for a circular disc of radius
    /// `view_distance` around `center`.
    pub fn update_desired(&self, center: ChunkPos, view_distance: u8) {
        let vd = view_distance as i32;
        let mut set = HashSet::with_capacity(((2 * vd + 1) * (2 * vd + 1)) as usize);
        for dx in -vd..=vd {
            for dz in -vd..=vd {
                if ((dx * dx + dz * dz) as f64).sqrt() <= vd as f64 {
                    set.insert((center.x + dx, center.z + dz));
                }
            }
        }
        let _ = self.desired_tx.send((set, (center.x, center.z)));
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

async fn run_worker(
    worker_id: usize,
    manager: Arc<RequestManager>,
    world: Arc<WorldState>,
    player: Arc<Player>,
    outbound: mpsc::Sender<InternalPacket>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let coord = match manager.pop() {
            Some(c) => c,
            None => {
                tokio::select! {
                    _ = manager.wait_for_work() => continue,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
                }
            }
        };

        let Some(mut req) = manager.requests.get_mut(&coord) else {
            continue;
        };
        if matches!(req.state, RequestState::Cancelled | RequestState::Loaded) {
            continue;
        }
        req.state = RequestState::Loading;
        req.started_at = Some(Instant::now());
        drop(req);

        let chunk = world.chunks.get_or_create(coord.0, coord.1).await;
        let packet = chunk.to_packet();

        let write = tokio::time::timeout(CHUNK_WRITE_TIMEOUT, outbound.send(packet)).await;

        let Some(mut req) = manager.requests.get_mut(&coord) else {
            continue;
        };
        match write {
            Ok(Ok(())) => {
                if req.state != RequestState::Cancelled {
                    req.state = RequestState::Loaded;
                    player.loaded_chunks.insert(ChunkPos::new(coord.0, coord.1));
                    player.loading_chunks.remove(&ChunkPos::new(coord.0, coord.1));
                }
            }
            Ok(Err(_)) => {
                req.state = RequestState::Failed;
                req.error = Some("outbound channel closed".into());
                debug!(worker_id, ?coord, "chunk write failed: channel closed");
            }
            Err(_) => {
                req.state = RequestState::Failed;
                req.error = Some("write timeout".into());
                warn!(worker_id, ?coord, "chunk write timed out after {:?}", CHUNK_WRITE_TIMEOUT);
            }
        }
    }
}

async fn run_health_monitor(manager: Arc<RequestManager>, player: Arc<Player>, shutdown: Arc<AtomicBool>) {
    let mut interval = tokio::time::interval(HEALTH_INTERVAL);
    loop {
        interval.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let stale: Vec<(i32, i32)> = manager
            .requests
            .iter()
            .map(|e| *e.key())
            .collect();

        for coord in stale {
            let Some(mut req) = manager.requests.get_mut(&coord) else {
                continue;
            };
            match req.state {
                RequestState::Loading => {
                    if let Some(started) = req.started_at {
                        if started.elapsed() >= STUCK_TIMEOUT {
                            req.state = RequestState::Failed;
                            req.error = Some("stuck timeout".into());
                            warn!(?coord, "chunk load stuck, marking failed");
                        }
                    }
                }
                RequestState::Failed => {
                    let ready = req
                        .last_retry_at
                        .map(|t| t.elapsed() >= RETRY_BACKOFF)
                        .unwrap_or(true);
                    if ready && req.retry_count < MAX_RETRIES {
                        req.state = RequestState::Retrying;
                        req.retry_count += 1;
                        req.last_retry_at = Some(Instant::now());
                        req.state = RequestState::Pending;
                        let age = req.created_at.elapsed();
                        let player_chunk = player.chunk_pos();
                        req.priority = compute_priority(
                            coord,
                            (player_chunk.x, player_chunk.z),
                            req.retry_count,
                            age,
                            true,
                        );
                        debug!(?coord, retry_count = req.retry_count, priority = req.priority, "retrying chunk load");
                        manager.push(coord, req.priority);
                    }
                }
                RequestState::Loaded => {
                    if !manager.in_desired_set(&coord) {
                        req.state = RequestState::Cancelled;
                        // Client already dropped this chunk once it left its
                        // view distance (no server packet needed, see §4.4
                        // boundary-crossing example); just keep our own
                        // bookkeeping in sync so broadcast scoping doesn't
                        // keep targeting it.
                        player.loaded_chunks.remove(&ChunkPos::new(coord.0, coord.1));
                    }
                }
                _ => {}
            }
        }
    }
}
