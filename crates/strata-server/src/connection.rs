use crate::config::ServerConfig;
use crate::pipeline::ChunkPipeline;
use crate::player::Player;
use crate::session::{self, SessionContext};
use crate::world::WorldState;
use anyhow::{anyhow, Result};
use md5::{Digest, Md5};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use strata_protocol_core::{
    read_varint, Connection, ConnectionState, ConnectionWriter, InternalPacket, KnownPack,
    ProtocolAdapter,
};
use strata_protocol_v773::V1_21Adapter;
use strata_types::{BlockPos, GameMode, GameProfile, TextComponent, Vec3d};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(30);
const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Derives the offline-mode UUID the reference client uses for an
/// unauthenticated name: MD5("OfflinePlayer:" + name) with the version/variant
/// bits forced to 3/RFC4122, matching `UUID.nameUUIDFromBytes`.
pub fn offline_uuid(name: &str) -> Uuid {
    let mut hasher = Md5::new();
    hasher.update(format!("OfflinePlayer:{name}").as_bytes());
    let mut bytes: [u8; 16] = hasher.finalize().into();
    bytes[6] = (bytes[6] & 0x0f) | 0x30;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes)
}

/// Legal serverbound packet ids for a phase, by direction (server reads only
/// serverbound traffic, so this table never needs a clientbound half).
/// Anything outside this sparse table fails the connection per §4.5.
fn legal_packet_ids(state: ConnectionState) -> &'static [i32] {
    match state {
        ConnectionState::Handshaking => &[0x00],
        ConnectionState::Status => &[0x00, 0x01],
        ConnectionState::Login => &[0x00, 0x01, 0x03],
        ConnectionState::Configuration => &[0x00, 0x02, 0x03, 0x07],
        ConnectionState::Play => &[
            0x00, 0x04, 0x06, 0x08, 0x11, 0x12, 0x18, 0x1A, 0x1B, 0x1C, 0x1D, 0x24, 0x2F, 0x32,
            0x38,
        ],
    }
}

fn check_legal(state: ConnectionState, id: i32) -> Result<()> {
    if legal_packet_ids(state).contains(&id) {
        Ok(())
    } else {
        Err(anyhow!("UnexpectedPacket({:?}, 0x{:02X})", state, id))
    }
}

/// Login has a `Disconnect` packet; per §7, a fatal protocol error in Login
/// or Play sends it before the connection closes rather than just dropping
/// the socket.
async fn check_legal_login(conn: &mut Connection, adapter: &V1_21Adapter, id: i32) -> Result<()> {
    if let Err(e) = check_legal(ConnectionState::Login, id) {
        let _ = send(
            conn,
            adapter,
            ConnectionState::Login,
            &InternalPacket::Disconnect { reason: TextComponent::plain(e.to_string()) },
        )
        .await;
        return Err(e);
    }
    Ok(())
}

pub async fn handle_connection(stream: TcpStream, config: Arc<ServerConfig>, world: Arc<WorldState>) {
    let peer = stream
        .peer_addr()
        .unwrap_or_else(|_| "0.0.0.0:0".parse().unwrap());
    let mut conn = Connection::new(stream);
    let adapter = V1_21Adapter::new();

    if let Err(e) = handle_connection_inner(&mut conn, &adapter, &config, &world, peer).await {
        debug!(%peer, error = %e, "connection ended");
    }
}

async fn send(
    conn: &mut Connection,
    adapter: &V1_21Adapter,
    state: ConnectionState,
    packet: &InternalPacket,
) -> Result<()> {
    let mut encoded = adapter.encode_packet(state, packet)?;
    let packet_id = read_varint(&mut encoded)?;
    conn.write_packet(packet_id, &encoded).await
}

async fn handle_connection_inner(
    conn: &mut Connection,
    adapter: &V1_21Adapter,
    config: &Arc<ServerConfig>,
    world: &Arc<WorldState>,
    peer: std::net::SocketAddr,
) -> Result<()> {
    let (id, mut data) = conn.read_packet().await?;
    check_legal(ConnectionState::Handshaking, id)?;
    let packet = adapter.decode_packet(ConnectionState::Handshaking, id, &mut data)?;

    let next_state = match packet {
        InternalPacket::Handshake {
            protocol_version,
            next_state,
            ..
        } => {
            if protocol_version != adapter.protocol_version() {
                warn!(%peer, protocol_version, expected = adapter.protocol_version(), "protocol version mismatch");
            }
            next_state
        }
        _ => return Err(anyhow!("expected Handshake")),
    };

    match ConnectionState::from_handshake_next(next_state) {
        Some(ConnectionState::Status) => handle_status(conn, adapter, config, world).await,
        Some(ConnectionState::Login) => {
            let profile = handle_login(conn, adapter).await?;
            handle_configuration(conn, adapter).await?;
            handle_play(conn, adapter, config, world, profile).await
        }
        _ => Err(anyhow!("invalid next_state {next_state}")),
    }
}

async fn handle_status(
    conn: &mut Connection,
    adapter: &V1_21Adapter,
    config: &ServerConfig,
    world: &Arc<WorldState>,
) -> Result<()> {
    loop {
        let (id, mut data) = conn.read_packet().await?;
        check_legal(ConnectionState::Status, id)?;
        let packet = adapter.decode_packet(ConnectionState::Status, id, &mut data)?;
        match packet {
            InternalPacket::StatusRequest => {
                let json = format!(
                    r#"{{"version":{{"name":"1.21.10","protocol":{}}},"players":{{"max":{},"online":{}}},"description":{{"text":"{}"}}}}"#,
                    adapter.protocol_version(),
                    config.max_players,
                    world.player_count(),
                    config.motd
                );
                send(conn, adapter, ConnectionState::Status, &InternalPacket::StatusResponse { json }).await?;
            }
            InternalPacket::PingRequest { payload } => {
                send(conn, adapter, ConnectionState::Status, &InternalPacket::PongResponse { payload }).await?;
                return Ok(());
            }
            _ => {}
        }
    }
}

async fn handle_login(conn: &mut Connection, adapter: &V1_21Adapter) -> Result<GameProfile> {
    let (id, mut data) = conn.read_packet().await?;
    check_legal_login(conn, adapter, id).await?;
    let packet = adapter.decode_packet(ConnectionState::Login, id, &mut data)?;

    let name = match packet {
        InternalPacket::LoginStart { name, .. } => name,
        _ => return Err(anyhow!("expected Login Start")),
    };

    let profile = GameProfile {
        uuid: offline_uuid(&name),
        name: name.clone(),
        properties: Vec::new(),
    };

    send(
        conn,
        adapter,
        ConnectionState::Login,
        &InternalPacket::LoginSuccess { profile: profile.clone() },
    )
    .await?;

    let (id, mut data) = conn.read_packet().await?;
    check_legal_login(conn, adapter, id).await?;
    match adapter.decode_packet(ConnectionState::Login, id, &mut data)? {
        InternalPacket::LoginAcknowledged => {
            info!(%name, uuid = %profile.uuid, "player logged in (offline mode)");
            Ok(profile)
        }
        _ => Err(anyhow!("expected Login Acknowledged")),
    }
}

async fn handle_configuration(conn: &mut Connection, adapter: &V1_21Adapter) -> Result<()> {
    send(
        conn,
        adapter,
        ConnectionState::Configuration,
        &InternalPacket::KnownPacksRequest {
            packs: vec![KnownPack {
                namespace: "minecraft".into(),
                id: "core".into(),
                version: "1.21.10".into(),
            }],
        },
    )
    .await?;

    let (id, mut data) = conn.read_packet().await?;
    check_legal(ConnectionState::Configuration, id)?;
    match adapter.decode_packet(ConnectionState::Configuration, id, &mut data)? {
        InternalPacket::KnownPacksResponse { packs } => {
            debug!(count = packs.len(), "client known packs");
        }
        other => debug!(?other, "expected known packs response, continuing anyway"),
    }

    for registry_packet in adapter.registry_data() {
        send(conn, adapter, ConnectionState::Configuration, &registry_packet).await?;
    }

    send(conn, adapter, ConnectionState::Configuration, &InternalPacket::FinishConfiguration).await?;

    loop {
        let (id, mut data) = conn.read_packet().await?;
        check_legal(ConnectionState::Configuration, id)?;
        match adapter.decode_packet(ConnectionState::Configuration, id, &mut data)? {
            InternalPacket::FinishConfigurationAck => return Ok(()),
            InternalPacket::ClientInformation { .. } | InternalPacket::PluginMessage { .. } => {}
            _ => {}
        }
    }
}

async fn handle_play(
    conn: &mut Connection,
    adapter: &V1_21Adapter,
    config: &Arc<ServerConfig>,
    world: &Arc<WorldState>,
    profile: GameProfile,
) -> Result<()> {
    let entity_id = world.alloc_player_eid();
    let view_distance = config.view_distance;
    let spawn = Vec3d::new(0.5, 64.0, 0.5);
    let player = Arc::new(Player::new(entity_id, profile.clone(), spawn, view_distance));
    world.add_player(player.clone());

    let result = run_play_session(conn, adapter, config, world, &player).await;

    world.remove_player(&player.profile.uuid);
    info!(player = %player.profile.name, "left the game");
    result
}

async fn run_play_session(
    conn: &mut Connection,
    adapter: &V1_21Adapter,
    config: &Arc<ServerConfig>,
    world: &Arc<WorldState>,
    player: &Arc<Player>,
) -> Result<()> {
    let view_distance = config.view_distance as i32;
    let spawn = player.position();
    let center = player.chunk_pos();

    send(
        conn,
        adapter,
        ConnectionState::Play,
        &InternalPacket::JoinGame {
            entity_id: player.entity_id,
            is_hardcore: false,
            dimension_names: vec!["minecraft:overworld".into()],
            max_players: config.max_players as i32,
            view_distance,
            simulation_distance: view_distance,
            reduced_debug_info: false,
            enable_respawn_screen: true,
            do_limited_crafting: false,
            dimension_type: 0,
            dimension_name: "minecraft:overworld".into(),
            hashed_seed: config.seed as i64,
            game_mode: GameMode::Survival,
            previous_game_mode: -1,
            is_debug: false,
            is_flat: config.generator == "flat",
            portal_cooldown: 0,
            enforces_secure_chat: false,
        },
    )
    .await?;

    send(
        conn,
        adapter,
        ConnectionState::Play,
        &InternalPacket::SynchronizePlayerPosition {
            position: spawn,
            yaw: 0.0,
            pitch: 0.0,
            flags: 0,
            teleport_id: 0,
        },
    )
    .await?;

    let (world_age, time_of_day) = world.time.snapshot();
    send(
        conn,
        adapter,
        ConnectionState::Play,
        &InternalPacket::UpdateTime { world_age, time_of_day },
    )
    .await?;

    send(conn, adapter, ConnectionState::Play, &InternalPacket::GameEvent { event: 13, value: 0.0 }).await?;

    send(
        conn,
        adapter,
        ConnectionState::Play,
        &InternalPacket::SetCenterChunk { chunk_x: center.x, chunk_z: center.z },
    )
    .await?;

    send(
        conn,
        adapter,
        ConnectionState::Play,
        &InternalPacket::SetDefaultSpawnPosition {
            position: BlockPos::new(0, 64, 0),
            angle: 0.0,
        },
    )
    .await?;

    let (tx, rx) = mpsc::channel::<InternalPacket>(OUTBOUND_QUEUE_DEPTH);
    player.set_outbound(tx.clone());
    let dummy = std::mem::replace(conn, Connection::new_dummy());
    let (mut reader, writer) = dummy.into_split();
    let writer_task = tokio::spawn(run_writer(writer, writer_adapter(), rx));

    let pipeline = ChunkPipeline::start(world.clone(), player.clone(), tx.clone());
    pipeline.update_desired(center, player.view_distance());

    let session_result = run_session_loop(&mut reader, adapter, world, player, &pipeline, &tx).await;

    pipeline.shutdown();
    drop(tx);
    let _ = writer_task.await;
    session_result
}

fn writer_adapter() -> V1_21Adapter {
    V1_21Adapter::new()
}

async fn run_writer(
    mut writer: ConnectionWriter,
    adapter: V1_21Adapter,
    mut rx: mpsc::Receiver<InternalPacket>,
) {
    while let Some(packet) = rx.recv().await {
        match adapter.encode_packet(ConnectionState::Play, &packet) {
            Ok(mut encoded) => match read_varint(&mut encoded) {
                Ok(packet_id) => {
                    if let Err(e) = writer.write_packet(packet_id, &encoded).await {
                        debug!(error = %e, "outbound write failed, closing connection");
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "failed to split encoded packet id"),
            },
            Err(e) => warn!(error = %e, ?packet, "failed to encode outbound packet"),
        }
    }
}

async fn run_session_loop(
    reader: &mut strata_protocol_core::ConnectionReader,
    adapter: &V1_21Adapter,
    world: &Arc<WorldState>,
    player: &Arc<Player>,
    pipeline: &ChunkPipeline,
    outbound: &mpsc::Sender<InternalPacket>,
) -> Result<()> {
    let ctx = SessionContext {
        world,
        player,
        pipeline,
        outbound,
    };

    let mut last_keep_alive_sent = tokio::time::Instant::now();
    let mut pending_keep_alive: Option<i64> = None;
    let mut last_keep_alive_reply = tokio::time::Instant::now();

    loop {
        tokio::select! {
            result = reader.read_packet() => {
                let (id, mut data) = result?;
                if let Err(e) = check_legal(ConnectionState::Play, id) {
                    let _ = outbound
                        .send(InternalPacket::Disconnect { reason: TextComponent::plain(e.to_string()) })
                        .await;
                    return Err(e);
                }
                let packet = adapter.decode_packet(ConnectionState::Play, id, &mut data)?;
                if let InternalPacket::KeepAliveServerbound { id: ka_id } = packet {
                    if pending_keep_alive == Some(ka_id) {
                        pending_keep_alive = None;
                        last_keep_alive_reply = tokio::time::Instant::now();
                    }
                    continue;
                }
                session::handle_packet(&ctx, packet).await?;
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                let now = tokio::time::Instant::now();
                if now.duration_since(last_keep_alive_sent) >= KEEP_ALIVE_INTERVAL {
                    let id = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_millis() as i64;
                    outbound.send(InternalPacket::KeepAliveClientbound { id }).await?;
                    pending_keep_alive = Some(id);
                    last_keep_alive_sent = now;
                }
                if pending_keep_alive.is_some()
                    && now.duration_since(last_keep_alive_reply) >= KEEP_ALIVE_TIMEOUT
                {
                    let _ = outbound
                        .send(InternalPacket::Disconnect { reason: TextComponent::plain("Timed out") })
                        .await;
                    return Err(anyhow!("keep-alive timeout"));
                }
            }
        }
    }
}
