use anyhow::{bail, Result};
use bytes::{Buf, BufMut, BytesMut};
use strata_nbt::NbtValue;
use strata_protocol_core::*;
use strata_types::BlockPos;

use crate::registries;

pub struct V1_21Adapter;

impl V1_21Adapter {
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolAdapter for V1_21Adapter {
    fn protocol_version(&self) -> i32 {
        773
    }

    fn decode_packet(
        &self,
        state: ConnectionState,
        id: i32,
        data: &mut BytesMut,
    ) -> Result<InternalPacket> {
        match state {
            ConnectionState::Handshaking => decode_handshaking(id, data),
            ConnectionState::Status => decode_status(id, data),
            ConnectionState::Login => decode_login(id, data),
            ConnectionState::Configuration => decode_configuration(id, data),
            ConnectionState::Play => decode_play(id, data),
        }
    }

    fn encode_packet(
        &self,
        state: ConnectionState,
        packet: &InternalPacket,
    ) -> Result<BytesMut> {
        match state {
            ConnectionState::Status => encode_status(packet),
            ConnectionState::Login => encode_login(packet),
            ConnectionState::Configuration => encode_configuration(packet),
            ConnectionState::Play => encode_play(packet),
            _ => bail!("Cannot encode packets in {:?} state", state),
        }
    }

    fn registry_data(&self) -> Vec<InternalPacket> {
        registries::build_registry_packets()
    }
}

// === Packet ID constants ===

// Status
const STATUS_RESPONSE: i32 = 0x00;
const PONG_RESPONSE: i32 = 0x01;

// Login clientbound
const LOGIN_DISCONNECT: i32 = 0x00;
const ENCRYPTION_REQUEST: i32 = 0x01;
const LOGIN_SUCCESS: i32 = 0x02;
const SET_COMPRESSION: i32 = 0x03;

// Configuration clientbound
const CONFIG_FINISH: i32 = 0x03;
const CONFIG_REGISTRY_DATA: i32 = 0x07;
const CONFIG_KNOWN_PACKS: i32 = 0x0E;

// Play clientbound
const PLAY_SPAWN_ENTITY: i32 = 0x01;
const PLAY_BLOCK_UPDATE: i32 = 0x09;
const PLAY_BLOCK_DESTROY_STAGE: i32 = 0x06;
const PLAY_CHUNK_BATCH_FINISHED: i32 = 0x0C;
const PLAY_CHUNK_BATCH_START: i32 = 0x0D;
const PLAY_DECLARE_COMMANDS: i32 = 0x11;
const PLAY_SET_CONTAINER_CONTENT: i32 = 0x13;
const PLAY_SET_CONTAINER_SLOT: i32 = 0x15;
const PLAY_DISCONNECT: i32 = 0x1D;
const PLAY_ACK_BLOCK_CHANGE: i32 = 0x05;
const PLAY_UNLOAD_CHUNK: i32 = 0x21;
const PLAY_GAME_EVENT: i32 = 0x22;
const PLAY_KEEP_ALIVE: i32 = 0x26;
const PLAY_CHUNK_DATA: i32 = 0x27;
const PLAY_LOGIN: i32 = 0x2B;
const PLAY_PLAYER_INFO_REMOVE: i32 = 0x3D;
const PLAY_PLAYER_INFO_UPDATE: i32 = 0x3E;
const PLAY_SYNC_PLAYER_POS: i32 = 0x40;
const PLAY_REMOVE_ENTITIES: i32 = 0x42;
const PLAY_UPDATE_ENTITY_POSITION: i32 = 0x2E;
const PLAY_UPDATE_ENTITY_POSITION_AND_ROTATION: i32 = 0x2F;
const PLAY_UPDATE_ENTITY_ROTATION: i32 = 0x30;
const PLAY_SET_HEAD_ROTATION: i32 = 0x48;
const PLAY_SET_HELD_ITEM: i32 = 0x53;
const PLAY_SET_CENTER_CHUNK: i32 = 0x54;
const PLAY_SET_DEFAULT_SPAWN: i32 = 0x56;
const PLAY_SET_ENTITY_METADATA: i32 = 0x58;
const PLAY_SET_ENTITY_VELOCITY: i32 = 0x5A;
const PLAY_SYSTEM_CHAT_MESSAGE: i32 = 0x6C;
const PLAY_UPDATE_TIME: i32 = 0x64;
const PLAY_TELEPORT_ENTITY: i32 = 0x70;

// Play serverbound
const SB_CHAT_COMMAND: i32 = 0x04;
const SB_CHAT_MESSAGE: i32 = 0x06;
const SB_CLICK_CONTAINER: i32 = 0x12;
const SB_CLOSE_CONTAINER: i32 = 0x11;
const SB_PLAYER_ACTION: i32 = 0x24;
const SB_HELD_ITEM_CHANGE: i32 = 0x2F;
const SB_CREATIVE_INVENTORY_ACTION: i32 = 0x32;
const SB_USE_ITEM_ON: i32 = 0x38;

// === Decode functions ===

fn decode_handshaking(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        0x00 => {
            let protocol_version = read_varint(data)?;
            let server_address = read_string(data, 255)?;
            let server_port = data.get_u16();
            let next_state = read_varint(data)?;
            Ok(InternalPacket::Handshake {
                protocol_version,
                server_address,
                server_port,
                next_state,
            })
        }
        _ => Ok(InternalPacket::Unknown {
            packet_id: id,
            data: data.to_vec(),
        }),
    }
}

fn decode_status(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        0x00 => Ok(InternalPacket::StatusRequest),
        0x01 => {
            let payload = data.get_i64();
            Ok(InternalPacket::PingRequest { payload })
        }
        _ => Ok(InternalPacket::Unknown {
            packet_id: id,
            data: data.to_vec(),
        }),
    }
}

fn decode_login(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        0x00 => {
            let name = read_string(data, 16)?;
            let uuid = read_uuid(data)?;
            Ok(InternalPacket::LoginStart { name, uuid })
        }
        0x01 => {
            let shared_secret = read_byte_array(data)?;
            let verify_token = read_byte_array(data)?;
            Ok(InternalPacket::EncryptionResponse {
                shared_secret,
                verify_token,
            })
        }
        0x03 => Ok(InternalPacket::LoginAcknowledged),
        _ => Ok(InternalPacket::Unknown {
            packet_id: id,
            data: data.to_vec(),
        }),
    }
}

fn decode_configuration(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        0x00 => {
            let locale = read_string(data, 16)?;
            let view_distance = data.get_i8();
            let chat_mode = read_varint(data)?;
            let chat_colors = data.get_u8() != 0;
            let skin_parts = data.get_u8();
            let main_hand = read_varint(data)?;
            let text_filtering = data.get_u8() != 0;
            let allow_listing = data.get_u8() != 0;
            Ok(InternalPacket::ClientInformation {
                locale,
                view_distance,
                chat_mode,
                chat_colors,
                skin_parts,
                main_hand,
                text_filtering,
                allow_listing,
            })
        }
        0x02 => {
            let channel = read_string(data, 32767)?;
            let remaining = data.to_vec();
            data.advance(remaining.len());
            Ok(InternalPacket::PluginMessage {
                channel,
                data: remaining,
            })
        }
        0x03 => Ok(InternalPacket::FinishConfigurationAck),
        0x07 => {
            let count = read_varint(data)? as usize;
            let mut packs = Vec::with_capacity(count);
            for _ in 0..count {
                let namespace = read_string(data, 32767)?;
                let id = read_string(data, 32767)?;
                let version = read_string(data, 32767)?;
                packs.push(KnownPack {
                    namespace,
                    id,
                    version,
                });
            }
            Ok(InternalPacket::KnownPacksResponse { packs })
        }
        _ => Ok(InternalPacket::Unknown {
            packet_id: id,
            data: data.to_vec(),
        }),
    }
}

fn decode_play(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        0x00 => {
            let teleport_id = read_varint(data)?;
            Ok(InternalPacket::ConfirmTeleportation { teleport_id })
        }
        0x08 => {
            // Chunk Batch Received â€” just acknowledge, read the chunks_per_tick float
            let _chunks_per_tick = data.get_f32();
            Ok(InternalPacket::Unknown {
                packet_id: id,
                data: vec![],
            })
        }
        0x18 => {
            let id = data.get_i64();
            Ok(InternalPacket::KeepAliveServerbound { id })
        }
        0x1A => {
            let x = data.get_f64();
            let y = data.get_f64();
            let z = data.get_f64();
            let on_ground = data.get_u8() != 0;
            Ok(InternalPacket::PlayerPosition { x, y, z, on_ground })
        }
        0x1B => {
            let x = data.get_f64();
            let y = data.get_f64();
            let z = data.get_f64();
            let yaw = data.get_f32();
            let pitch = data.get_f32();
            let on_ground = data.get_u8() != 0;
            Ok(InternalPacket::PlayerPositionAndRotation {
                x,
                y,
                z,
                yaw,
                pitch,
                on_ground,
            })
        }
        0x1C => {
            let yaw = data.get_f32();
            let pitch = data.get_f32();
            let on_ground = data.get_u8() != 0;
            Ok(InternalPacket::PlayerRotation {
                yaw,
                pitch,
                on_ground,
            })
        }
        0x1D => {
            let on_ground = data.get_u8() != 0;
            Ok(InternalPacket::PlayerOnGround { on_ground })
        }
        SB_CHAT_COMMAND => {
            let command = read_string(data, 256)?;
            Ok(InternalPacket::ChatCommand { command })
        }
        SB_CHAT_MESSAGE => {
            let message = read_string(data, 256)?;
            let timestamp = data.get_i64();
            let salt = data.get_i64();
            let has_signature = read_bool(data)?;
            let signature = if has_signature {
                let mut sig = vec![0u8; 256];
                data.copy_to_slice(&mut sig);
                Some(sig)
            } else {
                None
            };
            let offset = read_varint(data)?;
            let ack_count = (offset as usize).min(20);
            let _ = ack_count;
            let bits = read_bitset(data)?;
            let mut acknowledged = [0u8; 3];
            if let Some(&w) = bits.first() {
                acknowledged.copy_from_slice(&w.to_be_bytes()[5..8]);
            }
            Ok(InternalPacket::ChatMessage {
                message,
                timestamp,
                salt,
                has_signature,
                signature,
                offset,
                acknowledged,
            })
        }
        SB_CLOSE_CONTAINER => {
            let window_id = data.get_u8();
            Ok(InternalPacket::CloseContainer { window_id })
        }
        SB_CLICK_CONTAINER => {
            let window_id = data.get_u8();
            let state_id = read_varint(data)?;
            let slot = data.get_i16();
            let button = data.get_i8();
            let mode = read_varint(data)?;
            let changed_count = read_varint(data)? as usize;
            let mut changed_slots = Vec::with_capacity(changed_count);
            for _ in 0..changed_count {
                let slot_index = data.get_i16();
                let item = read_hashed_slot(data)?;
                changed_slots.push((slot_index, item));
            }
            let carried_item = read_hashed_slot(data)?;
            Ok(InternalPacket::ClickContainer {
                window_id,
                state_id,
                slot,
                button,
                mode,
                changed_slots,
                carried_item,
            })
        }
        SB_HELD_ITEM_CHANGE => {
            let slot = data.get_i16();
            Ok(InternalPacket::HeldItemChange { slot })
        }
        SB_CREATIVE_INVENTORY_ACTION => {
            let slot = data.get_i16();
            let item = read_slot(data)?;
            Ok(InternalPacket::CreativeInventoryAction { slot, item })
        }
        SB_PLAYER_ACTION => {
            let status = read_varint(data)?;
            let position = BlockPos::decode(data.get_u64());
            let face = data.get_u8();
            let sequence = read_varint(data)?;
            Ok(InternalPacket::PlayerAction {
                status,
                position,
                face,
                sequence,
            })
        }
        SB_USE_ITEM_ON => {
            let hand = read_varint(data)?;
            let position = BlockPos::decode(data.get_u64());
            let face = read_varint(data)? as u8;
            let cursor_x = data.get_f32();
            let cursor_y = data.get_f32();
            let cursor_z = data.get_f32();
            let inside_block = read_bool(data)?;
            let sequence = read_varint(data)?;
            Ok(InternalPacket::UseItemOn {
                hand,
                position,
                face,
                cursor_x,
                cursor_y,
                cursor_z,
                inside_block,
                sequence,
            })
        }
        _ => Ok(InternalPacket::Unknown {
            packet_id: id,
            data: data.to_vec(),
        }),
    }
}

// === Encode functions ===

fn encode_status(packet: &InternalPacket) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        InternalPacket::StatusResponse { json } => {
            write_varint(&mut buf, STATUS_RESPONSE);
            write_string(&mut buf, json);
        }
        InternalPacket::PongResponse { payload } => {
            write_varint(&mut buf, PONG_RESPONSE);
            buf.put_i64(*payload);
        }
        _ => bail!("Cannot encode {:?} in Status state", std::mem::discriminant(packet)),
    }
    Ok(buf)
}

fn encode_login(packet: &InternalPacket) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        InternalPacket::Disconnect { reason } => {
            write_varint(&mut buf, LOGIN_DISCONNECT);
            write_string(&mut buf, &reason.to_json());
        }
        InternalPacket::EncryptionRequest {
            server_id,
            public_key,
            verify_token,
        } => {
            write_varint(&mut buf, ENCRYPTION_REQUEST);
            write_string(&mut buf, server_id);
            write_byte_array(&mut buf, public_key);
            write_byte_array(&mut buf, verify_token);
            buf.put_u8(1); // should authenticate = true
        }
        InternalPacket::LoginSuccess { profile } => {
            write_varint(&mut buf, LOGIN_SUCCESS);
            write_uuid(&mut buf, &profile.uuid);
            write_string(&mut buf, &profile.name);
            write_varint(&mut buf, profile.properties.len() as i32);
            for prop in &profile.properties {
                write_string(&mut buf, &prop.name);
                write_string(&mut buf, &prop.value);
                if let Some(ref sig) = prop.signature {
                    buf.put_u8(1);
                    write_string(&mut buf, sig);
                } else {
                    buf.put_u8(0);
                }
            }
            buf.put_u8(0); // strict error handling = false
        }
        InternalPacket::SetCompression { threshold } => {
            write_varint(&mut buf, SET_COMPRESSION);
            write_varint(&mut buf, *threshold);
        }
        _ => bail!("Cannot encode {:?} in Login state", std::mem::discriminant(packet)),
    }
    Ok(buf)
}

fn encode_configuration(packet: &InternalPacket) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        InternalPacket::RegistryData { registry_id, entries } => {
            write_varint(&mut buf, CONFIG_REGISTRY_DATA);
            write_string(&mut buf, registry_id);
            write_varint(&mut buf, entries.len() as i32);
            for entry in entries {
                write_string(&mut buf, &entry.id);
                if let Some(ref nbt_data) = entry.data {
                    buf.put_u8(1); // has data
                    let mut nbt_buf = BytesMut::new();
                    nbt_data.write_root_network(&mut nbt_buf);
                    buf.extend_from_slice(&nbt_buf);
                } else {
                    buf.put_u8(0);
                }
            }
        }
        InternalPacket::FinishConfiguration => {
            write_varint(&mut buf, CONFIG_FINISH);
        }
        InternalPacket::KnownPacksRequest { packs } => {
            write_varint(&mut buf, CONFIG_KNOWN_PACKS);
            write_varint(&mut buf, packs.len() as i32);
            for pack in packs {
                write_string(&mut buf, &pack.namespace);
                write_string(&mut buf, &pack.id);
                write_string(&mut buf, &pack.version);
            }
        }
        InternalPacket::Disconnect { reason } => {
            write_varint(&mut buf, 0x02); // Disconnect (Configuration)
            // In configuration state, disconnect reason is NBT text component
            let nbt = NbtValue::Compound(vec![
                ("text".into(), NbtValue::String(reason.text.clone())),
            ]);
            let mut nbt_buf = BytesMut::new();
            nbt.write_root_network(&mut nbt_buf);
            buf.extend_from_slice(&nbt_buf);
        }
        _ => bail!(
            "Cannot encode {:?} in Configuration state",
            std::mem::discriminant(packet)
        ),
    }
    Ok(buf)
}

fn encode_play(packet: &InternalPacket) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        InternalPacket::JoinGame {
            entity_id,
            is_hardcore,
            dimension_names,
            max_players,
            view_distance,
            simulation_distance,
            reduced_debug_info,
            enable_respawn_screen,
            do_limited_crafting,
            dimension_type,
            dimension_name,
            hashed_seed,
            game_mode,
            previous_game_mode,
            is_debug,
            is_flat,
            portal_cooldown,
            enforces_secure_chat,
        } => {
            write_varint(&mut buf, PLAY_LOGIN);
            buf.put_i32(*entity_id);
            buf.put_u8(*is_hardcore as u8);
            write_varint(&mut buf, dimension_names.len() as i32);
            for dim in dimension_names {
                write_string(&mut buf, dim);
            }
            write_varint(&mut buf, *max_players);
            write_varint(&mut buf, *view_distance);
            write_varint(&mut buf, *simulation_distance);
            buf.put_u8(*reduced_debug_info as u8);
            buf.put_u8(*enable_respawn_screen as u8);
            buf.put_u8(*do_limited_crafting as u8);
            write_varint(&mut buf, *dimension_type);
            write_string(&mut buf, dimension_name);
            buf.put_i64(*hashed_seed);
            buf.put_u8(game_mode.id());
            buf.put_i8(*previous_game_mode);
            buf.put_u8(*is_debug as u8);
            buf.put_u8(*is_flat as u8);
            // Death location: not present
            buf.put_u8(0);
            write_varint(&mut buf, *portal_cooldown);
            buf.put_u8(*enforces_secure_chat as u8);
        }
        InternalPacket::SynchronizePlayerPosition {
            position,
            yaw,
            pitch,
            flags,
            teleport_id,
        } => {
            write_varint(&mut buf, PLAY_SYNC_PLAYER_POS);
            buf.put_f64(position.x);
            buf.put_f64(position.y);
            buf.put_f64(position.z);
            buf.put_f32(*yaw);
            buf.put_f32(*pitch);
            buf.put_u8(*flags);
            write_varint(&mut buf, *teleport_id);
        }
        InternalPacket::SetCenterChunk { chunk_x, chunk_z } => {
            write_varint(&mut buf, PLAY_SET_CENTER_CHUNK);
            write_varint(&mut buf, *chunk_x);
            write_varint(&mut buf, *chunk_z);
        }
        InternalPacket::ChunkDataAndUpdateLight {
            chunk_x,
            chunk_z,
            heightmaps,
            data,
            block_entities,
            light_data,
        } => {
            write_varint(&mut buf, PLAY_CHUNK_DATA);
            buf.put_i32(*chunk_x);
            buf.put_i32(*chunk_z);
            // Heightmaps NBT
            let mut nbt_buf = BytesMut::new();
            heightmaps.write_root_network(&mut nbt_buf);
            buf.extend_from_slice(&nbt_buf);
            // Chunk data
            write_varint(&mut buf, data.len() as i32);
            buf.extend_from_slice(data);
            // Block entities
            write_varint(&mut buf, 0); // number of block entities
            let _ = block_entities;
            // Light data
            encode_light_data(&mut buf, light_data);
        }
        InternalPacket::UnloadChunk { chunk_x, chunk_z } => {
            write_varint(&mut buf, PLAY_UNLOAD_CHUNK);
            buf.put_i32(*chunk_z);
            buf.put_i32(*chunk_x);
        }
        InternalPacket::KeepAliveClientbound { id } => {
            write_varint(&mut buf, PLAY_KEEP_ALIVE);
            buf.put_i64(*id);
        }
        InternalPacket::GameEvent { event, value } => {
            write_varint(&mut buf, PLAY_GAME_EVENT);
            buf.put_u8(*event);
            buf.put_f32(*value);
        }
        InternalPacket::SetDefaultSpawnPosition { position, angle } => {
            write_varint(&mut buf, PLAY_SET_DEFAULT_SPAWN);
            buf.put_u64(position.encode());
            buf.put_f32(*angle);
        }
        InternalPacket::Disconnect { reason } => {
            write_varint(&mut buf, PLAY_DISCONNECT);
            // Play disconnect uses NBT text component in 1.20.3+
            let nbt = NbtValue::Compound(vec![
                ("text".into(), NbtValue::String(reason.text.clone())),
            ]);
            let mut nbt_buf = BytesMut::new();
            nbt.write_root_network(&mut nbt_buf);
            buf.extend_from_slice(&nbt_buf);
        }
        InternalPacket::BlockUpdate { position, block_id } => {
            write_varint(&mut buf, PLAY_BLOCK_UPDATE);
            buf.put_u64(position.encode());
            write_varint(&mut buf, *block_id);
        }
        InternalPacket::AcknowledgeBlockChange { sequence } => {
            write_varint(&mut buf, PLAY_ACK_BLOCK_CHANGE);
            write_varint(&mut buf, *sequence);
        }
        InternalPacket::SetBlockDestroyStage {
            entity_id,
            position,
            destroy_stage,
        } => {
            write_varint(&mut buf, PLAY_BLOCK_DESTROY_STAGE);
            write_varint(&mut buf, *entity_id);
            buf.put_u64(position.encode());
            buf.put_i8(*destroy_stage);
        }
        InternalPacket::ChunkBatchStart => {
            write_varint(&mut buf, PLAY_CHUNK_BATCH_START);
        }
        InternalPacket::ChunkBatchFinished { batch_size } => {
            write_varint(&mut buf, PLAY_CHUNK_BATCH_FINISHED);
            write_varint(&mut buf, *batch_size);
        }
        InternalPacket::UpdateTime {
            world_age,
            time_of_day,
        } => {
            write_varint(&mut buf, PLAY_UPDATE_TIME);
            buf.put_i64(*world_age);
            buf.put_i64(*time_of_day);
        }
        InternalPacket::SpawnEntity {
            entity_id,
            entity_uuid,
            entity_type,
            x,
            y,
            z,
            pitch,
            yaw,
            head_yaw,
            data,
            velocity_x,
            velocity_y,
            velocity_z,
        } => {
            write_varint(&mut buf, PLAY_SPAWN_ENTITY);
            write_varint(&mut buf, *entity_id);
            write_uuid(&mut buf, entity_uuid);
            write_varint(&mut buf, *entity_type);
            buf.put_f64(*x);
            buf.put_f64(*y);
            buf.put_f64(*z);
            buf.put_u8(*pitch);
            buf.put_u8(*yaw);
            buf.put_u8(*head_yaw);
            write_varint(&mut buf, *data);
            buf.put_i16(*velocity_x);
            buf.put_i16(*velocity_y);
            buf.put_i16(*velocity_z);
        }
        InternalPacket::RemoveEntities { entity_ids } => {
            write_varint(&mut buf, PLAY_REMOVE_ENTITIES);
            write_varint(&mut buf, entity_ids.len() as i32);
            for id in entity_ids {
                write_varint(&mut buf, *id);
            }
        }
        InternalPacket::UpdateEntityPosition {
            entity_id,
            delta_x,
            delta_y,
            delta_z,
            on_ground,
        } => {
            write_varint(&mut buf, PLAY_UPDATE_ENTITY_POSITION);
            write_varint(&mut buf, *entity_id);
            buf.put_i16(*delta_x);
            buf.put_i16(*delta_y);
            buf.put_i16(*delta_z);
            buf.put_u8(*on_ground as u8);
        }
        InternalPacket::UpdateEntityPositionAndRotation {
            entity_id,
            delta_x,
            delta_y,
            delta_z,
            yaw,
            pitch,
            on_ground,
        } => {
            write_varint(&mut buf, PLAY_UPDATE_ENTITY_POSITION_AND_ROTATION);
            write_varint(&mut buf, *entity_id);
            buf.put_i16(*delta_x);
            buf.put_i16(*delta_y);
            buf.put_i16(*delta_z);
            buf.put_u8(*yaw);
            buf.put_u8(*pitch);
            buf.put_u8(*on_ground as u8);
        }
        InternalPacket::UpdateEntityRotation {
            entity_id,
            yaw,
            pitch,
            on_ground,
        } => {
            write_varint(&mut buf, PLAY_UPDATE_ENTITY_ROTATION);
            write_varint(&mut buf, *entity_id);
            buf.put_u8(*yaw);
            buf.put_u8(*pitch);
            buf.put_u8(*on_ground as u8);
        }
        InternalPacket::SetHeadRotation {
            entity_id,
            head_yaw,
        } => {
            write_varint(&mut buf, PLAY_SET_HEAD_ROTATION);
            write_varint(&mut buf, *entity_id);
            buf.put_u8(*head_yaw);
        }
        InternalPacket::TeleportEntity {
            entity_id,
            x,
            y,
            z,
            yaw,
            pitch,
            on_ground,
        } => {
            write_varint(&mut buf, PLAY_TELEPORT_ENTITY);
            write_varint(&mut buf, *entity_id);
            buf.put_f64(*x);
            buf.put_f64(*y);
            buf.put_f64(*z);
            buf.put_u8(*yaw);
            buf.put_u8(*pitch);
            buf.put_u8(*on_ground as u8);
        }
        InternalPacket::DeclareCommands { nodes, root_index } => {
            write_varint(&mut buf, PLAY_DECLARE_COMMANDS);
            write_varint(&mut buf, nodes.len() as i32);
            for node in nodes {
                buf.put_u8(node.flags);
                write_varint(&mut buf, node.children.len() as i32);
                for child in &node.children {
                    write_varint(&mut buf, *child);
                }
                if node.flags & 0x08 != 0 {
                    write_varint(&mut buf, 0); // redirect node, unused
                }
                if let Some(ref name) = node.name {
                    write_string(&mut buf, name);
                }
                if let Some(ref parser) = node.parser {
                    write_string(&mut buf, parser);
                    if let Some(ref props) = node.parser_properties {
                        buf.extend_from_slice(props);
                    }
                }
                if node.flags & 0x10 != 0 {
                    write_string(&mut buf, ""); // suggestions type, unused
                }
            }
            write_varint(&mut buf, *root_index);
        }
        InternalPacket::SetContainerContent {
            window_id,
            state_id,
            slots,
            carried_item,
        } => {
            write_varint(&mut buf, PLAY_SET_CONTAINER_CONTENT);
            buf.put_u8(*window_id);
            write_varint(&mut buf, *state_id);
            write_varint(&mut buf, slots.len() as i32);
            for slot in slots {
                write_slot(&mut buf, slot);
            }
            write_slot(&mut buf, carried_item);
        }
        InternalPacket::SetContainerSlot {
            window_id,
            state_id,
            slot,
            item,
        } => {
            write_varint(&mut buf, PLAY_SET_CONTAINER_SLOT);
            buf.put_i8(*window_id);
            write_varint(&mut buf, *state_id);
            buf.put_i16(*slot);
            write_slot(&mut buf, item);
        }
        InternalPacket::SetHeldItem { slot } => {
            write_varint(&mut buf, PLAY_SET_HELD_ITEM);
            buf.put_i8(*slot);
        }
        InternalPacket::SetEntityMetadata {
            entity_id,
            metadata,
        } => {
            write_varint(&mut buf, PLAY_SET_ENTITY_METADATA);
            write_varint(&mut buf, *entity_id);
            for entry in metadata {
                buf.put_u8(entry.index);
                write_varint(&mut buf, entry.type_id);
                buf.extend_from_slice(&entry.data);
            }
            buf.put_u8(0xFF); // terminator
        }
        InternalPacket::SetEntityVelocity {
            entity_id,
            velocity_x,
            velocity_y,
            velocity_z,
        } => {
            write_varint(&mut buf, PLAY_SET_ENTITY_VELOCITY);
            write_varint(&mut buf, *entity_id);
            buf.put_i16(*velocity_x);
            buf.put_i16(*velocity_y);
            buf.put_i16(*velocity_z);
        }
        InternalPacket::PlayerInfoUpdate { actions, players } => {
            write_varint(&mut buf, PLAY_PLAYER_INFO_UPDATE);
            buf.put_u8(*actions);
            write_varint(&mut buf, players.len() as i32);
            for p in players {
                write_uuid(&mut buf, &p.uuid);
                if actions & player_info_actions::ADD_PLAYER != 0 {
                    write_string(&mut buf, p.name.as_deref().unwrap_or(""));
                    write_varint(&mut buf, p.properties.len() as i32);
                    for (name, value, signature) in &p.properties {
                        write_string(&mut buf, name);
                        write_string(&mut buf, value);
                        if let Some(sig) = signature {
                            buf.put_u8(1);
                            write_string(&mut buf, sig);
                        } else {
                            buf.put_u8(0);
                        }
                    }
                }
                if actions & player_info_actions::INITIALIZE_CHAT != 0 {
                    buf.put_u8(0); // no chat session data
                }
                if actions & player_info_actions::UPDATE_GAME_MODE != 0 {
                    write_varint(&mut buf, p.game_mode.unwrap_or(0));
                }
                if actions & player_info_actions::UPDATE_LISTED != 0 {
                    buf.put_u8(p.listed.unwrap_or(true) as u8);
                }
                if actions & player_info_actions::UPDATE_LATENCY != 0 {
                    write_varint(&mut buf, p.ping.unwrap_or(0));
                }
                if actions & player_info_actions::UPDATE_DISPLAY_NAME != 0 {
                    if let Some(ref name) = p.display_name {
                        buf.put_u8(1);
                        let nbt = NbtValue::Compound(vec![(
                            "text".into(),
                            NbtValue::String(name.text.clone()),
                        )]);
                        let mut nbt_buf = BytesMut::new();
                        nbt.write_root_network(&mut nbt_buf);
                        buf.extend_from_slice(&nbt_buf);
                    } else {
                        buf.put_u8(0);
                    }
                }
            }
        }
        InternalPacket::PlayerInfoRemove { uuids } => {
            write_varint(&mut buf, PLAY_PLAYER_INFO_REMOVE);
            write_varint(&mut buf, uuids.len() as i32);
            for uuid in uuids {
                write_uuid(&mut buf, uuid);
            }
        }
        InternalPacket::SystemChatMessage { content, overlay } => {
            write_varint(&mut buf, PLAY_SYSTEM_CHAT_MESSAGE);
            let nbt = NbtValue::Compound(vec![(
                "text".into(),
                NbtValue::String(content.text.clone()),
            )]);
            let mut nbt_buf = BytesMut::new();
            nbt.write_root_network(&mut nbt_buf);
            buf.extend_from_slice(&nbt_buf);
            buf.put_u8(*overlay as u8);
        }
        _ => bail!("Cannot encode {:?} in Play state", std::mem::discriminant(packet)),
    }
    Ok(buf)
}

fn encode_light_data(buf: &mut BytesMut, light: &ChunkLightData) {
    // Sky light mask
    write_varint(buf, light.sky_light_mask.len() as i32);
    for v in &light.sky_light_mask {
        buf.put_i64(*v);
    }
    // Block light mask
    write_varint(buf, light.block_light_mask.len() as i32);
    for v in &light.block_light_mask {
        buf.put_i64(*v);
    }
    // Empty sky light mask
    write_varint(buf, light.empty_sky_light_mask.len() as i32);
    for v in &light.empty_sky_light_mask {
        buf.put_i64(*v);
    }
    // Empty block light mask
    write_varint(buf, light.empty_block_light_mask.len() as i32);
    for v in &light.empty_block_light_mask {
        buf.put_i64(*v);
    }
    // Sky light arrays
    write_varint(buf, light.sky_light_arrays.len() as i32);
    for arr in &light.sky_light_arrays {
        write_varint(buf, arr.len() as i32);
        buf.extend_from_slice(arr);
    }
    // Block light arrays
    write_varint(buf, light.block_light_arrays.len() as i32);
    for arr in &light.block_light_arrays {
        write_varint(buf, arr.len() as i32);
        buf.extend_from_slice(arr);
    }
}

