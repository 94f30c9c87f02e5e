use crate::pipeline::ChunkPipeline;
use crate::player::{DestroyState, Player};
use crate::world::WorldState;
use std::sync::Arc;
use strata_data::{block_state_to_hardness, item_id_to_block_state, item_id_to_stack_size, tool_speed};
use strata_protocol_core::{
    player_info_actions, HashedSlot, InternalPacket,
};
use strata_types::{BlockPos, GameMode, ItemStack, Vec3d};
use tokio::sync::mpsc;
use tracing::debug;

/// Offsets a block position by a face index (0=down,1=up,2=north,3=south,4=west,5=east).
fn offset_by_face(pos: BlockPos, face: u8) -> BlockPos {
    match face {
        0 => BlockPos::new(pos.x, pos.y - 1, pos.z),
        1 => BlockPos::new(pos.x, pos.y + 1, pos.z),
        2 => BlockPos::new(pos.x, pos.y, pos.z - 1),
        3 => BlockPos::new(pos.x, pos.y, pos.z + 1),
        4 => BlockPos::new(pos.x - 1, pos.y, pos.z),
        5 => BlockPos::new(pos.x + 1, pos.y, pos.z),
        _ => pos,
    }
}

/// Per-connection state the dispatcher needs beyond what's on `Player` —
/// the current world tick (for the destroy-state machine) and the
/// outbound queue used to answer requests directly.
pub struct SessionContext<'a> {
    pub world: &'a Arc<WorldState>,
    pub player: &'a Arc<Player>,
    pub pipeline: &'a ChunkPipeline,
    pub outbound: &'a mpsc::Sender<InternalPacket>,
}

/// Dispatch one decoded serverbound Play packet. Returns `Ok(true)` to
/// keep the connection open, `Ok(false)` if the packet requested a clean
/// disconnect (none currently do; reserved for future chat commands).
pub async fn handle_packet(ctx: &SessionContext<'_>, packet: InternalPacket) -> anyhow::Result<bool> {
    match packet {
        InternalPacket::ConfirmTeleportation { .. } => {}

        InternalPacket::PlayerPosition { x, y, z, on_ground } => {
            let before = ctx.player.chunk_pos();
            ctx.player.set_position(Vec3d::new(x, y, z), on_ground);
            maybe_notify_chunk_move(ctx, before).await?;
        }

        InternalPacket::PlayerPositionAndRotation {
            x,
            y,
            z,
            yaw,
            pitch,
            on_ground,
        } => {
            let before = ctx.player.chunk_pos();
            ctx.player.set_position(Vec3d::new(x, y, z), on_ground);
            ctx.player.set_rotation(yaw, pitch, on_ground);
            maybe_notify_chunk_move(ctx, before).await?;
        }

        InternalPacket::PlayerRotation { yaw, pitch, on_ground } => {
            ctx.player.set_rotation(yaw, pitch, on_ground);
        }

        InternalPacket::PlayerOnGround { on_ground } => {
            ctx.player
                .on_ground
                .store(on_ground, std::sync::atomic::Ordering::Relaxed);
        }

        InternalPacket::HeldItemChange { slot } => {
            let mut inv = ctx.player.inventory.lock().expect("inventory lock poisoned");
            if (0..9).contains(&slot) {
                inv.selected_hotbar = slot as u8;
            }
        }

        InternalPacket::CreativeInventoryAction { slot, item } => {
            let mode = *ctx.player.game_mode.lock().expect("game_mode lock poisoned");
            if mode != GameMode::Creative {
                debug!(player = %ctx.player.profile.name, "ignoring creative inventory action outside creative mode");
            } else if slot >= 0 && (slot as usize) < 45 {
                let mut inv = ctx.player.inventory.lock().expect("inventory lock poisoned");
                inv.set_slot(slot as usize, item);
            }
        }

        InternalPacket::ClickContainer {
            window_id,
            state_id,
            slot,
            button,
            mode,
            changed_slots,
            carried_item,
        } => {
            handle_click_container(
                ctx,
                window_id,
                state_id,
                slot,
                button,
                mode,
                changed_slots,
                carried_item,
            )
            .await?;
        }

        InternalPacket::CloseContainer { window_id } => {
            let dropped = {
                let mut inv = ctx.player.inventory.lock().expect("inventory lock poisoned");
                if window_id != 0 { inv.cursor.take() } else { None }
            };
            if let Some(item) = dropped {
                ctx.world.spawn_dropped_item(item, ctx.player.position());
            }
        }

        InternalPacket::PlayerAction {
            status,
            position,
            face,
            sequence,
        } => {
            handle_player_action(ctx, status, position, face, sequence).await?;
        }

        InternalPacket::UseItemOn {
            position,
            face,
            sequence,
            ..
        } => {
            handle_use_item_on(ctx, position, face, sequence).await?;
        }

        InternalPacket::ChatMessage { message, .. } => {
            debug!(player = %ctx.player.profile.name, %message, "chat message (not broadcast: no chat routing in scope)");
        }

        InternalPacket::ChatCommand { command } => {
            debug!(player = %ctx.player.profile.name, %command, "chat command (no command dispatcher registered)");
        }

        InternalPacket::KeepAliveServerbound { .. } => {
            // handled by the connection's keep-alive tracker, not here
        }

        InternalPacket::Unknown { packet_id, .. } => {
            debug!(packet_id = format!("0x{:02X}", packet_id), "ignoring unhandled play packet");
        }

        _ => {}
    }
    Ok(true)
}

async fn maybe_notify_chunk_move(
    ctx: &SessionContext<'_>,
    before: strata_types::ChunkPos,
) -> anyhow::Result<()> {
    let after = ctx.player.chunk_pos();
    if before != after {
        ctx.pipeline.update_desired(after, ctx.player.view_distance());
        ctx.outbound
            .send(InternalPacket::SetCenterChunk {
                chunk_x: after.x,
                chunk_z: after.z,
            })
            .await?;
    }
    Ok(())
}

/// Resolves a click against the server's own inventory state, then resyncs
/// the client if its hashed prediction disagrees with the result, per §4.6:
/// the client's `state_id` and slot hashes are a verification check, never
/// data to apply — `HashedSlot` carries no real item data to apply from.
async fn handle_click_container(
    ctx: &SessionContext<'_>,
    window_id: u8,
    state_id: i32,
    slot: i16,
    button: i8,
    mode: i32,
    changed_slots: Vec<(i16, Option<HashedSlot>)>,
    carried_item: Option<HashedSlot>,
) -> anyhow::Result<()> {
    let mut inv = ctx.player.inventory.lock().expect("inventory lock poisoned");

    if state_id != inv.state_id {
        drop(inv);
        resync_container(ctx, window_id).await?;
        return Ok(());
    }

    let idx = usize::try_from(slot).ok().filter(|&i| i < inv.slots.len());
    let dropped = match (mode, idx) {
        (0, Some(i)) => {
            apply_normal_click(&mut inv, i, button);
            None
        }
        (1, Some(i)) => {
            apply_shift_click(&mut inv, i);
            None
        }
        (2, Some(i)) => {
            apply_number_key_swap(&mut inv, i, button);
            None
        }
        (4, Some(i)) => apply_drop_click(&mut inv, i, button),
        // Mode 3 (creative middle-click clone), 5 (drag) and 6
        // (double-click collect) aren't modeled; left as a no-op so an
        // unrecognized click just falls through to the resync check below.
        _ => None,
    };

    let slot_matches = idx
        .map(|i| {
            changed_slots
                .iter()
                .find(|(si, _)| *si == slot)
                .map(|(_, hashed)| hashes_match(inv.slots[i].as_ref(), hashed.as_ref()))
                .unwrap_or(true)
        })
        .unwrap_or(true);
    let cursor_matches = hashes_match(inv.cursor.as_ref(), carried_item.as_ref());
    let needs_resync = !slot_matches || !cursor_matches;
    drop(inv);

    if let Some(item) = dropped {
        ctx.world.spawn_dropped_item(item, ctx.player.position());
    }
    if needs_resync {
        resync_container(ctx, window_id).await?;
    }
    Ok(())
}

/// Mode 0: left click (button 0) swaps the clicked slot with the cursor,
/// merging same-item stacks up to the max stack size; right click (button
/// 1) moves a single item each way.
fn apply_normal_click(inv: &mut strata_types::Inventory, idx: usize, button: i8) {
    let slot_item = inv.slots[idx].take();
    let cursor_item = inv.cursor.take();
    let (new_slot, new_cursor) = match button {
        1 => normal_click_right(slot_item, cursor_item),
        _ => normal_click_left(slot_item, cursor_item),
    };
    inv.slots[idx] = new_slot;
    inv.cursor = new_cursor;
    inv.state_id = inv.state_id.wrapping_add(1);
}

fn normal_click_left(
    slot_item: Option<ItemStack>,
    cursor_item: Option<ItemStack>,
) -> (Option<ItemStack>, Option<ItemStack>) {
    match (slot_item, cursor_item) {
        (Some(mut s), Some(mut c)) if s.item_id == c.item_id => {
            let max = item_id_to_stack_size(s.item_id).unwrap_or(64) as u8;
            let moved = max.saturating_sub(s.count).min(c.count);
            s.count += moved;
            c.count -= moved;
            (Some(s), if c.count > 0 { Some(c) } else { None })
        }
        (s, c) => (c, s),
    }
}

fn normal_click_right(
    slot_item: Option<ItemStack>,
    cursor_item: Option<ItemStack>,
) -> (Option<ItemStack>, Option<ItemStack>) {
    match (slot_item, cursor_item) {
        (Some(mut s), Some(mut c)) if s.item_id == c.item_id => {
            let max = item_id_to_stack_size(s.item_id).unwrap_or(64) as u8;
            if s.count < max {
                s.count += 1;
                c.count -= 1;
            }
            (Some(s), if c.count > 0 { Some(c) } else { None })
        }
        (Some(mut s), None) => {
            let half = s.count.div_ceil(2);
            let taken = s.split(half);
            (if s.count > 0 { Some(s) } else { None }, Some(taken))
        }
        (None, Some(mut c)) => {
            let one = c.split(1);
            (Some(one), if c.count > 0 { Some(c) } else { None })
        }
        (s, c) => (s, c),
    }
}

/// Mode 1: shift-click moves the full stack to the complementary region
/// (hotbar <-> main+armor), merging into existing stacks first and
/// spilling into the first empty slot.
fn apply_shift_click(inv: &mut strata_types::Inventory, idx: usize) {
    let Some(mut item) = inv.slots[idx].take() else {
        return;
    };
    let destinations: Vec<usize> = if strata_types::Inventory::HOTBAR.contains(&idx) {
        strata_types::Inventory::MAIN.collect()
    } else {
        strata_types::Inventory::HOTBAR.collect()
    };
    for &dest in &destinations {
        if item.count == 0 {
            break;
        }
        if let Some(existing) = inv.slots[dest].as_mut() {
            if existing.item_id == item.item_id {
                let max = item_id_to_stack_size(existing.item_id).unwrap_or(64) as u8;
                let moved = max.saturating_sub(existing.count).min(item.count);
                existing.count += moved;
                item.count -= moved;
            }
        }
    }
    if item.count > 0 {
        match destinations.iter().find(|&&d| inv.slots[d].is_none()) {
            Some(&dest) => inv.slots[dest] = Some(item),
            None => inv.slots[idx] = Some(item),
        }
    }
    inv.state_id = inv.state_id.wrapping_add(1);
}

/// Mode 2: number-key swap exchanges the clicked slot with hotbar slot
/// `button` (0-8).
fn apply_number_key_swap(inv: &mut strata_types::Inventory, idx: usize, button: i8) {
    if !(0..9).contains(&button) {
        return;
    }
    let hotbar_idx = strata_types::Inventory::HOTBAR.start + button as usize;
    inv.slots.swap(idx, hotbar_idx);
    inv.state_id = inv.state_id.wrapping_add(1);
}

/// Mode 4: drop. Button 1 drops the whole stack, button 0 drops a single
/// item. Returns the stack to spawn as a dropped-item entity.
fn apply_drop_click(inv: &mut strata_types::Inventory, idx: usize, button: i8) -> Option<ItemStack> {
    if inv.slots[idx].is_none() {
        return None;
    }
    inv.state_id = inv.state_id.wrapping_add(1);
    if button == 1 {
        inv.slots[idx].take()
    } else {
        let stack = inv.slots[idx].as_mut().unwrap();
        let single = stack.split(1);
        if stack.count == 0 {
            inv.slots[idx] = None;
        }
        Some(single)
    }
}

fn hashes_match(stack: Option<&ItemStack>, hashed: Option<&HashedSlot>) -> bool {
    match (stack, hashed) {
        (None, None) => true,
        (Some(item), Some(hashed)) => {
            strata_protocol_core::hash_item_stack(item).item_id == hashed.item_id
                && strata_protocol_core::hash_item_stack(item).count == hashed.count
        }
        _ => false,
    }
}

async fn resync_container(ctx: &SessionContext<'_>, window_id: u8) -> anyhow::Result<()> {
    let inv = ctx.player.inventory.lock().expect("inventory lock poisoned");
    ctx.outbound
        .send(InternalPacket::SetContainerContent {
            window_id,
            state_id: inv.state_id,
            slots: inv.to_slot_vec(),
            carried_item: inv.cursor.clone(),
        })
        .await?;
    Ok(())
}

/// Drives the destroy-state machine: status 0 starts a break, 1 cancels,
/// 2 finishes it. Required tick count follows §4.6's formula; completion
/// before that many ticks have elapsed is ignored rather than trusted.
async fn handle_player_action(
    ctx: &SessionContext<'_>,
    status: i32,
    position: BlockPos,
    _face: u8,
    sequence: i32,
) -> anyhow::Result<()> {
    let world_tick = ctx.world.time.snapshot().0;
    let mode = *ctx.player.game_mode.lock().expect("game_mode lock poisoned");

    match status {
        0 => {
            if mode == GameMode::Creative {
                break_block(ctx, position, sequence).await?;
                return Ok(());
            }
            let block_state = ctx.world.chunks.get_block(position.x, position.y, position.z).await;
            let Some((hardness, harvestable)) = block_state_to_hardness(block_state) else {
                return Ok(());
            };
            if hardness < 0.0 {
                return Ok(());
            }
            let held_item_name = {
                let inv = ctx.player.inventory.lock().expect("inventory lock poisoned");
                inv.held_item().and_then(|s| strata_data::item_id_to_name(s.item_id)).unwrap_or("air").to_string()
            };
            let speed = tool_speed(&held_item_name, block_state) as f64;
            let base = if harvestable { 30.0 } else { 100.0 };
            // Floor of 0: a hardness-0 block (e.g. tall grass) finishes on
            // the same tick it started, per §4.6.
            let required_ticks = (hardness / speed / base) as i64;
            *ctx.player.destroying.lock().expect("destroying lock poisoned") = Some(DestroyState {
                position,
                start_tick: world_tick,
                required_ticks,
            });
        }
        1 | 2 => {
            let state = ctx.player.destroying.lock().expect("destroying lock poisoned").take();
            if status == 2 {
                if let Some(state) = state {
                    if state.position == position {
                        let elapsed = world_tick - state.start_tick;
                        if (elapsed as f64) >= 0.7 * state.required_ticks as f64 {
                            break_block(ctx, position, sequence).await?;
                            return Ok(());
                        }
                    }
                }
                // Client thought it finished but server's gate disagrees:
                // resend the current state so the client rolls back the break.
                let block_state = ctx.world.chunks.get_block(position.x, position.y, position.z).await;
                ctx.outbound
                    .send(InternalPacket::BlockUpdate {
                        position,
                        block_id: block_state,
                    })
                    .await?;
            }
            ctx.outbound
                .send(InternalPacket::AcknowledgeBlockChange { sequence })
                .await?;
        }
        _ => {
            ctx.outbound
                .send(InternalPacket::AcknowledgeBlockChange { sequence })
                .await?;
        }
    }
    Ok(())
}

async fn break_block(ctx: &SessionContext<'_>, position: BlockPos, sequence: i32) -> anyhow::Result<()> {
    ctx.world.chunks.set_block(position.x, position.y, position.z, 0).await;
    ctx.outbound
        .send(InternalPacket::BlockUpdate {
            position,
            block_id: 0,
        })
        .await?;
    ctx.outbound
        .send(InternalPacket::AcknowledgeBlockChange { sequence })
        .await?;
    broadcast_block_update(ctx, position, 0).await;
    Ok(())
}

/// Broadcasts to every session whose player's loaded-chunk set includes
/// this block's chunk, per §4.6's scoped-broadcast note.
async fn broadcast_block_update(ctx: &SessionContext<'_>, position: BlockPos, block_id: i32) {
    let chunk = position.chunk_pos();
    for other in ctx.world.players_snapshot() {
        if other.loaded_chunks.contains(&chunk) {
            other.try_send(InternalPacket::BlockUpdate { position, block_id });
        }
    }
}

/// Resolves the held item to a block state and places it adjacent to the
/// clicked face, acking via the action's sequence number either way.
async fn handle_use_item_on(
    ctx: &SessionContext<'_>,
    position: BlockPos,
    face: u8,
    sequence: i32,
) -> anyhow::Result<()> {
    let held_item_id = {
        let inv = ctx.player.inventory.lock().expect("inventory lock poisoned");
        inv.held_item().map(|s| s.item_id)
    };

    let Some(item_id) = held_item_id else {
        ctx.outbound
            .send(InternalPacket::AcknowledgeBlockChange { sequence })
            .await?;
        return Ok(());
    };

    let Some(block_state) = item_id_to_block_state(item_id) else {
        ctx.outbound
            .send(InternalPacket::AcknowledgeBlockChange { sequence })
            .await?;
        return Ok(());
    };

    let target = offset_by_face(position, face);
    let existing = ctx.world.chunks.get_block(target.x, target.y, target.z).await;
    if existing != 0 {
        ctx.outbound
            .send(InternalPacket::AcknowledgeBlockChange { sequence })
            .await?;
        return Ok(());
    }

    ctx.world
        .chunks
        .set_block(target.x, target.y, target.z, block_state)
        .await;
    ctx.outbound
        .send(InternalPacket::BlockUpdate {
            position: target,
            block_id: block_state,
        })
        .await?;
    ctx.outbound
        .send(InternalPacket::AcknowledgeBlockChange { sequence })
        .await?;

    let mode = *ctx.player.game_mode.lock().expect("game_mode lock poisoned");
    if mode != GameMode::Creative {
        let mut inv = ctx.player.inventory.lock().expect("inventory lock poisoned");
        let hotbar_slot = strata_types::Inventory::HOTBAR.start + inv.selected_hotbar as usize;
        if let Some(stack) = inv.slots[hotbar_slot].as_mut() {
            stack.count = stack.count.saturating_sub(1);
            if stack.count == 0 {
                inv.slots[hotbar_slot] = None;
                inv.state_id = inv.state_id.wrapping_add(1);
            }
        }
    }

    broadcast_block_update(ctx, target, block_state).await;
    Ok(())
}

pub fn player_info_entry_add(player: &Player) -> strata_protocol_core::PlayerInfoEntry {
    strata_protocol_core::PlayerInfoEntry {
        uuid: player.profile.uuid,
        name: Some(player.profile.name.clone()),
        properties: player
            .profile
            .properties
            .iter()
            .map(|p| (p.name.clone(), p.value.clone(), p.signature.clone()))
            .collect(),
        game_mode: Some(player.game_mode.lock().expect("game_mode lock poisoned").id() as i32),
        listed: Some(true),
        ping: Some(0),
        display_name: None,
    }
}

pub const PLAYER_INFO_ADD_ACTIONS: u8 = player_info_actions::ADD_PLAYER
    | player_info_actions::UPDATE_LISTED
    | player_info_actions::UPDATE_GAME_MODE
    | player_info_actions::UPDATE_LATENCY;
