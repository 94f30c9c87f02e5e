use bytes::{Buf, BufMut, BytesMut};
use strata_types::{ItemComponent, ItemStack};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("VarInt too big")]
    VarIntTooBig,
    #[error("Not enough data")]
    NotEnoughData,
    #[error("String too long: {0} > {1}")]
    StringTooLong(usize, usize),
    #[error("unknown item component type {0}")]
    UnknownComponentType(i32),
    #[error("malformed NBT while skipping component payload")]
    MalformedNbt,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

fn require(buf: &BytesMut, n: usize) -> CodecResult<()> {
    if buf.remaining() < n {
        Err(CodecError::NotEnoughData)
    } else {
        Ok(())
    }
}

/// Read a VarInt from the buffer.
pub fn read_varint(buf: &mut BytesMut) -> CodecResult<i32> {
    let mut result: i32 = 0;
    let mut shift: u32 = 0;
    loop {
        if !buf.has_remaining() {
            return Err(CodecError::NotEnoughData);
        }
        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as i32) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 32 {
            return Err(CodecError::VarIntTooBig);
        }
    }
}

/// Write a VarInt to the buffer.
pub fn write_varint(buf: &mut BytesMut, mut value: i32) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value = ((value as u32) >> 7) as i32;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Calculate the byte length of a VarInt.
pub fn varint_len(value: i32) -> usize {
    let mut val = value as u32;
    let mut len = 0;
    loop {
        len += 1;
        val >>= 7;
        if val == 0 {
            break;
        }
    }
    len
}

/// Write a VarInt to a Vec<u8>.
pub fn write_varint_vec(buf: &mut Vec<u8>, mut value: i32) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value = ((value as u32) >> 7) as i32;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Read a VarLong from the buffer.
pub fn read_varlong(buf: &mut BytesMut) -> CodecResult<i64> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    loop {
        if !buf.has_remaining() {
            return Err(CodecError::NotEnoughData);
        }
        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as i64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 70 {
            return Err(CodecError::VarIntTooBig);
        }
    }
}

/// Write a VarLong to the buffer.
pub fn write_varlong(buf: &mut BytesMut, mut value: i64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value = ((value as u64) >> 7) as i64;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Read a protocol string (varint-prefixed UTF-8).
pub fn read_string(buf: &mut BytesMut, max_len: usize) -> CodecResult<String> {
    let len = read_varint(buf)? as usize;
    if len > max_len * 4 {
        return Err(CodecError::StringTooLong(len, max_len));
    }
    require(buf, len)?;
    let bytes = buf.split_to(len);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write a protocol string.
pub fn write_string(buf: &mut BytesMut, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.put_slice(s.as_bytes());
}

/// Read a UUID (128 bits, big endian).
pub fn read_uuid(buf: &mut BytesMut) -> CodecResult<Uuid> {
    require(buf, 16)?;
    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    Ok(Uuid::from_bytes(bytes))
}

/// Write a UUID.
pub fn write_uuid(buf: &mut BytesMut, uuid: &Uuid) {
    buf.put_slice(uuid.as_bytes());
}

/// Read a byte array with varint length prefix.
pub fn read_byte_array(buf: &mut BytesMut) -> CodecResult<Vec<u8>> {
    let len = read_varint(buf)? as usize;
    require(buf, len)?;
    let bytes = buf.split_to(len);
    Ok(bytes.to_vec())
}

/// Write a byte array with varint length prefix.
pub fn write_byte_array(buf: &mut BytesMut, data: &[u8]) {
    write_varint(buf, data.len() as i32);
    buf.put_slice(data);
}

pub fn read_bool(buf: &mut BytesMut) -> CodecResult<bool> {
    require(buf, 1)?;
    Ok(buf.get_u8() != 0)
}

pub fn write_bool(buf: &mut BytesMut, v: bool) {
    buf.put_u8(if v { 1 } else { 0 });
}

/// Read an Angle: one byte, value * 360/256 degrees.
pub fn read_angle(buf: &mut BytesMut) -> CodecResult<f32> {
    require(buf, 1)?;
    Ok(buf.get_u8() as f32 * (360.0 / 256.0))
}

/// Write an Angle.
pub fn write_angle(buf: &mut BytesMut, degrees: f32) {
    let wrapped = degrees.rem_euclid(360.0);
    buf.put_u8((wrapped * (256.0 / 360.0)).round() as u8);
}

/// Read a BitSet: VarInt word count, then that many 64-bit words.
pub fn read_bitset(buf: &mut BytesMut) -> CodecResult<Vec<u64>> {
    let count = read_varint(buf)? as usize;
    require(buf, count * 8)?;
    let mut words = Vec::with_capacity(count);
    for _ in 0..count {
        words.push(buf.get_u64());
    }
    Ok(words)
}

/// Write a BitSet.
pub fn write_bitset(buf: &mut BytesMut, words: &[u64]) {
    write_varint(buf, words.len() as i32);
    for w in words {
        buf.put_u64(*w);
    }
}

/// Smallest bit width that can index `n` distinct values (0 for n <= 1).
fn bits_needed(n: usize) -> u8 {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as u8
    }
}

/// Pack `count` entries, each `bits` wide and produced by `value_at`, LSB
/// first into 64-bit words with no entry spanning a word boundary, prefixed
/// by a VarInt word count.
fn write_packed_entries(buf: &mut BytesMut, count: usize, bits: u8, value_at: impl Fn(usize) -> u64) {
    let entries_per_long = 64 / bits as usize;
    let longs_needed = (count + entries_per_long - 1) / entries_per_long;
    write_varint(buf, longs_needed as i32);
    let mask = (1u64 << bits) - 1;
    let mut words = vec![0i64; longs_needed];
    for i in 0..count {
        let v = value_at(i) & mask;
        let long_index = i / entries_per_long;
        let bit_index = (i % entries_per_long) * bits as usize;
        words[long_index] |= (v << bit_index) as i64;
    }
    for w in words {
        buf.put_i64(w);
    }
}

/// Write a paletted container: `u8 bits_per_entry`, then a single VarInt
/// value with an (empty) data array when uniform, an indirect palette +
/// packed indices when `bits_needed(palette.len())` fits in
/// `[min_indirect_bits, max_indirect_bits]`, or a direct (global-id) packing
/// at `direct_bits` otherwise.
fn write_paletted_container(
    buf: &mut BytesMut,
    palette: &[i32],
    indices: &[u16],
    min_indirect_bits: u8,
    max_indirect_bits: u8,
    direct_bits: u8,
) {
    if palette.len() <= 1 {
        buf.put_u8(0);
        write_varint(buf, palette.first().copied().unwrap_or(0));
        write_varint(buf, 0);
        return;
    }
    let needed = bits_needed(palette.len()).max(min_indirect_bits);
    if needed <= max_indirect_bits {
        buf.put_u8(needed);
        write_varint(buf, palette.len() as i32);
        for &id in palette {
            write_varint(buf, id);
        }
        write_packed_entries(buf, indices.len(), needed, |i| indices[i] as u64);
    } else {
        buf.put_u8(direct_bits);
        write_packed_entries(buf, indices.len(), direct_bits, |i| {
            palette[indices[i] as usize] as u64
        });
    }
}

/// Write a 4096-entry block-state paletted container: bits=0 uniform,
/// bits∈[4,8] indirect, bits=15 direct (global palette).
pub fn write_paletted_container_block_states(buf: &mut BytesMut, palette: &[i32], indices: &[u16]) {
    write_paletted_container(buf, palette, indices, 4, 8, 15);
}

/// Write a 64-entry biome paletted container: bits=0 uniform, bits∈[1,3]
/// indirect, bits=6 direct.
pub fn write_paletted_container_biomes(buf: &mut BytesMut, palette: &[i32], indices: &[u16]) {
    write_paletted_container(buf, palette, indices, 1, 3, 6);
}

/// Skip one network-format NBT tag's payload (no name prefix) given its tag
/// id, returning nothing — used only to find the component payload's byte
/// length, not to reconstruct its structure.
fn skip_nbt_tag(buf: &mut BytesMut, tag_id: u8) -> CodecResult<()> {
    match tag_id {
        strata_nbt::TAG_END => {}
        strata_nbt::TAG_BYTE => {
            require(buf, 1)?;
            buf.advance(1);
        }
        strata_nbt::TAG_SHORT => {
            require(buf, 2)?;
            buf.advance(2);
        }
        strata_nbt::TAG_INT => {
            require(buf, 4)?;
            buf.advance(4);
        }
        strata_nbt::TAG_LONG => {
            require(buf, 8)?;
            buf.advance(8);
        }
        strata_nbt::TAG_FLOAT => {
            require(buf, 4)?;
            buf.advance(4);
        }
        strata_nbt::TAG_DOUBLE => {
            require(buf, 8)?;
            buf.advance(8);
        }
        strata_nbt::TAG_BYTE_ARRAY => {
            require(buf, 4)?;
            let n = buf.get_i32().max(0) as usize;
            require(buf, n)?;
            buf.advance(n);
        }
        strata_nbt::TAG_STRING => {
            require(buf, 2)?;
            let len = buf.get_u16() as usize;
            require(buf, len)?;
            buf.advance(len);
        }
        strata_nbt::TAG_LIST => {
            require(buf, 1)?;
            let elem_id = buf.get_u8();
            require(buf, 4)?;
            let n = buf.get_i32().max(0);
            for _ in 0..n {
                skip_nbt_tag(buf, elem_id)?;
            }
        }
        strata_nbt::TAG_COMPOUND => loop {
            require(buf, 1)?;
            let id = buf.get_u8();
            if id == strata_nbt::TAG_END {
                break;
            }
            require(buf, 2)?;
            let name_len = buf.get_u16() as usize;
            require(buf, name_len)?;
            buf.advance(name_len);
            skip_nbt_tag(buf, id)?;
        },
        strata_nbt::TAG_INT_ARRAY => {
            require(buf, 4)?;
            let n = buf.get_i32().max(0) as usize;
            require(buf, n * 4)?;
            buf.advance(n * 4);
        }
        strata_nbt::TAG_LONG_ARRAY => {
            require(buf, 4)?;
            let n = buf.get_i32().max(0) as usize;
            require(buf, n * 8)?;
            buf.advance(n * 8);
        }
        _ => return Err(CodecError::MalformedNbt),
    }
    Ok(())
}

/// Type-indexed skip table for item component payloads. Each arm consumes
/// exactly the bytes that component type occupies; the raw bytes consumed
/// are captured by the caller via the buffer's remaining-length delta, so
/// adding a new known type here never changes how unknown types behave.
fn skip_component_payload(buf: &mut BytesMut, type_id: i32) -> CodecResult<()> {
    match type_id {
        // custom_data: network NBT (tag id byte + payload, no name)
        0 => {
            require(buf, 1)?;
            let tag_id = buf.get_u8();
            skip_nbt_tag(buf, tag_id)?;
        }
        // max_stack_size, max_damage, damage, rarity: single VarInt
        1 | 2 | 3 | 8 => {
            read_varint(buf)?;
        }
        // unbreakable: no payload
        4 => {}
        // custom_name, item_name: network NBT text component
        5 | 6 => {
            require(buf, 1)?;
            let tag_id = buf.get_u8();
            skip_nbt_tag(buf, tag_id)?;
        }
        // lore: VarInt count, then that many NBT text components
        7 => {
            let n = read_varint(buf)?;
            for _ in 0..n {
                require(buf, 1)?;
                let tag_id = buf.get_u8();
                skip_nbt_tag(buf, tag_id)?;
            }
        }
        // enchantments, stored_enchantments: VarInt count, then (VarInt id, VarInt level) pairs
        9 | 17 => {
            let n = read_varint(buf)?;
            for _ in 0..n {
                read_varint(buf)?;
                read_varint(buf)?;
            }
        }
        other => return Err(CodecError::UnknownComponentType(other)),
    }
    Ok(())
}

/// Read a Slot from the wire (component-based format). Returns `None` for
/// an empty slot. Unknown component types surface as a decode error rather
/// than silently desyncing the rest of the packet.
pub fn read_slot(buf: &mut BytesMut) -> CodecResult<Option<ItemStack>> {
    let item_count = read_varint(buf)?;
    if item_count <= 0 {
        return Ok(None);
    }
    let item_id = read_varint(buf)?;
    let add_count = read_varint(buf)?;
    let mut components = Vec::with_capacity(add_count.max(0) as usize);
    for _ in 0..add_count {
        let type_id = read_varint(buf)?;
        let snapshot = buf.chunk().to_vec();
        skip_component_payload(buf, type_id)?;
        let consumed = snapshot.len() - buf.remaining();
        components.push(ItemComponent {
            type_id,
            payload: snapshot[..consumed].to_vec(),
        });
    }
    let remove_count = read_varint(buf)?;
    for _ in 0..remove_count {
        read_varint(buf)?;
    }
    Ok(Some(ItemStack {
        item_id,
        count: item_count.clamp(0, u8::MAX as i32) as u8,
        components,
    }))
}

/// Write a Slot to the wire.
pub fn write_slot(buf: &mut BytesMut, slot: &Option<ItemStack>) {
    match slot {
        None => write_varint(buf, 0),
        Some(item) => {
            write_varint(buf, item.count as i32);
            write_varint(buf, item.item_id);
            write_varint(buf, item.components.len() as i32);
            for component in &item.components {
                write_varint(buf, component.type_id);
                buf.put_slice(&component.payload);
            }
            write_varint(buf, 0); // no removed components on a fresh write
        }
    }
}

/// The hashed form of a slot used only in Click Container: component
/// payloads are replaced by their CRC32C so the client can cheaply confirm
/// the server's view without resending full payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedSlot {
    pub item_id: i32,
    pub count: i32,
    pub component_hashes: Vec<(i32, u32)>,
    pub removed_components: Vec<i32>,
}

pub fn compute_component_hash(payload: &[u8]) -> u32 {
    crc32c::crc32c(payload)
}

pub fn hash_item_stack(item: &ItemStack) -> HashedSlot {
    HashedSlot {
        item_id: item.item_id,
        count: item.count as i32,
        component_hashes: item
            .components
            .iter()
            .map(|c| (c.type_id, compute_component_hash(&c.payload)))
            .collect(),
        removed_components: Vec::new(),
    }
}

pub fn read_hashed_slot(buf: &mut BytesMut) -> CodecResult<Option<HashedSlot>> {
    if !read_bool(buf)? {
        return Ok(None);
    }
    let item_id = read_varint(buf)?;
    let count = read_varint(buf)?;
    let add_count = read_varint(buf)?;
    let mut component_hashes = Vec::with_capacity(add_count.max(0) as usize);
    for _ in 0..add_count {
        let type_id = read_varint(buf)?;
        require(buf, 4)?;
        component_hashes.push((type_id, buf.get_u32()));
    }
    let remove_count = read_varint(buf)?;
    let mut removed_components = Vec::with_capacity(remove_count.max(0) as usize);
    for _ in 0..remove_count {
        removed_components.push(read_varint(buf)?);
    }
    Ok(Some(HashedSlot {
        item_id,
        count,
        component_hashes,
        removed_components,
    }))
}

pub fn write_hashed_slot(buf: &mut BytesMut, slot: &Option<HashedSlot>) {
    match slot {
        None => write_bool(buf, false),
        Some(hashed) => {
            write_bool(buf, true);
            write_varint(buf, hashed.item_id);
            write_varint(buf, hashed.count);
            write_varint(buf, hashed.component_hashes.len() as i32);
            for (type_id, hash) in &hashed.component_hashes {
                write_varint(buf, *type_id);
                buf.put_u32(*hash);
            }
            write_varint(buf, hashed.removed_components.len() as i32);
            for type_id in &hashed.removed_components {
                write_varint(buf, *type_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_roundtrip() {
        let test_cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (255, vec![0xFF, 0x01]),
            (25565, vec![0xDD, 0xC7, 0x01]),
            (2097151, vec![0xFF, 0xFF, 0x7F]),
            (-1, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];

        for (value, expected_bytes) in test_cases {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            assert_eq!(
                buf.to_vec(),
                expected_bytes,
                "write_varint({}) failed",
                value
            );

            let mut buf = BytesMut::from(&expected_bytes[..]);
            let result = read_varint(&mut buf).unwrap();
            assert_eq!(result, value, "read_varint for {} failed", value);
        }
    }

    #[test]
    fn test_varint_len() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(25565), 3);
        assert_eq!(varint_len(-1), 5);
    }

    #[test]
    fn test_varlong_roundtrip() {
        for value in [0i64, 1, -1, i64::MAX, i64::MIN, 123456789012345] {
            let mut buf = BytesMut::new();
            write_varlong(&mut buf, value);
            assert!(buf.len() <= 10);
            let result = read_varlong(&mut buf).unwrap();
            assert_eq!(result, value);
        }
    }

    #[test]
    fn test_string_roundtrip() {
        let test_str = "Hello, Minecraft!";
        let mut buf = BytesMut::new();
        write_string(&mut buf, test_str);
        let result = read_string(&mut buf, 32767).unwrap();
        assert_eq!(result, test_str);
    }

    #[test]
    fn test_uuid_roundtrip() {
        let uuid = Uuid::new_v4();
        let mut buf = BytesMut::new();
        write_uuid(&mut buf, &uuid);
        let result = read_uuid(&mut buf).unwrap();
        assert_eq!(result, uuid);
    }

    #[test]
    fn test_angle_roundtrip() {
        let mut buf = BytesMut::new();
        write_angle(&mut buf, 180.0);
        let result = read_angle(&mut buf).unwrap();
        assert!((result - 180.0).abs() < 1.5);
    }

    #[test]
    fn test_bitset_roundtrip() {
        let words = vec![0xFFFF_FFFF_0000_0000u64, 1];
        let mut buf = BytesMut::new();
        write_bitset(&mut buf, &words);
        let result = read_bitset(&mut buf).unwrap();
        assert_eq!(result, words);
    }

    #[test]
    fn test_slot_empty_roundtrip() {
        let mut buf = BytesMut::new();
        write_slot(&mut buf, &None);
        let result = read_slot(&mut buf).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_slot_with_known_component_roundtrip() {
        let item = ItemStack {
            item_id: 5,
            count: 12,
            components: vec![ItemComponent {
                type_id: 2, // max_damage: VarInt payload
                payload: {
                    let mut p = BytesMut::new();
                    write_varint(&mut p, 250);
                    p.to_vec()
                },
            }],
        };
        let mut buf = BytesMut::new();
        write_slot(&mut buf, &Some(item.clone()));
        let result = read_slot(&mut buf).unwrap().unwrap();
        assert_eq!(result, item);
    }

    #[test]
    fn test_slot_unknown_component_errors() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 1); // count
        write_varint(&mut buf, 5); // item id
        write_varint(&mut buf, 1); // one added component
        write_varint(&mut buf, 9001); // bogus type id
        let err = read_slot(&mut buf);
        assert!(matches!(err, Err(CodecError::UnknownComponentType(9001))));
    }

    #[test]
    fn test_paletted_container_uniform() {
        let mut buf = BytesMut::new();
        write_paletted_container_block_states(&mut buf, &[0], &[0u16; 4096]);
        assert_eq!(buf[0], 0); // bits_per_entry
        let mut rest = buf.split_off(1);
        assert_eq!(read_varint(&mut rest).unwrap(), 0); // the uniform value
        assert_eq!(read_varint(&mut rest).unwrap(), 0); // empty data array
    }

    #[test]
    fn test_paletted_container_indirect() {
        let palette = vec![0, 1, 2];
        let mut indices = [0u16; 4096];
        indices[1] = 1;
        indices[2] = 2;
        let mut buf = BytesMut::new();
        write_paletted_container_block_states(&mut buf, &palette, &indices);
        assert_eq!(buf[0], 4); // bits_needed(3).max(4) == 4
    }

    #[test]
    fn test_paletted_container_direct_fallback() {
        // > 256 distinct ids forces bits_needed above the indirect max (8),
        // so the container must switch to direct (15-bit) packing.
        let palette: Vec<i32> = (0..300).collect();
        let mut indices = [0u16; 4096];
        for (i, idx) in indices.iter_mut().enumerate() {
            *idx = (i % 300) as u16;
        }
        let mut buf = BytesMut::new();
        write_paletted_container_block_states(&mut buf, &palette, &indices);
        assert_eq!(buf[0], 15);
    }

    #[test]
    fn test_hashed_slot_roundtrip() {
        let hashed = HashedSlot {
            item_id: 7,
            count: 3,
            component_hashes: vec![(2, compute_component_hash(&[1, 2, 3]))],
            removed_components: vec![9],
        };
        let mut buf = BytesMut::new();
        write_hashed_slot(&mut buf, &Some(hashed.clone()));
        let result = read_hashed_slot(&mut buf).unwrap().unwrap();
        assert_eq!(result, hashed);
    }
}
