include!(concat!(env!("OUT_DIR"), "/generated.rs"));

/// Tool speed multiplier for a held item against a harvestable block, per
/// the reference client's break-time table. Returns 1.0 for a bare hand or
/// any tool not specifically suited to the block.
pub fn tool_speed(item_name: &str, block_state: i32) -> f32 {
    let Some(tools) = block_state_to_harvest_tools(block_state) else {
        return 1.0;
    };
    let Some(item_id) = item_name_to_id(item_name) else {
        return 1.0;
    };
    if !tools.contains(&item_id) {
        return 1.0;
    }
    if item_name.starts_with("wooden_") || item_name.starts_with("golden_") {
        2.0
    } else if item_name.starts_with("stone_") {
        4.0
    } else if item_name.starts_with("iron_") {
        6.0
    } else if item_name.starts_with("diamond_") {
        8.0
    } else if item_name.starts_with("netherite_") {
        9.0
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_lookups() {
        assert_eq!(block_name_to_default_state("air"), Some(0));
        assert_eq!(block_name_to_default_state("stone"), Some(1));
        assert_eq!(block_name_to_default_state("grass_block"), Some(9));
        assert_eq!(block_name_to_default_state("bedrock"), Some(79));
        assert_eq!(block_name_to_default_state("nonexistent"), None);
    }

    #[test]
    fn test_item_lookups() {
        assert_eq!(item_name_to_id("stone"), Some(1));
        assert_eq!(item_name_to_id("air"), Some(0));
        assert!(item_name_to_id("nonexistent").is_none());
    }

    #[test]
    fn test_item_to_block() {
        let stone_item = item_name_to_id("stone").unwrap();
        assert_eq!(item_id_to_block_state(stone_item), Some(1));
        let dirt_item = item_name_to_id("dirt").unwrap();
        assert_eq!(item_id_to_block_state(dirt_item), Some(10));
    }

    #[test]
    fn test_block_state_to_item() {
        let stone_item = block_state_to_item_id(1);
        assert!(stone_item.is_some());
    }

    #[test]
    fn test_item_id_to_name() {
        assert_eq!(item_id_to_name(1), Some("stone"));
        assert_eq!(item_id_to_name(0), Some("air"));
    }

    #[test]
    fn test_stack_size() {
        assert_eq!(item_id_to_stack_size(1), Some(64));
    }

    #[test]
    fn test_block_hardness() {
        assert_eq!(block_state_to_hardness(1), Some((1.5, true))); // stone
        assert_eq!(block_state_to_hardness(79), Some((-1.0, false))); // bedrock
        assert_eq!(block_state_to_hardness(0), Some((0.0, false))); // air
        assert_eq!(block_state_to_hardness(10), Some((0.5, true))); // dirt
    }

    #[test]
    fn test_block_drops() {
        assert_eq!(block_state_to_drops(1), &[35]); // stone -> cobblestone
        assert_eq!(block_state_to_drops(10), &[28]); // dirt -> dirt
        assert!(block_state_to_drops(0).is_empty()); // air -> nothing
    }

    #[test]
    fn test_harvest_tools() {
        let tools = block_state_to_harvest_tools(1).unwrap(); // stone requires pickaxes
        assert!(tools.contains(&820)); // wooden_pickaxe
        assert!(tools.contains(&845)); // netherite_pickaxe
        assert_eq!(block_state_to_harvest_tools(10), None); // dirt needs no tool
    }

    #[test]
    fn test_tool_speed() {
        let pick_id = item_name_to_id("wooden_pickaxe").unwrap();
        let speed = tool_speed("wooden_pickaxe", 1); // stone
        assert!(speed > 1.0);
        let _ = pick_id;
        assert_eq!(tool_speed("wooden_pickaxe", 10), 1.0); // dirt needs no tool
        assert_eq!(tool_speed("", 1), 1.0); // bare hand
    }
}
