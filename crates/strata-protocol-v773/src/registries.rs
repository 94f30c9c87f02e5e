use strata_nbt::{nbt_compound, NbtValue};
use strata_protocol_core::{InternalPacket, RegistryEntry};

/// Build every registry the 1.21.10 client requires to be present before it
/// will finish Configuration — one entry per registry is enough, the client
/// only needs *a* default variant/biome/dimension to resolve ids against.
pub fn build_registry_packets() -> Vec<InternalPacket> {
    vec![
        build_dimension_type_registry(),
        build_biome_registry(),
        build_damage_type_registry(),
        build_cat_variant_registry(),
        build_chicken_variant_registry(),
        build_cow_variant_registry(),
        build_frog_variant_registry(),
        build_pig_variant_registry(),
        build_wolf_variant_registry(),
        build_wolf_sound_variant_registry(),
        build_painting_variant_registry(),
    ]
}

fn build_dimension_type_registry() -> InternalPacket {
    InternalPacket::RegistryData {
        registry_id: "minecraft:dimension_type".into(),
        entries: vec![RegistryEntry {
            id: "minecraft:overworld".into(),
            data: Some(nbt_compound! {
                "has_skylight" => NbtValue::Byte(1),
                "has_ceiling" => NbtValue::Byte(0),
                "ultrawarm" => NbtValue::Byte(0),
                "natural" => NbtValue::Byte(1),
                "coordinate_scale" => NbtValue::Double(1.0),
                "bed_works" => NbtValue::Byte(1),
                "respawn_anchor_works" => NbtValue::Byte(0),
                "min_y" => NbtValue::Int(-64),
                "height" => NbtValue::Int(384),
                "logical_height" => NbtValue::Int(384),
                "infiniburn" => NbtValue::String("#minecraft:infiniburn_overworld".into()),
                "effects" => NbtValue::String("minecraft:overworld".into()),
                "ambient_light" => NbtValue::Float(0.0),
                "piglin_safe" => NbtValue::Byte(0),
                "has_raids" => NbtValue::Byte(1),
                "monster_spawn_light_level" => NbtValue::Int(0),
                "monster_spawn_block_light_limit" => NbtValue::Int(0)
            }),
        }],
    }
}

fn build_biome_registry() -> InternalPacket {
    InternalPacket::RegistryData {
        registry_id: "minecraft:worldgen/biome".into(),
        entries: vec![RegistryEntry {
            id: "minecraft:plains".into(),
            data: Some(nbt_compound! {
                "has_precipitation" => NbtValue::Byte(1),
                "temperature" => NbtValue::Float(0.8),
                "downfall" => NbtValue::Float(0.4),
                "effects" => NbtValue::Compound(vec![
                    ("fog_color".into(), NbtValue::Int(12638463)),
                    ("water_color".into(), NbtValue::Int(4159204)),
                    ("water_fog_color".into(), NbtValue::Int(329011)),
                    ("sky_color".into(), NbtValue::Int(7907327)),
                    ("mood_sound".into(), NbtValue::Compound(vec![
                        ("sound".into(), NbtValue::String("minecraft:ambient.cave".into())),
                        ("tick_delay".into(), NbtValue::Int(6000)),
                        ("offset".into(), NbtValue::Double(2.0)),
                        ("block_search_extent".into(), NbtValue::Int(8)),
                    ])),
                ])
            }),
        }],
    }
}

fn build_damage_type_registry() -> InternalPacket {
    InternalPacket::RegistryData {
        registry_id: "minecraft:damage_type".into(),
        entries: vec![
            RegistryEntry {
                id: "minecraft:generic".into(),
                data: Some(nbt_compound! {
                    "message_id" => NbtValue::String("generic".into()),
                    "scaling" => NbtValue::String("never".into()),
                    "exhaustion" => NbtValue::Float(0.0)
                }),
            },
            RegistryEntry {
                id: "minecraft:generic_kill".into(),
                data: Some(nbt_compound! {
                    "message_id" => NbtValue::String("genericKill".into()),
                    "scaling" => NbtValue::String("never".into()),
                    "exhaustion" => NbtValue::Float(0.0)
                }),
            },
            RegistryEntry {
                id: "minecraft:out_of_world".into(),
                data: Some(nbt_compound! {
                    "message_id" => NbtValue::String("outOfWorld".into()),
                    "scaling" => NbtValue::String("always".into()),
                    "exhaustion" => NbtValue::Float(0.0)
                }),
            },
        ],
    }
}

fn build_cat_variant_registry() -> InternalPacket {
    InternalPacket::RegistryData {
        registry_id: "minecraft:cat_variant".into(),
        entries: vec![RegistryEntry {
            id: "minecraft:black".into(),
            data: Some(nbt_compound! {
                "asset_id" => NbtValue::String("minecraft:entity/cat/black".into())
            }),
        }],
    }
}

fn build_chicken_variant_registry() -> InternalPacket {
    InternalPacket::RegistryData {
        registry_id: "minecraft:chicken_variant".into(),
        entries: vec![RegistryEntry {
            id: "minecraft:temperate".into(),
            data: Some(nbt_compound! {
                "asset_id" => NbtValue::String("minecraft:entity/chicken/chicken".into()),
                "model" => NbtValue::String("normal".into())
            }),
        }],
    }
}

fn build_cow_variant_registry() -> InternalPacket {
    InternalPacket::RegistryData {
        registry_id: "minecraft:cow_variant".into(),
        entries: vec![RegistryEntry {
            id: "minecraft:temperate".into(),
            data: Some(nbt_compound! {
                "asset_id" => NbtValue::String("minecraft:entity/cow/cow".into()),
                "model" => NbtValue::String("normal".into())
            }),
        }],
    }
}

fn build_frog_variant_registry() -> InternalPacket {
    InternalPacket::RegistryData {
        registry_id: "minecraft:frog_variant".into(),
        entries: vec![RegistryEntry {
            id: "minecraft:temperate".into(),
            data: Some(nbt_compound! {
                "asset_id" => NbtValue::String("minecraft:entity/frog/temperate_frog".into())
            }),
        }],
    }
}

fn build_pig_variant_registry() -> InternalPacket {
    InternalPacket::RegistryData {
        registry_id: "minecraft:pig_variant".into(),
        entries: vec![RegistryEntry {
            id: "minecraft:temperate".into(),
            data: Some(nbt_compound! {
                "asset_id" => NbtValue::String("minecraft:entity/pig/pig".into()),
                "model" => NbtValue::String("normal".into())
            }),
        }],
    }
}

fn build_wolf_variant_registry() -> InternalPacket {
    InternalPacket::RegistryData {
        registry_id: "minecraft:wolf_variant".into(),
        entries: vec![RegistryEntry {
            id: "minecraft:pale".into(),
            data: Some(nbt_compound! {
                "assets" => NbtValue::Compound(vec![
                    ("wild".into(), NbtValue::String("minecraft:entity/wolf/wolf".into())),
                    ("tame".into(), NbtValue::String("minecraft:entity/wolf/wolf_tame".into())),
                    ("angry".into(), NbtValue::String("minecraft:entity/wolf/wolf_angry".into())),
                ]),
                "biomes" => NbtValue::String("minecraft:plains".into())
            }),
        }],
    }
}

fn build_wolf_sound_variant_registry() -> InternalPacket {
    InternalPacket::RegistryData {
        registry_id: "minecraft:wolf_sound_variant".into(),
        entries: vec![RegistryEntry {
            id: "minecraft:classic".into(),
            data: Some(nbt_compound! {
                "ambient_sound" => NbtValue::String("minecraft:entity.wolf.ambient".into()),
                "death_sound" => NbtValue::String("minecraft:entity.wolf.death".into()),
                "growl_sound" => NbtValue::String("minecraft:entity.wolf.growl".into()),
                "hurt_sound" => NbtValue::String("minecraft:entity.wolf.hurt".into()),
                "pant_sound" => NbtValue::String("minecraft:entity.wolf.pant".into()),
                "whine_sound" => NbtValue::String("minecraft:entity.wolf.whine".into())
            }),
        }],
    }
}

fn build_painting_variant_registry() -> InternalPacket {
    InternalPacket::RegistryData {
        registry_id: "minecraft:painting_variant".into(),
        entries: vec![RegistryEntry {
            id: "minecraft:kebab".into(),
            data: Some(nbt_compound! {
                "asset_id" => NbtValue::String("minecraft:kebab".into()),
                "width" => NbtValue::Int(1),
                "height" => NbtValue::Int(1)
            }),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_exactly_the_required_registries() {
        let packets = build_registry_packets();
        let ids: Vec<&str> = packets
            .iter()
            .map(|p| match p {
                InternalPacket::RegistryData { registry_id, .. } => registry_id.as_str(),
                _ => unreachable!(),
            })
            .collect();
        let expected = [
            "minecraft:dimension_type",
            "minecraft:worldgen/biome",
            "minecraft:damage_type",
            "minecraft:cat_variant",
            "minecraft:chicken_variant",
            "minecraft:cow_variant",
            "minecraft:frog_variant",
            "minecraft:pig_variant",
            "minecraft:wolf_variant",
            "minecraft:wolf_sound_variant",
            "minecraft:painting_variant",
        ];
        for id in expected {
            assert!(ids.contains(&id), "missing registry {id}");
        }
        assert_eq!(ids.len(), expected.len());
    }
}
