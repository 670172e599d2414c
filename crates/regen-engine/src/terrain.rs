//! Procedural demo terrain.
//!
//! A square patch of layered ground: bedrock at the bottom, stone with
//! scattered ores, a few layers of dirt, grass on top and the odd farmland
//! column carrying wheat at a random growth stage. Generation is seeded so
//! a run can be repeated.

use std::collections::BTreeSet;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use regen_core::memory::MemoryWorld;
use regen_types::{CellState, LocationKey, Material, StateParseError, WorldId};

/// Depth of the dirt layer below the surface.
const DIRT_LAYERS: i32 = 3;

/// Highest wheat growth stage.
const MAX_WHEAT_AGE: u32 = 7;

/// Every material the demo world knows about.
const MATERIALS: [&str; 10] = [
    "AIR",
    "BEDROCK",
    "STONE",
    "COBBLESTONE",
    "COAL_ORE",
    "IRON_ORE",
    "DIRT",
    "GRASS_BLOCK",
    "FARMLAND",
    "WHEAT_CROP",
];

/// The host's material catalog.
pub fn catalog() -> Result<BTreeSet<Material>, StateParseError> {
    MATERIALS.iter().map(|name| Material::parse(name)).collect()
}

/// Parsed states used while generating.
struct Palette {
    bedrock: CellState,
    stone: CellState,
    coal: CellState,
    iron: CellState,
    dirt: CellState,
    grass: CellState,
    farmland: CellState,
}

impl Palette {
    fn new() -> Result<Self, StateParseError> {
        Ok(Self {
            bedrock: CellState::parse("BEDROCK")?,
            stone: CellState::parse("STONE")?,
            coal: CellState::parse("COAL_ORE")?,
            iron: CellState::parse("IRON_ORE")?,
            dirt: CellState::parse("DIRT")?,
            grass: CellState::parse("GRASS_BLOCK")?,
            farmland: CellState::parse("FARMLAND[moisture=7]")?,
        })
    }

    fn underground(&self, rng: &mut impl Rng) -> &CellState {
        match rng.random_range(0..100_u32) {
            0..4 => &self.coal,
            4..6 => &self.iron,
            _ => &self.stone,
        }
    }
}

/// Generate terrain covering `-half_width..=half_width` on X and Z.
///
/// The surface sits at `y = 0`, bedrock at `y = -depth`, and wheat at
/// `y = 1` on farmland columns.
#[allow(clippy::arithmetic_side_effects)]
pub fn generate(
    world: WorldId,
    half_width: i32,
    depth: i32,
    seed: u64,
) -> Result<MemoryWorld, StateParseError> {
    let palette = Palette::new()?;
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut cells = MemoryWorld::new();

    for x in -half_width..=half_width {
        for z in -half_width..=half_width {
            let farmed = rng.random_range(0..4_u32) == 0;
            for y in -depth..=0 {
                let state = if y == -depth {
                    palette.bedrock.clone()
                } else if y == 0 {
                    if farmed {
                        palette.farmland.clone()
                    } else {
                        palette.grass.clone()
                    }
                } else if y >= -DIRT_LAYERS {
                    palette.dirt.clone()
                } else {
                    palette.underground(&mut rng).clone()
                };
                cells.insert(LocationKey::new(world, x, y, z), state);
            }
            if farmed {
                let age = rng.random_range(0..=MAX_WHEAT_AGE).to_string();
                let crop = CellState::parse("WHEAT_CROP")?.with_property("age", &age);
                cells.insert(LocationKey::new(world, x, 1, z), crop);
            }
        }
    }
    Ok(cells)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use regen_core::World;

    use super::*;

    #[test]
    fn columns_are_layered() {
        let world = WorldId::new();
        let cells = generate(world, 2, 8, 7).unwrap();
        let at = |x, y, z| cells.get_state(&LocationKey::new(world, x, y, z)).unwrap();

        assert_eq!(at(0, -8, 0), CellState::parse("BEDROCK").unwrap());
        assert_eq!(at(1, -2, -1), CellState::parse("DIRT").unwrap());
        let surface = at(-2, 0, 2).material;
        assert!(surface.as_str() == "GRASS_BLOCK" || surface.as_str() == "FARMLAND");
    }

    #[test]
    fn same_seed_same_world() {
        let world = WorldId::new();
        let a = generate(world, 3, 10, 42).unwrap();
        let b = generate(world, 3, 10, 42).unwrap();
        let mut a_cells: Vec<_> = a.cells().collect();
        let mut b_cells: Vec<_> = b.cells().collect();
        a_cells.sort_by_key(|(key, _)| **key);
        b_cells.sort_by_key(|(key, _)| **key);
        assert_eq!(a_cells, b_cells);
    }

    #[test]
    fn every_generated_material_is_in_the_catalog() {
        let catalog = catalog().unwrap();
        let cells = generate(WorldId::new(), 4, 12, 3).unwrap();
        assert!(cells.cells().all(|(_, state)| catalog.contains(&state.material)));
    }

    #[test]
    fn wheat_only_grows_on_farmland() {
        let world = WorldId::new();
        let cells = generate(world, 4, 6, 11).unwrap();
        for (key, state) in cells.cells() {
            if state.material.as_str() == "WHEAT_CROP" {
                let below = cells.get_state(&LocationKey::new(world, key.x, 0, key.z));
                assert_eq!(below.map(|s| s.material), Some(Material::parse("FARMLAND").unwrap()));
                assert!(state.property("age").is_some());
            }
        }
    }
}
