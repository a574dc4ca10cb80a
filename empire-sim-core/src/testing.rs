//! Builders and fixtures for tests and examples.

use crate::config::SimConfig;
use crate::facilities::FacilityBehavior;
use crate::modifiers::{FacilityDefId, ResourceId, ResourceModifier};
use crate::oracle::ModifierTable;
use crate::registry::DefRegistry;
use crate::step::Simulation;
use tile_graph::{RiverKind, Terrain, TileId, TileMap};

/// Ids of the fixture registry's definitions.
#[derive(Debug, Clone, Copy)]
pub struct Fixture {
    pub food: ResourceId,
    pub wood: ResourceId,
    pub stone: ResourceId,
    /// Currency for tax remainders.
    pub silver: ResourceId,
    pub pasture: FacilityDefId,
    pub lumber_hut: FacilityDefId,
    pub quarry: FacilityDefId,
    /// Wood multiplier, requires tech tier 1.
    pub sawmill: FacilityDefId,
}

/// A small registry: four resources and four facilities.
///
/// | Facility   | Cost              | Produces        | Upkeep    |
/// |------------|-------------------|-----------------|-----------|
/// | Pasture    | 10 Wood           | 6 Food          |           |
/// | Lumber hut | 10 Wood           | 10 Wood         |           |
/// | Quarry     | 20 Wood           | 3 Stone         | 2 Food    |
/// | Sawmill    | 30 Wood, 10 Stone | Wood ×1.25      |           |
///
/// Settling costs 50 Wood.
pub fn fixture_registry() -> (DefRegistry, Fixture) {
    let mut b = DefRegistry::builder();
    let food = b.resource("Food", 1.0);
    let wood = b.resource("Wood", 1.0);
    let stone = b.resource("Stone", 2.0);
    let silver = b.currency("Silver", 1.0);
    b.settlement_cost(wood, 50.0);

    let pasture = b.facility("Pasture", 100).cost(wood, 10.0).produces(food, 6.0, 1.0).finish();
    let lumber_hut = b
        .facility("Lumber hut", 100)
        .cost(wood, 10.0)
        .produces(wood, 10.0, 1.0)
        .finish();
    let quarry = b
        .facility("Quarry", 200)
        .cost(wood, 20.0)
        .produces(stone, 3.0, 1.0)
        .consumes(food, 2.0, 1.0)
        .finish();
    let sawmill = b
        .facility("Sawmill", 300)
        .cost(wood, 30.0)
        .cost(stone, 10.0)
        .produces(wood, 0.0, 1.25)
        .behavior(FacilityBehavior::RequiresTechTier(1))
        .finish();

    (
        b.build(),
        Fixture {
            food,
            wood,
            stone,
            silver,
            pasture,
            lumber_hut,
            quarry,
            sawmill,
        },
    )
}

/// Fluent builder for a [`Simulation`] on a grid map.
///
/// Defaults: an 8×8 flat grid, the [`fixture_registry`], default config,
/// seed 0.
pub struct SimBuilder {
    map: TileMap,
    tile_modifiers: Vec<(TileId, ResourceModifier)>,
    defs: Option<DefRegistry>,
    config: SimConfig,
    seed: u64,
}

impl SimBuilder {
    pub fn new() -> Self {
        Self {
            map: TileMap::grid(8, 8, Terrain::Flat),
            tile_modifiers: Vec::new(),
            defs: None,
            config: SimConfig::default(),
            seed: 0,
        }
    }

    pub fn map(mut self, map: TileMap) -> Self {
        self.map = map;
        self
    }

    pub fn terrain(mut self, tile: TileId, terrain: Terrain) -> Self {
        self.map.set_terrain(tile, terrain);
        self
    }

    pub fn river(mut self, tile: TileId, river: RiverKind) -> Self {
        self.map.set_river(tile, river);
        self
    }

    /// Override the base modifier of one tile for one resource.
    pub fn tile_modifier(mut self, tile: TileId, modifier: ResourceModifier) -> Self {
        self.tile_modifiers.push((tile, modifier));
        self
    }

    pub fn registry(mut self, defs: DefRegistry) -> Self {
        self.defs = Some(defs);
        self
    }

    pub fn config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> Simulation {
        let defs = self.defs.unwrap_or_else(|| fixture_registry().0);
        let mut oracle = ModifierTable::new(self.map);
        for (tile, modifier) in self.tile_modifiers {
            oracle.set(tile, modifier);
        }
        Simulation::new(defs, oracle, self.config, self.seed)
    }
}

impl Default for SimBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_names_resolve() {
        let (defs, fx) = fixture_registry();
        assert_eq!(defs.resource_id("Wood"), Some(fx.wood));
        assert_eq!(defs.facility_id("Sawmill"), Some(fx.sawmill));
        assert_eq!(defs.currency(), Some(fx.silver));
    }

    #[test]
    fn test_builder_methods() {
        let mut sim = SimBuilder::default()
            .terrain(5, Terrain::Mountainous)
            .seed(7)
            .build();
        assert_eq!(sim.oracle().terrain(5), Some(Terrain::Mountainous));
        assert_eq!(sim.state().rng_seed, 7);
        let faction = sim.add_faction("North", 0);
        assert!(sim.state().faction(faction).is_some());
    }
}
