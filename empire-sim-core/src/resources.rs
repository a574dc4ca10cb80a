//! Resource kind definitions and their per-tile yield factors.

use crate::modifiers::{ResourceId, ResourceModifier};
use serde::{Deserialize, Serialize};
use tile_graph::{RiverKind, Terrain};

/// A quantity of one resource, used for costs and refunds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceAmount {
    pub resource: ResourceId,
    pub amount: f64,
}

impl ResourceAmount {
    pub fn new(resource: ResourceId, amount: f64) -> Self {
        Self { resource, amount }
    }
}

/// Yield factor per terrain class. Missing entries in data files default to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainFactors {
    pub ocean: f64,
    pub lake: f64,
    pub flat: f64,
    pub small_hills: f64,
    pub large_hills: f64,
    pub mountainous: f64,
    pub impassable: f64,
}

impl Default for TerrainFactors {
    fn default() -> Self {
        Self {
            ocean: 1.0,
            lake: 1.0,
            flat: 1.0,
            small_hills: 1.0,
            large_hills: 1.0,
            mountainous: 1.0,
            impassable: 1.0,
        }
    }
}

impl TerrainFactors {
    pub fn factor(&self, terrain: Terrain) -> f64 {
        match terrain {
            Terrain::Ocean => self.ocean,
            Terrain::Lake => self.lake,
            Terrain::Flat => self.flat,
            Terrain::SmallHills => self.small_hills,
            Terrain::LargeHills => self.large_hills,
            Terrain::Mountainous => self.mountainous,
            Terrain::Impassable => self.impassable,
        }
    }

    pub fn set(&mut self, terrain: Terrain, factor: f64) {
        match terrain {
            Terrain::Ocean => self.ocean = factor,
            Terrain::Lake => self.lake = factor,
            Terrain::Flat => self.flat = factor,
            Terrain::SmallHills => self.small_hills = factor,
            Terrain::LargeHills => self.large_hills = factor,
            Terrain::Mountainous => self.mountainous = factor,
            Terrain::Impassable => self.impassable = factor,
        }
    }
}

/// Yield factor per river class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiverFactors {
    pub none: f64,
    pub creek: f64,
    pub river: f64,
    pub large_river: f64,
    pub huge_river: f64,
}

impl Default for RiverFactors {
    fn default() -> Self {
        Self {
            none: 1.0,
            creek: 1.0,
            river: 1.0,
            large_river: 1.0,
            huge_river: 1.0,
        }
    }
}

impl RiverFactors {
    pub fn factor(&self, river: RiverKind) -> f64 {
        match river {
            RiverKind::None => self.none,
            RiverKind::Creek => self.creek,
            RiverKind::River => self.river,
            RiverKind::LargeRiver => self.large_river,
            RiverKind::HugeRiver => self.huge_river,
        }
    }
}

/// Static definition of a resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDef {
    pub id: ResourceId,
    pub name: String,
    /// Value of one unit in currency, used by the tax engine.
    pub market_value: f64,
    pub terrain_factors: TerrainFactors,
    pub river_factors: RiverFactors,
}

impl ResourceDef {
    /// Base modifier contributed by a tile: no offset, terrain factor times
    /// river factor as the multiplier.
    pub fn tile_modifier(&self, terrain: Terrain, river: RiverKind) -> ResourceModifier {
        ResourceModifier::new(
            self.id,
            0.0,
            self.terrain_factors.factor(terrain) * self.river_factors.factor(river),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wood() -> ResourceDef {
        let mut terrain_factors = TerrainFactors::default();
        terrain_factors.set(Terrain::Flat, 1.2);
        terrain_factors.set(Terrain::Mountainous, 0.5);
        ResourceDef {
            id: ResourceId(1),
            name: "Wood".into(),
            market_value: 1.0,
            terrain_factors,
            river_factors: RiverFactors {
                river: 1.5,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_tile_modifier_combines_terrain_and_river() {
        let def = wood();
        let m = def.tile_modifier(Terrain::Flat, RiverKind::None);
        assert_eq!(m.offset, 0.0);
        assert!((m.multiplier - 1.2).abs() < 1e-12);

        let m = def.tile_modifier(Terrain::Mountainous, RiverKind::River);
        assert!((m.multiplier - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_factors_default_from_partial_json() {
        let factors: TerrainFactors = serde_json::from_str(r#"{"flat": 2.0}"#).unwrap();
        assert_eq!(factors.flat, 2.0);
        assert_eq!(factors.ocean, 1.0);
        assert_eq!(factors.factor(Terrain::SmallHills), 1.0);
    }
}
