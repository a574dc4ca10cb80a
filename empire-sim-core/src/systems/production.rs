//! Resource pipeline: facility, settlement and faction production.
//!
//! Facility offsets scale with facility size and are summed per resource.
//! The settlement multiplier for a resource is applied once to that sum, and
//! the tile's base offset is added once per resource.
//!
//! ```text
//! production(r) = (Σ facility_offset(r) × size + tile_offset(r)) × Π facility_mult(r) × tile_mult(r)
//! upkeep(r)     = (Σ facility_upkeep(r) × size + tile_offset(r)) × Π facility_upkeep_mult(r)
//! change(r)     = Σ_settlements production(r) − upkeep(r)
//! ```

use crate::facilities::{Facility, FacilityDef};
use crate::ledger::ResourceLedger;
use crate::modifiers::{ModifierSet, ResourceId, ResourceModifier};
use crate::oracle::TileOracle;
use crate::registry::DefRegistry;
use crate::state::{EmpireState, FactionId, SettlementState};
use std::collections::{BTreeMap, BTreeSet};
use tracing::instrument;

/// Per-resource multipliers of one settlement.
///
/// Built once per settlement per pass so each facility lookup is O(1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementMultipliers {
    production: BTreeMap<ResourceId, f64>,
    upkeep: BTreeMap<ResourceId, f64>,
}

impl SettlementMultipliers {
    pub fn compute(defs: &DefRegistry, oracle: &dyn TileOracle, settlement: &SettlementState) -> Self {
        let mut out = Self::default();
        for facility in installed(settlement) {
            let Some(def) = defs.facility(facility.def) else {
                log::warn!(
                    "Settlement {} has unknown facility {:?}",
                    settlement.id.0,
                    facility.def
                );
                continue;
            };
            for m in &def.production {
                *out.production.entry(m.resource).or_insert(1.0) *= m.multiplier;
            }
            for m in &def.upkeep {
                *out.upkeep.entry(m.resource).or_insert(1.0) *= m.multiplier;
            }
        }

        for (resource, multiplier) in out.production.iter_mut() {
            if let Some(def) = defs.resource(*resource) {
                *multiplier *= oracle.base_modifier(settlement.tile, def).multiplier;
            }
        }
        out
    }

    pub fn production(&self, resource: ResourceId) -> f64 {
        self.production.get(&resource).copied().unwrap_or(1.0)
    }

    pub fn upkeep(&self, resource: ResourceId) -> f64 {
        self.upkeep.get(&resource).copied().unwrap_or(1.0)
    }
}

/// Facilities with at least one completed size step.
fn installed(settlement: &SettlementState) -> impl Iterator<Item = &Facility> {
    settlement.facilities.iter().filter(|f| f.size > 0)
}

/// Product of every installed facility's multiplier for `resource`, times
/// the tile multiplier. Unmemoized; the tick uses [`SettlementMultipliers`].
pub fn production_multiplier_for(
    defs: &DefRegistry,
    oracle: &dyn TileOracle,
    settlement: &SettlementState,
    resource: ResourceId,
) -> f64 {
    let facilities: f64 = installed(settlement)
        .filter_map(|f| defs.facility(f.def))
        .flat_map(|def| def.production.iter())
        .filter(|m| m.resource == resource)
        .map(|m| m.multiplier)
        .product();
    let tile = defs
        .resource(resource)
        .map_or(1.0, |def| oracle.base_modifier(settlement.tile, def).multiplier);
    facilities * tile
}

/// Per-resource production of one facility: offset × size, with the
/// settlement multiplier attached.
pub fn facility_production(
    def: &FacilityDef,
    facility: &Facility,
    multipliers: &SettlementMultipliers,
) -> Vec<ResourceModifier> {
    def.production
        .iter()
        .map(|m| {
            ResourceModifier::new(
                m.resource,
                m.offset * facility.size as f64,
                multipliers.production(m.resource),
            )
        })
        .collect()
}

pub fn facility_upkeep(
    def: &FacilityDef,
    facility: &Facility,
    multipliers: &SettlementMultipliers,
) -> Vec<ResourceModifier> {
    def.upkeep
        .iter()
        .map(|m| {
            ResourceModifier::new(
                m.resource,
                m.offset * facility.size as f64,
                multipliers.upkeep(m.resource),
            )
        })
        .collect()
}

/// Settlement-level production and upkeep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementOutput {
    pub production: ModifierSet,
    pub upkeep: ModifierSet,
}

impl SettlementOutput {
    /// `production − upkeep` per resource.
    pub fn net(&self) -> BTreeMap<ResourceId, f64> {
        let mut net = BTreeMap::new();
        for m in self.production.iter() {
            *net.entry(m.resource).or_insert(0.0) += m.net_value();
        }
        for m in self.upkeep.iter() {
            *net.entry(m.resource).or_insert(0.0) -= m.net_value();
        }
        net
    }
}

pub fn settlement_output(
    defs: &DefRegistry,
    oracle: &dyn TileOracle,
    settlement: &SettlementState,
) -> SettlementOutput {
    let multipliers = SettlementMultipliers::compute(defs, oracle, settlement);

    let mut production_offsets: BTreeMap<ResourceId, f64> = BTreeMap::new();
    let mut upkeep_offsets: BTreeMap<ResourceId, f64> = BTreeMap::new();
    for facility in &settlement.facilities {
        let Some(def) = defs.facility(facility.def) else {
            continue;
        };
        for m in facility_production(def, facility, &multipliers) {
            *production_offsets.entry(m.resource).or_insert(0.0) += m.offset;
        }
        for m in facility_upkeep(def, facility, &multipliers) {
            *upkeep_offsets.entry(m.resource).or_insert(0.0) += m.offset;
        }
    }

    let mut production: ModifierSet = production_offsets
        .into_iter()
        .map(|(r, offset)| ResourceModifier::new(r, offset, multipliers.production(r)))
        .collect();
    let mut upkeep: ModifierSet = upkeep_offsets
        .into_iter()
        .map(|(r, offset)| ResourceModifier::new(r, offset, multipliers.upkeep(r)))
        .collect();

    add_tile_offsets(&mut production, defs, oracle, settlement);
    add_tile_offsets(&mut upkeep, defs, oracle, settlement);

    log::trace!(
        "Settlement {}: {} produced, {} consumed resource kinds",
        settlement.id.0,
        production.len(),
        upkeep.len()
    );
    SettlementOutput { production, upkeep }
}

fn add_tile_offsets(
    set: &mut ModifierSet,
    defs: &DefRegistry,
    oracle: &dyn TileOracle,
    settlement: &SettlementState,
) {
    let resources: Vec<ResourceId> = set.resources().collect();
    for resource in resources {
        if let Some(def) = defs.resource(resource) {
            set.add_offset(resource, oracle.base_modifier(settlement.tile, def).offset);
        }
    }
}

pub fn settlement_production(
    defs: &DefRegistry,
    oracle: &dyn TileOracle,
    settlement: &SettlementState,
) -> ModifierSet {
    settlement_output(defs, oracle, settlement).production
}

pub fn settlement_upkeep(
    defs: &DefRegistry,
    oracle: &dyn TileOracle,
    settlement: &SettlementState,
) -> ModifierSet {
    settlement_output(defs, oracle, settlement).upkeep
}

/// Raw per-tick change for a faction, summed over its settlements.
pub fn faction_resource_change(
    state: &EmpireState,
    defs: &DefRegistry,
    oracle: &dyn TileOracle,
    faction: FactionId,
) -> BTreeMap<ResourceId, f64> {
    let mut change = BTreeMap::new();
    let mut any = false;
    for settlement in state.settlements_of(faction) {
        any = true;
        for (resource, delta) in settlement_output(defs, oracle, settlement).net() {
            *change.entry(resource).or_insert(0.0) += delta;
        }
    }
    if !any {
        log::warn!("Faction {} has no tracked settlements", faction.0);
    }
    change
}

/// Uniform throttle applied to every resource when any resource would go
/// negative: `1 − max over short resources of (1 − stockpile / −change)`.
pub fn deficit_scale(
    change: &BTreeMap<ResourceId, f64>,
    stockpile: &ResourceLedger,
    registry_resources: impl IntoIterator<Item = ResourceId>,
) -> f64 {
    let kinds: BTreeSet<ResourceId> = registry_resources
        .into_iter()
        .chain(change.keys().copied())
        .collect();

    let mut deficit: f64 = 0.0;
    for resource in kinds {
        let delta = change.get(&resource).copied().unwrap_or(0.0);
        let on_hand = stockpile.get(resource);
        if on_hand + delta < 0.0 {
            deficit = deficit.max(1.0 - on_hand / -delta);
        }
    }
    (1.0 - deficit).clamp(0.0, 1.0)
}

/// Faction change after the deficit throttle.
pub fn adjusted_resource_change(
    state: &EmpireState,
    defs: &DefRegistry,
    oracle: &dyn TileOracle,
    faction: FactionId,
) -> BTreeMap<ResourceId, f64> {
    let Some(faction_state) = state.faction(faction) else {
        log::warn!("Unknown faction {}", faction.0);
        return BTreeMap::new();
    };
    let change = faction_resource_change(state, defs, oracle, faction);
    let scale = deficit_scale(
        &change,
        &faction_state.stockpile,
        defs.resources().iter().map(|r| r.id),
    );
    if scale < 1.0 {
        log::debug!("Faction {} throttled to {:.3}", faction.0, scale);
    }
    change.into_iter().map(|(r, c)| (r, c * scale)).collect()
}

/// Apply one tick of adjusted change to every faction's stockpile.
#[instrument(skip_all, name = "resources")]
pub fn run_resource_tick(state: &mut EmpireState, defs: &DefRegistry, oracle: &dyn TileOracle) {
    let factions: Vec<FactionId> = state.factions.keys().copied().collect();
    let deltas: Vec<(FactionId, BTreeMap<ResourceId, f64>)> = factions
        .into_iter()
        .map(|f| (f, adjusted_resource_change(state, defs, oracle, f)))
        .collect();

    for (faction, change) in deltas {
        let Some(f) = state.factions.get_mut(&faction) else {
            continue;
        };
        for (resource, delta) in change {
            f.stockpile.apply_change(resource, delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::ModifierTable;
    use crate::state::SettlementId;
    use crate::testing::fixture_registry;
    use tile_graph::{Terrain, TileMap};

    fn settlement(facilities: Vec<Facility>) -> SettlementState {
        SettlementState {
            id: SettlementId(1),
            name: "Test".into(),
            faction: FactionId(1),
            tile: 0,
            level: 3,
            facilities,
            processes: Vec::new(),
        }
    }

    #[test]
    fn test_wood_scenario() {
        // One facility producing 10 Wood at size 2, tile multiplier 1.2.
        let (defs, fx) = fixture_registry();
        let mut oracle = ModifierTable::new(TileMap::grid(2, 2, Terrain::Flat));
        oracle.set(0, ResourceModifier::new(fx.wood, 0.0, 1.2));
        let s = settlement(vec![Facility {
            def: fx.lumber_hut,
            size: 2,
        }]);

        let production = settlement_production(&defs, &oracle, &s);
        let wood = production.get(fx.wood).unwrap();
        assert_eq!(wood.offset, 20.0);
        assert!((wood.multiplier - 1.2).abs() < 1e-12);
        assert!((wood.net_value() - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_multiplier_memo_matches_direct() {
        let (defs, fx) = fixture_registry();
        let mut oracle = ModifierTable::new(TileMap::grid(2, 2, Terrain::Flat));
        oracle.set(0, ResourceModifier::new(fx.wood, 0.0, 1.5));
        let s = settlement(vec![
            Facility { def: fx.lumber_hut, size: 1 },
            Facility { def: fx.sawmill, size: 1 },
        ]);
        let memo = SettlementMultipliers::compute(&defs, &oracle, &s);
        let direct = production_multiplier_for(&defs, &oracle, &s, fx.wood);
        assert!((memo.production(fx.wood) - direct).abs() < 1e-12);
        // sawmill 1.25 × tile 1.5
        assert!((direct - 1.875).abs() < 1e-12);
    }

    #[test]
    fn test_unbuilt_facility_contributes_nothing() {
        let (defs, fx) = fixture_registry();
        let oracle = TileMap::grid(2, 2, Terrain::Flat);
        let s = settlement(vec![
            Facility { def: fx.lumber_hut, size: 1 },
            Facility { def: fx.sawmill, size: 0 },
        ]);
        let production = settlement_production(&defs, &oracle, &s);
        assert_eq!(production.get(fx.wood).unwrap().multiplier, 1.0);
    }

    #[test]
    fn test_upkeep_ignores_tile_multiplier() {
        let (defs, fx) = fixture_registry();
        let mut oracle = ModifierTable::new(TileMap::grid(2, 2, Terrain::Flat));
        oracle.set(0, ResourceModifier::new(fx.food, 0.0, 3.0));
        let s = settlement(vec![Facility { def: fx.quarry, size: 2 }]);
        let output = settlement_output(&defs, &oracle, &s);
        let food = output.upkeep.get(fx.food).unwrap();
        assert_eq!(food.multiplier, 1.0);
        assert_eq!(food.offset, 4.0);
        assert_eq!(output.net()[&fx.food], -4.0);
    }

    #[test]
    fn test_tile_offset_added_once() {
        let (defs, fx) = fixture_registry();
        let mut oracle = ModifierTable::new(TileMap::grid(2, 2, Terrain::Flat));
        oracle.set(0, ResourceModifier::new(fx.wood, 5.0, 1.0));
        let s = settlement(vec![Facility { def: fx.lumber_hut, size: 3 }]);
        let production = settlement_production(&defs, &oracle, &s);
        assert_eq!(production.get(fx.wood).unwrap().offset, 35.0);
    }

    #[test]
    fn test_deficit_scenario() {
        let (defs, fx) = fixture_registry();
        let stockpile: ResourceLedger = [(fx.wood, 5.0)].into_iter().collect();
        let change: BTreeMap<_, _> = [(fx.wood, -20.0), (fx.food, 8.0)].into_iter().collect();
        let scale = deficit_scale(&change, &stockpile, defs.resources().iter().map(|r| r.id));
        assert!((scale - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_no_deficit_no_throttle() {
        let stockpile: ResourceLedger = [(ResourceId(0), 100.0)].into_iter().collect();
        let change: BTreeMap<_, _> = [(ResourceId(0), -20.0)].into_iter().collect();
        assert_eq!(deficit_scale(&change, &stockpile, []), 1.0);
    }

    #[test]
    fn test_worst_deficit_wins() {
        let stockpile: ResourceLedger = [(ResourceId(0), 5.0), (ResourceId(1), 0.0)]
            .into_iter()
            .collect();
        let change: BTreeMap<_, _> = [(ResourceId(0), -10.0), (ResourceId(1), -1.0)]
            .into_iter()
            .collect();
        // Resource 1 is empty with negative change: deficit 1, scale 0.
        assert_eq!(deficit_scale(&change, &stockpile, []), 0.0);
    }
}
