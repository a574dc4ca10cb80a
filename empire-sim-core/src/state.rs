use crate::facilities::Facility;
use crate::ledger::ResourceLedger;
use crate::modifiers::{FacilityDefId, ResourceId};
use crate::process::Process;
use crate::tax::{DropSite, TaxBasket};
use crate::territory::{territory_radius, TerritoryResolver};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tile_graph::TileId;

/// Discrete simulation step counter.
pub type Tick = u64;

#[derive(
    Hash, Eq, PartialEq, Clone, Copy, Debug, Default, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(transparent)]
pub struct FactionId(pub u32);

#[derive(
    Hash, Eq, PartialEq, Clone, Copy, Debug, Default, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(transparent)]
pub struct SettlementId(pub u32);

#[derive(
    Hash, Eq, PartialEq, Clone, Copy, Debug, Default, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(transparent)]
pub struct ProcessId(pub u64);

/// Highest level a settlement can reach.
pub const MAX_SETTLEMENT_LEVEL: u32 = 10;

/// Largest size any single facility may reach at `level`: `ceil(level²/4 + level)`.
pub fn max_facility_size(level: u32) -> u32 {
    (level * level).div_ceil(4) + level
}

/// The complete persisted state of the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmpireState {
    pub tick: Tick,
    /// Base seed for every random draw.
    pub rng_seed: u64,
    /// Number of RNG streams handed out so far.
    pub rng_counter: u64,

    pub tax_rate: f64,
    /// The faction tax is collected from.
    pub privileged_faction: Option<FactionId>,
    /// Where tax deliveries are dropped.
    pub drop_site: Option<DropSite>,

    pub factions: BTreeMap<FactionId, FactionState>,
    pub settlements: BTreeMap<SettlementId, SettlementState>,
    pub processes: BTreeMap<ProcessId, Process>,
    pub territory: TerritoryResolver,

    next_faction_id: u32,
    next_settlement_id: u32,
    next_process_id: u64,
}

impl EmpireState {
    pub fn new(seed: u64, tax_rate: f64) -> Self {
        Self {
            tick: 0,
            rng_seed: seed,
            rng_counter: 0,
            tax_rate,
            privileged_faction: None,
            drop_site: None,
            factions: BTreeMap::new(),
            settlements: BTreeMap::new(),
            processes: BTreeMap::new(),
            territory: TerritoryResolver::new(),
            next_faction_id: 1,
            next_settlement_id: 1,
            next_process_id: 1,
        }
    }

    /// A fresh deterministic RNG stream.
    ///
    /// Each call yields a different stream; replaying from the same seed and
    /// counter reproduces the same draws.
    pub fn next_rng(&mut self) -> StdRng {
        self.rng_counter += 1;
        StdRng::seed_from_u64(
            self.rng_seed ^ self.rng_counter.wrapping_mul(0x9E37_79B9_7F4A_7C15),
        )
    }

    pub fn add_faction(&mut self, name: impl Into<String>, tech_tier: u8) -> FactionId {
        let id = FactionId(self.next_faction_id);
        self.next_faction_id += 1;
        self.factions.insert(
            id,
            FactionState {
                name: name.into(),
                tech_tier,
                stockpile: ResourceLedger::new(),
                pending_tax: BTreeMap::new(),
            },
        );
        id
    }

    pub(crate) fn alloc_settlement_id(&mut self) -> SettlementId {
        let id = SettlementId(self.next_settlement_id);
        self.next_settlement_id += 1;
        id
    }

    pub(crate) fn alloc_process_id(&mut self) -> ProcessId {
        let id = ProcessId(self.next_process_id);
        self.next_process_id += 1;
        id
    }

    pub fn faction(&self, id: FactionId) -> Option<&FactionState> {
        self.factions.get(&id)
    }

    pub fn faction_mut(&mut self, id: FactionId) -> Option<&mut FactionState> {
        self.factions.get_mut(&id)
    }

    pub fn settlement(&self, id: SettlementId) -> Option<&SettlementState> {
        self.settlements.get(&id)
    }

    pub fn settlement_mut(&mut self, id: SettlementId) -> Option<&mut SettlementState> {
        self.settlements.get_mut(&id)
    }

    /// Settlements owned by `faction`, in id order.
    pub fn settlements_of(&self, faction: FactionId) -> impl Iterator<Item = &SettlementState> {
        self.settlements
            .values()
            .filter(move |s| s.faction == faction)
    }

    pub fn settlement_at(&self, tile: TileId) -> Option<SettlementId> {
        self.settlements
            .values()
            .find(|s| s.tile == tile)
            .map(|s| s.id)
    }

    /// Faction owning `tile` through its settlement's territory.
    pub fn tile_faction(&self, tile: TileId) -> Option<FactionId> {
        self.territory
            .tile_owner(tile)
            .and_then(|s| self.settlements.get(&s))
            .map(|s| s.faction)
    }

    /// Territory radius of a settlement, using its faction's tech tier.
    pub fn territory_radius(&self, settlement: SettlementId) -> Option<u32> {
        let s = self.settlements.get(&settlement)?;
        let tech = self.factions.get(&s.faction).map_or(0, |f| f.tech_tier);
        Some(territory_radius(s.level, tech))
    }

    /// Computes a deterministic checksum of the simulation state.
    ///
    /// Used to detect divergence between two runs from the same seed.
    pub fn checksum(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.rng_counter.hash(&mut hasher);
        self.tax_rate.to_bits().hash(&mut hasher);
        self.privileged_faction.hash(&mut hasher);

        for (id, f) in &self.factions {
            id.hash(&mut hasher);
            f.tech_tier.hash(&mut hasher);
            for (resource, amount) in f.stockpile.iter() {
                resource.hash(&mut hasher);
                amount.to_bits().hash(&mut hasher);
            }
            for (resource, basket) in &f.pending_tax {
                resource.hash(&mut hasher);
                for item in &basket.items {
                    item.label.hash(&mut hasher);
                    item.count.hash(&mut hasher);
                }
            }
        }

        for (id, s) in &self.settlements {
            id.hash(&mut hasher);
            s.faction.hash(&mut hasher);
            s.tile.hash(&mut hasher);
            s.level.hash(&mut hasher);
            for f in &s.facilities {
                f.def.hash(&mut hasher);
                f.size.hash(&mut hasher);
            }
            s.processes.hash(&mut hasher);
        }

        for (id, p) in &self.processes {
            id.hash(&mut hasher);
            p.progress.hash(&mut hasher);
            p.duration.hash(&mut hasher);
        }

        // Claims (sorted by tile, then settlement)
        for (tile, settlement, weight) in self.territory.sorted_claims() {
            tile.hash(&mut hasher);
            settlement.hash(&mut hasher);
            weight.to_bits().hash(&mut hasher);
        }

        hasher.finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactionState {
    pub name: String,
    pub tech_tier: u8,
    pub stockpile: ResourceLedger,
    /// Requested in-kind tax per resource, kept across cycles in shrunk form.
    #[serde(default)]
    pub pending_tax: BTreeMap<ResourceId, TaxBasket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementState {
    pub id: SettlementId,
    pub name: String,
    pub faction: FactionId,
    pub tile: TileId,
    pub level: u32,
    pub facilities: Vec<Facility>,
    /// Active processes in start order.
    pub processes: Vec<ProcessId>,
}

impl SettlementState {
    pub fn max_facility_size(&self) -> u32 {
        max_facility_size(self.level)
    }

    /// Facility count is bounded by the level.
    pub fn facility_limit(&self) -> usize {
        self.level as usize
    }

    pub fn facility(&self, def: FacilityDefId) -> Option<&Facility> {
        self.facilities.iter().find(|f| f.def == def)
    }

    pub fn facility_mut(&mut self, def: FacilityDefId) -> Option<&mut Facility> {
        self.facilities.iter_mut().find(|f| f.def == def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_facility_size_formula() {
        // ceil(l²/4 + l)
        assert_eq!(max_facility_size(1), 2);
        assert_eq!(max_facility_size(2), 3);
        assert_eq!(max_facility_size(3), 6);
        assert_eq!(max_facility_size(4), 8);
        assert_eq!(max_facility_size(10), 35);
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut state = EmpireState::new(1, 0.1);
        let a = state.add_faction("A", 0);
        let b = state.add_faction("B", 0);
        assert_eq!(a, FactionId(1));
        assert_eq!(b, FactionId(2));
        assert_eq!(state.alloc_settlement_id(), SettlementId(1));
        assert_eq!(state.alloc_process_id(), ProcessId(1));
        assert_eq!(state.alloc_process_id(), ProcessId(2));
    }

    #[test]
    fn test_rng_streams_are_reproducible() {
        use rand::Rng;
        let mut a = EmpireState::new(99, 0.1);
        let mut b = EmpireState::new(99, 0.1);
        let x: u64 = a.next_rng().gen();
        let y: u64 = b.next_rng().gen();
        assert_eq!(x, y);
        let z: u64 = a.next_rng().gen();
        assert_ne!(x, z);
    }

    #[test]
    fn test_checksum_tracks_changes() {
        let mut state = EmpireState::new(5, 0.1);
        let f = state.add_faction("A", 1);
        let before = state.checksum();
        assert_eq!(before, state.clone().checksum());

        state
            .faction_mut(f)
            .unwrap()
            .stockpile
            .set(ResourceId(0), 10.0);
        assert_ne!(before, state.checksum());
    }
}
