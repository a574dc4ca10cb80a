//! Faction controller interface.
//!
//! The engine does not decide what a faction builds or where it settles. A
//! [`FactionController`] receives a read-only [`FactionView`] plus the list of
//! commands that would currently pass validation, and returns the commands it
//! wants executed. The controllers action runs after the resource tick, and
//! whatever it returns is applied on the next tick.
//!
//! # Determinism
//!
//! Controllers must be deterministic given the same seed, so replays and
//! checksums stay stable.

use crate::facilities::Facility;
use crate::input::Command;
use crate::ledger::ResourceLedger;
use crate::modifiers::{FacilityDefId, ResourceId};
use crate::state::{FactionId, SettlementId, Tick};
use crate::step::Simulation;
use crate::systems::buildings::can_upgrade;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use tile_graph::TileId;

/// What a faction can see when deciding.
#[derive(Debug, Clone, Serialize)]
pub struct FactionView {
    pub tick: Tick,
    pub faction: FactionId,
    pub name: String,
    pub tech_tier: u8,
    pub privileged: bool,
    pub stockpile: ResourceLedger,
    /// Adjusted per-tick change, as the next resource tick applies it.
    pub resource_change: BTreeMap<ResourceId, f64>,
    pub settlements: Vec<SettlementView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementView {
    pub id: SettlementId,
    pub name: String,
    pub tile: TileId,
    pub level: u32,
    pub facilities: Vec<Facility>,
    pub territory: Vec<TileId>,
    /// Facility kinds that could be started now.
    pub buildable: Vec<FacilityDefId>,
    /// Installed facilities that could grow now.
    pub upgradable: Vec<FacilityDefId>,
    pub can_level: bool,
}

impl FactionView {
    /// Snapshot `faction` from the live simulation. `None` if it does not exist.
    pub fn capture(sim: &mut Simulation, faction: FactionId) -> Option<Self> {
        let f = sim.state.faction(faction)?;
        let name = f.name.clone();
        let tech_tier = f.tech_tier;
        let stockpile = f.stockpile.clone();
        let resource_change = sim.resource_change(faction);

        let ids: Vec<SettlementId> = sim.state.settlements_of(faction).map(|s| s.id).collect();
        let mut settlements = Vec::with_capacity(ids.len());
        for id in ids {
            let territory = sim.territory(id);
            let buildable = sim.available_facilities(id);
            let leveling = sim.level_progress(id).is_some();
            let Some(s) = sim.state.settlement(id) else {
                continue;
            };
            let upgradable = s
                .facilities
                .iter()
                .filter(|f| {
                    sim.defs
                        .facility(f.def)
                        .is_some_and(|def| can_upgrade(&sim.state, s, def).is_ok())
                })
                .map(|f| f.def)
                .collect();
            let can_level = !leveling
                && s.level < sim.config.max_settlement_level
                && stockpile.can_afford(sim.defs.settlement_cost());

            settlements.push(SettlementView {
                id,
                name: s.name.clone(),
                tile: s.tile,
                level: s.level,
                facilities: s.facilities.clone(),
                territory,
                buildable,
                upgradable,
                can_level,
            });
        }

        Some(Self {
            tick: sim.state.tick,
            faction,
            name,
            tech_tier,
            privileged: sim.state.privileged_faction == Some(faction),
            stockpile,
            resource_change,
            settlements,
        })
    }

    /// Facility and level commands that would pass validation right now.
    pub fn available_commands(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        for s in &self.settlements {
            commands.extend(s.buildable.iter().map(|&facility| Command::BuildFacility {
                settlement: s.id,
                facility,
            }));
            commands.extend(s.upgradable.iter().map(|&facility| Command::UpgradeFacility {
                settlement: s.id,
                facility,
            }));
            if s.can_level {
                commands.push(Command::LevelSettlement { settlement: s.id });
            }
        }
        commands
    }
}

/// Decision-making hook for one faction.
pub trait FactionController {
    /// Choose commands for the next tick. May return empty to pass.
    fn decide(&mut self, view: &FactionView, available: &[Command]) -> Vec<Command>;
}

/// Never issues anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleController;

impl FactionController for IdleController {
    fn decide(&mut self, _view: &FactionView, _available: &[Command]) -> Vec<Command> {
        Vec::new()
    }
}

/// Picks one available command at random, half of the time.
pub struct RandomController {
    rng: StdRng,
}

impl RandomController {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl FactionController for RandomController {
    fn decide(&mut self, _view: &FactionView, available: &[Command]) -> Vec<Command> {
        if available.is_empty() {
            return vec![];
        }
        if self.rng.gen::<bool>() {
            if let Some(cmd) = available.choose(&mut self.rng) {
                return vec![cmd.clone()];
            }
        }
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture_registry, SimBuilder};

    fn view_of_fresh_faction() -> (FactionView, crate::testing::Fixture) {
        let (_, fx) = fixture_registry();
        let mut sim = SimBuilder::new().build();
        let faction = sim.add_faction("North", 0);
        let s = sim.found_settlement(faction, 0, "Capital", 2).unwrap();
        sim.build_facility_instant(s, fx.pasture, 1).unwrap();
        sim.credit(faction, fx.wood, 1000.0);
        sim.credit(faction, fx.stone, 1000.0);
        (FactionView::capture(&mut sim, faction).unwrap(), fx)
    }

    #[test]
    fn test_view_lists_legal_commands() {
        let (view, fx) = view_of_fresh_faction();
        let s = &view.settlements[0];
        assert!(s.territory.contains(&0));
        assert!(s.buildable.contains(&fx.lumber_hut));
        // Tech tier 0 cannot build the sawmill.
        assert!(!s.buildable.contains(&fx.sawmill));
        assert_eq!(s.upgradable, vec![fx.pasture]);

        let available = view.available_commands();
        assert!(available.contains(&Command::LevelSettlement { settlement: s.id }));
        assert!(available.contains(&Command::BuildFacility {
            settlement: s.id,
            facility: fx.lumber_hut,
        }));
    }

    #[test]
    fn test_random_controller_is_deterministic() {
        let (view, _) = view_of_fresh_faction();
        let available = view.available_commands();
        let mut a = RandomController::new(42);
        let mut b = RandomController::new(42);
        for _ in 0..20 {
            assert_eq!(a.decide(&view, &available), b.decide(&view, &available));
        }
    }

    #[test]
    fn test_controllers_pass_on_nothing_available() {
        let (view, _) = view_of_fresh_faction();
        assert!(RandomController::new(1).decide(&view, &[]).is_empty());
        assert!(IdleController.decide(&view, &[]).is_empty());
    }
}
