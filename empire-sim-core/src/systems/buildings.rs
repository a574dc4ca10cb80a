//! Facility construction, upgrades and demolition.
//!
//! Every size step of a facility is a `FacilityBuild` process. Building a new
//! facility inserts it at size 0 and starts the first step; upgrading starts
//! another step on an existing facility. Only one step per facility may be
//! in flight at a time.

use crate::events::SimEvent;
use crate::facilities::{Facility, FacilityBehavior, FacilityDef};
use crate::modifiers::FacilityDefId;
use crate::process::ProcessKind;
use crate::state::{EmpireState, FactionId, ProcessId, SettlementId, SettlementState};
use crate::step::{CommandError, Simulation};
use crate::systems::processes::{cancel_process, find_process, start_process};
use std::sync::Arc;

/// Check if a new facility can be built at a settlement.
pub fn can_build(
    state: &EmpireState,
    settlement: &SettlementState,
    def: &FacilityDef,
) -> Result<(), CommandError> {
    // 1. Slot limit
    if settlement.facilities.len() >= settlement.facility_limit() {
        return Err(CommandError::NoFacilitySlots);
    }

    // 2. Already present
    if settlement.facility(def.id).is_some() {
        return Err(CommandError::AlreadyBuilt);
    }

    let faction = state
        .faction(settlement.faction)
        .ok_or(CommandError::FactionNotFound(settlement.faction))?;

    // 3. Behavior gate
    if let FacilityBehavior::RequiresTechTier(required) = def.behavior {
        if faction.tech_tier < required {
            return Err(CommandError::TechTooLow {
                required,
                have: faction.tech_tier,
            });
        }
    }

    // 4. Cost
    if !faction.stockpile.can_afford(&def.build_cost) {
        return Err(CommandError::TooExpensive);
    }

    Ok(())
}

/// Check if an existing facility can grow by one size step.
pub fn can_upgrade(
    state: &EmpireState,
    settlement: &SettlementState,
    def: &FacilityDef,
) -> Result<(), CommandError> {
    let facility = settlement
        .facility(def.id)
        .ok_or(CommandError::NoFacility)?;

    let max = settlement.max_facility_size();
    if facility.size >= max {
        return Err(CommandError::MaxSize(max));
    }

    if build_in_progress(state, settlement, def.id).is_some() {
        return Err(CommandError::AlreadyUpgrading);
    }

    let faction = state
        .faction(settlement.faction)
        .ok_or(CommandError::FactionNotFound(settlement.faction))?;
    if !faction.stockpile.can_afford(&def.build_cost) {
        return Err(CommandError::TooExpensive);
    }

    Ok(())
}

fn build_in_progress(
    state: &EmpireState,
    settlement: &SettlementState,
    def: FacilityDefId,
) -> Option<ProcessId> {
    settlement.processes.iter().copied().find(|id| {
        state.processes.get(id).is_some_and(|p| {
            matches!(p.kind, ProcessKind::FacilityBuild { facility, .. } if facility == def)
        })
    })
}

/// Settlement `id` if it exists and belongs to `faction`.
pub(crate) fn owned_settlement(
    state: &EmpireState,
    faction: FactionId,
    id: SettlementId,
) -> Result<&SettlementState, CommandError> {
    let settlement = state
        .settlement(id)
        .ok_or(CommandError::SettlementNotFound(id))?;
    if settlement.faction != faction {
        return Err(CommandError::NotOwner(faction));
    }
    Ok(settlement)
}

/// Start building a new facility.
///
/// Debits the build cost and inserts the facility at size 0.
pub fn build_facility(
    sim: &mut Simulation,
    faction: FactionId,
    settlement: SettlementId,
    facility: FacilityDefId,
) -> Result<ProcessId, CommandError> {
    let defs = Arc::clone(&sim.defs);
    let def = defs
        .facility(facility)
        .ok_or(CommandError::FacilityDefNotFound(facility))?;

    let s = owned_settlement(&sim.state, faction, settlement)?;
    can_build(&sim.state, s, def)?;

    if let Some(f) = sim.state.faction_mut(faction) {
        f.stockpile.pay(&def.build_cost);
    }
    if let Some(s) = sim.state.settlement_mut(settlement) {
        s.facilities.push(Facility::new(facility));
    }

    log::info!(
        "Faction {} started building {} at settlement {}",
        faction.0,
        def.name,
        settlement.0
    );

    Ok(start_process(
        sim,
        format!("Build {}", def.name),
        ProcessKind::FacilityBuild {
            settlement,
            facility,
        },
        def.build_duration,
        def.build_cost.clone(),
    ))
}

/// Start the next size step of an existing facility.
pub fn upgrade_facility(
    sim: &mut Simulation,
    faction: FactionId,
    settlement: SettlementId,
    facility: FacilityDefId,
) -> Result<ProcessId, CommandError> {
    let defs = Arc::clone(&sim.defs);
    let def = defs
        .facility(facility)
        .ok_or(CommandError::FacilityDefNotFound(facility))?;

    let s = owned_settlement(&sim.state, faction, settlement)?;
    can_upgrade(&sim.state, s, def)?;

    if let Some(f) = sim.state.faction_mut(faction) {
        f.stockpile.pay(&def.build_cost);
    }

    Ok(start_process(
        sim,
        format!("Upgrade {}", def.name),
        ProcessKind::FacilityBuild {
            settlement,
            facility,
        },
        def.build_duration,
        def.build_cost.clone(),
    ))
}

/// Place a facility at a given size without cost or delay.
///
/// Used for world seeding. The size is clamped to the settlement's maximum.
pub fn build_facility_instant(
    sim: &mut Simulation,
    settlement: SettlementId,
    facility: FacilityDefId,
    size: u32,
) -> Result<(), CommandError> {
    if sim.defs.facility(facility).is_none() {
        return Err(CommandError::FacilityDefNotFound(facility));
    }
    let s = sim
        .state
        .settlement_mut(settlement)
        .ok_or(CommandError::SettlementNotFound(settlement))?;
    let max = s.max_facility_size();
    if s.facility(facility).is_none() {
        s.facilities.push(Facility::new(facility));
    }
    let size = match s.facility_mut(facility) {
        Some(f) => {
            f.size = size.min(max);
            f.size
        }
        None => return Err(CommandError::NoFacility),
    };

    sim.record(SimEvent::FacilitySizeChanged {
        tick: sim.state.tick,
        settlement,
        facility,
        size,
    });
    Ok(())
}

/// Shrink a facility by one size step.
///
/// At size 0 the facility is removed and any build step for it is canceled
/// without refund. Returns the new size.
pub fn demolish_facility(
    sim: &mut Simulation,
    faction: FactionId,
    settlement: SettlementId,
    facility: FacilityDefId,
) -> Result<u32, CommandError> {
    let s = owned_settlement(&sim.state, faction, settlement)?;
    let current = s.facility(facility).ok_or(CommandError::NoFacility)?.size;
    let pending = build_in_progress(&sim.state, s, facility);
    let size = current.saturating_sub(1);

    if size == 0 {
        if let Some(process) = pending {
            cancel_process(sim, process, false)?;
        }
        if let Some(s) = sim.state.settlement_mut(settlement) {
            s.facilities.retain(|f| f.def != facility);
        }
    } else if let Some(f) = sim
        .state
        .settlement_mut(settlement)
        .and_then(|s| s.facility_mut(facility))
    {
        f.size = size;
    }

    log::info!(
        "Faction {} demolished {:?} at settlement {} (size now {})",
        faction.0,
        facility,
        settlement.0,
        size
    );
    sim.record(SimEvent::FacilitySizeChanged {
        tick: sim.state.tick,
        settlement,
        facility,
        size,
    });
    Ok(size)
}

/// Apply a completed size step. Missing settlements or facilities are
/// logged and ignored.
pub fn change_facility_size(
    sim: &mut Simulation,
    settlement: SettlementId,
    facility: FacilityDefId,
    delta: i64,
) {
    let Some(s) = sim.state.settlement_mut(settlement) else {
        log::warn!("Size change for missing settlement {}", settlement.0);
        return;
    };
    let max = s.max_facility_size();
    let Some(f) = s.facility_mut(facility) else {
        log::warn!(
            "Size change for missing facility {:?} at settlement {}",
            facility,
            settlement.0
        );
        return;
    };
    let size = f.change_size(delta, max);

    sim.record(SimEvent::FacilitySizeChanged {
        tick: sim.state.tick,
        settlement,
        facility,
        size,
    });
}

/// Drop a facility whose first size step never finished.
pub(crate) fn remove_if_unbuilt(sim: &mut Simulation, settlement: SettlementId, facility: FacilityDefId) {
    if let Some(s) = sim.state.settlement_mut(settlement) {
        let before = s.facilities.len();
        s.facilities.retain(|f| f.def != facility || f.size > 0);
        if s.facilities.len() != before {
            log::debug!(
                "Removed unbuilt {:?} from settlement {}",
                facility,
                settlement.0
            );
        }
    }
}

/// Fraction complete of the in-flight size step of a facility, if any.
pub fn upgrade_progress(sim: &Simulation, settlement: SettlementId, facility: FacilityDefId) -> Option<f32> {
    find_process(sim, settlement, |kind| {
        matches!(kind, ProcessKind::FacilityBuild { facility: f, .. } if *f == facility)
    })
    .map(|p| p.progress_pct())
}

/// Facility kinds a settlement could start right now.
pub fn available_facilities(sim: &Simulation, settlement: SettlementId) -> Vec<FacilityDefId> {
    let Some(s) = sim.state.settlement(settlement) else {
        return Vec::new();
    };
    sim.defs
        .facilities()
        .iter()
        .filter(|def| can_build(&sim.state, s, def).is_ok())
        .map(|def| def.id)
        .collect()
}
