//! Settlements: placement, founding, leveling, abandonment and the territory
//! claims that follow them.

use crate::events::SimEvent;
use crate::oracle::TileOracle;
use crate::process::ProcessKind;
use crate::registry::DefRegistry;
use crate::state::{EmpireState, FactionId, ProcessId, SettlementId, SettlementState};
use crate::step::{CommandError, Simulation};
use crate::systems::buildings::owned_settlement;
use crate::systems::processes::{cancel_process, find_process, start_process};
use thiserror::Error;
use tile_graph::{Terrain, TileId};
use tracing::instrument;

/// Why a tile cannot be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("tile is out of range")]
    TileOutOfRange,
    #[error("tile is covered by water")]
    Water,
    #[error("tile is impassable")]
    Impassable,
    #[error("too close to another settlement")]
    TooClose,
    #[error("faction has no territory")]
    NoTerritory,
    #[error("tile is not in the faction's territory")]
    TileUnowned,
    #[error("not enough resources to settle")]
    NoResources,
}

/// Check whether `faction` may place a new settlement on `tile`.
pub fn can_settle_at(
    state: &EmpireState,
    defs: &DefRegistry,
    oracle: &dyn TileOracle,
    faction: FactionId,
    tile: TileId,
) -> Result<(), PlacementError> {
    let terrain = oracle.terrain(tile).ok_or(PlacementError::TileOutOfRange)?;
    if terrain.is_water() {
        return Err(PlacementError::Water);
    }
    if terrain == Terrain::Impassable {
        return Err(PlacementError::Impassable);
    }

    let crowded = state.settlement_at(tile).is_some()
        || oracle
            .neighbors(tile)
            .into_iter()
            .any(|n| state.settlement_at(n).is_some());
    if crowded {
        return Err(PlacementError::TooClose);
    }

    if state.settlements_of(faction).next().is_none() {
        return Err(PlacementError::NoTerritory);
    }
    if state.tile_faction(tile) != Some(faction) {
        return Err(PlacementError::TileUnowned);
    }

    let affordable = state
        .faction(faction)
        .is_some_and(|f| f.stockpile.can_afford(defs.settlement_cost()));
    if !affordable {
        return Err(PlacementError::NoResources);
    }
    Ok(())
}

/// Settle a new level-1 settlement inside the faction's territory.
pub fn settle(
    sim: &mut Simulation,
    faction: FactionId,
    tile: TileId,
    name: impl Into<String>,
) -> Result<SettlementId, CommandError> {
    if sim.state.faction(faction).is_none() {
        return Err(CommandError::FactionNotFound(faction));
    }
    can_settle_at(&sim.state, &sim.defs, sim.oracle.as_ref(), faction, tile)?;

    let cost = sim.defs.settlement_cost().to_vec();
    if let Some(f) = sim.state.faction_mut(faction) {
        f.stockpile.pay(&cost);
    }
    found_settlement(sim, faction, tile, name, 1)
}

/// Place a settlement without placement checks or cost.
///
/// Used to seed a world. Only the faction and tile must exist. The level is
/// clamped to `1..=max_settlement_level`.
pub fn found_settlement(
    sim: &mut Simulation,
    faction: FactionId,
    tile: TileId,
    name: impl Into<String>,
    level: u32,
) -> Result<SettlementId, CommandError> {
    if sim.state.faction(faction).is_none() {
        return Err(CommandError::FactionNotFound(faction));
    }
    if !sim.oracle.contains(tile) {
        return Err(PlacementError::TileOutOfRange.into());
    }

    let id = sim.state.alloc_settlement_id();
    let name = name.into();
    log::info!("Faction {} founded {} on tile {}", faction.0, name, tile);
    sim.state.settlements.insert(
        id,
        SettlementState {
            id,
            name,
            faction,
            tile,
            level: level.clamp(1, sim.config.max_settlement_level.max(1)),
            facilities: Vec::new(),
            processes: Vec::new(),
        },
    );
    sim.record(SimEvent::SettlementFounded {
        tick: sim.state.tick,
        settlement: id,
        faction,
        tile,
    });

    claim_territory(sim, id);
    Ok(id)
}

/// Remove a settlement: its processes are canceled without refund and its
/// claims released to any competing settlement.
pub fn abandon_settlement(
    sim: &mut Simulation,
    faction: FactionId,
    settlement: SettlementId,
) -> Result<(), CommandError> {
    let processes = owned_settlement(&sim.state, faction, settlement)?
        .processes
        .clone();

    for process in processes {
        if let Err(e) = cancel_process(sim, process, false) {
            log::warn!("Abandoning settlement {}: {}", settlement.0, e);
        }
    }

    let update = sim.state.territory.remove_claims(settlement);
    sim.state.settlements.remove(&settlement);

    log::info!(
        "Faction {} abandoned settlement {} ({} tiles changed hands)",
        faction.0,
        settlement.0,
        update.owners_changed.len()
    );
    sim.record(SimEvent::SettlementAbandoned {
        tick: sim.state.tick,
        settlement,
        faction,
    });
    Ok(())
}

/// Start raising a settlement one level. Costs the settlement cost.
pub fn level_settlement(
    sim: &mut Simulation,
    faction: FactionId,
    settlement: SettlementId,
) -> Result<ProcessId, CommandError> {
    let s = owned_settlement(&sim.state, faction, settlement)?;
    let max = sim.config.max_settlement_level;
    if s.level >= max {
        return Err(CommandError::MaxLevel(max));
    }
    let label = format!("Level up {}", s.name);
    if level_process(sim, settlement).is_some() {
        return Err(CommandError::AlreadyLeveling);
    }

    let cost = sim.defs.settlement_cost().to_vec();
    let f = sim
        .state
        .faction_mut(faction)
        .ok_or(CommandError::FactionNotFound(faction))?;
    if !f.stockpile.can_afford(&cost) {
        return Err(CommandError::TooExpensive);
    }
    f.stockpile.pay(&cost);

    let duration = sim.config.level_up_ticks();
    Ok(start_process(
        sim,
        label,
        ProcessKind::SettlementLevel { settlement },
        duration,
        cost,
    ))
}

/// Cancel an in-flight level-up, optionally refunding its cost.
pub fn cancel_level(
    sim: &mut Simulation,
    faction: FactionId,
    settlement: SettlementId,
    refund: bool,
) -> Result<(), CommandError> {
    owned_settlement(&sim.state, faction, settlement)?;
    let process = level_process(sim, settlement).ok_or(CommandError::NoLevelUp)?;
    cancel_process(sim, process, refund)
}

fn level_process(sim: &Simulation, settlement: SettlementId) -> Option<ProcessId> {
    find_process(sim, settlement, |kind| {
        matches!(kind, ProcessKind::SettlementLevel { .. })
    })
    .map(|p| p.id)
}

/// Fraction complete of a settlement's level-up, if one is running.
pub fn level_progress(sim: &Simulation, settlement: SettlementId) -> Option<f32> {
    let id = level_process(sim, settlement)?;
    sim.state.processes.get(&id).map(|p| p.progress_pct())
}

/// Completion of a level-up: one level higher, and a claim pass for the
/// larger radius.
pub fn raise_level(sim: &mut Simulation, settlement: SettlementId) {
    let max = sim.config.max_settlement_level;
    let Some(s) = sim.state.settlement_mut(settlement) else {
        log::warn!("Level-up completed for missing settlement {}", settlement.0);
        return;
    };
    s.level = (s.level + 1).min(max);
    let level = s.level;
    log::info!("{} reached level {}", s.name, level);

    sim.record(SimEvent::SettlementLeveled {
        tick: sim.state.tick,
        settlement,
        level,
    });
    claim_territory(sim, settlement);
}

/// Run one claim pass for a settlement around its tile.
pub fn claim_territory(sim: &mut Simulation, settlement: SettlementId) {
    let Some(origin) = sim.state.settlement(settlement).map(|s| s.tile) else {
        log::warn!("Claim pass for missing settlement {}", settlement.0);
        return;
    };
    let radius = sim.state.territory_radius(settlement).unwrap_or(0);
    let mut rng = sim.state.next_rng();
    let update = sim.state.territory.add_claims(
        settlement,
        origin,
        radius,
        sim.oracle.as_ref(),
        sim.config.claim_jitter,
        &mut rng,
        false,
    );

    let tick = sim.state.tick;
    if !update.owners_changed.is_empty() {
        sim.record(SimEvent::TerritoryChanged {
            tick,
            settlement,
            tiles: update.owners_changed,
        });
    }
    if sim.state.territory.territory(settlement).is_empty() {
        sim.record(SimEvent::TerritoryEmpty { tick, settlement });
    }
}

/// Re-claim for every settlement that lost its own tile or has no claims.
#[instrument(skip_all, name = "territory")]
pub fn refresh_territory(sim: &mut Simulation) {
    let stale: Vec<SettlementId> = sim
        .state
        .settlements
        .values()
        .filter(|s| {
            !sim.state.territory.has_claims(s.id)
                || sim.state.territory.tile_owner(s.tile) != Some(s.id)
        })
        .map(|s| s.id)
        .collect();

    for settlement in stale {
        log::debug!("Refreshing claims of settlement {}", settlement.0);
        claim_territory(sim, settlement);
    }
}
