//! Versioned save format.
//!
//! A save holds the config and the persisted [`EmpireState`]. Definitions and
//! the tile oracle are supplied again on load; scheduled actions are rebuilt
//! from the state (standard actions plus one advancement per unfinished
//! process). Entities reference each other by id, and loading checks that
//! every reference resolves.

use crate::config::{ConfigError, SimConfig};
use crate::modifiers::FacilityDefId;
use crate::oracle::TileOracle;
use crate::process::ProcessKind;
use crate::registry::DefRegistry;
use crate::state::{EmpireState, FactionId, ProcessId, SettlementId};
use crate::step::Simulation;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tile_graph::TileId;

pub const SAVE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("invalid save data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported save version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("settlement {settlement:?} belongs to unknown faction {faction:?}")]
    UnknownFaction {
        settlement: SettlementId,
        faction: FactionId,
    },
    #[error("settlement {settlement:?} uses unknown facility {facility:?}")]
    UnknownFacility {
        settlement: SettlementId,
        facility: FacilityDefId,
    },
    #[error("settlement {settlement:?} lists unknown process {process:?}")]
    UnknownProcess {
        settlement: SettlementId,
        process: ProcessId,
    },
    #[error("process {process:?} targets unknown settlement {settlement:?}")]
    OrphanProcess {
        process: ProcessId,
        settlement: SettlementId,
    },
    #[error("delivery {process:?} is owed to unknown faction {faction:?}")]
    OrphanDelivery {
        process: ProcessId,
        faction: FactionId,
    },
    #[error("faction {faction:?} requested tax item {item:?} with a bad market value")]
    InvalidBasket { faction: FactionId, item: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("tile {tile} is claimed by unknown settlement {settlement:?}")]
    OrphanClaim {
        tile: TileId,
        settlement: SettlementId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveGame {
    pub version: u32,
    pub config: SimConfig,
    pub state: EmpireState,
}

impl SaveGame {
    pub fn capture(sim: &Simulation) -> Self {
        Self {
            version: SAVE_VERSION,
            config: sim.config.clone(),
            state: sim.state.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, SaveError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SaveError> {
        let save: SaveGame = serde_json::from_str(json)?;
        if save.version != SAVE_VERSION {
            return Err(SaveError::UnsupportedVersion {
                found: save.version,
                expected: SAVE_VERSION,
            });
        }
        save.config.validate()?;
        Ok(save)
    }

    /// Check that every id reference in the state resolves and that stored
    /// tax baskets carry usable values.
    pub fn validate(&self, defs: &DefRegistry) -> Result<(), SaveError> {
        let state = &self.state;
        for (&faction, f) in &state.factions {
            if let Some(item) = f.pending_tax.values().find_map(|b| b.invalid_item()) {
                return Err(SaveError::InvalidBasket {
                    faction,
                    item: item.label.clone(),
                });
            }
        }
        for s in state.settlements.values() {
            if state.faction(s.faction).is_none() {
                return Err(SaveError::UnknownFaction {
                    settlement: s.id,
                    faction: s.faction,
                });
            }
            if let Some(f) = s.facilities.iter().find(|f| defs.facility(f.def).is_none()) {
                return Err(SaveError::UnknownFacility {
                    settlement: s.id,
                    facility: f.def,
                });
            }
            if let Some(&p) = s.processes.iter().find(|p| !state.processes.contains_key(p)) {
                return Err(SaveError::UnknownProcess {
                    settlement: s.id,
                    process: p,
                });
            }
        }

        for p in state.processes.values() {
            match &p.kind {
                ProcessKind::Delivery { faction, .. } => {
                    if state.faction(*faction).is_none() {
                        return Err(SaveError::OrphanDelivery {
                            process: p.id,
                            faction: *faction,
                        });
                    }
                }
                kind => {
                    if let Some(settlement) = kind.settlement() {
                        if state.settlement(settlement).is_none() {
                            return Err(SaveError::OrphanProcess {
                                process: p.id,
                                settlement,
                            });
                        }
                    }
                }
            }
        }

        for (tile, settlement, _) in state.territory.sorted_claims() {
            if state.settlement(settlement).is_none() {
                return Err(SaveError::OrphanClaim { tile, settlement });
            }
        }
        Ok(())
    }
}

impl Simulation {
    pub fn save(&self) -> SaveGame {
        SaveGame::capture(self)
    }

    /// Rebuild a simulation from a save. Controllers are not persisted and
    /// must be set again.
    pub fn from_save(
        save: SaveGame,
        defs: impl Into<Arc<DefRegistry>>,
        oracle: impl TileOracle + 'static,
    ) -> Result<Self, SaveError> {
        let defs = defs.into();
        save.validate(&defs)?;

        let SaveGame { config, mut state, .. } = save;
        state.territory.rebuild_index();
        log::info!(
            "Loaded save at tick {} ({} settlements, {} processes)",
            state.tick,
            state.settlements.len(),
            state.processes.len()
        );
        Ok(Self::from_parts(state, config, defs, Box::new(oracle)))
    }
}

pub fn write_to_path(sim: &Simulation, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let path = path.as_ref();
    let json = sim.save().to_json()?;
    std::fs::write(path, json).with_context(|| format!("writing save to {}", path.display()))?;
    Ok(())
}

pub fn load_from_path(
    path: impl AsRef<Path>,
    defs: impl Into<Arc<DefRegistry>>,
    oracle: impl TileOracle + 'static,
) -> anyhow::Result<Simulation> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading save from {}", path.display()))?;
    let save = SaveGame::from_json(&json)
        .with_context(|| format!("parsing save {}", path.display()))?;
    Ok(Simulation::from_save(save, defs, oracle)?)
}
