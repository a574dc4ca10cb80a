use crate::modifiers::{FacilityDefId, ResourceId};
use crate::state::{FactionId, ProcessId, SettlementId};
use crate::tax::TaxBasket;
use serde::{Deserialize, Serialize};
use tile_graph::TileId;

/// Commands issued by one faction for the next tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInputs {
    pub faction: FactionId,
    pub commands: Vec<Command>,
}

impl PlayerInputs {
    pub fn new(faction: FactionId, commands: Vec<Command>) -> Self {
        Self { faction, commands }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Command {
    // Settlements
    Settle {
        tile: TileId,
        name: String,
    },
    Abandon {
        settlement: SettlementId,
    },
    LevelSettlement {
        settlement: SettlementId,
    },

    // Facilities
    BuildFacility {
        settlement: SettlementId,
        facility: FacilityDefId,
    },
    UpgradeFacility {
        settlement: SettlementId,
        facility: FacilityDefId,
    },
    DemolishFacility {
        settlement: SettlementId,
        facility: FacilityDefId,
    },

    // Processes
    CancelProcess {
        process: ProcessId,
        refund: bool,
    },
    SuspendProcess {
        process: ProcessId,
    },
    ResumeProcess {
        process: ProcessId,
    },

    // Tax (privileged faction only)
    RequestTax {
        resource: ResourceId,
        basket: TaxBasket,
    },
}
