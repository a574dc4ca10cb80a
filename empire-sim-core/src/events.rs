//! Structured record of notable simulation transitions.
//!
//! The engine appends [`SimEvent`]s as it runs; hosts drain them with
//! [`crate::Simulation::drain_events`] and may write them out as JSONL:
//!
//! ```json
//! {"type":"process_completed","tick":4200,"process":7,"label":"Build Lumber hut"}
//! ```

use crate::modifiers::{FacilityDefId, ResourceId};
use crate::state::{FactionId, ProcessId, SettlementId, Tick};
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use tile_graph::TileId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    SettlementFounded {
        tick: Tick,
        settlement: SettlementId,
        faction: FactionId,
        tile: TileId,
    },

    SettlementAbandoned {
        tick: Tick,
        settlement: SettlementId,
        faction: FactionId,
    },

    SettlementLeveled {
        tick: Tick,
        settlement: SettlementId,
        level: u32,
    },

    /// A facility grew, shrank, or was removed (size 0).
    FacilitySizeChanged {
        tick: Tick,
        settlement: SettlementId,
        facility: FacilityDefId,
        size: u32,
    },

    ProcessStarted {
        tick: Tick,
        process: ProcessId,
        label: String,
        duration: u32,
    },

    ProcessCompleted {
        tick: Tick,
        process: ProcessId,
        label: String,
    },

    ProcessCanceled {
        tick: Tick,
        process: ProcessId,
        label: String,
        refunded: bool,
    },

    /// A claim pass changed the owner of at least one tile.
    TerritoryChanged {
        tick: Tick,
        settlement: SettlementId,
        tiles: Vec<TileId>,
    },

    /// A settlement ended a claim pass owning no tiles.
    TerritoryEmpty {
        tick: Tick,
        settlement: SettlementId,
    },

    TaxCollected {
        tick: Tick,
        faction: FactionId,
        ceiling: f64,
        currency_amount: f64,
        items: usize,
    },

    TaxRequested {
        tick: Tick,
        resource: ResourceId,
        items: usize,
    },

    CommandRejected {
        tick: Tick,
        faction: FactionId,
        reason: String,
    },
}

impl SimEvent {
    pub fn tick(&self) -> Tick {
        match self {
            SimEvent::SettlementFounded { tick, .. }
            | SimEvent::SettlementAbandoned { tick, .. }
            | SimEvent::SettlementLeveled { tick, .. }
            | SimEvent::FacilitySizeChanged { tick, .. }
            | SimEvent::ProcessStarted { tick, .. }
            | SimEvent::ProcessCompleted { tick, .. }
            | SimEvent::ProcessCanceled { tick, .. }
            | SimEvent::TerritoryChanged { tick, .. }
            | SimEvent::TerritoryEmpty { tick, .. }
            | SimEvent::TaxCollected { tick, .. }
            | SimEvent::TaxRequested { tick, .. }
            | SimEvent::CommandRejected { tick, .. } => *tick,
        }
    }
}

/// Write events as one JSON object per line.
pub fn write_jsonl<W: Write>(events: &[SimEvent], out: W) -> std::io::Result<()> {
    let mut writer = BufWriter::new(out);
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}
