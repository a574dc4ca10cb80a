//! # Empire Simulation Core
//!
//! Deterministic, tick-driven simulation of competing factions on a shared
//! tile graph. Factions place settlements, claim the tiles around them, build
//! facilities that produce and consume resources, and a privileged faction
//! pays tax in kind or in currency.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   PlayerInputs   ┌────────────────────────────────────┐
//! │ Controllers  │─────────────────▶│ Simulation                         │
//! │ (decide)     │                  │  ActionScheduler (snapshot/prune)  │
//! └──────▲───────┘                  │   ├─ commands      every tick      │
//!        │ FactionView              │   ├─ resources     daily           │
//!        └──────────────────────────│   ├─ tax           daily           │
//!                                   │   ├─ controllers   4× daily        │
//!                                   │   ├─ territory     daily           │
//!                                   │   └─ processes     every tick      │
//!                                   └───────────────┬────────────────────┘
//!                                                   │ SimEvent, DeliveryRequest
//!                                                   ▼
//!                                                 host
//! ```
//!
//! ## Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Simulation`] | Context object: state, definitions, oracle, scheduler |
//! | [`EmpireState`] | Everything that is persisted |
//! | [`DefRegistry`] | Resource and facility definitions, resolved at load |
//! | [`TileOracle`] | Read-only tile graph with per-tile resource modifiers |
//! | [`TerritoryResolver`] | Weighted tile claims and ownership |
//! | [`Command`] | Faction actions, validated and applied on the next tick |
//! | [`FactionController`] | Hook for AI or UI decision making |
//! | [`SimEvent`] | Structured log of notable transitions |
//!
//! The engine is single-threaded: one tick runs at a time, and every write to
//! stockpiles, claims and facility lists happens inside a scheduled action or
//! an explicit setup call.

pub mod ai;
pub mod config;
pub mod events;
pub mod facilities;
pub mod input;
pub mod ledger;
pub mod metrics;
pub mod modifiers;
pub mod oracle;
pub mod process;
pub mod registry;
pub mod resources;
pub mod save;
pub mod scheduler;
pub mod state;
pub mod step;
pub mod systems;
pub mod tax;
pub mod territory;
pub mod testing;

pub use ai::{FactionController, FactionView, IdleController, RandomController, SettlementView};
pub use config::{Cadence, ConfigError, SimConfig};
pub use events::{write_jsonl, SimEvent};
pub use facilities::{Facility, FacilityBehavior, FacilityDef};
pub use input::{Command, PlayerInputs};
pub use ledger::ResourceLedger;
pub use metrics::SimMetrics;
pub use modifiers::{FacilityDefId, ModifierSet, ResourceId, ResourceModifier};
pub use oracle::{ModifierTable, TileOracle};
pub use process::{Process, ProcessKind, ProcessState};
pub use registry::{DefRegistry, RegistryError};
pub use resources::{ResourceAmount, ResourceDef};
pub use save::{SaveError, SaveGame};
pub use scheduler::{ActionScheduler, ScheduledAction, TickReport};
pub use state::{EmpireState, FactionId, ProcessId, SettlementId, Tick};
pub use step::{CommandError, ProcessInfo, Simulation};
pub use systems::colonization::PlacementError;
pub use tax::{DeliveryRequest, DropSite, TaxBasket, TaxItem};
pub use territory::TerritoryResolver;
