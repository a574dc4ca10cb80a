//! Tick systems and the commands that drive them.

pub mod buildings;
pub mod colonization;
pub mod processes;
pub mod production;
pub mod taxation;

pub use buildings::{
    build_facility, build_facility_instant, can_build, can_upgrade, demolish_facility,
    upgrade_facility,
};
pub use colonization::{
    abandon_settlement, can_settle_at, found_settlement, level_settlement, refresh_territory,
    settle, PlacementError,
};
pub use processes::{cancel_process, resume_process, start_process, suspend_process};
pub use production::{adjusted_resource_change, faction_resource_change, run_resource_tick};
pub use taxation::{collect_tax, max_tax, request_tax, run_tax_tick, TaxCollection};
