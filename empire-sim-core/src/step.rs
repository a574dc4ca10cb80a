//! The simulation context and its tick loop.
//!
//! A [`Simulation`] owns the persisted [`EmpireState`] together with the
//! things that are rebuilt on load: the definition registry, the tile oracle,
//! the action scheduler and the faction controllers. One call to
//! [`Simulation::step`] advances the tick counter and runs one scheduler pass.
//!
//! Standard actions, in registration (and therefore execution) order:
//!
//! | Action        | Cadence                    |
//! |---------------|----------------------------|
//! | Commands      | every tick                 |
//! | Resources     | daily, offset 1            |
//! | Tax           | daily, offset 5            |
//! | Controllers   | 4× daily, offset 10        |
//! | Territory     | daily, offset 20           |
//!
//! Process advancement actions are registered after these as processes start.

use crate::ai::{FactionController, FactionView};
use crate::config::SimConfig;
use crate::events::SimEvent;
use crate::facilities::Facility;
use crate::input::{Command, PlayerInputs};
use crate::metrics::SimMetrics;
use crate::modifiers::{FacilityDefId, ResourceId};
use crate::oracle::TileOracle;
use crate::process::{ProcessKind, ProcessState};
use crate::registry::DefRegistry;
use crate::scheduler::{run_tick, ActionScheduler, Scheduled, ScheduledAction, TickReport};
use crate::state::{EmpireState, FactionId, ProcessId, SettlementId, Tick};
use crate::systems::colonization::{self, PlacementError};
use crate::systems::{buildings, processes, production, taxation};
use crate::tax::{DeliveryRequest, DropSite};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tile_graph::TileId;
use tracing::instrument;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Unknown faction {0:?}")]
    FactionNotFound(FactionId),
    #[error("Unknown settlement {0:?}")]
    SettlementNotFound(SettlementId),
    #[error("Unknown facility definition {0:?}")]
    FacilityDefNotFound(FacilityDefId),
    #[error("Unknown resource {0:?}")]
    ResourceNotFound(ResourceId),
    #[error("Faction {0:?} does not own the target")]
    NotOwner(FactionId),
    #[error("Only the privileged faction may request tax")]
    NotPrivileged,
    #[error("Tax item {0:?} has a negative or non-finite market value")]
    InvalidBasket(String),
    #[error("No free facility slots")]
    NoFacilitySlots,
    #[error("Facility already built")]
    AlreadyBuilt,
    #[error("Tech tier too low: required {required}, have {have}")]
    TechTooLow { required: u8, have: u8 },
    #[error("Cannot afford the cost")]
    TooExpensive,
    #[error("No such facility at the settlement")]
    NoFacility,
    #[error("Facility is at its maximum size {0}")]
    MaxSize(u32),
    #[error("Facility is already growing")]
    AlreadyUpgrading,
    #[error("Settlement is at the maximum level {0}")]
    MaxLevel(u32),
    #[error("Settlement is already leveling up")]
    AlreadyLeveling,
    #[error("Settlement is not leveling up")]
    NoLevelUp,
    #[error("Unknown process {0:?}")]
    ProcessNotFound(ProcessId),
    #[error("Process {0:?} is not in a state that allows this")]
    ProcessInactive(ProcessId),
    #[error("Cannot settle: {0}")]
    Placement(#[from] PlacementError),
}

/// Snapshot of one active process for UI/AI consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub id: ProcessId,
    pub label: String,
    pub progress: f32,
    pub state: ProcessState,
}

pub struct Simulation {
    pub(crate) state: EmpireState,
    pub(crate) config: SimConfig,
    pub(crate) defs: Arc<DefRegistry>,
    pub(crate) oracle: Box<dyn TileOracle>,
    pub(crate) scheduler: ActionScheduler<Simulation>,
    pub(crate) controllers: BTreeMap<FactionId, Box<dyn FactionController>>,
    /// Commands waiting for the next commands action.
    pub(crate) pending: Vec<PlayerInputs>,
    /// Bounded by `event_log_capacity`.
    pub(crate) events: VecDeque<SimEvent>,
    /// Unbounded: every entry is tax owed to the host.
    pub(crate) deliveries: Vec<DeliveryRequest>,
    pub(crate) metrics: SimMetrics,
}

impl Scheduled for Simulation {
    fn current_tick(&self) -> u64 {
        self.state.tick
    }

    fn scheduler(&self) -> &ActionScheduler<Self> {
        &self.scheduler
    }

    fn scheduler_mut(&mut self) -> &mut ActionScheduler<Self> {
        &mut self.scheduler
    }
}

impl Simulation {
    /// A fresh world with no factions.
    pub fn new(
        defs: impl Into<Arc<DefRegistry>>,
        oracle: impl TileOracle + 'static,
        config: SimConfig,
        seed: u64,
    ) -> Self {
        let state = EmpireState::new(seed, config.tax_rate);
        Self::from_parts(state, config, defs.into(), Box::new(oracle))
    }

    /// Wire up a context around existing state: standard actions first, then
    /// one advancement action per unfinished process, in id order.
    pub(crate) fn from_parts(
        state: EmpireState,
        mut config: SimConfig,
        defs: Arc<DefRegistry>,
        oracle: Box<dyn TileOracle>,
    ) -> Self {
        if let Err(e) = config.validate() {
            log::warn!("{}; using the default shrink factor", e);
            config.tax_shrink_factor = SimConfig::default().tax_shrink_factor;
        }
        let mut sim = Self {
            state,
            config,
            defs,
            oracle,
            scheduler: ActionScheduler::new(),
            controllers: BTreeMap::new(),
            pending: Vec::new(),
            events: VecDeque::new(),
            deliveries: Vec::new(),
            metrics: SimMetrics::default(),
        };
        sim.register_standard_actions();

        let unfinished: Vec<ProcessId> = sim
            .state
            .processes
            .values()
            .filter(|p| !p.is_finished())
            .map(|p| p.id)
            .collect();
        for id in unfinished {
            processes::register_advancement(&mut sim, id);
        }
        sim
    }

    fn register_standard_actions(&mut self) {
        let config = &self.config;
        let actions = [
            ScheduledAction::new("Commands", |_: &Simulation| true, apply_commands),
            ScheduledAction::on_cadence("Resources", config.resource_cadence(), |sim: &mut Simulation| {
                let start = Instant::now();
                production::run_resource_tick(&mut sim.state, &sim.defs, sim.oracle.as_ref());
                sim.metrics.resource_time += start.elapsed();
            }),
            ScheduledAction::on_cadence("Tax", config.tax_cadence(), |sim: &mut Simulation| {
                let start = Instant::now();
                taxation::run_tax_tick(sim);
                sim.metrics.tax_time += start.elapsed();
            }),
            ScheduledAction::on_cadence("Controllers", config.controller_cadence(), run_controllers),
            ScheduledAction::on_cadence("Territory", config.territory_cadence(), |sim: &mut Simulation| {
                let start = Instant::now();
                colonization::refresh_territory(sim);
                sim.metrics.territory_time += start.elapsed();
            }),
        ];
        for action in actions {
            self.scheduler.register(action);
        }
    }

    /// Advance one tick.
    #[instrument(skip_all, name = "step")]
    pub fn step(&mut self) -> TickReport {
        let start = Instant::now();
        self.state.tick += 1;

        let report = run_tick(self);

        self.metrics.total_ticks += 1;
        self.metrics.actions_executed += report.executed as u64;
        self.metrics.actions_discarded += report.discarded as u64;

        let freq = self.config.checksum_frequency;
        if freq > 0 && self.state.tick % freq == 0 {
            let checksum = self.state.checksum();
            log::debug!("Tick {} checksum {:016x}", self.state.tick, checksum);
            self.metrics.last_checksum = Some(checksum);
        }

        self.metrics.total_time += start.elapsed();
        report
    }

    pub fn run_ticks(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Queue commands for the next tick.
    pub fn submit(&mut self, inputs: PlayerInputs) {
        self.pending.push(inputs);
    }

    pub(crate) fn record(&mut self, event: SimEvent) {
        log::trace!("{:?}", event);
        let capacity = self.config.event_log_capacity;
        if capacity > 0 && self.events.len() >= capacity {
            if self.metrics.events_dropped == 0 {
                log::warn!("Event log full ({} entries), dropping oldest events", capacity);
            }
            self.events.pop_front();
            self.metrics.events_dropped += 1;
        }
        self.events.push_back(event);
    }

    pub(crate) fn execute_command(
        &mut self,
        faction: FactionId,
        cmd: &Command,
    ) -> Result<(), CommandError> {
        if self.state.faction(faction).is_none() {
            return Err(CommandError::FactionNotFound(faction));
        }
        match cmd {
            Command::Settle { tile, name } => {
                colonization::settle(self, faction, *tile, name.clone()).map(|_| ())
            }
            Command::Abandon { settlement } => {
                colonization::abandon_settlement(self, faction, *settlement)
            }
            Command::LevelSettlement { settlement } => {
                colonization::level_settlement(self, faction, *settlement).map(|_| ())
            }
            Command::BuildFacility {
                settlement,
                facility,
            } => buildings::build_facility(self, faction, *settlement, *facility).map(|_| ()),
            Command::UpgradeFacility {
                settlement,
                facility,
            } => buildings::upgrade_facility(self, faction, *settlement, *facility).map(|_| ()),
            Command::DemolishFacility {
                settlement,
                facility,
            } => buildings::demolish_facility(self, faction, *settlement, *facility).map(|_| ()),
            Command::CancelProcess { process, refund } => {
                self.check_process_owner(faction, *process)?;
                processes::cancel_process(self, *process, *refund)
            }
            Command::SuspendProcess { process } => {
                self.check_process_owner(faction, *process)?;
                processes::suspend_process(self, *process)
            }
            Command::ResumeProcess { process } => {
                self.check_process_owner(faction, *process)?;
                processes::resume_process(self, *process)
            }
            Command::RequestTax { resource, basket } => {
                taxation::request_tax(self, faction, *resource, basket.clone())
            }
        }
    }

    fn check_process_owner(&self, faction: FactionId, id: ProcessId) -> Result<(), CommandError> {
        let process = self
            .state
            .processes
            .get(&id)
            .ok_or(CommandError::ProcessNotFound(id))?;
        let owner = match &process.kind {
            ProcessKind::FacilityBuild { settlement, .. }
            | ProcessKind::SettlementLevel { settlement } => {
                self.state.settlement(*settlement).map(|s| s.faction)
            }
            ProcessKind::Delivery { faction: payer, .. } => Some(*payer),
        };
        if owner != Some(faction) {
            return Err(CommandError::NotOwner(faction));
        }
        Ok(())
    }

    // --- World setup ---

    pub fn add_faction(&mut self, name: impl Into<String>, tech_tier: u8) -> FactionId {
        self.state.add_faction(name, tech_tier)
    }

    /// Change a faction's tech tier and re-claim around its settlements for
    /// the new radius.
    pub fn set_tech_tier(&mut self, faction: FactionId, tech_tier: u8) -> Result<(), CommandError> {
        self.state
            .faction_mut(faction)
            .ok_or(CommandError::FactionNotFound(faction))?
            .tech_tier = tech_tier;
        let settlements: Vec<SettlementId> =
            self.state.settlements_of(faction).map(|s| s.id).collect();
        for settlement in settlements {
            colonization::claim_territory(self, settlement);
        }
        Ok(())
    }

    /// Add to a faction's stockpile. Returns the new balance.
    pub fn credit(&mut self, faction: FactionId, resource: ResourceId, amount: f64) -> f64 {
        match self.state.faction_mut(faction) {
            Some(f) => f.stockpile.credit(resource, amount),
            None => {
                log::warn!("Credit to unknown faction {}", faction.0);
                0.0
            }
        }
    }

    pub fn set_privileged_faction(&mut self, faction: Option<FactionId>) {
        self.state.privileged_faction = faction;
    }

    pub fn set_drop_site(&mut self, drop_site: Option<DropSite>) {
        self.state.drop_site = drop_site;
    }

    pub fn set_tax_rate(&mut self, rate: f64) {
        self.state.tax_rate = rate.max(0.0);
    }

    pub fn found_settlement(
        &mut self,
        faction: FactionId,
        tile: TileId,
        name: impl Into<String>,
        level: u32,
    ) -> Result<SettlementId, CommandError> {
        colonization::found_settlement(self, faction, tile, name, level)
    }

    pub fn build_facility_instant(
        &mut self,
        settlement: SettlementId,
        facility: FacilityDefId,
        size: u32,
    ) -> Result<(), CommandError> {
        buildings::build_facility_instant(self, settlement, facility, size)
    }

    /// Hand a faction's decisions to `controller`, replacing any previous one.
    pub fn set_controller(&mut self, faction: FactionId, controller: impl FactionController + 'static) {
        self.controllers.insert(faction, Box::new(controller));
    }

    // --- Queries ---

    pub fn state(&self) -> &EmpireState {
        &self.state
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn defs(&self) -> &DefRegistry {
        &self.defs
    }

    pub fn oracle(&self) -> &dyn TileOracle {
        self.oracle.as_ref()
    }

    pub fn tick(&self) -> Tick {
        self.state.tick
    }

    pub fn stockpile(&self, faction: FactionId, resource: ResourceId) -> f64 {
        self.state
            .faction(faction)
            .map_or(0.0, |f| f.stockpile.get(resource))
    }

    /// Per-tick change after the deficit throttle, as the next resource tick
    /// would apply it.
    pub fn resource_change(&self, faction: FactionId) -> BTreeMap<ResourceId, f64> {
        production::adjusted_resource_change(&self.state, &self.defs, self.oracle.as_ref(), faction)
    }

    pub fn tile_owner(&self, tile: TileId) -> Option<SettlementId> {
        self.state.territory.tile_owner(tile)
    }

    /// Tiles `settlement` currently wins, sorted.
    pub fn territory(&mut self, settlement: SettlementId) -> Vec<TileId> {
        self.state.territory.territory(settlement).to_vec()
    }

    pub fn facilities(&self, settlement: SettlementId) -> &[Facility] {
        self.state
            .settlement(settlement)
            .map(|s| s.facilities.as_slice())
            .unwrap_or(&[])
    }

    pub fn available_facilities(&self, settlement: SettlementId) -> Vec<FacilityDefId> {
        buildings::available_facilities(self, settlement)
    }

    pub fn processes(&self, settlement: SettlementId) -> Vec<ProcessInfo> {
        let Some(s) = self.state.settlement(settlement) else {
            return Vec::new();
        };
        s.processes
            .iter()
            .filter_map(|id| self.state.processes.get(id))
            .map(|p| ProcessInfo {
                id: p.id,
                label: p.label.clone(),
                progress: p.progress_pct(),
                state: p.state,
            })
            .collect()
    }

    pub fn max_tax(&self, resource: ResourceId) -> f64 {
        taxation::max_tax(&self.state, &self.defs, self.oracle.as_ref(), resource)
    }

    pub fn upgrade_progress(&self, settlement: SettlementId, facility: FacilityDefId) -> Option<f32> {
        buildings::upgrade_progress(self, settlement, facility)
    }

    pub fn level_progress(&self, settlement: SettlementId) -> Option<f32> {
        colonization::level_progress(self, settlement)
    }

    /// Events recorded since the last call, oldest first.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.events.drain(..).collect()
    }

    /// Tax deliveries that arrived since the last call.
    ///
    /// Deliveries are never dropped, so hosts that collect tax must call this
    /// regularly.
    pub fn take_deliveries(&mut self) -> Vec<DeliveryRequest> {
        std::mem::take(&mut self.deliveries)
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    pub fn checksum(&self) -> u64 {
        self.state.checksum()
    }
}

/// Execute every queued command. Failures are logged and dropped.
fn apply_commands(sim: &mut Simulation) {
    if sim.pending.is_empty() {
        return;
    }
    let start = Instant::now();
    let inputs = std::mem::take(&mut sim.pending);
    for input in inputs {
        for cmd in &input.commands {
            if let Err(e) = sim.execute_command(input.faction, cmd) {
                log::warn!(
                    "Failed to execute command for faction {}: {}",
                    input.faction.0,
                    e
                );
                sim.metrics.commands_rejected += 1;
                sim.record(SimEvent::CommandRejected {
                    tick: sim.state.tick,
                    faction: input.faction,
                    reason: e.to_string(),
                });
            }
        }
    }
    sim.metrics.command_time += start.elapsed();
}

/// Ask every controller for commands; they run on the next tick.
#[instrument(skip_all, name = "controllers")]
fn run_controllers(sim: &mut Simulation) {
    if sim.controllers.is_empty() {
        return;
    }
    let start = Instant::now();
    let mut controllers = std::mem::take(&mut sim.controllers);
    for (faction, controller) in controllers.iter_mut() {
        let Some(view) = FactionView::capture(sim, *faction) else {
            log::warn!("Controller for unknown faction {}", faction.0);
            continue;
        };
        let available = view.available_commands();
        let commands = controller.decide(&view, &available);
        if !commands.is_empty() {
            log::debug!("Faction {} issued {} commands", faction.0, commands.len());
            sim.pending.push(PlayerInputs::new(*faction, commands));
        }
    }
    // Controllers installed while deciding take precedence.
    controllers.append(&mut sim.controllers);
    sim.controllers = controllers;
    sim.metrics.controller_time += start.elapsed();
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
