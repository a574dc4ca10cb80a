//! Process engine: starting, advancing, completing and canceling processes.
//!
//! Every active process owns one scheduled action that runs each tick. The
//! action advances the process while it is `Running` and is discarded once
//! the process leaves the process table (completed or canceled).

use crate::events::SimEvent;
use crate::process::{Process, ProcessKind, ProcessState};
use crate::resources::ResourceAmount;
use crate::scheduler::ScheduledAction;
use crate::state::{ProcessId, SettlementId};
use crate::step::{CommandError, Simulation};
use crate::systems::{buildings, colonization};

/// Create a process and start it.
///
/// `paid` records what the caller already debited, for refunds on cancel.
/// A zero-length process completes before this returns.
pub fn start_process(
    sim: &mut Simulation,
    label: impl Into<String>,
    kind: ProcessKind,
    duration: u32,
    paid: Vec<ResourceAmount>,
) -> ProcessId {
    let id = sim.state.alloc_process_id();
    let mut process = Process::new(id, label, kind, duration);
    process.paid = paid;
    process.start();

    if let Some(settlement) = process.kind.settlement() {
        if let Some(s) = sim.state.settlement_mut(settlement) {
            s.processes.push(id);
        }
    }

    log::debug!("Started {} ({} ticks)", process.label, duration);
    sim.record(SimEvent::ProcessStarted {
        tick: sim.state.tick,
        process: id,
        label: process.label.clone(),
        duration,
    });
    sim.state.processes.insert(id, process);

    if duration == 0 {
        if let Some(p) = sim.state.processes.get_mut(&id) {
            p.state = ProcessState::Completed;
        }
        complete_process(sim, id);
    } else {
        register_advancement(sim, id);
    }
    id
}

/// Register the per-tick advancement action of an active process.
pub(crate) fn register_advancement(sim: &mut Simulation, id: ProcessId) {
    let label = sim
        .state
        .processes
        .get(&id)
        .map_or_else(|| format!("process {}", id.0), |p| p.label.clone());
    let action = ScheduledAction::new(
        format!("Advance {}", label),
        move |sim: &Simulation| {
            sim.state
                .processes
                .get(&id)
                .is_some_and(|p| p.state == ProcessState::Running)
        },
        move |sim: &mut Simulation| advance_process(sim, id),
    )
    .with_discard(move |sim: &Simulation| !sim.state.processes.contains_key(&id));
    sim.scheduler.register(action);
}

/// Advance one tick, firing the completion if the duration is reached.
pub fn advance_process(sim: &mut Simulation, id: ProcessId) {
    let finished = match sim.state.processes.get_mut(&id) {
        Some(p) => p.advance(),
        None => return,
    };
    if finished {
        complete_process(sim, id);
    }
}

/// Remove a finished process and apply its effect. Fires at most once per
/// process: the process leaves the table before the effect runs.
fn complete_process(sim: &mut Simulation, id: ProcessId) {
    let Some(process) = sim.state.processes.remove(&id) else {
        return;
    };
    detach(sim, process.kind.settlement(), id);

    log::info!("{} completed", process.label);
    sim.record(SimEvent::ProcessCompleted {
        tick: sim.state.tick,
        process: id,
        label: process.label.clone(),
    });

    match process.kind {
        ProcessKind::FacilityBuild {
            settlement,
            facility,
        } => buildings::change_facility_size(sim, settlement, facility, 1),
        ProcessKind::SettlementLevel { settlement } => {
            colonization::raise_level(sim, settlement);
        }
        ProcessKind::Delivery { request, .. } => sim.deliveries.push(request),
    }
}

/// Cancel an active process without firing its completion.
///
/// With `refund`, whatever was paid at start is credited back to the owning
/// faction. A canceled first build step removes the size-0 facility.
pub fn cancel_process(sim: &mut Simulation, id: ProcessId, refund: bool) -> Result<(), CommandError> {
    let Some(mut process) = sim.state.processes.remove(&id) else {
        return Err(CommandError::ProcessNotFound(id));
    };
    process.cancel();
    detach(sim, process.kind.settlement(), id);

    let owner = match &process.kind {
        ProcessKind::FacilityBuild { settlement, .. } | ProcessKind::SettlementLevel { settlement } => {
            sim.state.settlement(*settlement).map(|s| s.faction)
        }
        ProcessKind::Delivery { faction, .. } => Some(*faction),
    };
    let refunded = refund && !process.paid.is_empty();
    if refunded {
        if let Some(f) = owner.and_then(|f| sim.state.faction_mut(f)) {
            f.stockpile.refund(&process.paid);
        }
    }

    if let ProcessKind::FacilityBuild {
        settlement,
        facility,
    } = process.kind
    {
        buildings::remove_if_unbuilt(sim, settlement, facility);
    }

    log::info!("{} canceled (refund: {})", process.label, refunded);
    sim.record(SimEvent::ProcessCanceled {
        tick: sim.state.tick,
        process: id,
        label: process.label,
        refunded,
    });
    Ok(())
}

pub fn suspend_process(sim: &mut Simulation, id: ProcessId) -> Result<(), CommandError> {
    let process = sim
        .state
        .processes
        .get_mut(&id)
        .ok_or(CommandError::ProcessNotFound(id))?;
    if !process.suspend() {
        return Err(CommandError::ProcessInactive(id));
    }
    Ok(())
}

pub fn resume_process(sim: &mut Simulation, id: ProcessId) -> Result<(), CommandError> {
    let process = sim
        .state
        .processes
        .get_mut(&id)
        .ok_or(CommandError::ProcessNotFound(id))?;
    if process.state != ProcessState::Suspended {
        return Err(CommandError::ProcessInactive(id));
    }
    process.start();
    Ok(())
}

fn detach(sim: &mut Simulation, settlement: Option<SettlementId>, id: ProcessId) {
    if let Some(s) = settlement.and_then(|s| sim.state.settlement_mut(s)) {
        s.processes.retain(|p| *p != id);
    }
}

/// First active process at `settlement` matching `pred`.
pub fn find_process(
    sim: &Simulation,
    settlement: SettlementId,
    pred: impl Fn(&ProcessKind) -> bool,
) -> Option<&Process> {
    let s = sim.state.settlement(settlement)?;
    s.processes
        .iter()
        .filter_map(|id| sim.state.processes.get(id))
        .find(|p| pred(&p.kind))
}
