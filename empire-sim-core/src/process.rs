//! Deferred, progress-tracked state transitions.
//!
//! A [`Process`] is pure data: what finishes, how far along it is, and what
//! was paid for it. The engine side (registering the advancement action,
//! firing completions) lives in [`crate::systems::processes`].

use crate::modifiers::FacilityDefId;
use crate::resources::ResourceAmount;
use crate::state::{FactionId, ProcessId, SettlementId};
use crate::tax::DeliveryRequest;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Suspended,
    Running,
    Completed,
    Canceled,
}

/// What happens when a process completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessKind {
    /// Grow a facility by one size step.
    FacilityBuild {
        settlement: SettlementId,
        facility: FacilityDefId,
    },
    /// Raise a settlement's level by one.
    SettlementLevel { settlement: SettlementId },
    /// Hand collected tax to the host.
    Delivery {
        faction: FactionId,
        request: DeliveryRequest,
    },
}

impl ProcessKind {
    pub fn settlement(&self) -> Option<SettlementId> {
        match self {
            ProcessKind::FacilityBuild { settlement, .. }
            | ProcessKind::SettlementLevel { settlement } => Some(*settlement),
            ProcessKind::Delivery { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: ProcessId,
    pub label: String,
    pub kind: ProcessKind,
    pub progress: u32,
    pub duration: u32,
    pub state: ProcessState,
    /// Resources debited when the process was started.
    #[serde(default)]
    pub paid: Vec<ResourceAmount>,
}

impl Process {
    pub fn new(id: ProcessId, label: impl Into<String>, kind: ProcessKind, duration: u32) -> Self {
        Self {
            id,
            label: label.into(),
            kind,
            progress: 0,
            duration,
            state: ProcessState::Suspended,
            paid: Vec::new(),
        }
    }

    /// Fraction complete in `[0, 1]`. Zero-length processes report 1.
    pub fn progress_pct(&self) -> f32 {
        if self.duration == 0 {
            return 1.0;
        }
        (self.progress as f32 / self.duration as f32).min(1.0)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ProcessState::Suspended | ProcessState::Running)
    }

    pub fn is_finished(&self) -> bool {
        self.progress >= self.duration
    }

    pub fn start(&mut self) {
        if self.state == ProcessState::Suspended {
            self.state = ProcessState::Running;
        }
    }

    pub fn suspend(&mut self) -> bool {
        if self.state == ProcessState::Running {
            self.state = ProcessState::Suspended;
            return true;
        }
        false
    }

    pub fn cancel(&mut self) -> bool {
        if self.is_active() {
            self.state = ProcessState::Canceled;
            return true;
        }
        false
    }

    /// Advance one tick. Returns `true` only on the tick that completes it.
    pub fn advance(&mut self) -> bool {
        if self.state != ProcessState::Running {
            return false;
        }
        self.progress = self.progress.saturating_add(1);
        if self.is_finished() {
            self.state = ProcessState::Completed;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(duration: u32) -> Process {
        Process::new(
            ProcessId(1),
            "Build",
            ProcessKind::FacilityBuild {
                settlement: SettlementId(1),
                facility: FacilityDefId(0),
            },
            duration,
        )
    }

    #[test]
    fn test_suspended_does_not_advance() {
        let mut p = build(3);
        assert!(!p.advance());
        assert_eq!(p.progress, 0);
    }

    #[test]
    fn test_completes_exactly_once() {
        let mut p = build(3);
        p.start();
        let fired: Vec<bool> = (0..5).map(|_| p.advance()).collect();
        assert_eq!(fired, vec![false, false, true, false, false]);
        assert_eq!(p.state, ProcessState::Completed);
        assert_eq!(p.progress, 3);
    }

    #[test]
    fn test_canceled_never_completes() {
        let mut p = build(2);
        p.start();
        p.advance();
        assert!(p.cancel());
        assert!(!p.advance());
        assert_eq!(p.state, ProcessState::Canceled);
        assert!(!p.cancel());
    }

    #[test]
    fn test_suspend_and_resume() {
        let mut p = build(2);
        p.start();
        p.advance();
        assert!(p.suspend());
        assert!(!p.advance());
        p.start();
        assert!(p.advance());
    }

    #[test]
    fn test_progress_pct() {
        let mut p = build(4);
        p.start();
        p.advance();
        assert_eq!(p.progress_pct(), 0.25);
        assert_eq!(build(0).progress_pct(), 1.0);
        assert_eq!(
            p.kind.settlement(),
            Some(SettlementId(1)),
            "build processes belong to a settlement"
        );
    }
}
