use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Accumulated timing and throughput counters for a simulation run.
#[derive(Default, Clone, Debug, Serialize, Deserialize)]
pub struct SimMetrics {
    pub total_ticks: u64,
    pub total_time: Duration,
    pub command_time: Duration,
    pub resource_time: Duration,
    pub tax_time: Duration,
    /// Time spent inside faction controllers.
    pub controller_time: Duration,
    pub territory_time: Duration,
    pub actions_executed: u64,
    pub actions_discarded: u64,
    pub commands_rejected: u64,
    /// Events discarded because the log hit its capacity before a drain.
    pub events_dropped: u64,
    /// Most recent periodic state checksum.
    pub last_checksum: Option<u64>,
}

impl SimMetrics {
    pub fn tick_avg_ms(&self) -> f64 {
        if self.total_ticks == 0 {
            0.0
        } else {
            self.total_time.as_secs_f64() * 1000.0 / self.total_ticks as f64
        }
    }

    pub fn days_per_second(&self, days_simulated: f64) -> f64 {
        if self.total_time.as_secs_f64() == 0.0 {
            0.0
        } else {
            days_simulated / self.total_time.as_secs_f64()
        }
    }
}
