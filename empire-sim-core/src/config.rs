use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tick-modulus trigger for a recurring action: runs when
/// `tick % interval == offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cadence {
    pub interval: u64,
    pub offset: u64,
}

impl Cadence {
    pub const fn new(interval: u64, offset: u64) -> Self {
        Self { interval, offset }
    }

    /// A zero interval is treated as every tick; offsets wrap into the interval.
    pub fn fires_at(&self, tick: u64) -> bool {
        let interval = self.interval.max(1);
        tick % interval == self.offset % interval
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Json(String),
    #[error("tax_shrink_factor must lie strictly between 0 and 1, got {0}")]
    ShrinkFactor(f64),
}

/// Simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Ticks in one in-game day.
    pub ticks_per_day: u64,
    /// Ticks in one in-game hour. Tax deliveries default to one hour of travel.
    pub ticks_per_hour: u64,

    /// Offset of the daily resource tick.
    pub resource_offset: u64,
    /// Offset of the daily tax collection.
    pub tax_offset: u64,
    /// Faction controllers run this many times per day.
    pub controller_runs_per_day: u64,
    pub controller_offset: u64,
    /// Offset of the daily claim refresh.
    pub territory_offset: u64,

    /// Share of production skimmed as tax.
    pub tax_rate: f64,
    /// Count multiplier applied per shrink pass of an oversized tax basket.
    pub tax_shrink_factor: f64,
    /// Travel time of a tax delivery, in ticks. 0 delivers immediately.
    pub tax_delivery_ticks: u32,

    /// Amplitude of the random tie-break added to claim weights.
    pub claim_jitter: f64,
    /// Days a settlement level-up takes.
    pub level_up_days: u32,
    pub max_settlement_level: u32,

    /// Most events kept between drains; the oldest are dropped first
    /// (0 = unbounded).
    pub event_log_capacity: usize,

    /// Compute checksum every N ticks (0 = disabled).
    pub checksum_frequency: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ticks_per_day: 60_000,
            ticks_per_hour: 2_500,
            resource_offset: 1,
            tax_offset: 5,
            controller_runs_per_day: 4,
            controller_offset: 10,
            territory_offset: 20,
            tax_rate: 0.1,
            tax_shrink_factor: 0.75,
            tax_delivery_ticks: 2_500,
            claim_jitter: 1e-5,
            level_up_days: 3,
            max_settlement_level: crate::state::MAX_SETTLEMENT_LEVEL,
            event_log_capacity: 10_000,
            // Default to daily checksums
            checksum_frequency: 60_000,
        }
    }
}

impl SimConfig {
    pub fn resource_cadence(&self) -> Cadence {
        Cadence::new(self.ticks_per_day, self.resource_offset)
    }

    pub fn tax_cadence(&self) -> Cadence {
        Cadence::new(self.ticks_per_day, self.tax_offset)
    }

    pub fn controller_cadence(&self) -> Cadence {
        Cadence::new(
            self.ticks_per_day / self.controller_runs_per_day.max(1),
            self.controller_offset,
        )
    }

    pub fn territory_cadence(&self) -> Cadence {
        Cadence::new(self.ticks_per_day, self.territory_offset)
    }

    /// Parse a config, filling missing fields with defaults, and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Values outside these ranges make the tax shrink loop crawl.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = self.tax_shrink_factor;
        if !(f > 0.0 && f < 1.0) {
            return Err(ConfigError::ShrinkFactor(f));
        }
        Ok(())
    }

    /// Duration of a settlement level-up, in ticks.
    pub fn level_up_ticks(&self) -> u32 {
        (self.level_up_days as u64 * self.ticks_per_day).min(u32::MAX as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.ticks_per_day, 60_000);
        assert_eq!(config.tax_rate, 0.1);
        assert_eq!(config.level_up_ticks(), 180_000);
        assert_eq!(config.controller_cadence(), Cadence::new(15_000, 10));
    }

    #[test]
    fn test_cadence_fires_on_offset() {
        let daily = Cadence::new(100, 5);
        assert!(daily.fires_at(5));
        assert!(daily.fires_at(105));
        assert!(!daily.fires_at(100));

        let every_tick = Cadence::new(0, 3);
        assert!(every_tick.fires_at(0));
        assert!(every_tick.fires_at(7));

        // Offsets beyond the interval wrap.
        assert!(Cadence::new(10, 20).fires_at(0));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SimConfig = serde_json::from_str(r#"{"ticks_per_day": 100}"#).unwrap();
        assert_eq!(config.ticks_per_day, 100);
        assert_eq!(config.tax_offset, 5);
        assert_eq!(config.resource_cadence(), Cadence::new(100, 1));
    }

    #[test]
    fn test_shrink_factor_range_checked() {
        assert!(SimConfig::from_json(r#"{"tax_shrink_factor": 0.5}"#).is_ok());
        for bad in ["1.0", "1.5", "0.0", "-0.25"] {
            let json = format!(r#"{{"tax_shrink_factor": {bad}}}"#);
            assert!(matches!(
                SimConfig::from_json(&json),
                Err(ConfigError::ShrinkFactor(_))
            ));
        }
        assert!(matches!(
            SimConfig::from_json("not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
