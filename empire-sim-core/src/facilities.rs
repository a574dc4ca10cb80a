//! Facility definitions and per-settlement facility instances.
//!
//! Facilities are settlement improvements that produce and consume resources.
//! Each settlement holds at most one instance of each facility kind, and an
//! instance grows in integer size steps through build processes.

use crate::modifiers::{FacilityDefId, ResourceModifier};
use crate::resources::ResourceAmount;
use serde::{Deserialize, Serialize};

/// Per-kind placement rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityBehavior {
    #[default]
    Standard,
    /// Only factions at or above this tech tier may build it.
    RequiresTechTier(u8),
}

impl FacilityBehavior {
    pub fn allows(&self, tech_tier: u8) -> bool {
        match self {
            FacilityBehavior::Standard => true,
            FacilityBehavior::RequiresTechTier(min) => tech_tier >= *min,
        }
    }
}

/// Static facility definition.
///
/// Immutable after loading and shared across all settlements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityDef {
    pub id: FacilityDefId,
    pub name: String,
    /// Ticks for one size step to complete.
    pub build_duration: u32,
    /// Paid for every size step, refunded on canceled steps if asked.
    pub build_cost: Vec<ResourceAmount>,
    /// Per-size-unit production. The offset is the base amount, the
    /// multiplier scales the whole settlement's output of that resource.
    pub production: Vec<ResourceModifier>,
    /// Per-size-unit upkeep, same shape as `production`.
    pub upkeep: Vec<ResourceModifier>,
    #[serde(default)]
    pub behavior: FacilityBehavior,
}

/// A facility built (or being built) at a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub def: FacilityDefId,
    /// Completed size steps. Size 0 means the first step is still in progress.
    pub size: u32,
}

impl Facility {
    pub fn new(def: FacilityDefId) -> Self {
        Self { def, size: 0 }
    }

    /// Apply a signed size change, clamped to `0..=max_size`. Returns the new size.
    pub fn change_size(&mut self, delta: i64, max_size: u32) -> u32 {
        let next = (self.size as i64 + delta).clamp(0, max_size as i64);
        self.size = next as u32;
        self.size
    }
}
