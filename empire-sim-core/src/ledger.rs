//! Per-faction stockpile of resource amounts.

use crate::modifiers::ResourceId;
use crate::resources::ResourceAmount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stockpile map from resource to amount.
///
/// Amounts never go below zero: every mutation clamps at 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceLedger(BTreeMap<ResourceId, f64>);

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount on hand, 0 for resources never stocked.
    pub fn get(&self, resource: ResourceId) -> f64 {
        self.0.get(&resource).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, resource: ResourceId, amount: f64) {
        self.0.insert(resource, amount.max(0.0));
    }

    /// Apply a signed change, clamping the result at 0. Returns the new amount.
    pub fn apply_change(&mut self, resource: ResourceId, delta: f64) -> f64 {
        let entry = self.0.entry(resource).or_insert(0.0);
        *entry = (*entry + delta).max(0.0);
        *entry
    }

    pub fn credit(&mut self, resource: ResourceId, amount: f64) -> f64 {
        self.apply_change(resource, amount)
    }

    pub fn debit(&mut self, resource: ResourceId, amount: f64) -> f64 {
        self.apply_change(resource, -amount)
    }

    pub fn can_afford(&self, cost: &[ResourceAmount]) -> bool {
        cost.iter().all(|c| self.get(c.resource) >= c.amount)
    }

    /// Debit every entry of `cost`. Callers check [`Self::can_afford`] first.
    pub fn pay(&mut self, cost: &[ResourceAmount]) {
        for c in cost {
            self.debit(c.resource, c.amount);
        }
    }

    pub fn refund(&mut self, cost: &[ResourceAmount]) {
        for c in cost {
            self.credit(c.resource, c.amount);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

impl FromIterator<(ResourceId, f64)> for ResourceLedger {
    fn from_iter<I: IntoIterator<Item = (ResourceId, f64)>>(iter: I) -> Self {
        let mut ledger = ResourceLedger::new();
        for (resource, amount) in iter {
            ledger.set(resource, amount);
        }
        ledger
    }
}
