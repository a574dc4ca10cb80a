//! Resource modifier algebra.
//!
//! A [`ResourceModifier`] is an additive offset paired with a multiplicative
//! factor for one resource kind. Merging two modifiers for the same resource
//! sums the offsets and multiplies the factors, so merges within one
//! aggregation pass commute and associate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Type-safe resource kind identifier.
///
/// Sequential ids (0..N) assigned by [`crate::registry::DefRegistry`] at load time.
#[derive(
    Hash, Eq, PartialEq, Clone, Copy, Debug, Default, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(transparent)]
pub struct ResourceId(pub u16);

/// Type-safe facility definition identifier.
#[derive(
    Hash, Eq, PartialEq, Clone, Copy, Debug, Default, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(transparent)]
pub struct FacilityDefId(pub u16);

#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot merge modifiers of different resources ({left:?} and {right:?})")]
pub struct ModifierMismatch {
    pub left: ResourceId,
    pub right: ResourceId,
}

/// `(resource, offset, multiplier)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceModifier {
    pub resource: ResourceId,
    pub offset: f64,
    pub multiplier: f64,
}

impl ResourceModifier {
    pub fn new(resource: ResourceId, offset: f64, multiplier: f64) -> Self {
        Self {
            resource,
            offset,
            multiplier,
        }
    }

    /// Identity element of the merge: offset 0, multiplier 1.
    pub fn neutral(resource: ResourceId) -> Self {
        Self::new(resource, 0.0, 1.0)
    }

    /// Merge two modifiers for the same resource into a new one.
    pub fn merge_with(&self, other: &ResourceModifier) -> Result<ResourceModifier, ModifierMismatch> {
        let mut merged = *self;
        merged.merge_into(other)?;
        Ok(merged)
    }

    /// Merge `other` into `self` in place.
    pub fn merge_into(&mut self, other: &ResourceModifier) -> Result<(), ModifierMismatch> {
        if self.resource != other.resource {
            return Err(ModifierMismatch {
                left: self.resource,
                right: other.resource,
            });
        }
        self.offset += other.offset;
        self.multiplier *= other.multiplier;
        Ok(())
    }

    /// `(1 + offset) * multiplier`
    pub fn total_modifier(&self) -> f64 {
        (1.0 + self.offset) * self.multiplier
    }

    /// Amount of resource this modifier yields per tick: `offset * multiplier`.
    ///
    /// Settlement-level production and upkeep are expressed as modifiers whose
    /// offset is the summed base amount and whose multiplier is the settlement
    /// multiplier; this is the value that flows into the faction ledger.
    pub fn net_value(&self) -> f64 {
        self.offset * self.multiplier
    }
}

/// Per-resource accumulator of modifiers, ordered by resource id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifierSet(BTreeMap<ResourceId, ResourceModifier>);

impl ModifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a modifier into the entry for its resource, creating it if absent.
    pub fn merge(&mut self, modifier: ResourceModifier) {
        let entry = self
            .0
            .entry(modifier.resource)
            .or_insert_with(|| ResourceModifier::neutral(modifier.resource));
        entry.offset += modifier.offset;
        entry.multiplier *= modifier.multiplier;
    }

    /// Add to the offset of an existing entry. Missing entries are left alone.
    pub fn add_offset(&mut self, resource: ResourceId, offset: f64) {
        if let Some(entry) = self.0.get_mut(&resource) {
            entry.offset += offset;
        }
    }

    pub fn get(&self, resource: ResourceId) -> Option<&ResourceModifier> {
        self.0.get(&resource)
    }

    /// Multiplier for `resource`, 1 if absent.
    pub fn multiplier_for(&self, resource: ResourceId) -> f64 {
        self.0.get(&resource).map_or(1.0, |m| m.multiplier)
    }

    pub fn resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceModifier> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ResourceModifier> for ModifierSet {
    fn from_iter<I: IntoIterator<Item = ResourceModifier>>(iter: I) -> Self {
        let mut set = ModifierSet::new();
        for modifier in iter {
            set.merge(modifier);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WOOD: ResourceId = ResourceId(1);
    const STONE: ResourceId = ResourceId(2);

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * (1.0 + a.abs().max(b.abs()))
    }

    #[test]
    fn test_neutral_total_is_one() {
        assert_eq!(ResourceModifier::neutral(WOOD).total_modifier(), 1.0);
        assert_eq!(ResourceModifier::neutral(WOOD).net_value(), 0.0);
    }

    #[test]
    fn test_merge_sums_offsets_multiplies_factors() {
        let a = ResourceModifier::new(WOOD, 2.0, 1.5);
        let b = ResourceModifier::new(WOOD, 3.0, 2.0);
        let merged = a.merge_with(&b).unwrap();
        assert_eq!(merged.offset, 5.0);
        assert_eq!(merged.multiplier, 3.0);
        assert_eq!(merged.total_modifier(), 18.0);
        assert_eq!(merged.net_value(), 15.0);
    }

    #[test]
    fn test_merge_rejects_different_resources() {
        let a = ResourceModifier::new(WOOD, 1.0, 1.0);
        let b = ResourceModifier::new(STONE, 1.0, 1.0);
        let err = a.merge_with(&b).unwrap_err();
        assert_eq!(err.left, WOOD);
        assert_eq!(err.right, STONE);

        let mut c = a;
        assert!(c.merge_into(&b).is_err());
        assert_eq!(c, a, "failed merge must not mutate");
    }

    #[test]
    fn test_modifier_set_groups_by_resource() {
        let set: ModifierSet = vec![
            ResourceModifier::new(WOOD, 1.0, 2.0),
            ResourceModifier::new(STONE, 4.0, 1.0),
            ResourceModifier::new(WOOD, 2.0, 0.5),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 2);
        let wood = set.get(WOOD).unwrap();
        assert_eq!(wood.offset, 3.0);
        assert_eq!(wood.multiplier, 1.0);
        assert_eq!(set.multiplier_for(ResourceId(99)), 1.0);
        assert_eq!(set.resources().collect::<Vec<_>>(), vec![WOOD, STONE]);
    }

    #[test]
    fn test_add_offset_only_touches_existing() {
        let mut set = ModifierSet::new();
        set.merge(ResourceModifier::new(WOOD, 1.0, 1.0));
        set.add_offset(WOOD, 2.0);
        set.add_offset(STONE, 2.0);
        assert_eq!(set.get(WOOD).unwrap().offset, 3.0);
        assert!(set.get(STONE).is_none());
    }

    use proptest::prelude::*;

    fn arb_modifier() -> impl Strategy<Value = ResourceModifier> {
        (-1000.0..1000.0f64, 0.01..10.0f64).prop_map(|(o, m)| ResourceModifier::new(WOOD, o, m))
    }

    proptest! {
        #[test]
        fn prop_merge_is_commutative(a in arb_modifier(), b in arb_modifier()) {
            let ab = a.merge_with(&b).unwrap();
            let ba = b.merge_with(&a).unwrap();
            prop_assert_eq!(ab.offset, ba.offset);
            prop_assert_eq!(ab.multiplier, ba.multiplier);
        }

        #[test]
        fn prop_merge_is_associative(a in arb_modifier(), b in arb_modifier(), c in arb_modifier()) {
            let left = a.merge_with(&b).unwrap().merge_with(&c).unwrap();
            let right = a.merge_with(&b.merge_with(&c).unwrap()).unwrap();
            prop_assert!(approx_eq(left.offset, right.offset));
            prop_assert!(approx_eq(left.multiplier, right.multiplier));
        }

        #[test]
        fn prop_neutral_is_identity(a in arb_modifier()) {
            let merged = a.merge_with(&ResourceModifier::neutral(WOOD)).unwrap();
            prop_assert_eq!(merged, a);
        }
    }
}
