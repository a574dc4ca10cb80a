//! Static definition registry.
//!
//! Resources and facilities are resolved once at load time into id-indexed
//! tables with a name lookup. Facility behaviors are plain tagged variants
//! on [`FacilityDef`], so nothing is looked up by type name at runtime.

use crate::facilities::{FacilityBehavior, FacilityDef};
use crate::modifiers::{FacilityDefId, ResourceId, ResourceModifier};
use crate::resources::{ResourceAmount, ResourceDef, RiverFactors, TerrainFactors};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("invalid definition file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate definition name: {0}")]
    DuplicateName(String),
    #[error("unknown resource '{name}' referenced by {context}")]
    UnknownResource { name: String, context: String },
    #[error("too many definitions (limit {0})")]
    TooMany(usize),
}

/// Immutable definitions shared by every settlement and faction.
#[derive(Debug, Clone, Default)]
pub struct DefRegistry {
    resources: Vec<ResourceDef>,
    facilities: Vec<FacilityDef>,
    resource_by_name: FxHashMap<String, ResourceId>,
    facility_by_name: FxHashMap<String, FacilityDefId>,
    settlement_cost: Vec<ResourceAmount>,
    currency: Option<ResourceId>,
}

impl DefRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn resource(&self, id: ResourceId) -> Option<&ResourceDef> {
        self.resources.get(id.0 as usize)
    }

    pub fn facility(&self, id: FacilityDefId) -> Option<&FacilityDef> {
        self.facilities.get(id.0 as usize)
    }

    pub fn resources(&self) -> &[ResourceDef] {
        &self.resources
    }

    pub fn facilities(&self) -> &[FacilityDef] {
        &self.facilities
    }

    pub fn resource_id(&self, name: &str) -> Option<ResourceId> {
        self.resource_by_name.get(name).copied()
    }

    pub fn facility_id(&self, name: &str) -> Option<FacilityDefId> {
        self.facility_by_name.get(name).copied()
    }

    /// Cost debited when a faction settles a new tile.
    pub fn settlement_cost(&self) -> &[ResourceAmount] {
        &self.settlement_cost
    }

    /// Fungible resource that fills the gap between a tax basket and its ceiling.
    pub fn currency(&self) -> Option<ResourceId> {
        self.currency
    }

    /// Market value of one unit, 0 for unknown resources.
    pub fn market_value(&self, id: ResourceId) -> f64 {
        self.resource(id).map_or(0.0, |r| r.market_value)
    }

    /// Load definitions from the JSON data-file shape ([`RegistryFile`]).
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_json::from_str(json)?;
        file.resolve()
    }
}

/// Fluent builder for [`DefRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    registry: DefRegistry,
}

impl RegistryBuilder {
    /// Register a resource kind. Re-registering a name returns the existing id.
    pub fn resource(&mut self, name: &str, market_value: f64) -> ResourceId {
        if let Some(id) = self.registry.resource_id(name) {
            return id;
        }
        let id = ResourceId(self.registry.resources.len() as u16);
        self.registry.resources.push(ResourceDef {
            id,
            name: name.to_string(),
            market_value,
            terrain_factors: TerrainFactors::default(),
            river_factors: RiverFactors::default(),
        });
        self.registry.resource_by_name.insert(name.to_string(), id);
        id
    }

    /// Register the currency resource used for tax remainders.
    pub fn currency(&mut self, name: &str, market_value: f64) -> ResourceId {
        let id = self.resource(name, market_value);
        self.registry.currency = Some(id);
        id
    }

    pub fn terrain_factors(&mut self, id: ResourceId, factors: TerrainFactors) -> &mut Self {
        if let Some(def) = self.registry.resources.get_mut(id.0 as usize) {
            def.terrain_factors = factors;
        }
        self
    }

    pub fn river_factors(&mut self, id: ResourceId, factors: RiverFactors) -> &mut Self {
        if let Some(def) = self.registry.resources.get_mut(id.0 as usize) {
            def.river_factors = factors;
        }
        self
    }

    pub fn settlement_cost(&mut self, resource: ResourceId, amount: f64) -> &mut Self {
        self.registry
            .settlement_cost
            .push(ResourceAmount::new(resource, amount));
        self
    }

    /// Start a facility definition. Call [`FacilityBuilder::finish`] to register it.
    pub fn facility(&mut self, name: &str, build_duration: u32) -> FacilityBuilder<'_> {
        let id = FacilityDefId(self.registry.facilities.len() as u16);
        FacilityBuilder {
            registry: &mut self.registry,
            def: FacilityDef {
                id,
                name: name.to_string(),
                build_duration,
                build_cost: Vec::new(),
                production: Vec::new(),
                upkeep: Vec::new(),
                behavior: FacilityBehavior::Standard,
            },
        }
    }

    pub fn build(self) -> DefRegistry {
        self.registry
    }
}

pub struct FacilityBuilder<'a> {
    registry: &'a mut DefRegistry,
    def: FacilityDef,
}

impl FacilityBuilder<'_> {
    pub fn cost(mut self, resource: ResourceId, amount: f64) -> Self {
        self.def.build_cost.push(ResourceAmount::new(resource, amount));
        self
    }

    pub fn produces(mut self, resource: ResourceId, offset: f64, multiplier: f64) -> Self {
        self.def
            .production
            .push(ResourceModifier::new(resource, offset, multiplier));
        self
    }

    pub fn consumes(mut self, resource: ResourceId, offset: f64, multiplier: f64) -> Self {
        self.def
            .upkeep
            .push(ResourceModifier::new(resource, offset, multiplier));
        self
    }

    pub fn behavior(mut self, behavior: FacilityBehavior) -> Self {
        self.def.behavior = behavior;
        self
    }

    pub fn finish(self) -> FacilityDefId {
        let id = self.def.id;
        self.registry
            .facility_by_name
            .insert(self.def.name.clone(), id);
        self.registry.facilities.push(self.def);
        id
    }
}

// ============================================================================
// Data-file shape
// ============================================================================

/// On-disk definition file. Cross references use names and are resolved to
/// ids by [`RegistryFile::resolve`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryFile {
    pub resources: Vec<ResourceEntry>,
    #[serde(default)]
    pub facilities: Vec<FacilityEntry>,
    #[serde(default)]
    pub settlement_cost: Vec<AmountEntry>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    pub market_value: f64,
    #[serde(default)]
    pub terrain_factors: TerrainFactors,
    #[serde(default)]
    pub river_factors: RiverFactors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountEntry {
    pub resource: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifierEntry {
    pub resource: String,
    #[serde(default)]
    pub offset: f64,
    #[serde(default = "one")]
    pub multiplier: f64,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityEntry {
    pub name: String,
    pub build_duration: u32,
    #[serde(default)]
    pub build_cost: Vec<AmountEntry>,
    #[serde(default)]
    pub production: Vec<ModifierEntry>,
    #[serde(default)]
    pub upkeep: Vec<ModifierEntry>,
    #[serde(default)]
    pub behavior: FacilityBehavior,
}

impl RegistryFile {
    pub fn resolve(self) -> Result<DefRegistry, RegistryError> {
        if self.resources.len() > u16::MAX as usize {
            return Err(RegistryError::TooMany(u16::MAX as usize));
        }
        if self.facilities.len() > u16::MAX as usize {
            return Err(RegistryError::TooMany(u16::MAX as usize));
        }

        let mut builder = DefRegistry::builder();
        for entry in &self.resources {
            if builder.registry.resource_id(&entry.name).is_some() {
                return Err(RegistryError::DuplicateName(entry.name.clone()));
            }
            let id = builder.resource(&entry.name, entry.market_value);
            builder
                .terrain_factors(id, entry.terrain_factors)
                .river_factors(id, entry.river_factors);
        }

        let lookup = |name: &str, context: &str| -> Result<ResourceId, RegistryError> {
            builder
                .registry
                .resource_id(name)
                .ok_or_else(|| RegistryError::UnknownResource {
                    name: name.to_string(),
                    context: context.to_string(),
                })
        };

        let currency = match &self.currency {
            Some(name) => Some(lookup(name, "currency")?),
            None => None,
        };
        let settlement_cost = self
            .settlement_cost
            .iter()
            .map(|a| Ok(ResourceAmount::new(lookup(&a.resource, "settlement_cost")?, a.amount)))
            .collect::<Result<Vec<_>, RegistryError>>()?;

        let mut facilities = Vec::with_capacity(self.facilities.len());
        for entry in &self.facilities {
            let cost = entry
                .build_cost
                .iter()
                .map(|a| Ok(ResourceAmount::new(lookup(&a.resource, &entry.name)?, a.amount)))
                .collect::<Result<Vec<_>, RegistryError>>()?;
            let modifiers = |list: &[ModifierEntry]| {
                list.iter()
                    .map(|m| {
                        Ok(ResourceModifier::new(
                            lookup(&m.resource, &entry.name)?,
                            m.offset,
                            m.multiplier,
                        ))
                    })
                    .collect::<Result<Vec<_>, RegistryError>>()
            };
            facilities.push((entry, cost, modifiers(&entry.production)?, modifiers(&entry.upkeep)?));
        }

        builder.registry.currency = currency;
        builder.registry.settlement_cost = settlement_cost;
        for (entry, cost, production, upkeep) in facilities {
            if builder.registry.facility_id(&entry.name).is_some() {
                return Err(RegistryError::DuplicateName(entry.name.clone()));
            }
            let mut fb = builder
                .facility(&entry.name, entry.build_duration)
                .behavior(entry.behavior);
            fb.def.build_cost = cost;
            fb.def.production = production;
            fb.def.upkeep = upkeep;
            fb.finish();
        }

        let registry = builder.build();
        log::debug!(
            "Loaded {} resources, {} facilities",
            registry.resources.len(),
            registry.facilities.len()
        );
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = r#"{
        "resources": [
            {"name": "Wood", "market_value": 1.0, "terrain_factors": {"flat": 1.2}},
            {"name": "Stone", "market_value": 2.0},
            {"name": "Silver", "market_value": 1.0}
        ],
        "currency": "Silver",
        "settlement_cost": [
            {"resource": "Wood", "amount": 1000},
            {"resource": "Stone", "amount": 500}
        ],
        "facilities": [
            {
                "name": "Lumber hut",
                "build_duration": 100,
                "build_cost": [{"resource": "Wood", "amount": 50}],
                "production": [{"resource": "Wood", "offset": 10}]
            },
            {
                "name": "Sawmill",
                "build_duration": 200,
                "production": [{"resource": "Wood", "multiplier": 1.5}],
                "behavior": {"requires_tech_tier": 2}
            }
        ]
    }"#;

    #[test]
    fn test_builder_assigns_sequential_ids() {
        let mut b = DefRegistry::builder();
        let food = b.resource("Food", 1.0);
        let wood = b.resource("Wood", 1.0);
        assert_eq!(food, ResourceId(0));
        assert_eq!(wood, ResourceId(1));
        assert_eq!(b.resource("Food", 5.0), food, "re-registering returns same id");

        let hut = b.facility("Lumber hut", 10).produces(wood, 10.0, 1.0).finish();
        let reg = b.build();
        assert_eq!(reg.facility_id("Lumber hut"), Some(hut));
        assert_eq!(reg.facility(hut).unwrap().production.len(), 1);
        assert_eq!(reg.market_value(food), 1.0);
        assert_eq!(reg.market_value(ResourceId(77)), 0.0);
    }

    #[test]
    fn test_from_json_resolves_names() {
        let reg = DefRegistry::from_json(DATA).unwrap();
        let wood = reg.resource_id("Wood").unwrap();
        let silver = reg.resource_id("Silver").unwrap();
        assert_eq!(reg.currency(), Some(silver));
        assert_eq!(reg.resource(wood).unwrap().terrain_factors.flat, 1.2);
        assert_eq!(reg.settlement_cost().len(), 2);

        let hut = reg.facility(reg.facility_id("Lumber hut").unwrap()).unwrap();
        assert_eq!(hut.production[0].resource, wood);
        assert_eq!(hut.production[0].offset, 10.0);
        assert_eq!(hut.production[0].multiplier, 1.0);

        let mill = reg.facility(reg.facility_id("Sawmill").unwrap()).unwrap();
        assert_eq!(mill.production[0].offset, 0.0);
        assert_eq!(mill.behavior, FacilityBehavior::RequiresTechTier(2));
    }

    #[test]
    fn test_from_json_unknown_resource() {
        let json = r#"{
            "resources": [{"name": "Wood", "market_value": 1.0}],
            "facilities": [{"name": "Mine", "build_duration": 1,
                            "production": [{"resource": "Iron", "offset": 1}]}]
        }"#;
        match DefRegistry::from_json(json) {
            Err(RegistryError::UnknownResource { name, context }) => {
                assert_eq!(name, "Iron");
                assert_eq!(context, "Mine");
            }
            other => panic!("expected UnknownResource, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json_duplicate_resource() {
        let json = r#"{"resources": [
            {"name": "Wood", "market_value": 1.0},
            {"name": "Wood", "market_value": 2.0}
        ]}"#;
        assert!(matches!(
            DefRegistry::from_json(json),
            Err(RegistryError::DuplicateName(n)) if n == "Wood"
        ));
    }
}
