//! Tax collection from the privileged faction.
//!
//! Each tax cycle computes a ceiling per resource from the faction's adjusted
//! change and stockpile, shrinks any requested basket for that resource to
//! fit, and fills the rest of the ceiling with currency. The result leaves as
//! a `Delivery` process.

use crate::events::SimEvent;
use crate::modifiers::ResourceId;
use crate::oracle::TileOracle;
use crate::process::ProcessKind;
use crate::registry::DefRegistry;
use crate::state::{EmpireState, FactionId};
use crate::step::{CommandError, Simulation};
use crate::systems::processes::start_process;
use crate::systems::production::adjusted_resource_change;
use crate::tax::{shrink_basket, tax_ceiling, DeliveryRequest, TaxBasket, TaxItem};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

/// Outcome of one collection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxCollection {
    pub faction: FactionId,
    /// Sum of the per-resource ceilings.
    pub ceiling: f64,
    /// Currency making up the gap between the basket values and the ceiling.
    pub currency_amount: f64,
    pub items: Vec<TaxItem>,
}

impl TaxCollection {
    pub fn delivered_value(&self) -> f64 {
        TaxBasket::new(self.items.clone()).value() + self.currency_amount
    }
}

/// Current ceiling for `resource`. Zero when no faction is privileged.
pub fn max_tax(
    state: &EmpireState,
    defs: &DefRegistry,
    oracle: &dyn TileOracle,
    resource: ResourceId,
) -> f64 {
    let Some(faction) = state.privileged_faction else {
        return 0.0;
    };
    let Some(f) = state.faction(faction) else {
        log::warn!("Privileged faction {} does not exist", faction.0);
        return 0.0;
    };
    let production = adjusted_resource_change(state, defs, oracle, faction)
        .get(&resource)
        .copied()
        .unwrap_or(0.0);
    tax_ceiling(production, f.stockpile.get(resource), state.tax_rate)
}

/// Replace the privileged faction's requested basket for `resource`.
pub fn request_tax(
    sim: &mut Simulation,
    faction: FactionId,
    resource: ResourceId,
    basket: TaxBasket,
) -> Result<(), CommandError> {
    if sim.state.privileged_faction != Some(faction) {
        return Err(CommandError::NotPrivileged);
    }
    if sim.defs.resource(resource).is_none() {
        return Err(CommandError::ResourceNotFound(resource));
    }
    if let Some(item) = basket.invalid_item() {
        return Err(CommandError::InvalidBasket(item.label.clone()));
    }
    let items = basket.items.len();
    sim.state
        .faction_mut(faction)
        .ok_or(CommandError::FactionNotFound(faction))?
        .pending_tax
        .insert(resource, basket);

    sim.record(SimEvent::TaxRequested {
        tick: sim.state.tick,
        resource,
        items,
    });
    Ok(())
}

/// Run one collection pass over every resource the privileged faction
/// produces or has requested.
///
/// Requested baskets are shrunk in place and kept for the next cycle; a
/// basket shrunk to nothing is dropped. The stockpile is not debited.
pub fn collect_tax(
    state: &mut EmpireState,
    defs: &DefRegistry,
    oracle: &dyn TileOracle,
    shrink_factor: f64,
) -> Option<TaxCollection> {
    let faction = state.privileged_faction?;
    if state.faction(faction).is_none() {
        log::warn!("Privileged faction {} does not exist", faction.0);
        return None;
    }

    let change = adjusted_resource_change(state, defs, oracle, faction);
    let rate = state.tax_rate;
    let mut rng = state.next_rng();
    let f = state.faction_mut(faction)?;

    let resources: BTreeSet<ResourceId> = change
        .keys()
        .chain(f.pending_tax.keys())
        .copied()
        .collect();

    let mut collection = TaxCollection {
        faction,
        ceiling: 0.0,
        currency_amount: 0.0,
        items: Vec::new(),
    };
    for resource in resources {
        let production = change.get(&resource).copied().unwrap_or(0.0);
        let ceiling = tax_ceiling(production, f.stockpile.get(resource), rate);
        collection.ceiling += ceiling;

        let Some(basket) = f.pending_tax.get_mut(&resource) else {
            collection.currency_amount += ceiling;
            continue;
        };
        let outcome = shrink_basket(basket, ceiling, shrink_factor, &mut rng);
        if outcome.passes > 0 {
            log::debug!(
                "Tax basket for {:?} shrunk in {} passes ({} items dropped)",
                resource,
                outcome.passes,
                outcome.removed
            );
        }
        collection.currency_amount += (ceiling - basket.value()).max(0.0);
        collection.items.extend(basket.items.iter().cloned());
        if basket.is_empty() {
            f.pending_tax.remove(&resource);
        }
    }

    Some(collection)
}

/// Collect tax and send it off as a delivery process.
#[instrument(skip_all, name = "tax")]
pub fn run_tax_tick(sim: &mut Simulation) {
    let Some(drop_site) = sim.state.drop_site else {
        if sim.state.privileged_faction.is_some() {
            log::warn!("No drop site set, skipping tax collection");
        }
        return;
    };

    let defs = Arc::clone(&sim.defs);
    let Some(collection) = collect_tax(
        &mut sim.state,
        &defs,
        sim.oracle.as_ref(),
        sim.config.tax_shrink_factor,
    ) else {
        return;
    };

    if collection.ceiling <= 0.0 {
        log::debug!("Faction {} owes no tax this cycle", collection.faction.0);
        return;
    }

    log::info!(
        "Collected {:.1} tax from faction {} ({} items, {:.1} currency)",
        collection.ceiling,
        collection.faction.0,
        collection.items.len(),
        collection.currency_amount
    );
    sim.record(SimEvent::TaxCollected {
        tick: sim.state.tick,
        faction: collection.faction,
        ceiling: collection.ceiling,
        currency_amount: collection.currency_amount,
        items: collection.items.len(),
    });

    let request = DeliveryRequest {
        drop_site,
        currency: defs.currency(),
        currency_amount: collection.currency_amount,
        items: collection.items,
    };
    let duration = sim.config.tax_delivery_ticks;
    start_process(
        sim,
        "Tax delivery",
        ProcessKind::Delivery {
            faction: collection.faction,
            request,
        },
        duration,
        Vec::new(),
    );
}
