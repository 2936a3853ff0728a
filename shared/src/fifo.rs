//! FIFO allocation planning
//!
//! Pure planning over a snapshot of a part's batches. The backend takes the
//! locks and persists the result; nothing here has side effects.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Allocation, BatchAvailability, Margin, WeightedPrices};
use crate::money::{percent_of, weighted_average};

/// Not enough unconsumed batch quantity to cover a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("requested {requested} units but only {available} available")]
pub struct Shortage {
    pub requested: i64,
    pub available: i64,
}

/// How each allocated unit is priced for sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellingPriceRule {
    /// Batch cost plus a margin
    Margin(Margin),
    /// A flat list price (usually `Part::sell_price`)
    List(i64),
}

impl SellingPriceRule {
    pub fn price_for(&self, unit_cost: i64) -> i64 {
        match self {
            SellingPriceRule::Margin(margin) => selling_price(unit_cost, margin),
            SellingPriceRule::List(price) => *price,
        }
    }
}

/// `unit_cost + margin`
pub fn selling_price(unit_cost: i64, margin: &Margin) -> i64 {
    match margin {
        Margin::Percent(value) => unit_cost + percent_of(unit_cost, *value),
        Margin::Fixed(value) => unit_cost + value,
    }
}

/// Allocate `quantity_needed` units oldest batch first.
///
/// All-or-nothing: on a shortage no allocation is returned.
pub fn plan_allocation(
    batches: &[BatchAvailability],
    quantity_needed: i64,
    pricing: SellingPriceRule,
) -> Result<Vec<Allocation>, Shortage> {
    let mut ordered: Vec<&BatchAvailability> = batches.iter().collect();
    ordered.sort_by_key(|b| (b.batch.created_at, b.batch.sequence));

    let mut needed = quantity_needed;
    let mut allocations = Vec::new();

    for candidate in ordered {
        if needed == 0 {
            break;
        }
        if candidate.is_exhausted() {
            continue;
        }

        let take = candidate.remaining_quantity.min(needed);
        allocations.push(Allocation {
            batch_id: candidate.batch.id,
            quantity: take,
            unit_cost: candidate.batch.unit_cost,
            unit_selling_price: pricing.price_for(candidate.batch.unit_cost),
        });
        needed -= take;
    }

    if needed > 0 {
        return Err(Shortage {
            requested: quantity_needed,
            available: quantity_needed - needed,
        });
    }

    Ok(allocations)
}

/// Quantity-weighted cost and selling price over a line's allocations
pub fn compute_weighted_prices(allocations: &[Allocation]) -> Option<WeightedPrices> {
    let costs: Vec<(i64, i64)> = allocations.iter().map(|a| (a.unit_cost, a.quantity)).collect();
    let prices: Vec<(i64, i64)> = allocations
        .iter()
        .map(|a| (a.unit_selling_price, a.quantity))
        .collect();

    Some(WeightedPrices {
        cost_price: weighted_average(&costs)?,
        selling_price: weighted_average(&prices)?,
    })
}
