//! Purchase batches and their consumption

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MovementReference;

/// One received purchase line, consumed oldest-first by sales
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseBatch {
    pub id: Uuid,
    pub part_id: Uuid,
    pub purchase_id: Uuid,
    pub supplier_id: Option<Uuid>,
    /// Quantity originally received
    pub quantity: i64,
    /// Minor units per unit
    pub unit_cost: i64,
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

/// A batch together with its unconsumed quantity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAvailability {
    pub batch: PurchaseBatch,
    pub remaining_quantity: i64,
}

impl BatchAvailability {
    pub fn is_exhausted(&self) -> bool {
        self.remaining_quantity <= 0
    }
}

/// Append-only record of units taken from (positive) or returned to
/// (negative) a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConsumption {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub part_id: Uuid,
    pub movement_id: Uuid,
    pub quantity: i64,
    pub unit_cost: i64,
    pub unit_selling_price: i64,
    pub reference: MovementReference,
    pub created_at: DateTime<Utc>,
}

/// Margin applied on top of a batch's unit cost to derive a selling price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Margin {
    Percent(Decimal),
    /// Flat amount in minor units
    Fixed(i64),
}

/// One batch's share of a sale line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub batch_id: Uuid,
    pub quantity: i64,
    pub unit_cost: i64,
    pub unit_selling_price: i64,
}

/// Blended prices for a sale line drawn from several batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedPrices {
    pub cost_price: i64,
    pub selling_price: i64,
}
