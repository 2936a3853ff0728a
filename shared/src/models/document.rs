//! Purchase, sale and order documents with their line items
//!
//! Totals on these documents are denormalized. They are recomputed from the
//! lines by [`crate::totals::RecalculateTotals`] and never trusted on their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pricing::{compute_discount, Adjustment, PricingError};

/// A document line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub part_id: Option<Uuid>,
    pub description: Option<String>,
    pub quantity: i64,
    /// Minor units per unit
    pub unit_price: i64,
    /// `quantity × unit_price`
    pub subtotal: i64,
    /// Line-level discount
    pub discount: Adjustment,
    /// Subtotal after the line discount. Equals `subtotal` when undiscounted.
    pub final_amount: i64,
}

impl DocumentLine {
    pub fn new(
        part_id: Option<Uuid>,
        quantity: i64,
        unit_price: i64,
        discount: Adjustment,
    ) -> Result<Self, PricingError> {
        let mut line = Self {
            part_id,
            description: None,
            quantity,
            unit_price,
            subtotal: 0,
            discount,
            final_amount: 0,
        };
        line.recompute()?;
        Ok(line)
    }

    /// Recompute `subtotal` and `final_amount` from quantity, price and discount
    pub fn recompute(&mut self) -> Result<(), PricingError> {
        if self.quantity <= 0 {
            return Err(PricingError::InvalidParameter {
                field: "quantity".to_string(),
                message: "line quantity must be positive".to_string(),
            });
        }
        self.discount.validate("line_discount")?;

        self.subtotal = self.quantity * self.unit_price;
        self.final_amount = self.subtotal - compute_discount(self.subtotal, &self.discount);
        Ok(())
    }

    /// Amount removed by the line discount
    pub fn discount_amount(&self) -> i64 {
        self.subtotal - self.final_amount
    }
}

/// Document-level totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub subtotal: i64,
    pub discount: Adjustment,
    pub discount_amount: i64,
    pub tax: Adjustment,
    pub tax_amount: i64,
    pub grand_total: i64,
}

impl DocumentTotals {
    pub fn new(discount: Adjustment, tax: Adjustment) -> Self {
        Self {
            discount,
            tax,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Draft,
    Ordered,
    Received,
    Cancelled,
}

/// Part purchase from a supplier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartPurchase {
    pub id: Uuid,
    pub purchase_number: String,
    pub supplier_id: Option<Uuid>,
    pub status: PurchaseStatus,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Partial,
    #[default]
    Unpaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Unpaid => "unpaid",
        }
    }
}

/// Over-the-counter part sale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartSale {
    pub id: Uuid,
    pub sale_number: String,
    pub customer_id: Option<Uuid>,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub paid_amount: i64,
    pub remaining_amount: i64,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// Sales order for parts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartSalesOrder {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub created_at: DateTime<Utc>,
}

/// Workshop service order. Lines cover both labour and parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOrder {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    /// Sum of line-level discounts, also folded into `totals.discount_amount`
    pub item_discount_amount: i64,
    pub created_at: DateTime<Utc>,
}
