//! Order/sale total recalculation
//!
//! In-memory transforms over a document and its loaded lines. Callers persist
//! the result.

use crate::models::{
    DocumentLine, DocumentTotals, PartPurchase, PartSale, PartSalesOrder, PaymentStatus,
    ServiceOrder,
};
use crate::pricing::{compute_total, PricingError};

/// Documents whose denormalized totals are derived from their lines
pub trait RecalculateTotals {
    /// Recompute every total field from the lines.
    ///
    /// Fails with `InvalidParameter` before touching any field.
    fn recalculate_totals(&mut self) -> Result<(), PricingError>;
}

fn lines_subtotal(lines: &[DocumentLine]) -> i64 {
    lines.iter().map(|line| line.final_amount).sum()
}

fn validate_totals(totals: &DocumentTotals) -> Result<(), PricingError> {
    totals.discount.validate("discount")?;
    totals.tax.validate("tax")
}

fn validate_lines(lines: &[DocumentLine]) -> Result<(), PricingError> {
    lines
        .iter()
        .try_for_each(|line| line.discount.validate("line_discount"))
}

/// Standard pipeline: subtotal from lines, discount, then tax on the discounted base
fn apply_totals(totals: &mut DocumentTotals, lines: &[DocumentLine]) {
    totals.subtotal = lines_subtotal(lines);
    let breakdown = compute_total(totals.subtotal, &totals.discount, &totals.tax);
    totals.discount_amount = breakdown.discount_amount;
    totals.tax_amount = breakdown.tax_amount;
    totals.grand_total = breakdown.grand_total;
}

impl RecalculateTotals for PartPurchase {
    fn recalculate_totals(&mut self) -> Result<(), PricingError> {
        validate_totals(&self.totals)?;
        validate_lines(&self.lines)?;
        apply_totals(&mut self.totals, &self.lines);
        Ok(())
    }
}

impl RecalculateTotals for PartSalesOrder {
    fn recalculate_totals(&mut self) -> Result<(), PricingError> {
        validate_totals(&self.totals)?;
        validate_lines(&self.lines)?;
        apply_totals(&mut self.totals, &self.lines);
        Ok(())
    }
}

impl RecalculateTotals for PartSale {
    fn recalculate_totals(&mut self) -> Result<(), PricingError> {
        validate_totals(&self.totals)?;
        validate_lines(&self.lines)?;
        if self.paid_amount < 0 {
            return Err(PricingError::InvalidParameter {
                field: "paid_amount".to_string(),
                message: "paid amount cannot be negative".to_string(),
            });
        }

        apply_totals(&mut self.totals, &self.lines);
        self.apply_payment();
        Ok(())
    }
}

impl PartSale {
    /// Derive remaining amount and payment status from `paid_amount`
    pub fn apply_payment(&mut self) {
        let grand_total = self.totals.grand_total;
        let (status, remaining) = payment_state(grand_total, self.paid_amount);
        self.payment_status = status;
        self.remaining_amount = remaining;
    }
}

/// `(status, remaining)` for a grand total and paid amount
pub fn payment_state(grand_total: i64, paid_amount: i64) -> (PaymentStatus, i64) {
    if paid_amount >= grand_total {
        (PaymentStatus::Paid, 0)
    } else if paid_amount > 0 {
        (PaymentStatus::Partial, grand_total - paid_amount)
    } else {
        (PaymentStatus::Unpaid, grand_total.max(0))
    }
}

impl RecalculateTotals for ServiceOrder {
    fn recalculate_totals(&mut self) -> Result<(), PricingError> {
        validate_totals(&self.totals)?;
        validate_lines(&self.lines)?;

        let subtotal = lines_subtotal(&self.lines);
        let item_discount: i64 = self.lines.iter().map(DocumentLine::discount_amount).sum();

        // tax only sees the document discount; item discounts are already in the subtotal
        let breakdown = compute_total(subtotal, &self.totals.discount, &self.totals.tax);

        self.item_discount_amount = item_discount;
        self.totals.subtotal = subtotal;
        self.totals.discount_amount = breakdown.discount_amount + item_discount;
        self.totals.tax_amount = breakdown.tax_amount;
        self.totals.grand_total = breakdown.grand_total;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::Adjustment;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn line(quantity: i64, unit_price: i64, discount: Adjustment) -> DocumentLine {
        DocumentLine::new(Some(Uuid::new_v4()), quantity, unit_price, discount).unwrap()
    }

    fn sale(lines: Vec<DocumentLine>, paid_amount: i64) -> PartSale {
        PartSale {
            id: Uuid::new_v4(),
            sale_number: "SAL-20240101-0001".to_string(),
            customer_id: None,
            lines,
            totals: DocumentTotals::new(
                Adjustment::percent(dec!(10)),
                Adjustment::percent(dec!(10)),
            ),
            paid_amount,
            remaining_amount: 0,
            payment_status: PaymentStatus::Unpaid,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_sale_totals_and_payment_status() {
        let mut paid = sale(vec![line(2, 300, Adjustment::NONE), line(1, 400, Adjustment::NONE)], 990);
        paid.recalculate_totals().unwrap();
        assert_eq!(paid.totals.subtotal, 1000);
        assert_eq!(paid.totals.discount_amount, 100);
        assert_eq!(paid.totals.tax_amount, 90);
        assert_eq!(paid.totals.grand_total, 990);
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.remaining_amount, 0);

        let mut partial = sale(vec![line(1, 1000, Adjustment::NONE)], 500);
        partial.recalculate_totals().unwrap();
        assert_eq!(partial.payment_status, PaymentStatus::Partial);
        assert_eq!(partial.remaining_amount, 490);

        let mut unpaid = sale(vec![line(1, 1000, Adjustment::NONE)], 0);
        unpaid.recalculate_totals().unwrap();
        assert_eq!(unpaid.payment_status, PaymentStatus::Unpaid);
        assert_eq!(unpaid.remaining_amount, 990);
    }

    #[test]
    fn test_overpayment_is_paid_with_zero_remaining() {
        let mut overpaid = sale(vec![line(1, 1000, Adjustment::NONE)], 2000);
        overpaid.recalculate_totals().unwrap();
        assert_eq!(overpaid.payment_status, PaymentStatus::Paid);
        assert_eq!(overpaid.remaining_amount, 0);
    }

    #[test]
    fn test_fixed_discount_above_subtotal_owes_nothing() {
        let mut discounted = sale(vec![line(1, 1000, Adjustment::NONE)], 0);
        discounted.totals.discount = Adjustment::fixed(1500);
        discounted.recalculate_totals().unwrap();
        assert_eq!(discounted.totals.discount_amount, 1000);
        assert_eq!(discounted.totals.tax_amount, 0);
        assert_eq!(discounted.totals.grand_total, 0);
        assert_eq!(discounted.remaining_amount, 0);

        let free = line(1, 100, Adjustment::fixed(300));
        assert_eq!(free.final_amount, 0);
        assert_eq!(free.discount_amount(), 100);
    }

    #[test]
    fn test_line_discount_feeds_subtotal() {
        let mut order = PartSalesOrder {
            id: Uuid::new_v4(),
            order_number: "SO-20240101-0001".to_string(),
            customer_id: None,
            lines: vec![
                line(1, 1000, Adjustment::percent(dec!(50))),
                line(1, 1000, Adjustment::NONE),
            ],
            totals: DocumentTotals::new(Adjustment::NONE, Adjustment::fixed(50)),
            created_at: Utc::now(),
        };
        order.recalculate_totals().unwrap();
        assert_eq!(order.totals.subtotal, 1500);
        assert_eq!(order.totals.tax_amount, 50);
        assert_eq!(order.totals.grand_total, 1550);
    }

    #[test]
    fn test_service_order_item_discount_reporting() {
        let mut order = ServiceOrder {
            id: Uuid::new_v4(),
            order_number: "SRV-20240101-0001".to_string(),
            customer_id: None,
            lines: vec![
                line(1, 2000, Adjustment::fixed(200)), // labour, 200 off
                line(2, 500, Adjustment::NONE),
            ],
            totals: DocumentTotals::new(
                Adjustment::percent(dec!(10)),
                Adjustment::percent(dec!(10)),
            ),
            item_discount_amount: 0,
            created_at: Utc::now(),
        };
        order.recalculate_totals().unwrap();

        // subtotal after item discounts: 1800 + 1000
        assert_eq!(order.totals.subtotal, 2800);
        assert_eq!(order.item_discount_amount, 200);
        // 10% of 2800 plus the item discount
        assert_eq!(order.totals.discount_amount, 480);
        // tax on 2800 - 280
        assert_eq!(order.totals.tax_amount, 252);
        assert_eq!(order.totals.grand_total, 2800 - 280 + 252);
    }

    #[test]
    fn test_invalid_percentage_leaves_document_untouched() {
        let mut purchase = PartPurchase {
            id: Uuid::new_v4(),
            purchase_number: "PUR-20240101-0001".to_string(),
            supplier_id: None,
            status: crate::models::PurchaseStatus::Draft,
            lines: vec![line(1, 1000, Adjustment::NONE)],
            totals: DocumentTotals::new(Adjustment::percent(dec!(120)), Adjustment::NONE),
            created_at: Utc::now(),
        };
        assert!(purchase.recalculate_totals().is_err());
        assert_eq!(purchase.totals.subtotal, 0);
        assert_eq!(purchase.totals.grand_total, 0);
    }

    #[test]
    fn test_payment_state_edges() {
        assert_eq!(payment_state(0, 0), (PaymentStatus::Paid, 0));
        assert_eq!(payment_state(990, 1), (PaymentStatus::Partial, 989));
    }
}
