//! Discount and tax calculator
//!
//! Pure functions over integer minor units. Discount is always applied before
//! tax and tax is computed on the discounted base; there is no other ordering.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::{percent_of, round_to_minor};
use crate::validation::validate_percentage;

/// Errors raised by the pricing and totals code
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Invalid parameter {field}: {message}")]
    InvalidParameter { field: String, message: String },
}

impl PricingError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        PricingError::InvalidParameter {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// How a discount, tax or margin value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    #[default]
    None,
    Percent,
    /// A flat amount already expressed in minor units
    Fixed,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::None => "none",
            AdjustmentType::Percent => "percent",
            AdjustmentType::Fixed => "fixed",
        }
    }

    /// Parse without failing: unknown strings behave like `none`.
    pub fn lenient(value: &str) -> Self {
        value.parse().unwrap_or(AdjustmentType::None)
    }
}

impl FromStr for AdjustmentType {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(AdjustmentType::None),
            "percent" => Ok(AdjustmentType::Percent),
            "fixed" => Ok(AdjustmentType::Fixed),
            other => Err(PricingError::invalid(
                "type",
                format!("unknown adjustment type '{}', expected none, percent or fixed", other),
            )),
        }
    }
}

impl fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A type/value pair used for discounts and taxes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Adjustment {
    #[serde(rename = "type")]
    pub kind: AdjustmentType,
    pub value: Decimal,
}

impl Adjustment {
    pub const NONE: Adjustment = Adjustment {
        kind: AdjustmentType::None,
        value: Decimal::ZERO,
    };

    pub fn percent(value: Decimal) -> Self {
        Self {
            kind: AdjustmentType::Percent,
            value,
        }
    }

    pub fn fixed(minor_units: i64) -> Self {
        Self {
            kind: AdjustmentType::Fixed,
            value: Decimal::from(minor_units),
        }
    }

    /// Amount this adjustment represents against `base`
    pub fn amount_on(&self, base: i64) -> i64 {
        if self.value.is_zero() {
            return 0;
        }
        match self.kind {
            AdjustmentType::None => 0,
            AdjustmentType::Percent => percent_of(base, self.value),
            AdjustmentType::Fixed => round_to_minor(self.value),
        }
    }

    /// Check type/value consistency; `field` prefixes the error (e.g. `"discount"`)
    pub fn validate(&self, field: &str) -> Result<(), PricingError> {
        if self.value.is_sign_negative() && !self.value.is_zero() {
            return Err(PricingError::invalid(
                &format!("{}_value", field),
                "value cannot be negative",
            ));
        }
        if self.kind == AdjustmentType::Percent {
            validate_percentage(self.value)
                .map_err(|message| PricingError::invalid(&format!("{}_value", field), message))?;
        }
        Ok(())
    }
}

/// Result of [`compute_total`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalBreakdown {
    pub discount_amount: i64,
    pub amount_after_discount: i64,
    pub tax_amount: i64,
    pub grand_total: i64,
}

/// Never more than the subtotal itself
pub fn compute_discount(subtotal: i64, discount: &Adjustment) -> i64 {
    discount.amount_on(subtotal).min(subtotal.max(0))
}

/// Tax on an already discounted amount
pub fn compute_tax(amount: i64, tax: &Adjustment) -> i64 {
    tax.amount_on(amount)
}

pub fn compute_amount_after_discount(subtotal: i64, discount: &Adjustment) -> i64 {
    subtotal - compute_discount(subtotal, discount)
}

/// Discount first, then tax on the post-discount amount.
pub fn compute_total(subtotal: i64, discount: &Adjustment, tax: &Adjustment) -> TotalBreakdown {
    let discount_amount = compute_discount(subtotal, discount);
    let amount_after_discount = subtotal - discount_amount;
    let tax_amount = compute_tax(amount_after_discount, tax);

    TotalBreakdown {
        discount_amount,
        amount_after_discount,
        tax_amount,
        grand_total: subtotal - discount_amount + tax_amount,
    }
}

/// Validate raw discount/tax parameters as received from a caller
pub fn validate_parameters(
    discount_type: &str,
    discount_value: Decimal,
    tax_type: &str,
    tax_value: Decimal,
) -> Result<(Adjustment, Adjustment), PricingError> {
    let discount = parse_adjustment("discount", discount_type, discount_value)?;
    let tax = parse_adjustment("tax", tax_type, tax_value)?;
    Ok((discount, tax))
}

/// Parse and validate a single type/value pair
pub fn parse_adjustment(
    field: &str,
    kind: &str,
    value: Decimal,
) -> Result<Adjustment, PricingError> {
    let kind: AdjustmentType = kind.parse().map_err(|_| {
        PricingError::invalid(
            &format!("{}_type", field),
            format!("'{}' is not one of none, percent, fixed", kind),
        )
    })?;
    let adjustment = Adjustment { kind, value };
    adjustment.validate(field)?;
    Ok(adjustment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_discount_then_tax() {
        let total = compute_total(1000, &Adjustment::percent(dec!(10)), &Adjustment::percent(dec!(10)));
        assert_eq!(total.discount_amount, 100);
        assert_eq!(total.amount_after_discount, 900);
        assert_eq!(total.tax_amount, 90);
        assert_eq!(total.grand_total, 990);
    }

    #[test]
    fn test_adjustment_json_uses_type_field() {
        let adjustment: Adjustment =
            serde_json::from_str(r#"{"type":"percent","value":"7.5"}"#).unwrap();
        assert_eq!(adjustment, Adjustment::percent(dec!(7.5)));

        let json = serde_json::to_value(Adjustment::fixed(250)).unwrap();
        assert_eq!(json["type"], "fixed");
    }

    #[test]
    fn test_fixed_is_minor_units() {
        assert_eq!(compute_discount(10_000, &Adjustment::fixed(50)), 50);
        assert_eq!(compute_tax(10_000, &Adjustment::fixed(700)), 700);
    }

    #[test]
    fn test_fixed_discount_capped_at_subtotal() {
        let total = compute_total(1000, &Adjustment::fixed(1500), &Adjustment::percent(dec!(10)));
        assert_eq!(total.discount_amount, 1000);
        assert_eq!(total.amount_after_discount, 0);
        assert_eq!(total.tax_amount, 0);
        assert_eq!(total.grand_total, 0);

        // tax is not capped
        assert_eq!(compute_tax(100, &Adjustment::fixed(700)), 700);
    }

    #[test]
    fn test_none_and_zero_values() {
        assert_eq!(compute_discount(1000, &Adjustment::NONE), 0);
        assert_eq!(compute_discount(1000, &Adjustment::percent(Decimal::ZERO)), 0);
        let none_with_value = Adjustment {
            kind: AdjustmentType::None,
            value: dec!(25),
        };
        assert_eq!(compute_discount(1000, &none_with_value), 0);
    }

    #[test]
    fn test_percent_rounding_half_up() {
        // 15% of 1010 = 151.5
        assert_eq!(compute_discount(1010, &Adjustment::percent(dec!(15))), 152);
        assert_eq!(compute_amount_after_discount(1010, &Adjustment::percent(dec!(15))), 858);
    }

    #[test]
    fn test_lenient_parse_unknown_is_none() {
        assert_eq!(AdjustmentType::lenient("bogus"), AdjustmentType::None);
        assert_eq!(AdjustmentType::lenient("PERCENT"), AdjustmentType::Percent);
    }

    #[test]
    fn test_validate_parameters() {
        assert!(validate_parameters("percent", dec!(100), "fixed", dec!(500)).is_ok());
        assert!(validate_parameters("percent", dec!(0), "none", dec!(0)).is_ok());

        let err = validate_parameters("percent", dec!(100.01), "none", dec!(0)).unwrap_err();
        assert_eq!(
            err,
            PricingError::InvalidParameter {
                field: "discount_value".to_string(),
                message: "Percentage must be between 0 and 100".to_string(),
            }
        );

        assert!(validate_parameters("none", dec!(0), "vat", dec!(7)).is_err());
        assert!(validate_parameters("fixed", dec!(-1), "none", dec!(0)).is_err());
    }

    proptest! {
        #[test]
        fn prop_grand_total_identity(
            subtotal in 0i64..10_000_000,
            discount in 0u32..=100,
            tax in 0u32..=100,
        ) {
            let total = compute_total(
                subtotal,
                &Adjustment::percent(Decimal::from(discount)),
                &Adjustment::percent(Decimal::from(tax)),
            );
            prop_assert_eq!(total.grand_total, subtotal - total.discount_amount + total.tax_amount);
            prop_assert_eq!(total.amount_after_discount, subtotal - total.discount_amount);
            prop_assert!(total.discount_amount <= subtotal);
        }

        #[test]
        fn prop_fixed_discount_never_goes_negative(
            subtotal in 0i64..1_000_000,
            discount in 0i64..2_000_000,
            tax in 0u32..=100,
        ) {
            let total = compute_total(
                subtotal,
                &Adjustment::fixed(discount),
                &Adjustment::percent(Decimal::from(tax)),
            );
            prop_assert!(total.amount_after_discount >= 0);
            prop_assert!(total.tax_amount >= 0);
            prop_assert!(total.grand_total >= 0);
        }

        #[test]
        fn prop_tax_uses_discounted_base(
            subtotal in 1i64..1_000_000,
            discount in 1u32..=100,
            tax in 1u32..=100,
        ) {
            let discount = Adjustment::percent(Decimal::from(discount));
            let tax = Adjustment::percent(Decimal::from(tax));
            let total = compute_total(subtotal, &discount, &tax);
            prop_assert_eq!(total.tax_amount, compute_tax(total.amount_after_discount, &tax));
            prop_assert!(total.tax_amount <= compute_tax(subtotal, &tax));
        }
    }
}
