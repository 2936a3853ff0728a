//! Validation utilities for stock and pricing inputs

use rust_decimal::Decimal;

use crate::models::Margin;

// ============================================================================
// Stock Validations
// ============================================================================

/// Validate a movement quantity (always positive, sign comes from the type)
pub fn validate_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a manual adjustment delta
pub fn validate_adjustment_delta(delta: i64) -> Result<(), &'static str> {
    if delta == 0 {
        return Err("Adjustment delta cannot be zero");
    }
    if delta == i64::MIN {
        return Err("Adjustment delta out of range");
    }
    Ok(())
}

/// Validate a reorder threshold
pub fn validate_minimal_stock(minimal_stock: i64) -> Result<(), &'static str> {
    if minimal_stock < 0 {
        return Err("Minimal stock cannot be negative");
    }
    Ok(())
}

/// Validate a unit cost or price in minor units
pub fn validate_unit_amount(amount: i64) -> Result<(), &'static str> {
    if amount < 0 {
        return Err("Amount cannot be negative");
    }
    Ok(())
}

// ============================================================================
// Pricing Validations
// ============================================================================

/// Validate a percentage is within 0-100 inclusive
pub fn validate_percentage(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err("Percentage must be between 0 and 100");
    }
    Ok(())
}

/// Validate a selling margin
pub fn validate_margin(margin: &Margin) -> Result<(), &'static str> {
    match margin {
        Margin::Percent(value) if *value < Decimal::ZERO => Err("Margin cannot be negative"),
        Margin::Fixed(value) if *value < 0 => Err("Margin cannot be negative"),
        _ => Ok(()),
    }
}

// ============================================================================
// Part Validations
// ============================================================================

/// Validate part SKU (2-32 chars, uppercase alphanumeric and dashes)
pub fn validate_sku(sku: &str) -> Result<(), &'static str> {
    if sku.len() < 2 {
        return Err("SKU must be at least 2 characters");
    }
    if sku.len() > 32 {
        return Err("SKU must be at most 32 characters");
    }
    if !sku
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("SKU must be uppercase alphanumeric or dashes only");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
    }

    #[test]
    fn test_validate_adjustment_delta() {
        assert!(validate_adjustment_delta(-4).is_ok());
        assert!(validate_adjustment_delta(4).is_ok());
        assert!(validate_adjustment_delta(0).is_err());
        assert!(validate_adjustment_delta(i64::MIN).is_err());
    }

    #[test]
    fn test_validate_percentage() {
        assert!(validate_percentage(dec!(0)).is_ok());
        assert!(validate_percentage(dec!(100)).is_ok());
        assert!(validate_percentage(dec!(7.5)).is_ok());
        assert!(validate_percentage(dec!(100.01)).is_err());
        assert!(validate_percentage(dec!(-1)).is_err());
    }

    #[test]
    fn test_validate_margin() {
        assert!(validate_margin(&Margin::Percent(dec!(150))).is_ok());
        assert!(validate_margin(&Margin::Fixed(0)).is_ok());
        assert!(validate_margin(&Margin::Percent(dec!(-5))).is_err());
        assert!(validate_margin(&Margin::Fixed(-1)).is_err());
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("BRK-PAD-01").is_ok());
        assert!(validate_sku("X").is_err());
        assert!(validate_sku("brk-pad").is_err());
        assert!(validate_sku("OIL FILTER").is_err());
    }

    #[test]
    fn test_validate_minimal_stock_and_amounts() {
        assert!(validate_minimal_stock(0).is_ok());
        assert!(validate_minimal_stock(-1).is_err());
        assert!(validate_unit_amount(0).is_ok());
        assert!(validate_unit_amount(-100).is_err());
    }
}
