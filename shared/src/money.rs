//! Integer minor-unit arithmetic helpers
//!
//! Every monetary amount in the inventory engine is an `i64` in the currency's
//! smallest unit. Fractions only appear transiently (percentages, averages)
//! and are resolved with round-half-away-from-zero.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round a decimal to whole minor units, halves away from zero.
///
/// Saturates at the `i64` bounds.
pub fn round_to_minor(value: Decimal) -> i64 {
    let rounded = value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded.to_i64().unwrap_or(if rounded.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// `amount × percent / 100`, rounded to minor units
pub fn percent_of(amount: i64, percent: Decimal) -> i64 {
    round_to_minor(Decimal::from(amount) * percent / Decimal::ONE_HUNDRED)
}

/// Quantity-weighted average of `(value, weight)` pairs, rounded to minor units.
///
/// Returns `None` when the total weight is zero.
pub fn weighted_average(pairs: &[(i64, i64)]) -> Option<i64> {
    let total_weight: i64 = pairs.iter().map(|(_, weight)| *weight).sum();
    if total_weight == 0 {
        return None;
    }

    let total_value: Decimal = pairs
        .iter()
        .map(|(value, weight)| Decimal::from(*value) * Decimal::from(*weight))
        .sum();

    Some(round_to_minor(total_value / Decimal::from(total_weight)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round_to_minor(dec!(2.5)), 3);
        assert_eq!(round_to_minor(dec!(3.5)), 4);
        assert_eq!(round_to_minor(dec!(2.4999)), 2);
        assert_eq!(round_to_minor(dec!(-2.5)), -3);
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(1000, dec!(10)), 100);
        assert_eq!(percent_of(995, dec!(10)), 100); // 99.5 rounds up
        assert_eq!(percent_of(1000, dec!(12.5)), 125);
        assert_eq!(percent_of(0, dec!(50)), 0);
    }

    #[test]
    fn test_weighted_average() {
        // (5×100 + 2×120) / 7 = 105.71
        assert_eq!(weighted_average(&[(100, 5), (120, 2)]), Some(106));
        assert_eq!(weighted_average(&[(100, 1)]), Some(100));
        assert_eq!(weighted_average(&[]), None);
    }
}
