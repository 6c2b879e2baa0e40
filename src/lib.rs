// Library module for testable functions

pub mod config;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod pipeline;

pub use error::{EtlError, Result};

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round to `dp` decimal places, halves away from zero
///
/// The value is rounded as the decimal it prints as, so 0.125 becomes 0.13
/// even though its binary form is slightly off.
pub fn round_half_away(value: f64, dp: u32) -> f64 {
    match Decimal::from_f64(value) {
        Some(d) => decimal_to_f64(d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)),
        None => {
            let factor = 10f64.powi(dp as i32);
            (value * factor).round() / factor
        }
    }
}

/// Convert inches to meters, rounded to 2 decimal places
/// Formula: inches × 0.0254
pub fn inches_to_meters(inches: f64) -> f64 {
    scale_and_round(inches, Decimal::new(254, 4))
}

/// Convert pounds to kilograms, rounded to 2 decimal places
/// Formula: pounds × 0.453592
pub fn pounds_to_kilograms(pounds: f64) -> f64 {
    scale_and_round(pounds, Decimal::new(453_592, 6))
}

fn scale_and_round(value: f64, factor: Decimal) -> f64 {
    let product = Decimal::from_f64(value).and_then(|d| d.checked_mul(factor));
    match product {
        Some(p) => decimal_to_f64(p.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)),
        // Out of Decimal range: fall back to float arithmetic
        None => round_half_away(value * decimal_to_f64(factor), 2),
    }
}

// One division keeps the result the nearest f64 to the decimal
fn decimal_to_f64(d: Decimal) -> f64 {
    d.mantissa() as f64 / 10f64.powi(d.scale() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inches_to_meters() {
        // 70 * 0.0254 = 1.778
        assert_eq!(inches_to_meters(70.0), 1.78);
        // 60 * 0.0254 = 1.524
        assert_eq!(inches_to_meters(60.0), 1.52);
        assert_eq!(inches_to_meters(0.0), 0.0);
    }

    #[test]
    fn test_pounds_to_kilograms() {
        // 150 * 0.453592 = 68.0388
        assert_eq!(pounds_to_kilograms(150.0), 68.04);
        // 120 * 0.453592 = 54.43104
        assert_eq!(pounds_to_kilograms(120.0), 54.43);
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        // Banker's rounding would give 0.12 and -0.12
        assert_eq!(round_half_away(0.125, 2), 0.13);
        assert_eq!(round_half_away(-0.125, 2), -0.13);
        // 2.675 is stored as 2.67499999..., rounded as the decimal 2.675
        assert_eq!(round_half_away(2.675, 2), 2.68);
        assert_eq!(round_half_away(1.234, 2), 1.23);
    }

    #[test]
    fn test_exact_midpoint_conversion() {
        // 12.5 * 0.0254 = 0.3175 -> 0.32
        assert_eq!(inches_to_meters(12.5), 0.32);
        // Negative input keeps the sign through rounding
        assert_eq!(inches_to_meters(-12.5), -0.32);
    }

    #[test]
    fn test_out_of_range_falls_back() {
        let huge = 1e30;
        let meters = inches_to_meters(huge);
        assert!((meters / (huge * 0.0254) - 1.0).abs() < 1e-9);
    }
}
