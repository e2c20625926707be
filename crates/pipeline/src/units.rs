//! Fixed-point micro-unit conversion.
//!
//! Advertising platforms report monetary fields as integers scaled by one
//! million ("micros"). [`Micros`] keeps that raw representation as a distinct
//! type so it can never be compared against a decimal threshold by mistake;
//! [`Micros::to_decimal`] is the only way out, and it is exact.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of micro-units in one whole currency unit.
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// Decimal scale of a micro value (10⁻⁶).
const MICROS_SCALE: u32 = 6;

/// A raw fixed-point value as reported by the platform: the true decimal value
/// multiplied by 1,000,000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Micros(i64);

impl Micros {
    /// Wraps a raw micro-unit integer.
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw micro-unit integer.
    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// Converts to a decimal currency value, computing `raw / 1_000_000`
    /// exactly.
    ///
    /// The result carries scale 6 with the raw integer as its mantissa, so no
    /// rounding ever happens. Every `i64` fits in the 96-bit decimal mantissa,
    /// so this conversion cannot overflow.
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, MICROS_SCALE)
    }

    /// Converts a decimal currency value back into micro-units.
    ///
    /// Returns `None` if `value` has sub-micro precision or does not fit in an
    /// `i64` once scaled.
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        let scaled = value.checked_mul(Decimal::from(MICROS_PER_UNIT))?;
        if !scaled.fract().is_zero() {
            return None;
        }
        i64::try_from(scaled.trunc()).ok().map(Self)
    }
}

impl std::fmt::Display for Micros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}µ", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    #[test]
    fn test_to_decimal_divides_by_one_million() {
        assert_eq!(Micros::new(1_500_000_000).to_decimal(), Decimal::from(1500));
        assert_eq!(
            Micros::new(1).to_decimal(),
            Decimal::from_str("0.000001").unwrap()
        );
        assert_eq!(
            Micros::new(-2_500_000).to_decimal(),
            Decimal::from_str("-2.5").unwrap()
        );
    }

    #[test]
    fn test_to_decimal_handles_extremes() {
        let max = Micros::new(i64::MAX).to_decimal();
        assert_eq!(Micros::from_decimal(max), Some(Micros::new(i64::MAX)));
        let min = Micros::new(i64::MIN).to_decimal();
        assert_eq!(Micros::from_decimal(min), Some(Micros::new(i64::MIN)));
    }

    #[test]
    fn test_from_decimal_rejects_sub_micro_precision() {
        let value = Decimal::from_str("0.0000001").unwrap();
        assert_eq!(Micros::from_decimal(value), None);
    }

    #[test]
    fn test_from_decimal_rejects_overflow() {
        let value = Decimal::from(i64::MAX);
        assert_eq!(Micros::from_decimal(value), None);
    }

    #[test]
    fn test_sums_do_not_accumulate_error() {
        let total: Decimal = (0..10).map(|_| Micros::new(100_000).to_decimal()).sum();
        assert_eq!(total, Decimal::from(1));
    }

    proptest! {
        #[test]
        fn prop_round_trip_through_decimal(raw in any::<i64>()) {
            let decimal = Micros::new(raw).to_decimal();
            prop_assert_eq!(decimal * Decimal::from(MICROS_PER_UNIT), Decimal::from(raw));
            prop_assert_eq!(Micros::from_decimal(decimal), Some(Micros::new(raw)));
        }
    }
}
