// 🧮 Reduction Calculator
// (data_value, coefficient) → (reduction_amount, points_earned)

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Reward points per kg CO2e reduced
pub const POINTS_PER_KG: i64 = 10;

/// Decimal places kept on reduction amounts
pub const REDUCTION_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reduction {
    /// kg CO2e, always exactly two decimal places
    pub amount: Decimal,
    pub points: i64,
}

impl Reduction {
    /// Amount in hundredths of a kg, the unit used for storage
    pub fn cents(&self) -> i64 {
        to_cents(self.amount)
    }
}

pub struct ReductionCalculator;

impl ReductionCalculator {
    /// Round half-up to 2 decimals, then truncate ×10 to whole points.
    ///
    /// Returns `None` only when the product overflows decimal range.
    pub fn compute(data_value: Decimal, coefficient: Decimal) -> Option<Reduction> {
        let mut amount = data_value
            .checked_mul(coefficient)?
            .round_dp_with_strategy(REDUCTION_SCALE, RoundingStrategy::MidpointAwayFromZero);
        amount.rescale(REDUCTION_SCALE);

        let points = amount
            .checked_mul(Decimal::from(POINTS_PER_KG))?
            .trunc()
            .to_i64()?;

        // cents must fit the storage column too
        amount.checked_mul(Decimal::ONE_HUNDRED)?.to_i64()?;

        Some(Reduction { amount, points })
    }
}

/// Convert a 2-decimal amount to integer hundredths.
pub fn to_cents(amount: Decimal) -> i64 {
    (amount * Decimal::ONE_HUNDRED).trunc().to_i64().unwrap_or(0)
}

/// Convert integer hundredths back to a 2-decimal amount.
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, REDUCTION_SCALE)
}
