// Money helpers - amounts are decimals with 2 fraction digits
//
// In memory an amount is a `rust_decimal::Decimal`; on disk it is an integer
// count of cents so the CHECK constraint compares numbers, not text.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{LedgerError, Result};

/// Fraction digits kept for every amount
pub const AMOUNT_SCALE: u32 = 2;

/// Exclusive upper bound in whole units, the range of a numeric(12, 2) column
pub const MAX_AMOUNT_UNITS: i64 = 10_000_000_000;

/// Round to cents and validate the range.
///
/// Rounds half away from zero. Rejects negative values and values at or
/// above [`MAX_AMOUNT_UNITS`] with ConstraintViolation.
pub fn normalize_amount(amount: Decimal) -> Result<Decimal> {
    let rounded = amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);

    if rounded.is_sign_negative() && !rounded.is_zero() {
        return Err(LedgerError::ConstraintViolation(format!(
            "amount must be >= 0, got {}",
            amount
        )));
    }

    if rounded.abs() >= Decimal::from(MAX_AMOUNT_UNITS) {
        return Err(LedgerError::ConstraintViolation(format!(
            "amount {} must be below {}",
            amount, MAX_AMOUNT_UNITS
        )));
    }

    // Normalizes -0.00 to 0.00
    Ok(rounded.abs())
}

/// Amount → stored cents
pub fn to_cents(amount: Decimal) -> Result<i64> {
    let normalized = normalize_amount(amount)?;
    (normalized * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| LedgerError::ConstraintViolation(format!("amount {} out of range", amount)))
}

/// Stored cents → amount
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, AMOUNT_SCALE)
}

/// Parse user input such as `12.50` or `12,50`.
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    let cleaned = raw.trim().replace(',', ".");
    cleaned
        .parse::<Decimal>()
        .map_err(|_| LedgerError::InvalidInput(format!("not an amount: {}", raw)))
}

/// Convert a computed float (forecasts) to a 2-digit decimal.
pub fn from_f64(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero))
        .unwrap_or_default()
}

/// Format with dot thousands and comma decimals: `R$ 1.234,56`
pub fn format_currency(value: Decimal, symbol: &str) -> String {
    let rounded = value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();

    let plain = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if negative { "-" } else { "" };
    format!("{}{} {},{}", sign, symbol, grouped, frac_part)
}
