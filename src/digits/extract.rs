//! Fixed-precision formatting and last-digit extraction.
//!
//! The digit is the final character of the price rendered with exactly
//! `decimal_places` fractional digits. The price is taken at its shortest
//! round-trip decimal form and rounded half away from zero, so `1.005` at
//! two places renders as `1.01`.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::error::AppError;

/// Render `price` with exactly `decimal_places` fractional digits.
pub fn format_fixed(price: f64, decimal_places: u32) -> Result<String, AppError> {
    let invalid = || AppError::DigitFormat {
        price,
        decimal_places,
    };
    if !price.is_finite() {
        return Err(invalid());
    }
    let value = Decimal::from_str(&price.to_string()).map_err(|_| invalid())?;
    let rounded = value.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero);
    Ok(format!("{:.*}", decimal_places as usize, rounded))
}

/// Last character of [`format_fixed`] as a digit 0-9.
pub fn last_digit(price: f64, decimal_places: u32) -> Result<u8, AppError> {
    let formatted = format_fixed(price, decimal_places)?;
    formatted
        .chars()
        .last()
        .and_then(|c| c.to_digit(10))
        .map(|d| d as u8)
        .ok_or(AppError::DigitFormat {
            price,
            decimal_places,
        })
}
