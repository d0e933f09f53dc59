//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Round down to lot size (quantity precision).
pub fn round_down_to_lot(value: Decimal, lot_size: Decimal) -> Decimal {
    if lot_size == Decimal::ZERO {
        return value;
    }
    (value / lot_size).floor() * lot_size
}

/// Align an order quantity to the instrument's lot step.
///
/// Rounds down to the nearest step but never below one step, and trims the
/// result to the step's scale so the venue accepts it verbatim.
pub fn align_to_step(quantity: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return quantity;
    }
    let aligned = round_down_to_lot(quantity, step).max(step);
    aligned.round_dp(step.normalize().scale())
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Express a ratio as a percentage rounded to two decimals.
pub fn to_percent(ratio: Decimal) -> Decimal {
    (ratio * dec!(100)).round_dp(2)
}
