//! Position and trade record domain types.

use crate::exchange::OrderSide;
use crate::utils::decimal::safe_div;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Order side that opens a position in this direction.
    pub fn entry_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes it.
    pub fn exit_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        }
    }

    /// +1 for long, -1 for short.
    fn sign(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => -Decimal::ONE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// Exit levels derived from the entry price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitLevels {
    pub target: Decimal,
    pub stop: Decimal,
}

impl ExitLevels {
    /// `target = entry * (1 ± profit)`, `stop = entry * (1 ∓ loss)`.
    pub fn derive(
        entry_price: Decimal,
        direction: Direction,
        profit_percent: Decimal,
        loss_percent: Decimal,
    ) -> Self {
        let sign = direction.sign();
        Self {
            target: entry_price * (Decimal::ONE + sign * profit_percent),
            stop: entry_price * (Decimal::ONE - sign * loss_percent),
        }
    }
}

/// What made a position close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitReason {
    Target,
    Stop,
    Forced,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Target => "target",
            ExitReason::Stop => "stop",
            ExitReason::Forced => "forced",
        }
    }
}

impl FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "target" => Ok(ExitReason::Target),
            "stop" => Ok(ExitReason::Stop),
            "forced" => Ok(ExitReason::Forced),
            other => Err(format!("unknown exit reason '{}'", other)),
        }
    }
}

/// A position the bot believes is open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    /// Frozen at entry; later config changes do not move them
    pub levels: ExitLevels,
    pub opened_at: DateTime<Utc>,
}

impl OpenPosition {
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        entry_price: Decimal,
        quantity: Decimal,
        profit_percent: Decimal,
        loss_percent: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            entry_price,
            quantity,
            levels: ExitLevels::derive(entry_price, direction, profit_percent, loss_percent),
            opened_at,
        }
    }

    /// Exit trigger for `price`, if any. Target is checked first.
    pub fn exit_trigger(&self, price: Decimal) -> Option<ExitReason> {
        let ExitLevels { target, stop } = self.levels;
        let (hit_target, hit_stop) = match self.direction {
            Direction::Long => (price >= target, price <= stop),
            Direction::Short => (price <= target, price >= stop),
        };
        if hit_target {
            Some(ExitReason::Target)
        } else if hit_stop {
            Some(ExitReason::Stop)
        } else {
            None
        }
    }

    /// Distance travelled towards target (positive) or stop (negative), in
    /// percent of the way there, rounded to 2 decimals.
    pub fn progress_percent(&self, price: Decimal) -> Decimal {
        let entry = self.entry_price;
        let ExitLevels { target, stop } = self.levels;
        let sign = self.direction.sign();
        let favourable = (price - entry) * sign;

        let progress = if favourable >= Decimal::ZERO {
            safe_div(favourable, (target - entry) * sign)
        } else {
            -safe_div(-favourable, (entry - stop) * sign)
        };
        (progress * dec!(100)).round_dp(2)
    }

    /// Settle the position at `exit_price`.
    pub fn settle(
        &self,
        exit_price: Decimal,
        reason: ExitReason,
        closed_at: DateTime<Utc>,
    ) -> TradeRecord {
        let sign = self.direction.sign();
        let move_per_unit = (exit_price - self.entry_price) * sign;
        let profit = move_per_unit * self.quantity;
        let roi = safe_div(move_per_unit, self.entry_price) * dec!(100);

        TradeRecord {
            id: None,
            closed_at,
            symbol: self.symbol.clone(),
            direction: self.direction,
            entry_price: self.entry_price,
            exit_price,
            quantity: self.quantity,
            outcome: if profit >= Decimal::ZERO {
                Outcome::Gain
            } else {
                Outcome::Loss
            },
            roi_percent: roi.round_dp(2),
            profit: profit.round_dp(2),
            exit_reason: reason,
        }
    }
}

/// Lifecycle state. `Flat` is the only state without a direction, quantity
/// or entry price.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    Open(OpenPosition),
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn as_open(&self) -> Option<&OpenPosition> {
        match self {
            PositionState::Flat => None,
            PositionState::Open(position) => Some(position),
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        self.as_open().map(|p| p.direction)
    }

    /// Zero when flat.
    pub fn quantity(&self) -> Decimal {
        self.as_open().map(|p| p.quantity).unwrap_or(Decimal::ZERO)
    }
}

/// Result classification of a closed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Gain,
    Loss,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Gain => "GAIN",
            Outcome::Loss => "LOSS",
        }
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GAIN" => Ok(Outcome::Gain),
            "LOSS" => Ok(Outcome::Loss),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

/// Immutable record of a closed trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    /// Ledger row id, assigned on append
    pub id: Option<i64>,
    pub closed_at: DateTime<Utc>,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub outcome: Outcome,
    pub roi_percent: Decimal,
    /// Quote-currency profit, rounded to 2 decimals
    pub profit: Decimal,
    pub exit_reason: ExitReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(direction: Direction) -> OpenPosition {
        OpenPosition::new(
            "ETHUSDT",
            direction,
            dec!(100),
            dec!(2),
            dec!(0.005),
            dec!(0.0045),
            Utc::now(),
        )
    }

    #[test]
    fn test_long_levels() {
        let levels = ExitLevels::derive(dec!(100), Direction::Long, dec!(0.005), dec!(0.0045));
        assert_eq!(levels.target, dec!(100.5));
        assert_eq!(levels.stop, dec!(99.55));
    }

    #[test]
    fn test_short_levels() {
        let levels = ExitLevels::derive(dec!(100), Direction::Short, dec!(0.005), dec!(0.0045));
        assert_eq!(levels.target, dec!(99.5));
        assert_eq!(levels.stop, dec!(100.45));
    }

    #[test]
    fn test_exit_triggers_long() {
        let pos = position(Direction::Long);
        assert_eq!(pos.exit_trigger(dec!(100.5)), Some(ExitReason::Target));
        assert_eq!(pos.exit_trigger(dec!(99.55)), Some(ExitReason::Stop));
        assert_eq!(pos.exit_trigger(dec!(100.2)), None);
    }

    #[test]
    fn test_exit_triggers_short() {
        let pos = position(Direction::Short);
        assert_eq!(pos.exit_trigger(dec!(99.4)), Some(ExitReason::Target));
        assert_eq!(pos.exit_trigger(dec!(100.45)), Some(ExitReason::Stop));
        assert_eq!(pos.exit_trigger(dec!(99.9)), None);
    }

    #[test]
    fn test_settle_long_gain() {
        let record = position(Direction::Long).settle(dec!(101), ExitReason::Target, Utc::now());
        assert_eq!(record.profit, dec!(2.0));
        assert_eq!(record.roi_percent, dec!(1.00));
        assert_eq!(record.outcome, Outcome::Gain);
    }

    #[test]
    fn test_settle_short_loss() {
        let record = position(Direction::Short).settle(dec!(101), ExitReason::Stop, Utc::now());
        assert_eq!(record.profit, dec!(-2));
        assert_eq!(record.roi_percent, dec!(-1));
        assert_eq!(record.outcome, Outcome::Loss);
    }

    #[test]
    fn test_breakeven_is_gain() {
        let record = position(Direction::Long).settle(dec!(100), ExitReason::Forced, Utc::now());
        assert_eq!(record.outcome, Outcome::Gain);
    }

    #[test]
    fn test_progress_percent() {
        let long = position(Direction::Long);
        assert_eq!(long.progress_percent(dec!(100.25)), dec!(50));
        assert_eq!(long.progress_percent(dec!(99.55)), dec!(-100));

        let short = position(Direction::Short);
        assert_eq!(short.progress_percent(dec!(99.75)), dec!(50));
        assert_eq!(short.progress_percent(dec!(100.225)), dec!(-50));
    }

    #[test]
    fn test_flat_state_invariant() {
        let flat = PositionState::Flat;
        assert_eq!(flat.direction(), None);
        assert_eq!(flat.quantity(), Decimal::ZERO);

        let open = PositionState::Open(position(Direction::Long));
        assert_eq!(open.direction(), Some(Direction::Long));
        assert!(open.quantity() > Decimal::ZERO);
    }
}
