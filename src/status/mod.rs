//! Live status published by the trading loop and read by the API.

use crate::strategy::{Direction, EntryGate, OpenPosition, Outcome, TradeRecord};
use crate::utils::decimal::to_percent;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Open position as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionView {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub target: Decimal,
    pub stop: Decimal,
    /// Towards target (positive) or stop (negative)
    pub progress_percent: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl PositionView {
    pub fn from_position(position: &OpenPosition, price: Option<Decimal>) -> Self {
        Self {
            symbol: position.symbol.clone(),
            direction: position.direction,
            entry_price: position.entry_price,
            quantity: position.quantity,
            target: position.levels.target,
            stop: position.levels.stop,
            progress_percent: price
                .map(|p| position.progress_percent(p))
                .unwrap_or(Decimal::ZERO),
            opened_at: position.opened_at,
        }
    }
}

/// Why new entries are currently blocked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suspension {
    pub reason: EntryGate,
    pub until: DateTime<Utc>,
}

/// Everything the loop knows after its last tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub symbol: String,
    pub current_price: Option<Decimal>,
    pub position: Option<PositionView>,
    pub loss_streak: u32,
    pub next_stake: Decimal,
    pub ladder: Vec<Decimal>,
    pub suspension: Option<Suspension>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn new(symbol: impl Into<String>, ladder: Vec<Decimal>, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            current_price: None,
            position: None,
            loss_streak: 0,
            next_stake: ladder.first().copied().unwrap_or(Decimal::ZERO),
            ladder,
            suspension: None,
            last_error: None,
            updated_at: now,
        }
    }
}

/// Aggregates over the trade ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub gains: usize,
    pub losses: usize,
    pub total_profit: Decimal,
    /// gains / (gains + losses) * 100, zero with no trades
    pub hit_rate: Decimal,
}

pub fn summarize(records: &[TradeRecord]) -> LedgerSummary {
    let gains = records
        .iter()
        .filter(|r| r.outcome == Outcome::Gain)
        .count();
    let losses = records.len() - gains;
    let total_profit: Decimal = records.iter().map(|r| r.profit).sum();

    let hit_rate = if records.is_empty() {
        Decimal::ZERO
    } else {
        to_percent(Decimal::from(gains) / Decimal::from(records.len()))
    };

    LedgerSummary {
        gains,
        losses,
        total_profit: total_profit.round_dp(2),
        hit_rate,
    }
}

/// Latest snapshot behind a single lock. Writers replace it whole.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusBoard {
    pub fn new(initial: StatusSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn publish(&self, snapshot: StatusSnapshot) {
        *self.inner.write().await = snapshot;
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ExitReason;
    use rust_decimal_macros::dec;

    fn record(profit: Decimal) -> TradeRecord {
        TradeRecord {
            id: None,
            closed_at: Utc::now(),
            symbol: "ETHUSDT".to_string(),
            direction: Direction::Long,
            entry_price: dec!(100),
            exit_price: dec!(101),
            quantity: dec!(1),
            outcome: if profit >= Decimal::ZERO {
                Outcome::Gain
            } else {
                Outcome::Loss
            },
            roi_percent: dec!(1),
            profit,
            exit_reason: ExitReason::Target,
        }
    }

    #[test]
    fn test_summary_of_empty_ledger() {
        let summary = summarize(&[]);
        assert_eq!(summary, LedgerSummary::default());
        assert_eq!(summary.hit_rate, Decimal::ZERO);
    }

    #[test]
    fn test_summary_totals() {
        let records = vec![
            record(dec!(1.004)),
            record(dec!(-0.5)),
            record(dec!(0)),
        ];
        let summary = summarize(&records);
        assert_eq!(summary.gains, 2);
        assert_eq!(summary.losses, 1);
        assert_eq!(summary.total_profit, dec!(0.50));
        assert_eq!(summary.hit_rate, dec!(66.67));
    }

    #[tokio::test]
    async fn test_board_publish_replaces_snapshot() {
        let board = StatusBoard::new(StatusSnapshot::new("ETHUSDT", vec![dec!(0.01)], Utc::now()));
        assert_eq!(board.snapshot().await.next_stake, dec!(0.01));

        let mut next = board.snapshot().await;
        next.loss_streak = 2;
        next.current_price = Some(dec!(2500));
        board.publish(next).await;

        let read = board.snapshot().await;
        assert_eq!(read.loss_streak, 2);
        assert_eq!(read.current_price, Some(dec!(2500)));
    }
}
