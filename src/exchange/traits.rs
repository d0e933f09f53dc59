//! Venue-agnostic ports the trading core talks to.
//!
//! The lifecycle only ever sees these traits: the live Binance client and the
//! paper exchange both implement them, and tests substitute mocks.

use crate::error::TradeResult;
use crate::exchange::types::OrderSide;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

/// One OHLC candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Candle {
    pub fn new(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Self {
        Self {
            open_time: 0,
            open,
            high,
            low,
            close,
        }
    }
}

/// Confirmation of an executed market order.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: i64,
    pub side: OrderSide,
    pub quantity: Decimal,
    /// Average execution price. Zero when the venue did not report one.
    pub avg_price: Decimal,
}

/// Open position as reported by the venue.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangePosition {
    pub symbol: String,
    /// Signed size: positive long, negative short
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

/// Supplies prices, candles and instrument metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Latest traded price.
    async fn current_price(&self, symbol: &str) -> TradeResult<Decimal>;

    /// The most recent `count` candles, oldest first.
    async fn recent_candles(
        &self,
        symbol: &str,
        interval: &str,
        count: u16,
    ) -> TradeResult<Vec<Candle>>;

    /// Minimum tradable quantity increment.
    async fn lot_step(&self, symbol: &str) -> TradeResult<Decimal>;
}

/// Places orders and reports the open position.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionPort: Send + Sync {
    /// Submit a market order and wait for its fill.
    async fn market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    ) -> TradeResult<Fill>;

    /// The venue's open position for `symbol`, `None` when flat.
    async fn open_position(&self, symbol: &str) -> TradeResult<Option<ExchangePosition>>;
}
