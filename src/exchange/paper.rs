//! Paper trading exchange.
//!
//! Fills every market order instantly at the current price. Prices and
//! candles come either from values pushed in by the caller (tests) or from a
//! live market data feed (paper mode against real prices).

use super::traits::{Candle, ExchangePosition, ExecutionPort, Fill, MarketDataPort};
use super::types::OrderSide;
use crate::error::{TradeError, TradeResult};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Simulated position for one symbol.
#[derive(Debug, Clone, Default)]
pub struct PaperPosition {
    /// Signed size: positive long, negative short
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

/// Paper account state.
#[derive(Debug, Clone)]
pub struct PaperState {
    pub initial_balance: Decimal,
    pub balance: Decimal,
    pub positions: HashMap<String, PaperPosition>,
    pub total_trading_fees: Decimal,
    pub realized_pnl: Decimal,
    pub order_count: u64,
}

impl Default for PaperState {
    fn default() -> Self {
        Self {
            initial_balance: dec!(10000),
            balance: dec!(10000),
            positions: HashMap::new(),
            total_trading_fees: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            order_count: 0,
        }
    }
}

/// Injected faults, consumed one per call.
#[derive(Debug, Default)]
struct Faults {
    rejected_orders: u32,
    failed_price_reads: u32,
}

/// In-process exchange implementing both ports.
pub struct PaperExchange {
    state: Arc<RwLock<PaperState>>,
    order_id_counter: AtomicU64,
    prices: Arc<RwLock<HashMap<String, Decimal>>>,
    candles: Arc<RwLock<HashMap<String, Vec<Candle>>>>,
    lot_steps: Arc<RwLock<HashMap<String, Decimal>>>,
    faults: Arc<RwLock<Faults>>,
    /// Live data source; when set, prices/candles/steps are read through it
    feed: Option<Arc<dyn MarketDataPort>>,
    /// Trading fee rate (0.04% taker)
    fee_rate: Decimal,
}

impl PaperExchange {
    /// Create a paper exchange with an initial balance and no data feed.
    pub fn new(initial_balance: Decimal) -> Self {
        let state = PaperState {
            initial_balance,
            balance: initial_balance,
            ..Default::default()
        };

        Self {
            state: Arc::new(RwLock::new(state)),
            order_id_counter: AtomicU64::new(1),
            prices: Arc::new(RwLock::new(HashMap::new())),
            candles: Arc::new(RwLock::new(HashMap::new())),
            lot_steps: Arc::new(RwLock::new(HashMap::new())),
            faults: Arc::new(RwLock::new(Faults::default())),
            feed: None,
            fee_rate: dec!(0.0004),
        }
    }

    /// Read market data from a live source while simulating execution.
    pub fn with_feed(mut self, feed: Arc<dyn MarketDataPort>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    pub async fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.candles.write().await.insert(symbol.to_string(), candles);
    }

    pub async fn set_lot_step(&self, symbol: &str, step: Decimal) {
        self.lot_steps.write().await.insert(symbol.to_string(), step);
    }

    /// Reject the next `count` orders.
    pub async fn reject_next_orders(&self, count: u32) {
        self.faults.write().await.rejected_orders = count;
    }

    /// Fail the next `count` price reads.
    pub async fn fail_next_price_reads(&self, count: u32) {
        self.faults.write().await.failed_price_reads = count;
    }

    /// Open a position outside the bot (manual trade, restart recovery).
    pub async fn seed_position(&self, symbol: &str, quantity: Decimal, entry_price: Decimal) {
        self.state.write().await.positions.insert(
            symbol.to_string(),
            PaperPosition {
                quantity,
                entry_price,
            },
        );
    }

    /// Drop a position outside the bot (liquidation, manual close).
    pub async fn clear_position(&self, symbol: &str) {
        self.state.write().await.positions.remove(symbol);
    }

    /// Copy of the account state.
    pub async fn get_state(&self) -> PaperState {
        self.state.read().await.clone()
    }

    fn next_order_id(&self) -> u64 {
        self.order_id_counter.fetch_add(1, Ordering::SeqCst)
    }

    async fn price_for(&self, symbol: &str) -> TradeResult<Decimal> {
        {
            let mut faults = self.faults.write().await;
            if faults.failed_price_reads > 0 {
                faults.failed_price_reads -= 1;
                return Err(TradeError::DataUnavailable(format!(
                    "simulated ticker outage for {}",
                    symbol
                )));
            }
        }

        if let Some(feed) = &self.feed {
            let price = feed.current_price(symbol).await?;
            self.prices.write().await.insert(symbol.to_string(), price);
            return Ok(price);
        }

        self.prices
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| TradeError::DataUnavailable(format!("no price for {}", symbol)))
    }
}

#[async_trait]
impl MarketDataPort for PaperExchange {
    async fn current_price(&self, symbol: &str) -> TradeResult<Decimal> {
        self.price_for(symbol).await
    }

    async fn recent_candles(
        &self,
        symbol: &str,
        interval: &str,
        count: u16,
    ) -> TradeResult<Vec<Candle>> {
        if let Some(feed) = &self.feed {
            return feed.recent_candles(symbol, interval, count).await;
        }

        let candles = self.candles.read().await;
        let series = candles
            .get(symbol)
            .ok_or_else(|| TradeError::DataUnavailable(format!("no candles for {}", symbol)))?;
        let skip = series.len().saturating_sub(count as usize);
        Ok(series[skip..].to_vec())
    }

    async fn lot_step(&self, symbol: &str) -> TradeResult<Decimal> {
        if let Some(step) = self.lot_steps.read().await.get(symbol) {
            return Ok(*step);
        }
        if let Some(feed) = &self.feed {
            let step = feed.lot_step(symbol).await?;
            self.lot_steps.write().await.insert(symbol.to_string(), step);
            return Ok(step);
        }
        Ok(dec!(0.001))
    }
}

#[async_trait]
impl ExecutionPort for PaperExchange {
    async fn market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    ) -> TradeResult<Fill> {
        {
            let mut faults = self.faults.write().await;
            if faults.rejected_orders > 0 {
                faults.rejected_orders -= 1;
                warn!(%symbol, ?side, %quantity, "Paper order rejected (injected)");
                return Err(TradeError::OrderRejected("simulated rejection".into()));
            }
        }
        if quantity <= Decimal::ZERO {
            return Err(TradeError::OrderRejected(format!(
                "non-positive quantity {}",
                quantity
            )));
        }

        let price = self
            .price_for(symbol)
            .await
            .map_err(|e| TradeError::OrderRejected(e.to_string()))?;
        let signed = match side {
            OrderSide::Buy => quantity,
            OrderSide::Sell => -quantity,
        };

        let mut state = self.state.write().await;
        let current = state.positions.get(symbol).cloned().unwrap_or_default();

        if reduce_only
            && (current.quantity == Decimal::ZERO
                || current.quantity.is_sign_positive() == signed.is_sign_positive()
                || quantity > current.quantity.abs())
        {
            return Err(TradeError::OrderRejected(
                "reduce-only order would increase position".into(),
            ));
        }

        let fee = quantity * price * self.fee_rate;
        let new_qty = current.quantity + signed;

        // Realize PnL on the closed portion
        if current.quantity != Decimal::ZERO
            && current.quantity.is_sign_positive() != signed.is_sign_positive()
        {
            let closed = quantity.min(current.quantity.abs());
            let direction = if current.quantity > Decimal::ZERO {
                Decimal::ONE
            } else {
                -Decimal::ONE
            };
            let pnl = (price - current.entry_price) * closed * direction;
            state.realized_pnl += pnl;
            state.balance += pnl;
        }

        if new_qty == Decimal::ZERO {
            state.positions.remove(symbol);
        } else {
            let entry_price = if current.quantity == Decimal::ZERO
                || current.quantity.is_sign_positive() != new_qty.is_sign_positive()
            {
                price
            } else if new_qty.abs() > current.quantity.abs() {
                // Adding to the position: volume-weighted entry
                (current.entry_price * current.quantity.abs() + price * quantity) / new_qty.abs()
            } else {
                current.entry_price
            };
            state.positions.insert(
                symbol.to_string(),
                PaperPosition {
                    quantity: new_qty,
                    entry_price,
                },
            );
        }

        state.balance -= fee;
        state.total_trading_fees += fee;
        state.order_count += 1;

        let order_id = self.next_order_id() as i64;

        info!(
            order_id,
            %symbol,
            ?side,
            %quantity,
            %price,
            %fee,
            reduce_only,
            "Paper order executed"
        );

        Ok(Fill {
            order_id,
            side,
            quantity,
            avg_price: price,
        })
    }

    async fn open_position(&self, symbol: &str) -> TradeResult<Option<ExchangePosition>> {
        let state = self.state.read().await;
        let position = state
            .positions
            .get(symbol)
            .filter(|p| p.quantity != Decimal::ZERO)
            .map(|p| ExchangePosition {
                symbol: symbol.to_string(),
                quantity: p.quantity,
                entry_price: p.entry_price,
            });
        debug!(%symbol, open = position.is_some(), "Paper position query");
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exchange_at(price: Decimal) -> PaperExchange {
        let exchange = PaperExchange::new(dec!(10000));
        exchange.set_price("ETHUSDT", price).await;
        exchange
    }

    #[tokio::test]
    async fn test_open_and_close_long_realizes_pnl() {
        let exchange = exchange_at(dec!(100)).await;

        let fill = exchange
            .market_order("ETHUSDT", OrderSide::Buy, dec!(2), false)
            .await
            .unwrap();
        assert_eq!(fill.avg_price, dec!(100));

        let position = exchange.open_position("ETHUSDT").await.unwrap().unwrap();
        assert_eq!(position.quantity, dec!(2));
        assert_eq!(position.entry_price, dec!(100));

        exchange.set_price("ETHUSDT", dec!(101)).await;
        exchange
            .market_order("ETHUSDT", OrderSide::Sell, dec!(2), true)
            .await
            .unwrap();

        assert!(exchange.open_position("ETHUSDT").await.unwrap().is_none());
        let state = exchange.get_state().await;
        assert_eq!(state.realized_pnl, dec!(2));
        assert_eq!(state.order_count, 2);
        // fees: 200 * 0.0004 + 202 * 0.0004
        assert_eq!(state.total_trading_fees, dec!(0.1608));
    }

    #[tokio::test]
    async fn test_short_position_is_negative() {
        let exchange = exchange_at(dec!(100)).await;
        exchange
            .market_order("ETHUSDT", OrderSide::Sell, dec!(1.5), false)
            .await
            .unwrap();

        let position = exchange.open_position("ETHUSDT").await.unwrap().unwrap();
        assert_eq!(position.quantity, dec!(-1.5));
    }

    #[tokio::test]
    async fn test_reduce_only_cannot_open() {
        let exchange = exchange_at(dec!(100)).await;
        let err = exchange
            .market_order("ETHUSDT", OrderSide::Sell, dec!(1), true)
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::OrderRejected(_)));
    }

    #[tokio::test]
    async fn test_injected_rejection_is_consumed() {
        let exchange = exchange_at(dec!(100)).await;
        exchange.reject_next_orders(1).await;

        assert!(exchange
            .market_order("ETHUSDT", OrderSide::Buy, dec!(1), false)
            .await
            .is_err());
        assert!(exchange
            .market_order("ETHUSDT", OrderSide::Buy, dec!(1), false)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_recent_candles_returns_tail() {
        let exchange = PaperExchange::new(dec!(10000));
        let series: Vec<Candle> = (1..=5)
            .map(|i| {
                let p = Decimal::from(i);
                Candle::new(p, p, p, p)
            })
            .collect();
        exchange.set_candles("ETHUSDT", series).await;

        let tail = exchange.recent_candles("ETHUSDT", "1m", 2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].close, dec!(4));
        assert!(exchange.recent_candles("BTCUSDT", "1m", 2).await.is_err());
    }

    #[tokio::test]
    async fn test_price_outage() {
        let exchange = exchange_at(dec!(100)).await;
        exchange.fail_next_price_reads(1).await;
        assert!(exchange.current_price("ETHUSDT").await.is_err());
        assert_eq!(exchange.current_price("ETHUSDT").await.unwrap(), dec!(100));
    }
}
