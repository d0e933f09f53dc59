//! Position lifecycle state machine.
//!
//! Each call to [`PositionLifecycle::tick`] advances the bot by one step:
//!
//! 1. Reconcile local state against the venue's open position
//! 2. With a position open: check force-close, target and stop
//! 3. While flat: apply suspensions, the staking gate and the signal
//!
//! A failed port call leaves the state untouched; the caller retries the
//! tick after a backoff.

use crate::config::{Config, SharedConfig};
use crate::error::{TradeError, TradeResult};
use crate::exchange::{ExchangePosition, ExecutionPort, MarketDataPort};
use crate::persistence::{EventLevel, EventLog, LossStreakStore, PersistenceManager, TradeLedger};
use crate::status::{PositionView, StatusBoard, StatusSnapshot, Suspension};
use crate::strategy::position::{
    Direction, ExitReason, OpenPosition, Outcome, PositionState, TradeRecord,
};
use crate::strategy::signal::SignalDetector;
use crate::strategy::staking::{EntryGate, StakingController};
use crate::utils::decimal::align_to_step;
use crate::utils::Clock;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Market data and execution venues.
#[derive(Clone)]
pub struct Ports {
    pub market: Arc<dyn MarketDataPort>,
    pub execution: Arc<dyn ExecutionPort>,
}

/// Durable stores used by the lifecycle.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn TradeLedger>,
    pub losses: Arc<dyn LossStreakStore>,
    pub events: Arc<dyn EventLog>,
}

impl Stores {
    /// All three stores backed by one SQLite database.
    pub fn sqlite(manager: Arc<PersistenceManager>) -> Self {
        Self {
            ledger: manager.clone(),
            losses: manager.clone(),
            events: manager,
        }
    }
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Flat, no entry signal
    Idle,
    /// Flat, entries blocked by a safeguard
    Suspended(EntryGate),
    Opened(OpenPosition),
    Holding { price: Decimal },
    Closed(TradeRecord),
}

/// Run a port call under the request timeout.
async fn bounded<T, F>(operation: &'static str, limit: Duration, call: F) -> TradeResult<T>
where
    F: Future<Output = TradeResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TradeError::Timeout {
            operation,
            secs: limit.as_secs(),
        }),
    }
}

/// Owns the single position and the loss streak.
pub struct PositionLifecycle {
    ports: Ports,
    stores: Stores,
    config: SharedConfig,
    board: StatusBoard,
    clock: Arc<dyn Clock>,
    force_close: Arc<AtomicBool>,
    state: PositionState,
    streak: u32,
    suspension: Option<Suspension>,
    last_price: Option<Decimal>,
    last_error: Option<String>,
}

impl PositionLifecycle {
    /// Create a lifecycle, restoring the loss streak from its store.
    pub fn new(
        ports: Ports,
        stores: Stores,
        config: SharedConfig,
        board: StatusBoard,
        clock: Arc<dyn Clock>,
    ) -> TradeResult<Self> {
        let streak = stores.losses.count()?;
        if streak > 0 {
            info!(streak, "Restored loss streak");
        }

        Ok(Self {
            ports,
            stores,
            config,
            board,
            clock,
            force_close: Arc::new(AtomicBool::new(false)),
            state: PositionState::Flat,
            streak,
            suspension: None,
            last_price: None,
            last_error: None,
        })
    }

    /// Flag consumed at the next tick; set it to close the open position.
    pub fn force_close_flag(&self) -> Arc<AtomicBool> {
        self.force_close.clone()
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn suspension(&self) -> Option<&Suspension> {
        self.suspension.as_ref()
    }

    pub fn is_open(&self) -> bool {
        !self.state.is_flat()
    }

    /// Advance by one step.
    pub async fn tick(&mut self) -> TradeResult<TickOutcome> {
        let config = self.config.snapshot().await;
        let staking = StakingController::new(&config.staking);
        let limit = config.execution.request_timeout();

        let symbol = match &self.state {
            PositionState::Open(position) => position.symbol.clone(),
            PositionState::Flat => config.strategy.symbol.clone(),
        };

        let remote = bounded(
            "open_position",
            limit,
            self.ports.execution.open_position(&symbol),
        )
        .await?;
        self.reconcile(&symbol, remote, &config)?;

        let outcome = match self.state.clone() {
            PositionState::Open(position) => self.monitor(&position, limit).await?,
            PositionState::Flat => {
                // Nothing to close while flat
                self.force_close.store(false, Ordering::SeqCst);
                self.try_enter(&config, &staking, limit).await?
            }
        };

        self.last_error = None;
        self.publish(&config, &staking).await;
        Ok(outcome)
    }

    /// Record a failed tick on the status board and in the event log.
    pub async fn record_error(&mut self, err: &TradeError) {
        let config = self.config.snapshot().await;
        let staking = StakingController::new(&config.staking);

        self.last_error = Some(err.to_string());
        self.event(EventLevel::Error, &format!("Tick failed: {}", err));
        self.publish(&config, &staking).await;
    }

    /// The venue's view of the position wins.
    fn reconcile(
        &mut self,
        symbol: &str,
        remote: Option<ExchangePosition>,
        config: &Config,
    ) -> TradeResult<()> {
        match (&self.state, remote) {
            (PositionState::Flat, None) => {}
            (PositionState::Open(local), None) => {
                warn!(
                    symbol = %local.symbol,
                    direction = %local.direction,
                    quantity = %local.quantity,
                    "⚠️ [RECONCILE] Position closed outside the bot, dropping local state"
                );
                self.event(
                    EventLevel::Warn,
                    &format!(
                        "{} {} position no longer on exchange, no trade recorded",
                        local.direction, local.symbol
                    ),
                );
                self.state = PositionState::Flat;
            }
            (PositionState::Flat, Some(remote)) => {
                let adopted = self.adopt(symbol, &remote, config)?;
                warn!(
                    symbol = %adopted.symbol,
                    direction = %adopted.direction,
                    quantity = %adopted.quantity,
                    entry = %adopted.entry_price,
                    "⚠️ [RECONCILE] Adopting position found on exchange"
                );
                self.event(
                    EventLevel::Warn,
                    &format!(
                        "Adopted {} {} position: qty {} @ {}",
                        adopted.direction, adopted.symbol, adopted.quantity, adopted.entry_price
                    ),
                );
                self.state = PositionState::Open(adopted);
            }
            (PositionState::Open(local), Some(remote)) => {
                let remote_direction = direction_of(&remote);
                if remote_direction != Some(local.direction) {
                    let adopted = self.adopt(symbol, &remote, config)?;
                    warn!(
                        local = %local.direction,
                        remote = %adopted.direction,
                        "⚠️ [RECONCILE] Exchange position flipped, re-adopting"
                    );
                    self.state = PositionState::Open(adopted);
                } else if remote.quantity.abs() != local.quantity {
                    let mut updated = local.clone();
                    warn!(
                        local = %local.quantity,
                        remote = %remote.quantity.abs(),
                        "⚠️ [RECONCILE] Quantity mismatch, using exchange size"
                    );
                    updated.quantity = remote.quantity.abs();
                    self.state = PositionState::Open(updated);
                }
            }
        }
        Ok(())
    }

    fn adopt(
        &self,
        symbol: &str,
        remote: &ExchangePosition,
        config: &Config,
    ) -> TradeResult<OpenPosition> {
        let direction = direction_of(remote).ok_or_else(|| {
            TradeError::DataUnavailable(format!("zero-size position reported for {}", symbol))
        })?;
        if remote.entry_price <= Decimal::ZERO {
            return Err(TradeError::DataUnavailable(format!(
                "position for {} has no entry price",
                symbol
            )));
        }

        Ok(OpenPosition::new(
            symbol,
            direction,
            remote.entry_price,
            remote.quantity.abs(),
            config.strategy.profit_percent,
            config.strategy.loss_percent,
            self.clock.now(),
        ))
    }

    async fn monitor(
        &mut self,
        position: &OpenPosition,
        limit: Duration,
    ) -> TradeResult<TickOutcome> {
        let price = bounded(
            "current_price",
            limit,
            self.ports.market.current_price(&position.symbol),
        )
        .await?;
        self.last_price = Some(price);

        let reason = if self.force_close.swap(false, Ordering::SeqCst) {
            Some(ExitReason::Forced)
        } else {
            position.exit_trigger(price)
        };

        match reason {
            Some(reason) => {
                let record = self.close(position, reason, price, limit).await?;
                Ok(TickOutcome::Closed(record))
            }
            None => {
                debug!(
                    symbol = %position.symbol,
                    %price,
                    target = %position.levels.target,
                    stop = %position.levels.stop,
                    progress = %position.progress_percent(price),
                    "Holding position"
                );
                Ok(TickOutcome::Holding { price })
            }
        }
    }

    async fn close(
        &mut self,
        position: &OpenPosition,
        reason: ExitReason,
        price: Decimal,
        limit: Duration,
    ) -> TradeResult<TradeRecord> {
        let fill = match bounded(
            "market_order",
            limit,
            self.ports.execution.market_order(
                &position.symbol,
                position.direction.exit_side(),
                position.quantity,
                true,
            ),
        )
        .await
        {
            Ok(fill) => fill,
            Err(e) => {
                // Force-close must survive a failed attempt
                if reason == ExitReason::Forced {
                    self.force_close.store(true, Ordering::SeqCst);
                }
                return Err(e);
            }
        };

        let exit_price = if fill.avg_price > Decimal::ZERO {
            fill.avg_price
        } else {
            price
        };
        let now = self.clock.now();
        let mut record = if fill.quantity > Decimal::ZERO && fill.quantity < position.quantity {
            warn!(
                requested = %position.quantity,
                filled = %fill.quantity,
                "⚠️ [EXIT] Partial fill, remainder is adopted next tick"
            );
            OpenPosition {
                quantity: fill.quantity,
                ..position.clone()
            }
            .settle(exit_price, reason, now)
        } else {
            position.settle(exit_price, reason, now)
        };

        match self.stores.ledger.append(&record) {
            Ok(id) => record.id = Some(id),
            Err(e) => error!("❌ [LEDGER] Failed to record closed trade: {}", e),
        }
        self.apply_outcome(record.outcome, now);
        self.state = PositionState::Flat;

        info!(
            symbol = %record.symbol,
            direction = %record.direction,
            entry = %record.entry_price,
            exit = %record.exit_price,
            profit = %record.profit,
            roi = %record.roi_percent,
            reason = reason.as_str(),
            streak = self.streak,
            "💰 [EXIT] {} closed",
            record.outcome.as_str()
        );
        self.event(
            EventLevel::Info,
            &format!(
                "{} {} closed ({}) @ {}: {} profit {} ({}%)",
                record.direction,
                record.symbol,
                reason.as_str(),
                record.exit_price,
                record.outcome.as_str(),
                record.profit,
                record.roi_percent
            ),
        );

        Ok(record)
    }

    /// GAIN resets the streak, LOSS extends it.
    fn apply_outcome(&mut self, outcome: Outcome, at: DateTime<Utc>) {
        let stored = match outcome {
            Outcome::Gain => {
                self.streak = 0;
                self.stores.losses.clear()
            }
            Outcome::Loss => {
                self.streak = self.streak.saturating_add(1);
                self.stores.losses.record_loss(at)
            }
        };
        if let Err(e) = stored {
            error!("❌ [STREAK] Failed to persist loss streak: {}", e);
        }
    }

    async fn try_enter(
        &mut self,
        config: &Config,
        staking: &StakingController,
        limit: Duration,
    ) -> TradeResult<TickOutcome> {
        let now = self.clock.now();

        if let Some(active) = &self.suspension {
            if now < active.until {
                return Ok(TickOutcome::Suspended(active.reason));
            }
            let reason = active.reason;
            // Store first so memory never runs ahead of disk
            self.stores.losses.clear()?;
            self.suspension = None;
            self.streak = 0;
            info!(reason = reason.as_str(), "▶️ [STAKING] Cooldown over, loss streak reset");
            self.event(
                EventLevel::Info,
                &format!("{} cooldown over, loss streak reset", reason.as_str()),
            );
        }

        let gate = staking.gate(self.streak);
        if let Some(cooldown) = staking.cooldown(gate) {
            let until = now + cooldown;
            warn!(
                reason = gate.as_str(),
                streak = self.streak,
                %until,
                "🛑 [STAKING] Entries suspended"
            );
            self.event(
                EventLevel::Warn,
                &format!(
                    "{} after {} consecutive losses, entries suspended until {}",
                    gate.as_str(),
                    self.streak,
                    until.to_rfc3339()
                ),
            );
            self.suspension = Some(Suspension {
                reason: gate,
                until,
            });
            return Ok(TickOutcome::Suspended(gate));
        }

        let strategy = &config.strategy;
        let candles = bounded(
            "recent_candles",
            limit,
            self.ports.market.recent_candles(
                &strategy.symbol,
                &strategy.interval,
                strategy.candle_limit,
            ),
        )
        .await?;

        let detector = SignalDetector::new(strategy.candle_limit as usize);
        let reading = match detector.detect(&candles) {
            Ok(reading) => reading,
            Err(TradeError::InsufficientData { required, actual }) => {
                debug!(required, actual, "Not enough candles for a signal");
                return Ok(TickOutcome::Idle);
            }
            Err(e) => return Err(e),
        };
        self.last_price = Some(reading.last_close);

        let Some(direction) = reading.signal else {
            debug!(
                close = %reading.last_close,
                ma = ?reading.moving_average,
                "No signal"
            );
            return Ok(TickOutcome::Idle);
        };

        let step = bounded(
            "lot_step",
            limit,
            self.ports.market.lot_step(&strategy.symbol),
        )
        .await?;
        let stake = staking.size_for(self.streak);
        let quantity = align_to_step(stake, step);

        info!(
            symbol = %strategy.symbol,
            %direction,
            %stake,
            %quantity,
            streak = self.streak,
            ma = ?reading.moving_average,
            "📈 [ENTRY] Signal detected, placing order"
        );

        let fill = bounded(
            "market_order",
            limit,
            self.ports.execution.market_order(
                &strategy.symbol,
                direction.entry_side(),
                quantity,
                false,
            ),
        )
        .await?;

        let entry_price = if fill.avg_price > Decimal::ZERO {
            fill.avg_price
        } else {
            match bounded(
                "current_price",
                limit,
                self.ports.market.current_price(&strategy.symbol),
            )
            .await
            {
                Ok(price) => price,
                Err(e) => {
                    warn!("Fill had no price and ticker failed ({}), using last close", e);
                    reading.last_close
                }
            }
        };
        let filled = if fill.quantity > Decimal::ZERO {
            fill.quantity
        } else {
            quantity
        };

        let position = OpenPosition::new(
            strategy.symbol.clone(),
            direction,
            entry_price,
            filled,
            strategy.profit_percent,
            strategy.loss_percent,
            self.clock.now(),
        );
        self.last_price = Some(entry_price);

        info!(
            order_id = fill.order_id,
            entry = %position.entry_price,
            target = %position.levels.target,
            stop = %position.levels.stop,
            "✅ [ENTRY] {} position opened",
            direction
        );
        self.event(
            EventLevel::Info,
            &format!(
                "Opened {} {} qty {} @ {} (target {}, stop {})",
                direction,
                position.symbol,
                position.quantity,
                position.entry_price,
                position.levels.target,
                position.levels.stop
            ),
        );

        self.state = PositionState::Open(position.clone());
        Ok(TickOutcome::Opened(position))
    }

    fn event(&self, level: EventLevel, message: &str) {
        if let Err(e) = self
            .stores
            .events
            .append_event(self.clock.now(), level, message)
        {
            warn!("Failed to write event log: {}", e);
        }
    }

    async fn publish(&self, config: &Config, staking: &StakingController) {
        let symbol = self
            .state
            .as_open()
            .map(|p| p.symbol.clone())
            .unwrap_or_else(|| config.strategy.symbol.clone());

        let mut snapshot = StatusSnapshot::new(symbol, staking.ladder().to_vec(), self.clock.now());
        snapshot.current_price = self.last_price;
        snapshot.position = self
            .state
            .as_open()
            .map(|p| PositionView::from_position(p, self.last_price));
        snapshot.loss_streak = self.streak;
        snapshot.next_stake = staking.size_for(self.streak);
        snapshot.suspension = self.suspension.clone();
        snapshot.last_error = self.last_error.clone();

        self.board.publish(snapshot).await;
    }
}

fn direction_of(position: &ExchangePosition) -> Option<Direction> {
    if position.quantity > Decimal::ZERO {
        Some(Direction::Long)
    } else if position.quantity < Decimal::ZERO {
        Some(Direction::Short)
    } else {
        None
    }
}
