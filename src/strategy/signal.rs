//! Heikin-Ashi reversal detector.

use crate::error::{TradeError, TradeResult};
use crate::exchange::Candle;
use crate::strategy::position::Direction;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Minimum candles needed for a reading.
pub const MIN_CANDLES: usize = 2;

/// A smoothed candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeikinAshi {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl HeikinAshi {
    fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Smooth a candle series. The first candle is taken as-is and seeds the
/// recurrence for the rest.
pub fn heikin_ashi(candles: &[Candle]) -> Vec<HeikinAshi> {
    let mut out: Vec<HeikinAshi> = Vec::with_capacity(candles.len());

    for candle in candles {
        let smoothed = match out.last() {
            None => HeikinAshi {
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
            },
            Some(prev) => {
                let close = (candle.open + candle.high + candle.low + candle.close) / dec!(4);
                let open = (prev.open + prev.close) / dec!(2);
                HeikinAshi {
                    open,
                    high: candle.high.max(open).max(close),
                    low: candle.low.min(open).min(close),
                    close,
                }
            }
        };
        out.push(smoothed);
    }

    out
}

/// Simple moving average of the last `period` closes, `None` if the series is
/// shorter than `period`.
pub fn moving_average(candles: &[Candle], period: usize) -> Option<Decimal> {
    if period == 0 || candles.len() < period {
        return None;
    }
    let sum: Decimal = candles[candles.len() - period..]
        .iter()
        .map(|c| c.close)
        .sum();
    Some(sum / Decimal::from(period))
}

/// Output of one detector pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalReading {
    pub signal: Option<Direction>,
    pub last_close: Decimal,
    /// Informational only
    pub moving_average: Option<Decimal>,
}

/// Detects a colour flip between the last two Heikin-Ashi candles.
#[derive(Debug, Clone)]
pub struct SignalDetector {
    ma_period: usize,
}

impl SignalDetector {
    pub fn new(ma_period: usize) -> Self {
        Self { ma_period }
    }

    /// Bearish then bullish is `Long`, bullish then bearish is `Short`.
    pub fn detect(&self, candles: &[Candle]) -> TradeResult<SignalReading> {
        if candles.len() < MIN_CANDLES {
            return Err(TradeError::InsufficientData {
                required: MIN_CANDLES,
                actual: candles.len(),
            });
        }

        let smoothed = heikin_ashi(candles);
        let prev = &smoothed[smoothed.len() - 2];
        let last = &smoothed[smoothed.len() - 1];

        let signal = if prev.is_bearish() && last.is_bullish() {
            Some(Direction::Long)
        } else if prev.is_bullish() && last.is_bearish() {
            Some(Direction::Short)
        } else {
            None
        };

        Ok(SignalReading {
            signal,
            last_close: candles[candles.len() - 1].close,
            moving_average: moving_average(candles, self.ma_period),
        })
    }
}
