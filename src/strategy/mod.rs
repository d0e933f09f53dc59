//! Trading strategy implementation.
//!
//! Contains the core logic for:
//! - Heikin-Ashi reversal signals
//! - Stake sizing from the loss streak, with its two safeguards
//! - The single-position lifecycle and the loop that drives it

mod lifecycle;
mod position;
mod runner;
mod signal;
mod staking;

pub use lifecycle::{Ports, PositionLifecycle, Stores, TickOutcome};
pub use position::{
    Direction, ExitLevels, ExitReason, OpenPosition, Outcome, PositionState, TradeRecord,
};
pub use runner::TradingLoop;
pub use signal::{heikin_ashi, moving_average, HeikinAshi, SignalDetector, SignalReading};
pub use staking::{EntryGate, StakingController};
