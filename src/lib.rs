//! # Gale Trader
//!
//! A single-symbol Binance Futures bot that enters on Heikin-Ashi reversals
//! and sizes positions from a loss-streak staking ladder.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading, validation and runtime updates
//! - `exchange`: Binance REST client, paper exchange and the venue ports
//! - `strategy`: Signal detection, staking, and the position lifecycle
//! - `persistence`: SQLite trade ledger, loss counter and event log
//! - `status`: Live snapshot shared between the loop and the API
//! - `api`: JSON status API
//! - `utils`: Clock abstraction and decimal arithmetic

pub mod api;
pub mod config;
pub mod error;
pub mod exchange;
pub mod persistence;
pub mod status;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::{TradeError, TradeResult};
