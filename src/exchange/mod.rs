//! Exchange integrations.
//!
//! ## Binance
//! REST connectivity for USDⓈ-M futures:
//! - Market data (ticker price, klines, lot size)
//! - Account operations (market orders, position risk)
//!
//! ## Paper
//! An in-process exchange that fills at the current price, optionally fed
//! by live Binance market data.

mod client;
pub mod paper;
mod traits;
mod types;

pub use client::BinanceClient;
pub use paper::PaperExchange;
pub use traits::*;
pub use types::*;
