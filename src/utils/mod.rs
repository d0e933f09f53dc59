//! Shared utilities: decimal arithmetic and the time source.

pub mod clock;
pub mod decimal;

pub use clock::{Clock, ManualClock, SystemClock};
