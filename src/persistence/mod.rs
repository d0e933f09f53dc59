//! Durable state for the trader.
//!
//! Persists what must survive a restart:
//! - Closed trade history (the ledger)
//! - The consecutive loss counter
//! - A human-readable event log for the dashboard
//!
//! The lifecycle only sees the traits below; [`PersistenceManager`] backs
//! all three with one SQLite database.

mod sqlite;

pub use sqlite::PersistenceManager;

use crate::error::TradeResult;
use crate::strategy::TradeRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Append-only store of closed trades.
#[cfg_attr(test, mockall::automock)]
pub trait TradeLedger: Send + Sync {
    /// Append a record, returning its row id.
    fn append(&self, record: &TradeRecord) -> TradeResult<i64>;

    /// Every record, most recent first.
    fn all_records_newest_first(&self) -> TradeResult<Vec<TradeRecord>>;
}

/// Durable consecutive-loss counter. One entry per loss; the count is the
/// number of entries.
#[cfg_attr(test, mockall::automock)]
pub trait LossStreakStore: Send + Sync {
    fn record_loss(&self, at: DateTime<Utc>) -> TradeResult<()>;

    fn clear(&self) -> TradeResult<()>;

    fn count(&self) -> TradeResult<u32>;
}

/// Severity of an event log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "INFO",
            EventLevel::Warn => "WARN",
            EventLevel::Error => "ERROR",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "WARN" => EventLevel::Warn,
            "ERROR" => EventLevel::Error,
            _ => EventLevel::Info,
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEntry {
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub message: String,
}

/// Append-only event log.
#[cfg_attr(test, mockall::automock)]
pub trait EventLog: Send + Sync {
    fn append_event(
        &self,
        at: DateTime<Utc>,
        level: EventLevel,
        message: &str,
    ) -> TradeResult<()>;

    /// The last `limit` entries, oldest first.
    fn recent_events(&self, limit: usize) -> TradeResult<Vec<EventEntry>>;
}
