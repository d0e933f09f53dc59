//! SQLite implementation of the ledger, loss counter and event log.

use super::{EventEntry, EventLevel, EventLog, LossStreakStore, TradeLedger};
use crate::error::{TradeError, TradeResult};
use crate::strategy::{Direction, ExitReason, Outcome, TradeRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// SQLite-backed persistence manager.
pub struct PersistenceManager {
    conn: Mutex<Connection>,
}

impl PersistenceManager {
    /// Open (or create) the database and make sure the schema exists.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        let manager = Self {
            conn: Mutex::new(conn),
        };
        manager
            .init_schema()
            .context("Failed to initialize database schema")?;

        info!("Persistence manager initialized at {:?}", path);
        Ok(manager)
    }

    fn conn(&self) -> TradeResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TradeError::Storage("database connection lock poisoned".to_string()))
    }

    fn init_schema(&self) -> TradeResult<()> {
        self.conn()?.execute_batch(
            r#"
            -- Closed trades
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                closed_at TEXT NOT NULL,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                exit_price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                outcome TEXT NOT NULL,
                roi_percent TEXT NOT NULL,
                profit TEXT NOT NULL,
                exit_reason TEXT NOT NULL
            );

            -- One row per consecutive loss
            CREATE TABLE IF NOT EXISTS loss_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL
            );

            -- Dashboard event log
            CREATE TABLE IF NOT EXISTS event_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL
            );
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }
}

fn parse_decimal(raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap_or_default()
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TradeRecord> {
    let direction: String = row.get(3)?;
    let outcome: String = row.get(7)?;
    let reason: String = row.get(10)?;
    Ok(TradeRecord {
        id: Some(row.get(0)?),
        closed_at: parse_timestamp(&row.get::<_, String>(1)?),
        symbol: row.get(2)?,
        direction: Direction::from_str(&direction).unwrap_or(Direction::Long),
        entry_price: parse_decimal(&row.get::<_, String>(4)?),
        exit_price: parse_decimal(&row.get::<_, String>(5)?),
        quantity: parse_decimal(&row.get::<_, String>(6)?),
        outcome: Outcome::from_str(&outcome).unwrap_or(Outcome::Loss),
        roi_percent: parse_decimal(&row.get::<_, String>(8)?),
        profit: parse_decimal(&row.get::<_, String>(9)?),
        exit_reason: ExitReason::from_str(&reason).unwrap_or(ExitReason::Forced),
    })
}

impl TradeLedger for PersistenceManager {
    fn append(&self, record: &TradeRecord) -> TradeResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO trades (closed_at, symbol, direction, entry_price, exit_price, quantity,
                                outcome, roi_percent, profit, exit_reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.closed_at.to_rfc3339(),
                record.symbol,
                record.direction.as_str(),
                record.entry_price.to_string(),
                record.exit_price.to_string(),
                record.quantity.to_string(),
                record.outcome.as_str(),
                record.roi_percent.to_string(),
                record.profit.to_string(),
                record.exit_reason.as_str(),
            ],
        )?;
        let id = conn.last_insert_rowid();

        debug!(
            id,
            symbol = %record.symbol,
            outcome = record.outcome.as_str(),
            profit = %record.profit,
            "Trade recorded"
        );
        Ok(id)
    }

    fn all_records_newest_first(&self) -> TradeResult<Vec<TradeRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, closed_at, symbol, direction, entry_price, exit_price, quantity,
                   outcome, roi_percent, profit, exit_reason
            FROM trades
            ORDER BY id DESC
            "#,
        )?;

        let records = stmt
            .query_map([], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

impl LossStreakStore for PersistenceManager {
    fn record_loss(&self, at: DateTime<Utc>) -> TradeResult<()> {
        self.conn()?.execute(
            "INSERT INTO loss_events (timestamp) VALUES (?1)",
            params![at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn clear(&self) -> TradeResult<()> {
        let removed = self.conn()?.execute("DELETE FROM loss_events", [])?;
        if removed > 0 {
            debug!(removed, "Loss counter cleared");
        }
        Ok(())
    }

    fn count(&self) -> TradeResult<u32> {
        let count: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM loss_events", [], |row| row.get(0))?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

impl EventLog for PersistenceManager {
    fn append_event(
        &self,
        at: DateTime<Utc>,
        level: EventLevel,
        message: &str,
    ) -> TradeResult<()> {
        self.conn()?.execute(
            "INSERT INTO event_log (timestamp, level, message) VALUES (?1, ?2, ?3)",
            params![at.to_rfc3339(), level.as_str(), message],
        )?;
        Ok(())
    }

    fn recent_events(&self, limit: usize) -> TradeResult<Vec<EventEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT timestamp, level, message
            FROM event_log
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let mut entries = stmt
            .query_map([limit as i64], |row| {
                let ts: String = row.get(0)?;
                let level: String = row.get(1)?;
                Ok(EventEntry {
                    timestamp: parse_timestamp(&ts),
                    level: EventLevel::parse(&level),
                    message: row.get(2)?,
                })
            })?
            .filter_map(|r| match r {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable event log row: {}", e);
                    None
                }
            })
            .collect::<Vec<_>>();

        entries.reverse();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(profit: Decimal, outcome: Outcome) -> TradeRecord {
        TradeRecord {
            id: None,
            closed_at: Utc::now(),
            symbol: "ETHUSDT".to_string(),
            direction: Direction::Short,
            entry_price: dec!(2500),
            exit_price: dec!(2487.5),
            quantity: dec!(0.012),
            outcome,
            roi_percent: dec!(0.5),
            profit,
            exit_reason: ExitReason::Target,
        }
    }

    #[test]
    fn test_ledger_newest_first() {
        let manager = PersistenceManager::new(":memory:").unwrap();

        let first = manager.append(&record(dec!(0.15), Outcome::Gain)).unwrap();
        let second = manager.append(&record(dec!(-0.13), Outcome::Loss)).unwrap();
        assert!(second > first);

        let records = manager.all_records_newest_first().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, Some(second));
        assert_eq!(records[0].profit, dec!(-0.13));
        assert_eq!(records[0].outcome, Outcome::Loss);
        assert_eq!(records[1].direction, Direction::Short);
        assert_eq!(records[1].exit_reason, ExitReason::Target);
        assert_eq!(records[1].quantity, dec!(0.012));
    }

    #[test]
    fn test_loss_counter() {
        let manager = PersistenceManager::new(":memory:").unwrap();
        assert_eq!(manager.count().unwrap(), 0);

        manager.record_loss(Utc::now()).unwrap();
        manager.record_loss(Utc::now()).unwrap();
        manager.record_loss(Utc::now()).unwrap();
        assert_eq!(manager.count().unwrap(), 3);

        manager.clear().unwrap();
        assert_eq!(manager.count().unwrap(), 0);
    }

    #[test]
    fn test_recent_events_oldest_first() {
        let manager = PersistenceManager::new(":memory:").unwrap();
        for i in 0..5 {
            manager
                .append_event(Utc::now(), EventLevel::Info, &format!("event {}", i))
                .unwrap();
        }
        manager
            .append_event(Utc::now(), EventLevel::Error, "boom")
            .unwrap();

        let events = manager.recent_events(3).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, "event 3");
        assert_eq!(events[2].message, "boom");
        assert_eq!(events[2].level, EventLevel::Error);
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = std::env::temp_dir().join(format!("gale-trader-test-{}", std::process::id()));
        let path = dir.join("nested").join("gale.db");

        let manager = PersistenceManager::new(&path).unwrap();
        manager.record_loss(Utc::now()).unwrap();
        assert!(path.exists());

        drop(manager);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
