//! Pre-paper runtime history (spec §4.14).
//!
//! A second data plane, disjoint from the backtest parquet store: an
//! append-only SQLite cache keyed by `(symbol, timeframe, ts_utc_seconds)`,
//! written insert-or-replace so repeated backfills are idempotent. Reads
//! are monotonic by `ts`. `ensure_history` is the contract strategies must
//! clear before a live/replay run is allowed to emit signals.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("runtime history may not write under the backtest parquet tree: {0}")]
    ForbiddenLocation(PathBuf),
    #[error("failed to create directory for {0}: {1}")]
    CreateDir(PathBuf, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    Historical,
    Websocket,
    Backfill,
}

impl HistorySource {
    fn as_str(self) -> &'static str {
        match self {
            HistorySource::Historical => "historical",
            HistorySource::Websocket => "websocket",
            HistorySource::Backfill => "backfill",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "websocket" => HistorySource::Websocket,
            "backfill" => HistorySource::Backfill,
            _ => HistorySource::Historical,
        }
    }
}

/// A cached bar keyed by `(symbol, timeframe, ts_utc)` (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub symbol: String,
    pub timeframe: String,
    pub ts_utc: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub market_tz: String,
    pub source: HistorySource,
    pub inserted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryStatus {
    Sufficient,
    Loading,
    Degraded,
}

/// Opens (creating if absent) a runtime-history store at `path`. Refuses
/// to open anywhere beneath `backtest_parquet_root` — a hard guard spec
/// §4.14 calls out as a testable invariant (spec §8 property 7).
pub struct RuntimeHistoryStore {
    conn: Connection,
}

impl RuntimeHistoryStore {
    pub fn open(path: &Path, backtest_parquet_root: &Path) -> Result<Self, HistoryError> {
        if path.starts_with(backtest_parquet_root) {
            return Err(HistoryError::ForbiddenLocation(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HistoryError::CreateDir(parent.to_path_buf(), e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory store, used by tests and by callers who only need the
    /// `ensure_history` contract without persistence across processes.
    pub fn open_in_memory() -> Result<Self, HistoryError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<(), HistoryError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS runtime_history (
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                ts_utc_seconds INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume INTEGER NOT NULL,
                market_tz TEXT NOT NULL,
                source TEXT NOT NULL,
                inserted_at INTEGER NOT NULL,
                PRIMARY KEY (symbol, timeframe, ts_utc_seconds)
            )",
        )?;
        Ok(())
    }

    /// Insert-or-replace on the primary key (spec §4.14: writes are
    /// idempotent).
    pub fn upsert(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        self.conn.execute(
            "INSERT INTO runtime_history
                (symbol, timeframe, ts_utc_seconds, open, high, low, close, volume, market_tz, source, inserted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(symbol, timeframe, ts_utc_seconds) DO UPDATE SET
                open = excluded.open, high = excluded.high, low = excluded.low,
                close = excluded.close, volume = excluded.volume,
                market_tz = excluded.market_tz, source = excluded.source,
                inserted_at = excluded.inserted_at",
            params![
                entry.symbol,
                entry.timeframe,
                entry.ts_utc.timestamp(),
                entry.open,
                entry.high,
                entry.low,
                entry.close,
                entry.volume as i64,
                entry.market_tz,
                entry.source.as_str(),
                entry.inserted_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    /// Reads every cached bar for `(symbol, timeframe)`, ascending by
    /// `ts_utc` (spec §3: retrieval is monotonic by ts).
    pub fn read_range(&self, symbol: &str, timeframe: &str) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut stmt = self.conn.prepare(
            "SELECT symbol, timeframe, ts_utc_seconds, open, high, low, close, volume, market_tz, source, inserted_at
             FROM runtime_history WHERE symbol = ?1 AND timeframe = ?2 ORDER BY ts_utc_seconds ASC",
        )?;
        let rows = stmt.query_map(params![symbol, timeframe], |row| {
            Ok(HistoryEntry {
                symbol: row.get(0)?,
                timeframe: row.get(1)?,
                ts_utc: Utc.timestamp_opt(row.get(2)?, 0).single().unwrap_or_else(Utc::now),
                open: row.get(3)?,
                high: row.get(4)?,
                low: row.get(5)?,
                close: row.get(6)?,
                volume: row.get::<_, i64>(7)? as u64,
                market_tz: row.get(8)?,
                source: HistorySource::from_str(&row.get::<_, String>(9)?),
                inserted_at: Utc.timestamp_opt(row.get(10)?, 0).single().unwrap_or_else(Utc::now),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(HistoryError::from)
    }

    /// Clears the store (test helper; mirrors the `reset_for_tests`
    /// pattern used by the runtime config cache).
    pub fn clear(&self) -> Result<(), HistoryError> {
        self.conn.execute("DELETE FROM runtime_history", [])?;
        Ok(())
    }

    /// Determines coverage against `[required_start, required_end]` for
    /// `(symbol, timeframe)` (spec §4.14). `auto_backfill` gates whether
    /// `Loading` or `Degraded` is returned when gaps exist; the caller
    /// performs any actual backfill attempt before re-checking.
    pub fn ensure_history(
        &self,
        symbol: &str,
        timeframe: &str,
        required_start: DateTime<Utc>,
        required_end: DateTime<Utc>,
        auto_backfill: bool,
        backfill_attempted_and_succeeded: bool,
    ) -> Result<HistoryStatus, HistoryError> {
        let cached = self.read_range(symbol, timeframe)?;
        let Some(first) = cached.first() else {
            return Ok(if auto_backfill {
                HistoryStatus::Loading
            } else {
                HistoryStatus::Degraded
            });
        };
        let last = cached.last().expect("cached is non-empty");
        if first.ts_utc <= required_start && last.ts_utc >= required_end {
            return Ok(HistoryStatus::Sufficient);
        }
        if auto_backfill && backfill_attempted_and_succeeded {
            return Ok(HistoryStatus::Loading);
        }
        Ok(HistoryStatus::Degraded)
    }
}
