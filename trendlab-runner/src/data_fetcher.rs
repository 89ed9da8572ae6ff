//! Data fetcher (spec §4.3) — consumer-only.
//!
//! Locates the producer-built parquet for a derived timeframe, slices it
//! to the requested window plus warmup, and writes the run's bars
//! snapshot beneath `run_dir/bars/`. Never touches the network; never
//! falls back to a legacy HTTP path (spec §6: `ALLOW_LEGACY_HTTP_BACKFILL`
//! is always off inside the core).

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use trendlab_core::domain::Bar;
use trendlab_core::warmup::SessionMode;

use crate::bars_loader::{load_bars, BarsLoadError};
use crate::hashing::sha256_file;

#[derive(Debug, Error)]
pub enum DataFetchError {
    #[error("unsupported timeframe: {0}")]
    UnsupportedTimeframe(String),
    #[error(
        "missing historical data: expected producer file {expected} for {symbol}/{timeframe}; \
         invoke the producer's /ensure_timeframe_bars endpoint to backfill"
    )]
    MissingHistoricalData {
        symbol: String,
        timeframe: String,
        expected: String,
    },
    #[error("bars window is empty after slicing to [{0}, {1}]")]
    EmptyWindow(DateTime<Utc>, DateTime<Utc>),
    #[error(transparent)]
    Load(#[from] BarsLoadError),
    #[error("failed to write snapshot {0}: {1}")]
    WriteFailed(PathBuf, String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarsMetaSidecar {
    pub market_tz: String,
    pub timeframe: String,
    pub warmup_days: i64,
    pub lookback_days: i64,
    pub exec_bars: usize,
    pub signal_bars: usize,
    pub session_mode: SessionMode,
    pub option_b_source: String,
    pub consumer_only: bool,
}

#[derive(Debug, Clone)]
pub struct FetchedSnapshot {
    pub exec_bars: Vec<Bar>,
    pub signal_bars: Vec<Bar>,
    pub exec_path: PathBuf,
    pub signal_path: Option<PathBuf>,
    pub sidecar_path: PathBuf,
    pub bars_hash: String,
    pub meta: BarsMetaSidecar,
}

fn timeframe_minutes(timeframe: &str) -> Result<Option<u32>, DataFetchError> {
    match timeframe {
        "M1" => Ok(Some(1)),
        "M5" => Ok(Some(5)),
        "M15" => Ok(Some(15)),
        "H1" => Ok(Some(60)),
        "D1" => Ok(None),
        other => Err(DataFetchError::UnsupportedTimeframe(other.to_string())),
    }
}

fn producer_path(data_root: &Path, timeframe: &str, symbol: &str) -> PathBuf {
    match timeframe {
        "D1" => data_root.join("derived").join("tf_d1").join(format!("{}.parquet", symbol.to_uppercase())),
        other => {
            let minutes = timeframe_minutes(other).ok().flatten().unwrap_or(0);
            data_root
                .join("derived")
                .join(format!("tf_m{minutes}"))
                .join(format!("{}.parquet", symbol.to_uppercase()))
        }
    }
}

fn calendar_day_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn slice_window(bars: &[Bar], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Bar> {
    bars.iter()
        .filter(|b| b.timestamp >= start && b.timestamp <= end)
        .cloned()
        .collect()
}

/// Fetches and snapshots bars for `(symbol, timeframe)` into `run_dir`.
///
/// `warmup_days` comes from the warmup calculator (spec §4.2); the fetched
/// window is `[requested_end - lookback_days - warmup_days, requested_end]`.
pub fn fetch_snapshot(
    data_root: &Path,
    run_dir: &Path,
    symbol: &str,
    timeframe: &str,
    requested_end: DateTime<Utc>,
    lookback_days: i64,
    warmup_days: i64,
    market_tz: &str,
    session_mode: SessionMode,
) -> Result<FetchedSnapshot, DataFetchError> {
    let requested_start = calendar_day_start(requested_end) - Duration::days(lookback_days);
    let effective_start = requested_start - Duration::days(warmup_days);

    let source_path = producer_path(data_root, timeframe, symbol);
    if !source_path.exists() {
        return Err(DataFetchError::MissingHistoricalData {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            expected: source_path.display().to_string(),
        });
    }

    let bars_dir = run_dir.join("bars");
    std::fs::create_dir_all(&bars_dir)
        .map_err(|e| DataFetchError::WriteFailed(bars_dir.clone(), e.to_string()))?;

    if timeframe == "D1" {
        let dest = bars_dir.join(format!("bars_exec_{timeframe}_rth.parquet"));
        std::fs::copy(&source_path, &dest)
            .map_err(|e| DataFetchError::WriteFailed(dest.clone(), e.to_string()))?;
        let (bars, hash) = load_bars(&dest)?;
        if bars.is_empty() {
            return Err(DataFetchError::EmptyWindow(effective_start, requested_end));
        }
        let meta = BarsMetaSidecar {
            market_tz: market_tz.to_string(),
            timeframe: timeframe.to_string(),
            warmup_days,
            lookback_days,
            exec_bars: bars.len(),
            signal_bars: bars.len(),
            session_mode,
            option_b_source: source_path.display().to_string(),
            consumer_only: true,
        };
        let sidecar_path = write_sidecar(&bars_dir, timeframe, &meta)?;
        return Ok(FetchedSnapshot {
            exec_bars: bars.clone(),
            signal_bars: bars,
            exec_path: dest,
            signal_path: None,
            sidecar_path,
            bars_hash: hash,
            meta,
        });
    }

    let raw_bytes_hash = sha256_file(&source_path)
        .map_err(|e| DataFetchError::WriteFailed(source_path.clone(), e.to_string()))?;
    let (all_bars, _) = load_bars(&source_path)?;
    let windowed = slice_window(&all_bars, effective_start, requested_end);
    if windowed.is_empty() {
        return Err(DataFetchError::EmptyWindow(effective_start, requested_end));
    }

    // Written via `write_csv_snapshot`, so the extension must say `.csv` —
    // `load_bars` dispatches on extension, and a `.parquet` name here would
    // make any later re-read of this snapshot fail to parse.
    let exec_path = bars_dir.join(format!("bars_exec_{timeframe}_rth.csv"));
    write_csv_snapshot(&exec_path, &windowed)?;

    // For M1 and H1 the signal and exec grids are identical (spec §4.3).
    let signal_same_as_exec = matches!(timeframe, "M1" | "H1");
    let signal_path = if signal_same_as_exec {
        None
    } else {
        let path = bars_dir.join(format!("bars_signal_{timeframe}_rth.csv"));
        write_csv_snapshot(&path, &windowed)?;
        Some(path)
    };

    let meta = BarsMetaSidecar {
        market_tz: market_tz.to_string(),
        timeframe: timeframe.to_string(),
        warmup_days,
        lookback_days,
        exec_bars: windowed.len(),
        signal_bars: windowed.len(),
        session_mode,
        option_b_source: source_path.display().to_string(),
        consumer_only: true,
    };
    let sidecar_path = write_sidecar(&bars_dir, timeframe, &meta)?;

    Ok(FetchedSnapshot {
        exec_bars: windowed.clone(),
        signal_bars: windowed,
        exec_path,
        signal_path,
        sidecar_path,
        bars_hash: raw_bytes_hash,
        meta,
    })
}

fn write_csv_snapshot(path: &Path, bars: &[Bar]) -> Result<(), DataFetchError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| DataFetchError::WriteFailed(path.to_path_buf(), e.to_string()))?;
    writer
        .write_record(["timestamp", "open", "high", "low", "close", "volume"])
        .map_err(|e| DataFetchError::WriteFailed(path.to_path_buf(), e.to_string()))?;
    for bar in bars {
        writer
            .write_record([
                bar.timestamp.to_rfc3339(),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
            ])
            .map_err(|e| DataFetchError::WriteFailed(path.to_path_buf(), e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| DataFetchError::WriteFailed(path.to_path_buf(), e.to_string()))
}

fn write_sidecar(
    bars_dir: &Path,
    timeframe: &str,
    meta: &BarsMetaSidecar,
) -> Result<PathBuf, DataFetchError> {
    let path = bars_dir.join(format!("bars_{timeframe}_meta.json"));
    let json = serde_json::to_string_pretty(meta)
        .map_err(|e| DataFetchError::WriteFailed(path.clone(), e.to_string()))?;
    std::fs::write(&path, json).map_err(|e| DataFetchError::WriteFailed(path.clone(), e.to_string()))?;
    Ok(path)
}

/// Calls the producer's optional `/ensure_timeframe_bars` endpoint
/// (spec §6). Synchronous, performed before the run begins; any
/// `gaps_after` in the response forbids the pipeline from proceeding.
#[derive(Debug, Deserialize)]
pub struct EnsureBarsResponse {
    pub status: String,
    pub gaps_before: u64,
    pub gaps_after: u64,
}

pub fn ensure_timeframe_bars(
    stream_url: &str,
    symbol: &str,
    timeframe_minutes: u32,
    start_date: &str,
    end_date: &str,
    session_timezone: &str,
    session_mode: SessionMode,
    timeout_secs: u64,
) -> Result<EnsureBarsResponse, reqwest::Error> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?;
    let body = serde_json::json!({
        "symbol": symbol,
        "timeframe_minutes": timeframe_minutes,
        "start_date": start_date,
        "end_date": end_date,
        "session_timezone": session_timezone,
        "session_mode": session_mode,
    });
    client
        .post(format!("{stream_url}/ensure_timeframe_bars"))
        .json(&body)
        .send()?
        .json::<EnsureBarsResponse>()
}
