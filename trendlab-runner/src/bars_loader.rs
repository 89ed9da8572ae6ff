//! Bars snapshot loader (spec §4.4).
//!
//! Given a path on disk, detects CSV vs. parquet by extension, reads it
//! into a sorted `Vec<Bar>`, and returns the file's SHA-256 alongside it.
//! This is the function the data fetcher's snapshot and the runtime
//! history loader both eventually feed into the pipeline through.

use std::path::Path;
use thiserror::Error;
use trendlab_core::domain::Bar;

use crate::hashing::sha256_file;

#[derive(Debug, Error)]
pub enum BarsLoadError {
    #[error("unreadable bars file {0}: {1}")]
    Unreadable(String, String),
    #[error("unsupported bars file extension: {0}")]
    UnsupportedFormat(String),
    #[error("missing required column: {0}")]
    MissingColumn(String),
    #[error("bar series invariant violated: {0}")]
    Invariant(#[from] trendlab_core::domain::bar::BarError),
}

const REQUIRED_COLUMNS: &[&str] = &["timestamp", "open", "high", "low", "close", "volume"];

/// Loads `path` into an ascending-sorted `Vec<Bar>` plus the raw file's
/// SHA-256. Column names are matched case-insensitively.
pub fn load_bars(path: &Path) -> Result<(Vec<Bar>, String), BarsLoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let mut bars = match ext.as_str() {
        "csv" => load_csv(path)?,
        "parquet" => load_parquet(path)?,
        other => return Err(BarsLoadError::UnsupportedFormat(other.to_string())),
    };

    bars.sort_by_key(|b| b.timestamp);
    let hash = sha256_file(path)
        .map_err(|e| BarsLoadError::Unreadable(path.display().to_string(), e.to_string()))?;
    Ok((bars, hash))
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, BarsLoadError> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or_else(|| BarsLoadError::MissingColumn(name.to_string()))
}

fn load_csv(path: &Path) -> Result<Vec<Bar>, BarsLoadError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| BarsLoadError::Unreadable(path.display().to_string(), e.to_string()))?;
    let headers = reader
        .headers()
        .map_err(|e| BarsLoadError::Unreadable(path.display().to_string(), e.to_string()))?
        .clone();

    let idx: Vec<usize> = REQUIRED_COLUMNS
        .iter()
        .map(|c| column_index(&headers, c))
        .collect::<Result<_, _>>()?;
    let (ts_i, o_i, h_i, l_i, c_i, v_i) = (idx[0], idx[1], idx[2], idx[3], idx[4], idx[5]);

    let mut bars = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| BarsLoadError::Unreadable(path.display().to_string(), e.to_string()))?;
        let timestamp = chrono::DateTime::parse_from_rfc3339(&record[ts_i])
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| BarsLoadError::Unreadable(path.display().to_string(), e.to_string()))?;
        bars.push(Bar {
            timestamp,
            open: record[o_i].parse().unwrap_or(f64::NAN),
            high: record[h_i].parse().unwrap_or(f64::NAN),
            low: record[l_i].parse().unwrap_or(f64::NAN),
            close: record[c_i].parse().unwrap_or(f64::NAN),
            volume: record[v_i].parse().unwrap_or(0),
        });
    }
    Ok(bars)
}

fn load_parquet(path: &Path) -> Result<Vec<Bar>, BarsLoadError> {
    use polars::prelude::*;

    let file = std::fs::File::open(path)
        .map_err(|e| BarsLoadError::Unreadable(path.display().to_string(), e.to_string()))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| BarsLoadError::Unreadable(path.display().to_string(), e.to_string()))?;

    let lower: Vec<String> = df.get_column_names().iter().map(|s| s.to_lowercase()).collect();
    for required in REQUIRED_COLUMNS {
        if !lower.iter().any(|c| c == required) {
            return Err(BarsLoadError::MissingColumn(required.to_string()));
        }
    }

    let col = |name: &str| -> Result<Series, BarsLoadError> {
        let actual = df
            .get_column_names()
            .into_iter()
            .find(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| BarsLoadError::MissingColumn(name.to_string()))?;
        df.column(actual)
            .map(|s| s.clone())
            .map_err(|e| BarsLoadError::Unreadable(path.display().to_string(), e.to_string()))
    };

    let ts = col("timestamp")?;
    let open = col("open")?.cast(&DataType::Float64).unwrap();
    let high = col("high")?.cast(&DataType::Float64).unwrap();
    let low = col("low")?.cast(&DataType::Float64).unwrap();
    let close = col("close")?.cast(&DataType::Float64).unwrap();
    let volume = col("volume")?.cast(&DataType::UInt64).unwrap();

    let ts_us = ts
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
        .map_err(|e| BarsLoadError::Unreadable(path.display().to_string(), e.to_string()))?;
    let ts_i64 = ts_us.datetime().unwrap();

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let micros = ts_i64.get(i).unwrap_or_default();
        let timestamp = chrono::DateTime::from_timestamp_micros(micros)
            .unwrap_or_else(chrono::Utc::now);
        bars.push(Bar {
            timestamp,
            open: open.f64().unwrap().get(i).unwrap_or(f64::NAN),
            high: high.f64().unwrap().get(i).unwrap_or(f64::NAN),
            low: low.f64().unwrap().get(i).unwrap_or(f64::NAN),
            close: close.f64().unwrap().get(i).unwrap_or(f64::NAN),
            volume: volume.u64().unwrap().get(i).unwrap_or(0),
        });
    }
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_sorts_csv_bars() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(file, "2025-06-02T09:35:00Z,101,102,100,101.5,1000").unwrap();
        writeln!(file, "2025-06-02T09:30:00Z,100,101,99,100.5,900").unwrap();
        file.flush().unwrap();

        let (bars, hash) = load_bars(file.path()).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn rejects_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        assert!(matches!(
            load_bars(file.path()),
            Err(BarsLoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn rejects_missing_required_column() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "timestamp,open,high,low,close").unwrap();
        writeln!(file, "2025-06-02T09:30:00Z,100,101,99,100.5").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            load_bars(file.path()),
            Err(BarsLoadError::MissingColumn(_))
        ));
    }
}
