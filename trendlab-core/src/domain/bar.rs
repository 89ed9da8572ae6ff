//! Bar — the fundamental market data unit.
//!
//! Bars are produced by an external market-data component and are read-only
//! within a run: once snapshotted into the run directory, nothing in the
//! pipeline mutates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single OHLCV bar. Timestamps are always UTC instants; the market
/// timezone is only a display/session-partitioning concern, applied
/// elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Error, PartialEq)]
pub enum BarError {
    #[error("bar at {0} has negative or non-finite OHLC values")]
    NonFiniteOrNegative(DateTime<Utc>),
    #[error("bar at {0} violates low <= min(open, close)")]
    LowAboveBody(DateTime<Utc>),
    #[error("bar at {0} violates high >= max(open, close)")]
    HighBelowBody(DateTime<Utc>),
    #[error("duplicate bar timestamp {0}")]
    DuplicateTimestamp(DateTime<Utc>),
    #[error("bar timestamps are not monotonic strictly increasing at {0}")]
    NonMonotonic(DateTime<Utc>),
}

impl Bar {
    /// Validates the single-bar OHLC invariants from spec §3: `low <=
    /// min(open, close)` and `high >= max(open, close)`, all fields
    /// finite and nonnegative.
    pub fn validate(&self) -> Result<(), BarError> {
        let fields = [self.open, self.high, self.low, self.close];
        if fields.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(BarError::NonFiniteOrNegative(self.timestamp));
        }
        if self.low > self.open.min(self.close) {
            return Err(BarError::LowAboveBody(self.timestamp));
        }
        if self.high < self.open.max(self.close) {
            return Err(BarError::HighBelowBody(self.timestamp));
        }
        Ok(())
    }

    /// Whether `price` falls within this bar's `[low, high]` range,
    /// inclusive. Used by the fill model and trade evidence to prove a
    /// fill or trade leg actually happened during the matched bar.
    pub fn contains_price(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Validates a full bar series: per-bar OHLC invariants plus the
/// series-level invariants (no duplicate timestamps, strictly increasing
/// order). Bars are assumed to already be sorted ascending by timestamp;
/// this function does not sort.
pub fn validate_series(bars: &[Bar]) -> Result<(), BarError> {
    let mut prev: Option<DateTime<Utc>> = None;
    for bar in bars {
        bar.validate()?;
        if let Some(p) = prev {
            if bar.timestamp == p {
                return Err(BarError::DuplicateTimestamp(bar.timestamp));
            }
            if bar.timestamp < p {
                return Err(BarError::NonMonotonic(bar.timestamp));
            }
        }
        prev = Some(bar.timestamp);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    fn sample_bar() -> Bar {
        Bar {
            timestamp: ts(9, 30),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000,
        }
    }

    #[test]
    fn validates_sane_bar() {
        assert!(sample_bar().validate().is_ok());
    }

    #[test]
    fn rejects_low_above_body() {
        let mut bar = sample_bar();
        bar.low = 101.0;
        assert_eq!(bar.validate(), Err(BarError::LowAboveBody(bar.timestamp)));
    }

    #[test]
    fn rejects_high_below_body() {
        let mut bar = sample_bar();
        bar.high = 99.0;
        assert_eq!(bar.validate(), Err(BarError::HighBelowBody(bar.timestamp)));
    }

    #[test]
    fn rejects_negative_values() {
        let mut bar = sample_bar();
        bar.volume = 0;
        bar.open = -1.0;
        assert!(matches!(
            bar.validate(),
            Err(BarError::NonFiniteOrNegative(_))
        ));
    }

    #[test]
    fn series_rejects_duplicate_timestamp() {
        let bars = vec![sample_bar(), sample_bar()];
        assert!(matches!(
            validate_series(&bars),
            Err(BarError::DuplicateTimestamp(_))
        ));
    }

    #[test]
    fn series_rejects_non_monotonic() {
        let mut later = sample_bar();
        later.timestamp = ts(9, 25);
        let bars = vec![sample_bar(), later];
        assert!(matches!(
            validate_series(&bars),
            Err(BarError::NonMonotonic(_))
        ));
    }

    #[test]
    fn contains_price_checks_range() {
        let bar = sample_bar();
        assert!(bar.contains_price(100.0));
        assert!(!bar.contains_price(200.0));
    }
}
