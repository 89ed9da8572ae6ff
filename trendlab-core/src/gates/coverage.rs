//! Coverage gate (spec §4.12) — a metadata-only check that local bars
//! span `[requested_end - lookback_days, requested_end]`.
//!
//! Deliberately reads only `{first_ts, last_ts, row_count}` about the
//! producer's file on the happy path; it does not load the full data
//! frame. Loading bars for the run is the bars snapshot loader's job
//! (§4.4), which runs only once this gate is `Sufficient`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Metadata-only view of a producer bars file: first/last timestamp and
/// row count, without reading the full frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarsMeta {
    pub first_ts: DateTime<Utc>,
    pub last_ts: DateTime<Utc>,
    pub row_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// `SUFFICIENT`, `GAP_DETECTED` (fail-fast), or `FETCH_FAILED` (only
/// reached when `auto_fetch=true` and a backfill attempt failed).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverageOutcome {
    Sufficient,
    GapDetected { gap: CoverageGap },
    FetchFailed { reason_code: &'static str },
}

impl CoverageOutcome {
    pub fn is_sufficient(&self) -> bool {
        matches!(self, CoverageOutcome::Sufficient)
    }
}

/// Checks whether `meta` covers `[requested_end - lookback_days,
/// requested_end]`. `auto_fetch` only affects whether the caller may
/// attempt a backfill before re-checking; this function never performs
/// I/O itself — `FetchFailed` is constructed by the caller after a
/// failed backfill attempt, not returned here.
pub fn check_coverage(
    meta: &BarsMeta,
    requested_end: DateTime<Utc>,
    lookback_days: i64,
) -> CoverageOutcome {
    let requested_start = requested_end - Duration::days(lookback_days);
    if meta.first_ts <= requested_start && meta.last_ts >= requested_end {
        return CoverageOutcome::Sufficient;
    }
    let gap_start = if meta.last_ts < requested_end {
        meta.last_ts
    } else {
        requested_start
    };
    CoverageOutcome::GapDetected {
        gap: CoverageGap {
            start: gap_start,
            end: requested_end,
        },
    }
}
