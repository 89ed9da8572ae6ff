//! SLA gate (spec §4.13) — data-quality checks applied after the bars
//! snapshot is loaded: missing OHLC, duplicate timestamps, gap-based
//! completeness (FATAL for strategies needing consecutive bars) and
//! ratio-based completeness (WARNING only).

use crate::domain::Bar;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaSeverity {
    Fatal,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaViolation {
    pub check: String,
    pub severity: SlaSeverity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaReport {
    pub violations: Vec<SlaViolation>,
}

impl SlaReport {
    pub fn has_fatal(&self) -> bool {
        self.violations.iter().any(|v| v.severity == SlaSeverity::Fatal)
    }

    pub fn fatal(&self) -> Vec<&SlaViolation> {
        self.violations.iter().filter(|v| v.severity == SlaSeverity::Fatal).collect()
    }
}

fn no_nan_ohlc(bars: &[Bar]) -> Option<SlaViolation> {
    let has_non_finite = bars
        .iter()
        .any(|b| ![b.open, b.high, b.low, b.close].iter().all(|v| v.is_finite()));
    if bars.is_empty() || has_non_finite {
        Some(SlaViolation {
            check: "no_nan_ohlc".into(),
            severity: SlaSeverity::Fatal,
            message: "one or more OHLC values are missing or non-finite".into(),
        })
    } else {
        None
    }
}

fn no_dupe_index(bars: &[Bar]) -> Option<SlaViolation> {
    for w in bars.windows(2) {
        if w[0].timestamp >= w[1].timestamp {
            return Some(SlaViolation {
                check: "no_dupe_index".into(),
                severity: SlaSeverity::Fatal,
                message: format!("duplicate or out-of-order timestamp at {}", w[1].timestamp),
            });
        }
    }
    None
}

/// Expected RTH timestamps (09:30-16:00 in `market_tz`, inclusive of the
/// open, exclusive of the bar after close) at `timeframe_minutes`
/// granularity, for the session day containing `day_start` (a UTC instant
/// already truncated to that trading day in the market timezone).
fn expected_session_grid(day_local_date: chrono::NaiveDate, market_tz: Tz, timeframe_minutes: i64) -> Vec<DateTime<Utc>> {
    let open_local = market_tz
        .with_ymd_and_hms(day_local_date.year(), day_local_date.month(), day_local_date.day(), 9, 30, 0)
        .single();
    let close_local = market_tz
        .with_ymd_and_hms(day_local_date.year(), day_local_date.month(), day_local_date.day(), 16, 0, 0)
        .single();
    let (Some(open_local), Some(close_local)) = (open_local, close_local) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut cur = open_local.with_timezone(&Utc);
    let end = close_local.with_timezone(&Utc);
    let step = Duration::minutes(timeframe_minutes);
    while cur < end {
        out.push(cur);
        cur += step;
    }
    out
}

/// Gap-based completeness: within the last `lookback_bars` bars, the
/// expected RTH grid must have zero missing timestamps. Requires
/// strategies that need consecutive bars (e.g. inside-bar); FATAL.
fn gap_based_completeness(
    bars: &[Bar],
    market_tz: Tz,
    timeframe_minutes: i64,
    lookback_bars: usize,
) -> Option<SlaViolation> {
    if bars.len() < lookback_bars {
        return Some(SlaViolation {
            check: "gap_based_completeness".into(),
            severity: SlaSeverity::Fatal,
            message: format!(
                "insufficient bars: have {}, need lookback_bars={}",
                bars.len(),
                lookback_bars
            ),
        });
    }
    let tail = &bars[bars.len() - lookback_bars..];
    let present: std::collections::BTreeSet<DateTime<Utc>> = tail.iter().map(|b| b.timestamp).collect();

    let mut days: std::collections::BTreeSet<chrono::NaiveDate> = std::collections::BTreeSet::new();
    for bar in tail {
        days.insert(bar.timestamp.with_timezone(&market_tz).date_naive());
    }

    let mut missing = 0u64;
    for day in days {
        for expected_ts in expected_session_grid(day, market_tz, timeframe_minutes) {
            if expected_ts >= tail[0].timestamp && expected_ts <= tail[tail.len() - 1].timestamp && !present.contains(&expected_ts) {
                missing += 1;
            }
        }
    }

    if missing > 0 {
        Some(SlaViolation {
            check: "gap_based_completeness".into(),
            severity: SlaSeverity::Fatal,
            message: format!("{missing} expected RTH timestamp(s) missing from the last {lookback_bars} bars"),
        })
    } else {
        None
    }
}

/// Ratio-based completeness: `actual/expected >= 0.99` across the visible
/// span, approximated with the `~70%` business-day-of-calendar-days
/// heuristic (spec §9 open question — do not tighten without a
/// source-of-truth trading calendar). WARNING only, never fatal alone.
fn ratio_based_completeness(bars: &[Bar], timeframe_minutes: i64) -> Option<SlaViolation> {
    if bars.len() < 2 {
        return None;
    }
    let span_days = (bars.last().unwrap().timestamp - bars.first().unwrap().timestamp).num_days().max(1) as f64;
    let business_days = span_days * 0.70;
    let expected = (business_days * 390.0 / timeframe_minutes as f64).max(1.0);
    let actual = bars.len() as f64;
    let ratio = actual / expected;
    if ratio < 0.99 {
        Some(SlaViolation {
            check: "ratio_based_completeness".into(),
            severity: SlaSeverity::Warning,
            message: format!("completeness ratio {ratio:.4} below 0.99 threshold (actual={actual}, expected~={expected:.1})"),
        })
    } else {
        None
    }
}

/// Whether the caller strategy requires consecutive bars, making
/// gap-based completeness applicable. Passed explicitly rather than
/// inferred — only the strategy registry knows this (spec §4.13).
pub fn check_sla(
    bars: &[Bar],
    market_tz: Tz,
    timeframe_minutes: i64,
    lookback_bars: usize,
    requires_consecutive_bars: bool,
) -> SlaReport {
    let mut violations = Vec::new();
    violations.extend(no_nan_ohlc(bars));
    violations.extend(no_dupe_index(bars));
    if requires_consecutive_bars {
        violations.extend(gap_based_completeness(bars, market_tz, timeframe_minutes, lookback_bars));
    }
    violations.extend(ratio_based_completeness(bars, timeframe_minutes));
    SlaReport { violations }
}
