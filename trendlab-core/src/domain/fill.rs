//! Fill — the outcome of matching one intent against bars.
//!
//! The fill model (`crate::fill_model`) is the single source of truth for
//! fill timestamp, price, and reason; this module only defines the record
//! shape and the invariant every fill must satisfy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a fill was generated. `SignalFill` is the baseline matching rule
/// (spec §4.7); the others come from the richer stop/take-profit/session
/// policies layered on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillReason {
    SignalFill,
    StopHit,
    TakeProfitHit,
    SessionEnd,
}

impl FillReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillReason::SignalFill => "signal_fill",
            FillReason::StopHit => "stop_hit",
            FillReason::TakeProfitHit => "take_profit_hit",
            FillReason::SessionEnd => "session_end",
        }
    }
}

/// A single matched fill: one intent's `template_id` resolved against a
/// bar in the run's snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub template_id: String,
    pub symbol: String,
    pub fill_ts: DateTime<Utc>,
    pub fill_price: f64,
    pub reason: FillReason,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fill_reason_serializes_snake_case() {
        let fill = Fill {
            template_id: "t-1".into(),
            symbol: "AAPL".into(),
            fill_ts: Utc.with_ymd_and_hms(2025, 6, 2, 9, 30, 0).unwrap(),
            fill_price: 100.0,
            reason: FillReason::StopHit,
        };
        let json = serde_json::to_string(&fill).unwrap();
        assert!(json.contains("\"stop_hit\""));
    }

    #[test]
    fn fill_reason_as_str_matches_serde_tag() {
        for reason in [
            FillReason::SignalFill,
            FillReason::StopHit,
            FillReason::TakeProfitHit,
            FillReason::SessionEnd,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
        }
    }
}
