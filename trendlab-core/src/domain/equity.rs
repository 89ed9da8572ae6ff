//! Equity curve and portfolio ledger — derived from trades (spec §3, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point on the equity curve: `(ts, equity, drawdown_pct)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts: DateTime<Utc>,
    pub equity: f64,
    pub drawdown_pct: f64,
}

/// A monotonic checkpoint of cash at each trade exit: `(seq, timestamp,
/// cash)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub cash: f64,
}

/// Re-projects an equity curve into ledger entries (spec §4.8: "Ledger:
/// the equity curve re-projected as `{seq, timestamp, cash}`").
pub fn ledger_from_equity(equity: &[EquityPoint]) -> Vec<LedgerEntry> {
    equity
        .iter()
        .enumerate()
        .map(|(i, point)| LedgerEntry {
            seq: i as u64,
            timestamp: point.ts,
            cash: point.equity,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, 0, 0).unwrap()
    }

    #[test]
    fn ledger_assigns_sequential_seq() {
        let equity = vec![
            EquityPoint { ts: ts(9), equity: 1000.0, drawdown_pct: 0.0 },
            EquityPoint { ts: ts(10), equity: 1010.0, drawdown_pct: 0.0 },
        ];
        let ledger = ledger_from_equity(&equity);
        assert_eq!(ledger[0].seq, 0);
        assert_eq!(ledger[1].seq, 1);
        assert_eq!(ledger[1].cash, 1010.0);
    }
}
