//! Run comparison (spec §4.17).
//!
//! Joins two runs' `events_intent` streams on `(symbol, side, signal_ts)`,
//! diffs entry/stop/take-profit prices with a `1e-6` tolerance, and
//! optionally cross-joins fills/trades by `template_id`. Produces a
//! markdown summary plus the CSV of compared rows — a second pair of eyes
//! on two runs that are supposed to be the same strategy replayed twice.

use serde::Serialize;
use std::collections::BTreeMap;
use trendlab_core::domain::{Fill, Intent, TradeRecord};

const PRICE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct JoinKey {
    symbol: String,
    side: String,
    signal_ts: String,
}

fn join_key(intent: &Intent) -> JoinKey {
    JoinKey {
        symbol: intent.symbol.clone(),
        side: intent.side.as_str().to_string(),
        signal_ts: intent.signal_ts.to_rfc3339(),
    }
}

fn approx_eq(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => (x - y).abs() <= PRICE_TOLERANCE,
        _ => false,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntentDiffRow {
    pub symbol: String,
    pub side: String,
    pub signal_ts: String,
    pub template_id_a: String,
    pub template_id_b: String,
    pub entry_matches: bool,
    pub stop_matches: bool,
    pub take_profit_matches: bool,
    pub entry_a: f64,
    pub entry_b: f64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ComparisonSummary {
    pub common_rows: usize,
    pub only_in_a: usize,
    pub only_in_b: usize,
    pub mismatched_entry: usize,
    pub mismatched_stop: usize,
    pub mismatched_take_profit: usize,
}

#[derive(Debug, Clone)]
pub struct RunComparison {
    pub rows: Vec<IntentDiffRow>,
    pub summary: ComparisonSummary,
}

/// Compares two intent streams, each already canonically ordered.
pub fn compare_intents(run_a: &[Intent], run_b: &[Intent]) -> RunComparison {
    let by_key_b: BTreeMap<JoinKey, &Intent> = run_b.iter().map(|i| (join_key(i), i)).collect();
    let mut matched_b: std::collections::HashSet<JoinKey> = std::collections::HashSet::new();

    let mut rows = Vec::new();
    let mut summary = ComparisonSummary::default();

    for a in run_a {
        let key = join_key(a);
        match by_key_b.get(&key) {
            Some(b) => {
                matched_b.insert(key.clone());
                let entry_matches = (a.entry_price - b.entry_price).abs() <= PRICE_TOLERANCE;
                let stop_matches = approx_eq(a.stop_price, b.stop_price);
                let take_profit_matches = approx_eq(a.take_profit_price, b.take_profit_price);

                if !entry_matches {
                    summary.mismatched_entry += 1;
                }
                if !stop_matches {
                    summary.mismatched_stop += 1;
                }
                if !take_profit_matches {
                    summary.mismatched_take_profit += 1;
                }
                summary.common_rows += 1;

                rows.push(IntentDiffRow {
                    symbol: a.symbol.clone(),
                    side: a.side.as_str().to_string(),
                    signal_ts: a.signal_ts.to_rfc3339(),
                    template_id_a: a.template_id.clone(),
                    template_id_b: b.template_id.clone(),
                    entry_matches,
                    stop_matches,
                    take_profit_matches,
                    entry_a: a.entry_price,
                    entry_b: b.entry_price,
                });
            }
            None => summary.only_in_a += 1,
        }
    }
    summary.only_in_b = run_b.iter().filter(|b| !matched_b.contains(&join_key(b))).count();

    RunComparison { rows, summary }
}

/// Cross-joins two fills streams by `template_id`, returning the subset of
/// template ids present in both along with each side's fill price.
pub fn compare_fills(fills_a: &[Fill], fills_b: &[Fill]) -> Vec<(String, f64, f64)> {
    let by_template_b: BTreeMap<&str, &Fill> = fills_b.iter().map(|f| (f.template_id.as_str(), f)).collect();
    fills_a
        .iter()
        .filter_map(|a| {
            by_template_b
                .get(a.template_id.as_str())
                .map(|b| (a.template_id.clone(), a.fill_price, b.fill_price))
        })
        .collect()
}

/// Cross-joins two trade blotters by `(symbol, entry_ts)`, a stand-in for
/// `template_id` once a trade has been matched to an exit leg.
pub fn compare_trades(trades_a: &[TradeRecord], trades_b: &[TradeRecord]) -> Vec<(String, f64, f64)> {
    let by_key_b: BTreeMap<(String, String), &TradeRecord> = trades_b
        .iter()
        .map(|t| ((t.symbol.clone(), t.entry_ts.to_rfc3339()), t))
        .collect();
    trades_a
        .iter()
        .filter_map(|a| {
            by_key_b
                .get(&(a.symbol.clone(), a.entry_ts.to_rfc3339()))
                .map(|b| (a.symbol.clone(), a.pnl, b.pnl))
        })
        .collect()
}

/// Renders a short markdown report summarizing a comparison, suitable for
/// pasting into a PR description or a run's own notes.
pub fn render_markdown(run_a_label: &str, run_b_label: &str, comparison: &RunComparison) -> String {
    let s = &comparison.summary;
    format!(
        "# Run comparison: {run_a_label} vs {run_b_label}\n\n\
         | metric | value |\n|---|---|\n\
         | common intents | {} |\n\
         | only in {run_a_label} | {} |\n\
         | only in {run_b_label} | {} |\n\
         | entry price mismatches | {} |\n\
         | stop price mismatches | {} |\n\
         | take-profit mismatches | {} |\n",
        s.common_rows, s.only_in_a, s.only_in_b, s.mismatched_entry, s.mismatched_stop, s.mismatched_take_profit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeMap as Map;
    use trendlab_core::domain::ids::OcoGroupId;
    use trendlab_core::domain::Side;

    fn ts(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 13, m, 0).unwrap()
    }

    fn intent(entry: f64, signal_ts: DateTime<Utc>) -> Intent {
        Intent {
            template_id: "t0".into(),
            signal_ts,
            symbol: "AAPL".into(),
            side: Side::Buy,
            oco_group_id: OcoGroupId(0),
            entry_price: entry,
            stop_price: Some(entry - 1.0),
            take_profit_price: Some(entry + 2.0),
            exit_ts: None,
            exit_reason: None,
            strategy_id: "inside_bar".into(),
            strategy_version: "1.0.0".into(),
            order_valid_from_ts: None,
            order_valid_to_ts: None,
            context: Map::new(),
        }
    }

    #[test]
    fn identical_runs_produce_no_mismatches() {
        let a = vec![intent(100.0, ts(30))];
        let b = vec![intent(100.0, ts(30))];
        let result = compare_intents(&a, &b);
        assert_eq!(result.summary.common_rows, 1);
        assert_eq!(result.summary.mismatched_entry, 0);
    }

    #[test]
    fn entry_price_drift_beyond_tolerance_is_flagged() {
        let a = vec![intent(100.0, ts(30))];
        let b = vec![intent(100.01, ts(30))];
        let result = compare_intents(&a, &b);
        assert_eq!(result.summary.mismatched_entry, 1);
    }

    #[test]
    fn unmatched_rows_are_counted_on_the_correct_side() {
        let a = vec![intent(100.0, ts(30)), intent(101.0, ts(35))];
        let b = vec![intent(100.0, ts(30))];
        let result = compare_intents(&a, &b);
        assert_eq!(result.summary.only_in_a, 1);
        assert_eq!(result.summary.only_in_b, 0);
    }

    #[test]
    fn markdown_report_includes_both_labels() {
        let result = compare_intents(&[], &[]);
        let report = render_markdown("run-a", "run-b", &result);
        assert!(report.contains("run-a"));
        assert!(report.contains("run-b"));
    }
}
