//! Fill model — the single source of truth for fill timestamp, price, and
//! reason (spec §4.7).
//!
//! Baseline matching rule: for each intent, locate the bar whose timestamp
//! equals `signal_ts`; if present, emit a `signal_fill` at that bar's
//! close. If the signal isn't on the bar grid, the intent is silently
//! rejected. Richer policies (stop/take-profit/session-end) extend the
//! same matching loop and must preserve the invariant that every emitted
//! fill's price lies in the matched bar's `[low, high]`.

use crate::domain::fill::{Fill, FillReason};
use crate::domain::{Bar, Intent, Side};
use crate::hashing::{empty_stream_hash, sha256_hex};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FillModelError {
    #[error("cannot generate fills against an empty bars snapshot")]
    EmptyBars,
}

/// Canonical CSV serialization of a fills stream, mirroring
/// `domain::intent::canonical_csv`'s contract: fixed column order,
/// ISO-8601 UTC timestamps. Public so the artifact writer can emit
/// `fills.csv` using the same serialization the hash is computed over.
pub fn canonical_csv(fills: &[Fill]) -> String {
    let mut out = String::from("template_id,symbol,fill_ts,fill_price,reason\n");
    for fill in fills {
        out.push_str(&fill.template_id);
        out.push(',');
        out.push_str(&fill.symbol);
        out.push(',');
        out.push_str(&fill.fill_ts.to_rfc3339());
        out.push(',');
        out.push_str(&fill.fill_price.to_string());
        out.push(',');
        out.push_str(fill.reason.as_str());
        out.push('\n');
    }
    out
}

/// SHA-256 of the canonical fills serialization (spec §3, §4.7).
pub fn fills_hash(fills: &[Fill]) -> String {
    if fills.is_empty() {
        return empty_stream_hash();
    }
    sha256_hex(canonical_csv(fills).as_bytes())
}

/// Generates fills for `intents` against `bars` using the baseline
/// matching rule. `intents` is assumed already canonically ordered;
/// fills preserve that order (spec §5 ordering guarantee (b)).
///
/// Empty `bars` is a hard error (there is nothing to match against);
/// empty `intents` yields an empty, well-defined-hash fills stream with no
/// error — the caller is expected to log a warning at that point (spec
/// §4.7).
pub fn generate_fills(intents: &[Intent], bars: &[Bar]) -> Result<(Vec<Fill>, String), FillModelError> {
    if bars.is_empty() {
        return Err(FillModelError::EmptyBars);
    }
    if intents.is_empty() {
        return Ok((Vec::new(), empty_stream_hash()));
    }

    let by_ts: BTreeMap<DateTime<Utc>, &Bar> = bars.iter().map(|b| (b.timestamp, b)).collect();

    let mut fills = Vec::new();
    for intent in intents {
        if let Some(bar) = by_ts.get(&intent.signal_ts) {
            fills.push(Fill {
                template_id: intent.template_id.clone(),
                symbol: intent.symbol.clone(),
                fill_ts: intent.signal_ts,
                fill_price: bar.close,
                reason: FillReason::SignalFill,
            });
        }
        // Signal not on the bar grid: silently rejected per spec §4.7.
    }

    let hash = fills_hash(&fills);
    Ok((fills, hash))
}

/// Verifies the fill-price-in-bar-range invariant spec §8 property 3
/// requires. Returns the offending fill, if any.
pub fn find_out_of_range_fill<'a>(fills: &'a [Fill], bars: &[Bar]) -> Option<&'a Fill> {
    let by_ts: BTreeMap<DateTime<Utc>, &Bar> = bars.iter().map(|b| (b.timestamp, b)).collect();
    fills.iter().find(|fill| {
        by_ts
            .get(&fill.fill_ts)
            .map(|bar| !bar.contains_price(fill.fill_price))
            .unwrap_or(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::OcoGroupId;
    use chrono::TimeZone;
    use std::collections::BTreeMap as Map;

    fn ts(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 9, m, 0).unwrap()
    }

    fn bar(m: u32, close: f64) -> Bar {
        Bar {
            timestamp: ts(m),
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 1000,
        }
    }

    fn intent(template_id: &str, signal_ts: DateTime<Utc>) -> Intent {
        Intent {
            template_id: template_id.into(),
            signal_ts,
            symbol: "AAPL".into(),
            side: Side::Buy,
            oco_group_id: OcoGroupId(0),
            entry_price: 100.0,
            stop_price: None,
            take_profit_price: None,
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
    fn empty_bars_is_an_error() {
        let intents = vec![intent("t0", ts(30))];
        assert_eq!(generate_fills(&intents, &[]), Err(FillModelError::EmptyBars));
    }

    #[test]
    fn empty_intents_yields_well_defined_hash() {
        let bars = vec![bar(30, 101.0)];
        let (fills, hash) = generate_fills(&[], &bars).unwrap();
        assert!(fills.is_empty());
        assert_eq!(hash, empty_stream_hash());
    }

    #[test]
    fn matches_intent_at_bar_close() {
        let bars = vec![bar(30, 101.0)];
        let intents = vec![intent("t0", ts(30))];
        let (fills, _) = generate_fills(&intents, &bars).unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].fill_price, 101.0);
        assert_eq!(fills[0].reason, FillReason::SignalFill);
    }

    #[test]
    fn intent_off_bar_grid_is_silently_rejected() {
        let bars = vec![bar(30, 101.0)];
        let intents = vec![intent("t0", ts(31))];
        let (fills, _) = generate_fills(&intents, &bars).unwrap();
        assert!(fills.is_empty());
    }

    #[test]
    fn fills_always_land_within_bar_range() {
        let bars = vec![bar(30, 101.0), bar(35, 95.0)];
        let intents = vec![intent("t0", ts(30)), intent("t1", ts(35))];
        let (fills, _) = generate_fills(&intents, &bars).unwrap();
        assert!(find_out_of_range_fill(&fills, &bars).is_none());
    }

    #[test]
    fn identical_inputs_yield_identical_hash() {
        let bars = vec![bar(30, 101.0)];
        let intents = vec![intent("t0", ts(30))];
        let (_, hash_a) = generate_fills(&intents, &bars).unwrap();
        let (_, hash_b) = generate_fills(&intents, &bars).unwrap();
        assert_eq!(hash_a, hash_b);
    }
}
