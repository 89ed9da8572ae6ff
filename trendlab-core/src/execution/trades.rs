//! Trade construction, equity curve, and ledger derivation from fills
//! (spec §4.8).

use super::sizing::{size_position, SizingConfig};
use crate::domain::equity::{ledger_from_equity, EquityPoint, LedgerEntry};
use crate::domain::{Bar, Fill, Intent, Side, TradeRecord};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Left-joins fills with their originating intent on `template_id`, sizes
/// the position, and resolves each trade's exit leg: the intent's
/// `exit_ts` mapped to that bar's close on `exec_bars`, falling back to
/// `(entry_ts, entry_price)` when no exit is recorded.
pub fn build_trades(
    fills: &[Fill],
    intents: &[Intent],
    exec_bars: &[Bar],
    sizing: &SizingConfig,
    initial_cash: f64,
    compound_enabled: bool,
    tick_size: f64,
    min_qty: f64,
) -> Vec<TradeRecord> {
    let intents_by_template: BTreeMap<&str, &Intent> =
        intents.iter().map(|i| (i.template_id.as_str(), i)).collect();
    let bars_by_ts: BTreeMap<DateTime<Utc>, &Bar> =
        exec_bars.iter().map(|b| (b.timestamp, b)).collect();

    let mut trades = Vec::new();
    let mut equity = initial_cash;

    for fill in fills {
        let Some(intent) = intents_by_template.get(fill.template_id.as_str()) else {
            continue;
        };

        let (exit_ts, exit_price) = match intent.exit_ts.and_then(|ts| bars_by_ts.get(&ts)) {
            Some(bar) => (intent.exit_ts.unwrap(), bar.close),
            None => (fill.fill_ts, fill.fill_price),
        };

        let current_equity = if compound_enabled { equity } else { initial_cash };
        let qty = size_position(
            sizing,
            current_equity,
            fill.fill_price,
            intent.stop_price,
            tick_size,
            min_qty,
        );

        let pnl = TradeRecord::compute_pnl(intent.side, qty, fill.fill_price, exit_price);
        equity += pnl;

        trades.push(TradeRecord {
            symbol: fill.symbol.clone(),
            side: intent.side,
            qty,
            entry_ts: fill.fill_ts,
            entry_price: fill.fill_price,
            exit_ts,
            exit_price,
            pnl,
            reason: fill.reason.as_str().to_string(),
        });
    }

    trades
}

/// Builds the equity curve from trades ordered by `exit_ts` (spec §4.8).
/// Seeds with `initial_cash`; prepends a synthetic baseline point one
/// second before the first entry when the first real point would
/// otherwise dip below `initial_cash`.
pub fn equity_curve(trades: &[TradeRecord], initial_cash: f64) -> Vec<EquityPoint> {
    let mut sorted = trades.to_vec();
    sorted.sort_by_key(|t| t.exit_ts);

    let mut points = Vec::with_capacity(sorted.len() + 1);
    let mut cumulative_pnl = 0.0;
    let mut running_peak = initial_cash;

    for (i, trade) in sorted.iter().enumerate() {
        cumulative_pnl += trade.pnl;
        let equity = initial_cash + cumulative_pnl;
        running_peak = running_peak.max(equity);
        let drawdown_pct = if running_peak > 0.0 {
            (running_peak - equity) / running_peak
        } else {
            0.0
        };

        if i == 0 && equity < initial_cash {
            points.push(EquityPoint {
                ts: trade.entry_ts - Duration::seconds(1),
                equity: initial_cash,
                drawdown_pct: 0.0,
            });
        }

        points.push(EquityPoint {
            ts: trade.exit_ts,
            equity,
            drawdown_pct,
        });
    }

    points
}

/// Re-projects the equity curve as `{seq, timestamp, cash}` (spec §4.8).
pub fn portfolio_ledger(equity: &[EquityPoint]) -> Vec<LedgerEntry> {
    ledger_from_equity(equity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fill::FillReason;
    use crate::domain::ids::OcoGroupId;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, 16, 0, 0).unwrap()
    }

    fn fill(template_id: &str, day: u32, price: f64) -> Fill {
        Fill {
            template_id: template_id.into(),
            symbol: "AAPL".into(),
            fill_ts: ts(day),
            fill_price: price,
            reason: FillReason::SignalFill,
        }
    }

    fn intent_with_exit(template_id: &str, day: u32, exit_ts: DateTime<Utc>) -> Intent {
        Intent {
            template_id: template_id.into(),
            signal_ts: ts(day),
            symbol: "AAPL".into(),
            side: Side::Buy,
            oco_group_id: OcoGroupId(0),
            entry_price: 100.0,
            stop_price: Some(95.0),
            take_profit_price: None,
            exit_ts: Some(exit_ts),
            exit_reason: Some("session_end".into()),
            strategy_id: "inside_bar".into(),
            strategy_version: "1.0.0".into(),
            order_valid_from_ts: None,
            order_valid_to_ts: None,
            context: BTreeMap::new(),
        }
    }

    #[test]
    fn day_wise_compounding_example() {
        // Spec §8 scenario 5: day 1 long 100 -> 110 (profit 10), day 2 long
        // 100 -> 120 (profit 20), initial cash 1000.
        let exit_bar_1 = Bar {
            timestamp: ts(2),
            open: 109.0,
            high: 111.0,
            low: 109.0,
            close: 110.0,
            volume: 100,
        };
        let exit_bar_2 = Bar {
            timestamp: ts(4),
            open: 119.0,
            high: 121.0,
            low: 119.0,
            close: 120.0,
            volume: 100,
        };
        let fills = vec![fill("t1", 1, 100.0), fill("t2", 3, 100.0)];
        let intents = vec![
            intent_with_exit("t1", 1, ts(2)),
            intent_with_exit("t2", 3, ts(4)),
        ];
        let trades = build_trades(
            &fills,
            &intents,
            &[exit_bar_1, exit_bar_2],
            &SizingConfig::Fixed { fixed_qty: 1.0 },
            1000.0,
            true,
            1.0,
            0.0,
        );
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].pnl, 10.0);
        assert_eq!(trades[1].pnl, 20.0);

        let equity = equity_curve(&trades, 1000.0);
        assert_eq!(equity.last().unwrap().equity, 1030.0);
    }

    #[test]
    fn missing_exit_falls_back_to_entry() {
        let fills = vec![fill("t1", 1, 100.0)];
        let mut intent = intent_with_exit("t1", 1, ts(2));
        intent.exit_ts = None;
        let trades = build_trades(
            &fills,
            &[intent],
            &[],
            &SizingConfig::Fixed { fixed_qty: 1.0 },
            1000.0,
            false,
            1.0,
            0.0,
        );
        assert_eq!(trades[0].exit_ts, trades[0].entry_ts);
        assert_eq!(trades[0].exit_price, trades[0].entry_price);
        assert_eq!(trades[0].pnl, 0.0);
    }

    #[test]
    fn equity_is_monotonic_in_cumulative_pnl() {
        let trades = vec![
            TradeRecord {
                symbol: "AAPL".into(),
                side: Side::Buy,
                qty: 1.0,
                entry_ts: ts(1),
                entry_price: 100.0,
                exit_ts: ts(2),
                exit_price: 110.0,
                pnl: 10.0,
                reason: "signal_fill".into(),
            },
            TradeRecord {
                symbol: "AAPL".into(),
                side: Side::Buy,
                qty: 1.0,
                entry_ts: ts(3),
                entry_price: 100.0,
                exit_ts: ts(4),
                exit_price: 95.0,
                pnl: -5.0,
                reason: "signal_fill".into(),
            },
        ];
        let equity = equity_curve(&trades, 1000.0);
        assert_eq!(equity[0].equity, 1010.0);
        assert_eq!(equity[1].equity, 1005.0);
        assert!(equity[1].drawdown_pct > 0.0);
    }

    #[test]
    fn ledger_mirrors_equity_as_cash_checkpoints() {
        let trades = vec![TradeRecord {
            symbol: "AAPL".into(),
            side: Side::Buy,
            qty: 1.0,
            entry_ts: ts(1),
            entry_price: 100.0,
            exit_ts: ts(2),
            exit_price: 110.0,
            pnl: 10.0,
            reason: "signal_fill".into(),
        }];
        let equity = equity_curve(&trades, 1000.0);
        let ledger = portfolio_ledger(&equity);
        assert_eq!(ledger[0].cash, 1010.0);
    }
}
