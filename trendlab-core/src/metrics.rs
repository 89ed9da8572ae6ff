//! Metrics — PnL, drawdown, Sharpe, exposure, turnover from trades and
//! equity (spec §4.9). Serialized as a single JSON object (`metrics.json`).

use crate::domain::{EquityPoint, TradeRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub num_trades: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub exposure: f64,
    pub turnover: f64,
}

/// `max(peak - trough)` over the equity curve, plus the same figure as a
/// fraction of the running peak at the point of maximum drawdown.
fn max_drawdown(equity: &[EquityPoint]) -> (f64, f64) {
    let mut peak = equity.first().map(|p| p.equity).unwrap_or(0.0);
    let mut worst_abs = 0.0_f64;
    let mut worst_pct = 0.0_f64;
    for point in equity {
        peak = peak.max(point.equity);
        let dd_abs = peak - point.equity;
        let dd_pct = if peak > 0.0 { dd_abs / peak } else { 0.0 };
        if dd_abs > worst_abs {
            worst_abs = dd_abs;
        }
        if dd_pct > worst_pct {
            worst_pct = dd_pct;
        }
    }
    (worst_abs, worst_pct)
}

/// Daily returns from the equity curve, bucketed by UTC calendar day.
/// `sharpe_ratio` is annualized by `sqrt(252)` over these daily returns;
/// zero when there are fewer than two daily observations or the sample
/// standard deviation is zero or non-finite (spec §4.9).
fn daily_returns(equity: &[EquityPoint]) -> Vec<f64> {
    use std::collections::BTreeMap;
    let mut by_day: BTreeMap<chrono::NaiveDate, f64> = BTreeMap::new();
    for point in equity {
        by_day.insert(point.ts.date_naive(), point.equity);
    }
    let values: Vec<f64> = by_day.into_values().collect();
    values
        .windows(2)
        .map(|w| if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn sharpe_ratio(equity: &[EquityPoint]) -> f64 {
    let returns = daily_returns(equity);
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let std_dev = variance.sqrt();
    if !std_dev.is_finite() || std_dev == 0.0 {
        return 0.0;
    }
    mean / std_dev * (252.0_f64).sqrt()
}

/// Sum of trade holding durations divided by the total span from the
/// first entry to the last exit; zero when the span is zero.
fn exposure(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let span_start = trades.iter().map(|t| t.entry_ts).min().unwrap();
    let span_end = trades.iter().map(|t| t.exit_ts).max().unwrap();
    let span_seconds = (span_end - span_start).num_seconds() as f64;
    if span_seconds <= 0.0 {
        return 0.0;
    }
    let held: f64 = trades
        .iter()
        .map(|t| (t.exit_ts - t.entry_ts).num_seconds().max(0) as f64)
        .sum();
    (held / span_seconds).clamp(0.0, 1.0)
}

/// `Σ|qty|·(|entry| + |exit|) ÷ initial cash`.
fn turnover(trades: &[TradeRecord], initial_cash: f64) -> f64 {
    if initial_cash <= 0.0 {
        return 0.0;
    }
    let total: f64 = trades
        .iter()
        .map(|t| t.qty.abs() * (t.entry_price.abs() + t.exit_price.abs()))
        .sum();
    total / initial_cash
}

/// Computes every metric spec §4.9 names from a run's trades and equity
/// curve. `initial_cash` is needed for turnover; `net_pnl` doubles as
/// `gross_pnl` per spec (the core does not model fees/slippage as a
/// separate deduction from PnL at this layer).
pub fn compute_metrics(
    trades: &[TradeRecord],
    equity: &[EquityPoint],
    initial_cash: f64,
) -> RunMetrics {
    let num_trades = trades.len();
    let wins: Vec<&TradeRecord> = trades.iter().filter(|t| t.pnl > 0.0).collect();
    let losses: Vec<&TradeRecord> = trades.iter().filter(|t| t.pnl < 0.0).collect();

    let win_rate = if num_trades > 0 {
        wins.len() as f64 / num_trades as f64
    } else {
        0.0
    };
    let avg_win = if !wins.is_empty() {
        wins.iter().map(|t| t.pnl).sum::<f64>() / wins.len() as f64
    } else {
        0.0
    };
    let avg_loss = if !losses.is_empty() {
        losses.iter().map(|t| t.pnl).sum::<f64>() / losses.len() as f64
    } else {
        0.0
    };
    let net_pnl: f64 = trades.iter().map(|t| t.pnl).sum();

    let gross_win: f64 = wins.iter().map(|t| t.pnl).sum();
    let gross_loss: f64 = losses.iter().map(|t| t.pnl.abs()).sum();
    let profit_factor = if gross_loss > 0.0 {
        gross_win / gross_loss
    } else if !wins.is_empty() {
        f64::INFINITY
    } else {
        0.0
    };

    let (max_drawdown_abs, max_drawdown_pct) = max_drawdown(equity);

    RunMetrics {
        num_trades,
        win_rate,
        avg_win,
        avg_loss,
        gross_pnl: net_pnl,
        net_pnl,
        profit_factor,
        max_drawdown: max_drawdown_abs,
        max_drawdown_pct,
        sharpe_ratio: sharpe_ratio(equity),
        exposure: exposure(trades),
        turnover: turnover(trades, initial_cash),
    }
}

/// Last timestamp present in the equity curve, or `None` if empty. Used
/// by the manifest to stamp "as-of" metrics context.
pub fn last_equity_ts(equity: &[EquityPoint]) -> Option<DateTime<Utc>> {
    equity.last().map(|p| p.ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use chrono::TimeZone;

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap()
    }

    fn trade(day_entry: u32, day_exit: u32, entry: f64, exit: f64, pnl: f64) -> TradeRecord {
        TradeRecord {
            symbol: "AAPL".into(),
            side: Side::Buy,
            qty: 10.0,
            entry_ts: ts(day_entry, 9),
            entry_price: entry,
            exit_ts: ts(day_exit, 16),
            exit_price: exit,
            pnl,
            reason: "signal_fill".into(),
        }
    }

    #[test]
    fn exposure_is_bounded_zero_one() {
        let trades = vec![trade(1, 2, 100.0, 105.0, 50.0), trade(2, 3, 100.0, 95.0, -50.0)];
        let metrics = compute_metrics(
            &trades,
            &[
                EquityPoint { ts: ts(2, 16), equity: 1050.0, drawdown_pct: 0.0 },
                EquityPoint { ts: ts(3, 16), equity: 1000.0, drawdown_pct: 0.0476 },
            ],
            1000.0,
        );
        assert!((0.0..=1.0).contains(&metrics.exposure));
    }

    #[test]
    fn profit_factor_is_infinite_with_no_losses() {
        let trades = vec![trade(1, 2, 100.0, 110.0, 100.0)];
        let equity = vec![EquityPoint { ts: ts(2, 16), equity: 1100.0, drawdown_pct: 0.0 }];
        let metrics = compute_metrics(&trades, &equity, 1000.0);
        assert_eq!(metrics.profit_factor, f64::INFINITY);
    }

    #[test]
    fn profit_factor_is_zero_with_no_wins() {
        let trades = vec![trade(1, 2, 100.0, 90.0, -100.0)];
        let equity = vec![EquityPoint { ts: ts(2, 16), equity: 900.0, drawdown_pct: 0.1 }];
        let metrics = compute_metrics(&trades, &equity, 1000.0);
        assert_eq!(metrics.profit_factor, 0.0);
    }

    #[test]
    fn max_drawdown_pct_is_bounded() {
        let equity = vec![
            EquityPoint { ts: ts(1, 16), equity: 1000.0, drawdown_pct: 0.0 },
            EquityPoint { ts: ts(2, 16), equity: 1200.0, drawdown_pct: 0.0 },
            EquityPoint { ts: ts(3, 16), equity: 600.0, drawdown_pct: 0.5 },
        ];
        let metrics = compute_metrics(&[], &equity, 1000.0);
        assert!((0.0..=1.0).contains(&metrics.max_drawdown_pct));
        assert!((metrics.max_drawdown_pct - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sharpe_is_zero_with_fewer_than_two_daily_observations() {
        let equity = vec![EquityPoint { ts: ts(1, 16), equity: 1000.0, drawdown_pct: 0.0 }];
        let metrics = compute_metrics(&[], &equity, 1000.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn empty_trades_yields_zeroed_metrics() {
        let metrics = compute_metrics(&[], &[], 1000.0);
        assert_eq!(metrics.num_trades, 0);
        assert_eq!(metrics.win_rate, 0.0);
        assert_eq!(metrics.profit_factor, 0.0);
    }

    #[test]
    fn turnover_scales_with_initial_cash() {
        let trades = vec![trade(1, 2, 100.0, 110.0, 100.0)];
        let metrics = compute_metrics(&trades, &[], 1000.0);
        // qty 10 * (100 + 110) = 2100; / 1000 = 2.1
        assert!((metrics.turnover - 2.1).abs() < 1e-9);
    }
}
