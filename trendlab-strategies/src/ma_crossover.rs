//! Moving-average crossover strategy.
//!
//! A simple, complementary example plugin: a long signal fires when a
//! short-window simple moving average crosses above a long-window one, a
//! short signal on the reverse crossover. Exists mainly to prove the
//! registry supports more than one strategy without either one touching
//! framework code.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trendlab_core::domain::ids::OcoGroupIdGen;
use trendlab_core::domain::signal_frame::{ColumnKind, SignalSide};
use trendlab_core::domain::{Bar, ColumnSpec, SemanticDtype, SignalFrameSchema, SignalRow};
use trendlab_core::registry::{RegistryError, StrategyPlugin};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MaCrossoverParams {
    #[serde(default = "default_short_window")]
    pub short_window: usize,
    #[serde(default = "default_long_window")]
    pub long_window: usize,
    #[serde(default = "default_stop_pct")]
    pub stop_pct: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
}

fn default_short_window() -> usize {
    10
}

fn default_long_window() -> usize {
    30
}

fn default_stop_pct() -> f64 {
    0.02
}

fn default_take_profit_pct() -> f64 {
    0.04
}

impl Default for MaCrossoverParams {
    fn default() -> Self {
        Self {
            short_window: default_short_window(),
            long_window: default_long_window(),
            stop_pct: default_stop_pct(),
            take_profit_pct: default_take_profit_pct(),
        }
    }
}

fn sma_at(bars: &[Bar], i: usize, window: usize) -> Option<f64> {
    if i + 1 < window {
        return None;
    }
    let sum: f64 = bars[(i + 1 - window)..=i].iter().map(|b| b.close).sum();
    Some(sum / window as f64)
}

pub struct MaCrossoverStrategy;

impl StrategyPlugin for MaCrossoverStrategy {
    fn get_schema(&self, version: &str) -> Result<SignalFrameSchema, RegistryError> {
        let mut columns = SignalFrameSchema::base_columns();
        columns.extend(SignalFrameSchema::generic_columns());
        columns.push(ColumnSpec::new(
            "short_ma",
            SemanticDtype::Real,
            true,
            ColumnKind::RequiredStrategy,
        ));
        columns.push(ColumnSpec::new(
            "long_ma",
            SemanticDtype::Real,
            true,
            ColumnKind::RequiredStrategy,
        ));
        Ok(SignalFrameSchema {
            strategy_id: "ma_crossover".into(),
            strategy_tag: "default".into(),
            version: version.into(),
            columns,
        })
    }

    fn extend_signal_frame(
        &self,
        bars: &[Bar],
        version: &str,
        params: &serde_json::Value,
    ) -> Result<Vec<SignalRow>, RegistryError> {
        let params: MaCrossoverParams = if params.is_null() {
            MaCrossoverParams::default()
        } else {
            serde_json::from_value(params.clone()).unwrap_or_default()
        };

        if params.short_window == 0 || params.long_window == 0 {
            return Err(RegistryError::InvalidParams(
                "short_window and long_window must be positive".into(),
            ));
        }

        let mut oco_gen = OcoGroupIdGen::default();
        let mut rows = Vec::with_capacity(bars.len());
        let mut prev_short: Option<f64> = None;
        let mut prev_long: Option<f64> = None;

        for i in 0..bars.len() {
            let bar = &bars[i];
            let short = sma_at(bars, i, params.short_window);
            let long = sma_at(bars, i, params.long_window);

            let mut row = empty_row(bar, version);
            row.context
                .insert("dbg_short_ma".into(), short.map(|v| v.to_string()).unwrap_or_default());
            row.context
                .insert("dbg_long_ma".into(), long.map(|v| v.to_string()).unwrap_or_default());

            if let (Some(s), Some(l), Some(ps), Some(pl)) = (short, long, prev_short, prev_long) {
                let entry = bar.close;
                if ps <= pl && s > l {
                    fire_signal(&mut row, SignalSide::Long, entry, params.stop_pct, params.take_profit_pct, i);
                } else if ps >= pl && s < l {
                    fire_signal(&mut row, SignalSide::Short, entry, params.stop_pct, params.take_profit_pct, i);
                }
            }

            if row.signal_side.is_some() {
                row.oco_group_id = Some(oco_gen.next_id());
            }

            prev_short = short;
            prev_long = long;
            rows.push(row);
        }

        Ok(rows)
    }
}

fn empty_row(bar: &Bar, version: &str) -> SignalRow {
    SignalRow {
        timestamp: bar.timestamp,
        open: bar.open,
        high: bar.high,
        low: bar.low,
        close: bar.close,
        volume: bar.volume,
        symbol: String::new(),
        timeframe: String::new(),
        strategy_id: "ma_crossover".into(),
        strategy_version: version.into(),
        signal_side: None,
        oco_group_id: None,
        signal_reason: None,
        entry_price: None,
        stop_price: None,
        take_profit_price: None,
        template_id: None,
        exit_ts: None,
        exit_reason: None,
        context: BTreeMap::new(),
    }
}

fn fire_signal(
    row: &mut SignalRow,
    side: SignalSide,
    entry: f64,
    stop_pct: f64,
    take_profit_pct: f64,
    index: usize,
) {
    let (stop, take_profit) = match side {
        SignalSide::Long => (entry * (1.0 - stop_pct), entry * (1.0 + take_profit_pct)),
        SignalSide::Short => (entry * (1.0 + stop_pct), entry * (1.0 - take_profit_pct)),
    };
    row.signal_side = Some(side);
    row.signal_reason = Some("ma_crossover".into());
    row.entry_price = Some(entry);
    row.stop_price = Some(stop);
    row.take_profit_price = Some(take_profit);
    row.template_id = Some(format!("ma_crossover-{index}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, 16, 0, 0).unwrap()
    }

    fn bar(d: u32, close: f64) -> Bar {
        Bar {
            timestamp: ts(d),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
        }
    }

    fn rising_then_falling_series() -> Vec<Bar> {
        let mut closes = Vec::new();
        for i in 0..10 {
            closes.push(100.0 + i as f64);
        }
        for i in 0..10 {
            closes.push(109.0 - i as f64);
        }
        closes
            .into_iter()
            .enumerate()
            .map(|(i, c)| bar(i as u32 + 1, c))
            .collect()
    }

    #[test]
    fn fires_long_then_short_across_a_crossover_cycle() {
        let bars = rising_then_falling_series();
        let strategy = MaCrossoverStrategy;
        let params = serde_json::to_value(MaCrossoverParams {
            short_window: 2,
            long_window: 4,
            ..Default::default()
        })
        .unwrap();
        let rows = strategy.extend_signal_frame(&bars, "1.0.0", &params).unwrap();
        assert!(rows.iter().any(|r| r.signal_side == Some(SignalSide::Long)));
        assert!(rows.iter().any(|r| r.signal_side == Some(SignalSide::Short)));
    }

    #[test]
    fn rejects_zero_window_params() {
        let strategy = MaCrossoverStrategy;
        let bars = rising_then_falling_series();
        let params = serde_json::to_value(MaCrossoverParams {
            short_window: 0,
            ..Default::default()
        })
        .unwrap();
        assert!(strategy.extend_signal_frame(&bars, "1.0.0", &params).is_err());
    }

    #[test]
    fn flat_series_produces_no_signals() {
        let bars: Vec<Bar> = (1..=20).map(|d| bar(d, 100.0)).collect();
        let strategy = MaCrossoverStrategy;
        let rows = strategy
            .extend_signal_frame(&bars, "1.0.0", &serde_json::Value::Null)
            .unwrap();
        assert!(rows.iter().all(|r| r.signal_side.is_none()));
    }
}
