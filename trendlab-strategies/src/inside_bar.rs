//! Inside-bar breakout strategy.
//!
//! An "inside bar" is a bar whose range is fully contained within the
//! prior bar's range (`high <= prev.high && low >= prev.low`). The
//! signal fires on the bar immediately after an inside bar, in the
//! direction of the breakout past the inside bar's own range, sized by a
//! trailing ATR. This is the strategy named in spec §8's golden backtest
//! atom scenario (`atr_period=14`, `risk_reward_ratio=2.0`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trendlab_core::domain::ids::OcoGroupIdGen;
use trendlab_core::domain::signal_frame::{ColumnKind, SignalSide};
use trendlab_core::domain::{Bar, ColumnSpec, SemanticDtype, SignalFrameSchema, SignalRow};
use trendlab_core::registry::{RegistryError, StrategyPlugin};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InsideBarParams {
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_rr")]
    pub risk_reward_ratio: f64,
}

fn default_atr_period() -> usize {
    14
}

fn default_rr() -> f64 {
    2.0
}

impl Default for InsideBarParams {
    fn default() -> Self {
        Self {
            atr_period: default_atr_period(),
            risk_reward_ratio: default_rr(),
        }
    }
}

/// Wilder's true range, simple-averaged over `period` bars ending at
/// `i` inclusive (`None` until `i >= period`).
fn atr_at(bars: &[Bar], i: usize, period: usize) -> Option<f64> {
    if i < period {
        return None;
    }
    let mut sum = 0.0;
    for k in (i + 1 - period)..=i {
        let prev_close = bars[k - 1].close;
        let tr = (bars[k].high - bars[k].low)
            .max((bars[k].high - prev_close).abs())
            .max((bars[k].low - prev_close).abs());
        sum += tr;
    }
    Some(sum / period as f64)
}

fn is_inside_bar(bar: &Bar, prev: &Bar) -> bool {
    bar.high <= prev.high && bar.low >= prev.low
}

pub struct InsideBarStrategy;

impl StrategyPlugin for InsideBarStrategy {
    fn get_schema(&self, version: &str) -> Result<SignalFrameSchema, RegistryError> {
        let mut columns = SignalFrameSchema::base_columns();
        columns.extend(SignalFrameSchema::generic_columns());
        columns.push(ColumnSpec::new(
            "atr",
            SemanticDtype::Real,
            true,
            ColumnKind::RequiredStrategy,
        ));
        Ok(SignalFrameSchema {
            strategy_id: "inside_bar".into(),
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
        let params: InsideBarParams = if params.is_null() {
            InsideBarParams::default()
        } else {
            serde_json::from_value(params.clone()).unwrap_or_default()
        };

        let mut oco_gen = OcoGroupIdGen::default();
        let mut rows = Vec::with_capacity(bars.len());

        for i in 0..bars.len() {
            let bar = &bars[i];
            let atr = atr_at(bars, i, params.atr_period);

            let mut row = empty_row(bar, version);
            row.context.insert(
                "dbg_atr".into(),
                atr.map(|v| v.to_string()).unwrap_or_default(),
            );

            if i >= 2 {
                let prior = &bars[i - 1];
                let two_back = &bars[i - 2];
                if is_inside_bar(prior, two_back) {
                    if let Some(atr) = atr {
                        if bar.close > prior.high {
                            fire_signal(&mut row, SignalSide::Long, bar.close, atr, params.risk_reward_ratio, i);
                        } else if bar.close < prior.low {
                            fire_signal(&mut row, SignalSide::Short, bar.close, atr, params.risk_reward_ratio, i);
                        }
                    }
                    row.context.insert("sig_inside_bar_high".into(), prior.high.to_string());
                    row.context.insert("sig_inside_bar_low".into(), prior.low.to_string());
                }
            }

            if row.signal_side.is_some() {
                row.oco_group_id = Some(oco_gen.next_id());
            }
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
        strategy_id: "inside_bar".into(),
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

fn fire_signal(row: &mut SignalRow, side: SignalSide, entry: f64, atr: f64, rr: f64, index: usize) {
    let (stop, take_profit) = match side {
        SignalSide::Long => (entry - atr, entry + atr * rr),
        SignalSide::Short => (entry + atr, entry - atr * rr),
    };
    row.signal_side = Some(side);
    row.signal_reason = Some("inside_bar_breakout".into());
    row.entry_price = Some(entry);
    row.stop_price = Some(stop);
    row.take_profit_price = Some(take_profit);
    row.template_id = Some(format!("inside_bar-{index}"));
}
