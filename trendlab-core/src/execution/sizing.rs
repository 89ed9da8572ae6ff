//! Position sizing modes (spec §4.8). All deterministic, tick-rounded,
//! and enforce `qty >= min_qty` with a default tick size of 1.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizingConfig {
    Fixed {
        fixed_qty: f64,
    },
    PctEquity {
        pos_pct: f64,
    },
    RiskBased {
        risk_pct: f64,
        max_pos_pct: f64,
    },
}

fn round_to_tick(qty: f64, tick_size: f64) -> f64 {
    (qty / tick_size).floor() * tick_size
}

/// Applies `config` to compute a fill's quantity, given current `equity`,
/// `entry_price`, and (for `RiskBased`) `stop_price`. The result is
/// floored to `tick_size` and never produced below `min_qty`.
pub fn size_position(
    config: &SizingConfig,
    equity: f64,
    entry_price: f64,
    stop_price: Option<f64>,
    tick_size: f64,
    min_qty: f64,
) -> f64 {
    let raw = match config {
        SizingConfig::Fixed { fixed_qty } => *fixed_qty,
        SizingConfig::PctEquity { pos_pct } => {
            let notional = equity * pos_pct / 100.0;
            (notional / entry_price).floor()
        }
        SizingConfig::RiskBased {
            risk_pct,
            max_pos_pct,
        } => {
            let risk_amount = equity * risk_pct / 100.0;
            let stop_distance = stop_price.map(|s| (entry_price - s).abs()).unwrap_or(0.0);
            let qty = if stop_distance > 0.0 {
                (risk_amount / stop_distance).floor()
            } else {
                0.0
            };
            let max_notional = equity * max_pos_pct / 100.0;
            let max_qty = (max_notional / entry_price).floor();
            qty.min(max_qty)
        }
    };
    round_to_tick(raw, tick_size).max(min_qty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_sizing_ignores_equity() {
        let qty = size_position(&SizingConfig::Fixed { fixed_qty: 10.0 }, 50_000.0, 100.0, None, 1.0, 0.0);
        assert_eq!(qty, 10.0);
    }

    #[test]
    fn pct_equity_sizing_floors_to_whole_shares() {
        let qty = size_position(
            &SizingConfig::PctEquity { pos_pct: 10.0 },
            10_000.0,
            333.0,
            None,
            1.0,
            0.0,
        );
        // notional = 1000; 1000/333 = 3.003 -> floor 3
        assert_eq!(qty, 3.0);
    }

    #[test]
    fn risk_based_sizing_uses_stop_distance() {
        let qty = size_position(
            &SizingConfig::RiskBased {
                risk_pct: 1.0,
                max_pos_pct: 100.0,
            },
            100_000.0,
            100.0,
            Some(98.0),
            1.0,
            0.0,
        );
        // risk_amount = 1000; stop_distance = 2; qty = 500
        assert_eq!(qty, 500.0);
    }

    #[test]
    fn risk_based_sizing_caps_by_max_pos_pct() {
        let qty = size_position(
            &SizingConfig::RiskBased {
                risk_pct: 50.0,
                max_pos_pct: 10.0,
            },
            100_000.0,
            100.0,
            Some(99.0),
            1.0,
            0.0,
        );
        // uncapped qty would be huge; max_notional = 10_000 -> max_qty = 100
        assert_eq!(qty, 100.0);
    }

    #[test]
    fn sizing_never_produces_below_min_qty() {
        let qty = size_position(&SizingConfig::Fixed { fixed_qty: 0.0 }, 1000.0, 100.0, None, 1.0, 1.0);
        assert_eq!(qty, 1.0);
    }
}
