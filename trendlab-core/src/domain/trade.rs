//! TradeRecord — a matched entry/exit pair derived from fills and the
//! originating intent.

use super::side::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A completed round-trip trade. Field order matches spec §3's mandated
/// "fixed snake_case order" for the `trades.csv` artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub entry_ts: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_ts: DateTime<Utc>,
    pub exit_price: f64,
    pub pnl: f64,
    pub reason: String,
}

impl TradeRecord {
    /// `pnl` per spec §4.8: `SELL` legs flip the sign so a falling price
    /// between entry and exit is a profit.
    pub fn compute_pnl(side: Side, qty: f64, entry_price: f64, exit_price: f64) -> f64 {
        match side {
            Side::Sell => (entry_price - exit_price) * qty,
            Side::Buy => (exit_price - entry_price) * qty,
        }
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}
