//! Order side, shared by intents, orders, trades and fills.

use serde::{Deserialize, Serialize};

/// `BUY` or `SELL`, per spec §3's `Intent`/`Order`/`Trade` contracts.
///
/// Distinct from [`crate::domain::signal_frame::SignalSide`] (`LONG`/
/// `SHORT`), which lives on the signal frame before an intent has been
/// generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
