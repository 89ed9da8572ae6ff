//! Execution & sizing (spec §4.8): position sizing, trade construction,
//! equity curve and ledger derivation from fills.

pub mod sizing;
pub mod trades;

pub use sizing::{size_position, SizingConfig};
pub use trades::{build_trades, equity_curve, portfolio_ledger};
