//! Domain types for the backtesting pipeline.

pub mod bar;
pub mod equity;
pub mod fill;
pub mod ids;
pub mod intent;
pub mod order;
pub mod run;
pub mod side;
pub mod signal_frame;
pub mod trade;

pub use bar::{Bar, BarError};
pub use equity::{EquityPoint, LedgerEntry};
pub use fill::{Fill, FillReason};
pub use ids::{OcoGroupId, OcoGroupIdGen, RunId};
pub use intent::Intent;
pub use order::{Order, OrderIdentity, OrderType};
pub use run::{FailedPreconditionReason, RunContext, RunContextError, RunResult, RunStatus};
pub use side::Side;
pub use signal_frame::{
    validate_rows, ColumnKind, ColumnSpec, SemanticDtype, SignalFrameContractError,
    SignalFrameSchema, SignalRow, SignalSide,
};
pub use trade::TradeRecord;

/// Symbol type alias.
pub type Symbol = String;
