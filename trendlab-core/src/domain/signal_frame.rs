//! SignalFrame — a versioned, strategy-owned projection of bars.
//!
//! The frame itself is produced at runtime by a strategy plugin (see
//! `crate::registry`) and is deliberately *not* persisted (spec §9, open
//! question: the intent stream is the persisted proof). What lives here is
//! the typed schema contract every such frame must satisfy, and the row
//! shape used to validate one in memory.

use crate::hashing::sha256_hex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// The semantic type of a signal-frame column. Distinct from any physical
/// storage dtype — this is what validation and dtype coercion reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticDtype {
    UtcInstant,
    Real,
    Integer,
    Bool,
    String,
}

/// Which of the three ordered column groups a column belongs to (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    RequiredBase,
    RequiredGeneric,
    RequiredStrategy,
}

/// One column's contract: name, semantic dtype, nullability, and kind tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: SemanticDtype,
    pub nullable: bool,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(name: &str, dtype: SemanticDtype, nullable: bool, kind: ColumnKind) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            nullable,
            kind,
        }
    }
}

/// `LONG`/`SHORT`/absent, carried on the `signal_side` column. Distinct
/// from [`crate::domain::side::Side`] (`BUY`/`SELL`), which an intent row
/// carries once a signal has been turned into an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalSide {
    Long,
    Short,
}

/// A strategy's versioned contract: `(strategy_id, strategy_tag, version)`
/// plus its three ordered column-spec groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalFrameSchema {
    pub strategy_id: String,
    pub strategy_tag: String,
    pub version: String,
    pub columns: Vec<ColumnSpec>,
}

impl SignalFrameSchema {
    /// Always-present base columns every schema must declare on top of its
    /// own `required_base` additions (spec §3: "timestamp, ohlcv, symbol,
    /// timeframe, strategy identifiers").
    pub fn base_columns() -> Vec<ColumnSpec> {
        use ColumnKind::RequiredBase;
        use SemanticDtype::*;
        vec![
            ColumnSpec::new("timestamp", UtcInstant, false, RequiredBase),
            ColumnSpec::new("open", Real, false, RequiredBase),
            ColumnSpec::new("high", Real, false, RequiredBase),
            ColumnSpec::new("low", Real, false, RequiredBase),
            ColumnSpec::new("close", Real, false, RequiredBase),
            ColumnSpec::new("volume", Integer, false, RequiredBase),
            ColumnSpec::new("symbol", String, false, RequiredBase),
            ColumnSpec::new("timeframe", String, false, RequiredBase),
            ColumnSpec::new("strategy_id", String, false, RequiredBase),
            ColumnSpec::new("strategy_version", String, false, RequiredBase),
        ]
    }

    /// The generic signal columns spec §3 mandates at minimum.
    pub fn generic_columns() -> Vec<ColumnSpec> {
        use ColumnKind::RequiredGeneric;
        use SemanticDtype::*;
        vec![
            ColumnSpec::new("signal_side", String, true, RequiredGeneric),
            ColumnSpec::new("signal_reason", String, true, RequiredGeneric),
            ColumnSpec::new("entry_price", Real, true, RequiredGeneric),
            ColumnSpec::new("stop_price", Real, true, RequiredGeneric),
            ColumnSpec::new("take_profit_price", Real, true, RequiredGeneric),
            ColumnSpec::new("template_id", String, true, RequiredGeneric),
            ColumnSpec::new("exit_ts", UtcInstant, true, RequiredGeneric),
            ColumnSpec::new("exit_reason", String, true, RequiredGeneric),
        ]
    }

    /// The schema fingerprint: SHA-256 of the column specs sorted by name
    /// plus the identity triple (spec §3). Written into the run manifest.
    pub fn fingerprint(&self) -> String {
        let mut sorted = self.columns.clone();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        let canonical = serde_json::json!({
            "strategy_id": self.strategy_id,
            "strategy_tag": self.strategy_tag,
            "version": self.version,
            "columns": sorted,
        });
        sha256_hex(canonical.to_string().as_bytes())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SignalFrameContractError {
    #[error("missing required column: {0}")]
    MissingColumn(String),
    #[error("non-nullable column {0} contains a missing value at row {1}")]
    UnexpectedNull(String, usize),
    #[error("row {0}: sig_long and sig_short are both true")]
    MutuallyExclusiveSignalViolation(usize),
    #[error("row {0}: signal_side is {1:?} but boolean signal columns disagree")]
    SignalSideInconsistent(usize, Option<SignalSide>),
}

/// One validated row of a strategy's `SignalFrame`: the base + generic
/// columns spec §3 mandates, typed rather than accessed dynamically (spec
/// §9 redesign flag). Strategy-specific `required_strategy` columns and
/// `sig_`/`dbg_` context columns are carried in `context`, since their
/// shape varies per strategy and is not framework-owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRow {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub symbol: String,
    pub timeframe: String,
    pub strategy_id: String,
    pub strategy_version: String,
    pub signal_side: Option<SignalSide>,
    /// Mandatory when `signal_side` is set (spec §4.6: "missing
    /// `oco_group_id` when a side is set is a fatal error"). Strategy-
    /// assigned, since it groups sibling legs the strategy itself emits.
    pub oco_group_id: Option<super::ids::OcoGroupId>,
    pub signal_reason: Option<String>,
    pub entry_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub template_id: Option<String>,
    pub exit_ts: Option<DateTime<Utc>>,
    pub exit_reason: Option<String>,
    pub context: BTreeMap<String, String>,
}

/// Reads a `sig_`-prefixed boolean context column. Absent or unparseable
/// values are treated as `false`, since these columns are optional.
fn context_bool(row: &SignalRow, key: &str) -> bool {
    row.context
        .get(key)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Validates the generic-column invariants spec §3 mandates:
/// - a row with `signal_side` set must carry a non-empty `template_id`
///   (the intent generator's §4.6 fatal-error precondition lives one
///   layer up, on `oco_group_id`; this only validates what the frame
///   itself owns);
/// - `sig_long` and `sig_short`, when present, are never both `true`;
/// - a `true` boolean signal column agrees with `signal_side`.
pub fn validate_rows(rows: &[SignalRow]) -> Result<(), SignalFrameContractError> {
    for (i, row) in rows.iter().enumerate() {
        if row.signal_side.is_some() && row.template_id.is_none() {
            return Err(SignalFrameContractError::UnexpectedNull(
                "template_id".into(),
                i,
            ));
        }

        let sig_long = context_bool(row, "sig_long");
        let sig_short = context_bool(row, "sig_short");

        if sig_long && sig_short {
            return Err(SignalFrameContractError::MutuallyExclusiveSignalViolation(i));
        }
        if sig_long && row.signal_side != Some(SignalSide::Long) {
            return Err(SignalFrameContractError::SignalSideInconsistent(i, row.signal_side));
        }
        if sig_short && row.signal_side != Some(SignalSide::Short) {
            return Err(SignalFrameContractError::SignalSideInconsistent(i, row.signal_side));
        }
    }
    Ok(())
}
