//! Intent — a canonical, deterministic description of a pending order.
//!
//! The pipeline's first content-addressed artifact (spec §3, glossary). An
//! intent stream is canonicalized (sorted, serialized deterministically,
//! SHA-256 hashed) so byte-identical inputs always produce an identical
//! `intent_hash` — the core's first reproducibility guarantee.

use super::ids::OcoGroupId;
use super::side::Side;
use crate::hashing::{empty_stream_hash, sha256_hex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single pending-order description derived from one active signal row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub template_id: String,
    pub signal_ts: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub oco_group_id: OcoGroupId,
    pub entry_price: f64,
    pub stop_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub exit_ts: Option<DateTime<Utc>>,
    pub exit_reason: Option<String>,
    pub strategy_id: String,
    pub strategy_version: String,
    pub order_valid_from_ts: Option<DateTime<Utc>>,
    pub order_valid_to_ts: Option<DateTime<Utc>>,
    /// Context columns carried through from the signal frame, prefixed
    /// `sig_` or `dbg_` at the call site. Kept as a sorted map so
    /// serialization order is stable without re-sorting at hash time.
    pub context: BTreeMap<String, String>,
}

/// Sorts intents by `(signal_ts, template_id, side)` — the stable sort
/// spec §3/§4.6 require before hashing.
pub fn canonical_order(intents: &mut [Intent]) {
    intents.sort_by(|a, b| {
        a.signal_ts
            .cmp(&b.signal_ts)
            .then_with(|| a.template_id.cmp(&b.template_id))
            .then_with(|| a.side.as_str().cmp(b.side.as_str()))
    });
}

/// Canonical UTF-8 CSV serialization: fixed column order, ISO-8601 UTC
/// timestamps, snake_case names (spec §9, "per-stage hashing"). Context
/// columns are appended sorted by key so two frames with the same context
/// keys always serialize byte-identically.
pub fn canonical_csv(intents: &[Intent]) -> String {
    let mut context_keys: Vec<&str> = Vec::new();
    for intent in intents {
        for key in intent.context.keys() {
            if !context_keys.contains(&key.as_str()) {
                context_keys.push(key.as_str());
            }
        }
    }
    context_keys.sort();

    let mut out = String::from(
        "template_id,signal_ts,symbol,side,oco_group_id,entry_price,stop_price,\
         take_profit_price,exit_ts,exit_reason,strategy_id,strategy_version,\
         order_valid_from_ts,order_valid_to_ts",
    );
    for key in &context_keys {
        out.push(',');
        out.push_str(key);
    }
    out.push('\n');

    for intent in intents {
        out.push_str(&intent.template_id);
        out.push(',');
        out.push_str(&intent.signal_ts.to_rfc3339());
        out.push(',');
        out.push_str(&intent.symbol);
        out.push(',');
        out.push_str(intent.side.as_str());
        out.push(',');
        out.push_str(&intent.oco_group_id.to_string());
        out.push(',');
        out.push_str(&intent.entry_price.to_string());
        out.push(',');
        push_opt_f64(&mut out, intent.stop_price);
        out.push(',');
        push_opt_f64(&mut out, intent.take_profit_price);
        out.push(',');
        push_opt_ts(&mut out, intent.exit_ts);
        out.push(',');
        push_opt_str(&mut out, intent.exit_reason.as_deref());
        out.push(',');
        out.push_str(&intent.strategy_id);
        out.push(',');
        out.push_str(&intent.strategy_version);
        out.push(',');
        push_opt_ts(&mut out, intent.order_valid_from_ts);
        out.push(',');
        push_opt_ts(&mut out, intent.order_valid_to_ts);
        for key in &context_keys {
            out.push(',');
            if let Some(value) = intent.context.get(*key) {
                out.push_str(value);
            }
        }
        out.push('\n');
    }
    out
}

fn push_opt_f64(out: &mut String, value: Option<f64>) {
    if let Some(v) = value {
        out.push_str(&v.to_string());
    }
}

fn push_opt_ts(out: &mut String, value: Option<DateTime<Utc>>) {
    if let Some(v) = value {
        out.push_str(&v.to_rfc3339());
    }
}

fn push_opt_str(out: &mut String, value: Option<&str>) {
    if let Some(v) = value {
        out.push_str(v);
    }
}

/// The run's intent fingerprint: SHA-256 of the canonical CSV. An empty
/// intent stream still hashes deterministically (spec §4.7, §8 boundary
/// behaviors) — this is `empty_stream_hash()` only when `intents` is
/// empty, since the header row alone would otherwise hash differently per
/// caller.
pub fn intent_hash(intents: &[Intent]) -> String {
    if intents.is_empty() {
        return empty_stream_hash();
    }
    sha256_hex(canonical_csv(intents).as_bytes())
}
