//! Paper-trading adapter (spec §4.15).
//!
//! Sends an `Order` to the external order-intent service, deriving a
//! deterministic `Idempotency-Key` from `OrderIdentity` so a retried call
//! (same run, same leg) lands on the same key rather than duplicating an
//! order. No retries here: a transport failure is surfaced as `Error` and
//! left to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trendlab_core::domain::order::{Order, OrderIdentity};
use uuid::Uuid;

/// Fixed namespace for the UUIDv5 idempotency key, so the same
/// `OrderIdentity` always derives the same key across processes.
const IDEMPOTENCY_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x69, 0x5f, 0x69, 0x64, 0x65, 0x6d, 0x70, 0x6f, 0x74, 0x65, 0x6e, 0x63, 0x79, 0x00, 0x00,
]);

#[derive(Debug, Error)]
pub enum PaperTradingError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Created,
    Duplicate,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub idempotency_key: String,
    pub outcome: SubmissionOutcome,
    pub detail: Option<String>,
}

/// Derives the deterministic idempotency key for one order leg:
/// UUIDv5 over `(symbol, side, timestamp, source, order_type)` (spec
/// §4.15, §8 property 8).
pub fn idempotency_key(identity: &OrderIdentity) -> String {
    let name = format!(
        "{}|{:?}|{}|{}|{:?}",
        identity.symbol,
        identity.side,
        identity.timestamp.to_rfc3339(),
        identity.source,
        identity.order_type,
    );
    Uuid::new_v5(&IDEMPOTENCY_NAMESPACE, name.as_bytes()).to_string()
}

#[derive(Debug, Deserialize)]
struct OrderIntentResponse {
    #[serde(default)]
    duplicate: bool,
}

/// Submits one order leg. Classifies the outcome without retrying:
/// - `Skipped`: `order.is_sendable()` is false (LMT with no price).
/// - `Duplicate`: HTTP 409, or a 2xx body reporting this idempotency key
///   was already seen.
/// - `Created`: accepted as a new order.
/// - `Error`: any other non-2xx status; surfaced, not retried.
pub fn submit_order(
    endpoint: &str,
    order: &Order,
    identity: &OrderIdentity,
    timeout_secs: u64,
) -> Result<SubmissionResult, PaperTradingError> {
    let key = idempotency_key(identity);

    if !order.is_sendable() {
        return Ok(SubmissionResult {
            idempotency_key: key,
            outcome: SubmissionOutcome::Skipped,
            detail: Some("LMT order submitted without a price".to_string()),
        });
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?;

    let response = client
        .post(endpoint)
        .header("Idempotency-Key", key.clone())
        .json(order)
        .send()?;

    let status = response.status();
    let is_duplicate_status = status.as_u16() == 409;
    let status_is_success = status.is_success();
    let parsed: OrderIntentResponse = response.json().unwrap_or(OrderIntentResponse { duplicate: false });

    let outcome = if is_duplicate_status {
        SubmissionOutcome::Duplicate
    } else if !status_is_success {
        SubmissionOutcome::Error
    } else if parsed.duplicate {
        SubmissionOutcome::Duplicate
    } else {
        SubmissionOutcome::Created
    };

    Ok(SubmissionResult {
        idempotency_key: key,
        outcome,
        detail: None,
    })
}

/// A record of one submission attempt, written to the run's paper-trading
/// log alongside the order it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperTradingLogEntry {
    pub submitted_at: DateTime<Utc>,
    pub order: Order,
    pub result: SubmissionResult,
}
