//! Intent generator — projects a validated signal frame into a
//! canonicalized, content-hashed stream of order intents (spec §4.6).

use crate::domain::intent::{canonical_order, intent_hash, Intent};
use crate::domain::signal_frame::SignalSide;
use crate::domain::{Side, SignalRow};
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// When `order_valid_to_ts` is computed, per spec §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderValidityPolicy {
    SessionEnd,
    FixedMinutes,
    OneBar,
}

/// Whether an intent becomes valid on the signal bar itself or the next
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidFromPolicy {
    SignalTs,
    NextBar,
}

#[derive(Debug, Clone)]
pub struct IntentGenParams {
    pub order_validity_policy: OrderValidityPolicy,
    pub valid_from_policy: ValidFromPolicy,
    pub session_timezone: Tz,
    pub timeframe_minutes: u32,
    /// Only consulted when `order_validity_policy == FixedMinutes`.
    pub fixed_minutes: Option<u32>,
}

#[derive(Debug, Error, PartialEq)]
pub enum IntentGenError {
    #[error("row {0}: signal_side is set but oco_group_id is missing")]
    MissingOcoGroupId(usize),
    #[error("row {0}: signal_side is set but entry_price is missing")]
    MissingEntryPrice(usize),
}

/// Computes the end of the RTH session (16:00 in `session_timezone`) on
/// the local calendar day of `signal_ts`, converted back to UTC. This is
/// "the first session filter window whose end-of-day ... is >= signal_ts"
/// specialized to a single daily RTH window — richer multi-window session
/// filters are a strategy-config concern layered on top.
fn session_end_utc(signal_ts: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = signal_ts.with_timezone(&tz);
    let session_end_local = tz
        .with_ymd_and_hms(
            local.date_naive().year(),
            local.date_naive().month(),
            local.date_naive().day(),
            16,
            0,
            0,
        )
        .single()
        .expect("16:00 is never ambiguous/non-existent for US market days");
    session_end_local.with_timezone(&Utc)
}

/// Generates the intent stream for every row whose `signal_side` is set,
/// then canonicalizes it (sort + hash) per spec §4.6.
pub fn generate_intents(
    rows: &[SignalRow],
    strategy_id: &str,
    strategy_version: &str,
    params: &IntentGenParams,
) -> Result<(Vec<Intent>, String), IntentGenError> {
    let mut intents = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        let Some(signal_side) = row.signal_side else {
            continue;
        };
        let entry_price = row
            .entry_price
            .ok_or(IntentGenError::MissingEntryPrice(i))?;
        let oco_group_id = row
            .oco_group_id
            .ok_or(IntentGenError::MissingOcoGroupId(i))?;

        let side = match signal_side {
            SignalSide::Long => Side::Buy,
            SignalSide::Short => Side::Sell,
        };

        let order_valid_from_ts = match params.valid_from_policy {
            ValidFromPolicy::SignalTs => Some(row.timestamp),
            ValidFromPolicy::NextBar => {
                Some(row.timestamp + Duration::minutes(params.timeframe_minutes as i64))
            }
        };

        let order_valid_to_ts = match params.order_validity_policy {
            OrderValidityPolicy::SessionEnd => {
                Some(session_end_utc(row.timestamp, params.session_timezone))
            }
            OrderValidityPolicy::FixedMinutes => params
                .fixed_minutes
                .map(|m| row.timestamp + Duration::minutes(m as i64)),
            OrderValidityPolicy::OneBar => {
                Some(row.timestamp + Duration::minutes(params.timeframe_minutes as i64))
            }
        };

        intents.push(Intent {
            template_id: row
                .template_id
                .clone()
                .unwrap_or_else(|| format!("{strategy_id}-{i}")),
            signal_ts: row.timestamp,
            symbol: row.symbol.clone(),
            side,
            oco_group_id,
            entry_price,
            stop_price: row.stop_price,
            take_profit_price: row.take_profit_price,
            exit_ts: row.exit_ts,
            exit_reason: row.exit_reason.clone(),
            strategy_id: strategy_id.to_string(),
            strategy_version: strategy_version.to_string(),
            order_valid_from_ts,
            order_valid_to_ts,
            context: row.context.clone(),
        });
    }

    canonical_order(&mut intents);
    let hash = intent_hash(&intents);
    Ok((intents, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::OcoGroupId;
    use std::collections::BTreeMap;

    fn row(ts: DateTime<Utc>, signal_side: Option<SignalSide>, template_id: &str) -> SignalRow {
        SignalRow {
            timestamp: ts,
            open: 100.0,
            high: 102.0,
            low: 99.0,
            close: 101.0,
            volume: 1000,
            symbol: "AAPL".into(),
            timeframe: "M5".into(),
            strategy_id: "inside_bar".into(),
            strategy_version: "1.0.0".into(),
            signal_side,
            oco_group_id: signal_side.map(|_| OcoGroupId(0)),
            signal_reason: Some("inside_bar_breakout".into()),
            entry_price: Some(101.0),
            stop_price: Some(99.0),
            take_profit_price: Some(105.0),
            template_id: Some(template_id.into()),
            exit_ts: None,
            exit_reason: None,
            context: BTreeMap::new(),
        }
    }

    fn params() -> IntentGenParams {
        IntentGenParams {
            order_validity_policy: OrderValidityPolicy::SessionEnd,
            valid_from_policy: ValidFromPolicy::SignalTs,
            session_timezone: chrono_tz::America::New_York,
            timeframe_minutes: 5,
            fixed_minutes: None,
        }
    }

    #[test]
    fn skips_rows_without_signal_side() {
        let rows = vec![row(
            Utc.with_ymd_and_hms(2025, 6, 2, 13, 30, 0).unwrap(),
            None,
            "t0",
        )];
        let (intents, _) = generate_intents(&rows, "inside_bar", "1.0.0", &params()).unwrap();
        assert!(intents.is_empty());
    }

    #[test]
    fn active_row_becomes_an_intent() {
        let rows = vec![row(
            Utc.with_ymd_and_hms(2025, 6, 2, 13, 30, 0).unwrap(),
            Some(SignalSide::Long),
            "t0",
        )];
        let (intents, hash) = generate_intents(&rows, "inside_bar", "1.0.0", &params()).unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].side, Side::Buy);
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn missing_oco_group_id_is_fatal() {
        let mut r = row(
            Utc.with_ymd_and_hms(2025, 6, 2, 13, 30, 0).unwrap(),
            Some(SignalSide::Long),
            "t0",
        );
        r.oco_group_id = None;
        let rows = vec![r];
        assert_eq!(
            generate_intents(&rows, "inside_bar", "1.0.0", &params()),
            Err(IntentGenError::MissingOcoGroupId(0))
        );
    }

    #[test]
    fn session_end_validity_is_1600_market_tz() {
        let rows = vec![row(
            Utc.with_ymd_and_hms(2025, 6, 2, 13, 30, 0).unwrap(),
            Some(SignalSide::Long),
            "t0",
        )];
        let (intents, _) = generate_intents(&rows, "inside_bar", "1.0.0", &params()).unwrap();
        let valid_to = intents[0].order_valid_to_ts.unwrap();
        let local = valid_to.with_timezone(&chrono_tz::America::New_York);
        assert_eq!(local.time().format("%H:%M").to_string(), "16:00");
    }

    #[test]
    fn identical_input_yields_identical_hash() {
        let rows = vec![row(
            Utc.with_ymd_and_hms(2025, 6, 2, 13, 30, 0).unwrap(),
            Some(SignalSide::Long),
            "t0",
        )];
        let (_, hash_a) = generate_intents(&rows, "inside_bar", "1.0.0", &params()).unwrap();
        let (_, hash_b) = generate_intents(&rows, "inside_bar", "1.0.0", &params()).unwrap();
        assert_eq!(hash_a, hash_b);
    }
}
