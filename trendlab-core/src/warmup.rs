//! Warmup calculator — converts an indicator's warmup in bars to warmup
//! in calendar days, session-aware (spec §4.2).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `rth` (390 minutes/day) or `raw` (1440 minutes/day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Rth,
    Raw,
}

impl SessionMode {
    fn minutes_per_session(self) -> u32 {
        match self {
            SessionMode::Rth => 390,
            SessionMode::Raw => 1440,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum WarmupError {
    #[error("timeframe_minutes must be > 0, got {0}")]
    NonPositiveTimeframe(u32),
}

/// `bars_per_day = max(1, floor(minutes_per_session / timeframe_minutes))`.
pub fn bars_per_day(timeframe_minutes: u32, session_mode: SessionMode) -> Result<u32, WarmupError> {
    if timeframe_minutes == 0 {
        return Err(WarmupError::NonPositiveTimeframe(timeframe_minutes));
    }
    Ok((session_mode.minutes_per_session() / timeframe_minutes).max(1))
}

/// `ceil(required_warmup_bars / bars_per_day)`.
pub fn warmup_days_from_bars(
    required_warmup_bars: u32,
    timeframe_minutes: u32,
    session_mode: SessionMode,
) -> Result<u32, WarmupError> {
    let per_day = bars_per_day(timeframe_minutes, session_mode)?;
    Ok((required_warmup_bars + per_day - 1) / per_day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bars_per_day_rth_m5() {
        assert_eq!(bars_per_day(5, SessionMode::Rth).unwrap(), 78);
    }

    #[test]
    fn bars_per_day_raw_m1() {
        assert_eq!(bars_per_day(1, SessionMode::Raw).unwrap(), 1440);
    }

    #[test]
    fn bars_per_day_floors_to_at_least_one() {
        assert_eq!(bars_per_day(1000, SessionMode::Rth).unwrap(), 1);
    }

    #[test]
    fn warmup_days_rounds_up() {
        // 14 bars at M5/RTH: 78 bars/day -> ceil(14/78) = 1
        assert_eq!(warmup_days_from_bars(14, 5, SessionMode::Rth).unwrap(), 1);
        // 200 bars at M5/RTH: ceil(200/78) = 3
        assert_eq!(warmup_days_from_bars(200, 5, SessionMode::Rth).unwrap(), 3);
    }

    #[test]
    fn warmup_days_zero_bars_is_zero_days() {
        assert_eq!(warmup_days_from_bars(0, 5, SessionMode::Rth).unwrap(), 0);
    }

    #[test]
    fn rejects_zero_timeframe() {
        assert_eq!(
            bars_per_day(0, SessionMode::Rth),
            Err(WarmupError::NonPositiveTimeframe(0))
        );
    }
}
