//! RunContext and RunResult — the run's identity and terminal outcome.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RunContextError {
    #[error("run_dir must be an absolute path, got {0}")]
    NotAbsolute(String),
}

/// Immutable `(run_id, run_name, run_dir)`, the single source of truth for
/// all filesystem I/O within a run. After construction, no code may
/// reconstruct paths from `run_id` alone (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    run_id: String,
    run_name: String,
    run_dir: PathBuf,
}

impl RunContext {
    /// `run_dir` must be absolute; existence is checked by the caller at
    /// creation time (§4.10 invariant 1: the directory must not pre-exist
    /// when the run starts, which this constructor does not itself
    /// enforce — that is `trendlab-runner`'s job at the point of
    /// `fs::create_dir`).
    pub fn new(run_id: impl Into<String>, run_name: impl Into<String>, run_dir: PathBuf) -> Result<Self, RunContextError> {
        if !run_dir.is_absolute() {
            return Err(RunContextError::NotAbsolute(run_dir.display().to_string()));
        }
        Ok(Self {
            run_id: run_id.into(),
            run_name: run_name.into(),
            run_dir,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn run_dir(&self) -> &std::path::Path {
        &self.run_dir
    }
}

/// Reasons a run can fail a precondition gate, distinct from an
/// unexpected `ERROR` (spec §3, §7: "not errors in the exception sense —
/// first-class run outcomes").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailedPreconditionReason {
    DataCoverageGap,
    DataSlaFailed,
    HistoryDegraded,
}

/// Pipeline status sum type (spec §9 redesign flag): never a raw
/// exception, always one of these three terminal outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    FailedPrecondition { reason: FailedPreconditionReason },
    Error { error_id: String },
}

/// `(run_id, status, reason?, error_id?, details)` — always written to
/// `run_result.json` regardless of outcome (spec §4.10 invariant 3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    #[serde(flatten)]
    pub status: RunStatus,
    pub details: serde_json::Value,
}

impl RunResult {
    pub fn success(run_id: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Success,
            details,
        }
    }

    pub fn failed_precondition(
        run_id: impl Into<String>,
        reason: FailedPreconditionReason,
        details: serde_json::Value,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::FailedPrecondition { reason },
            details,
        }
    }

    pub fn error(run_id: impl Into<String>, error_id: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Error { error_id: error_id.into() },
            details,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn run_context_rejects_relative_dir() {
        let err = RunContext::new("r1", "inside_bar", PathBuf::from("relative/path"));
        assert_eq!(
            err,
            Err(RunContextError::NotAbsolute("relative/path".into()))
        );
    }

    #[test]
    fn run_context_accepts_absolute_dir() {
        let ctx = RunContext::new("r1", "inside_bar", PathBuf::from("/tmp/backtests/r1")).unwrap();
        assert_eq!(ctx.run_id(), "r1");
    }

    #[test]
    fn run_result_success_serializes_status_tag() {
        let result = RunResult::success("r1", serde_json::json!({"num_trades": 3}));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "SUCCESS");
    }

    #[test]
    fn run_result_failed_precondition_serializes_reason() {
        let result = RunResult::failed_precondition(
            "r1",
            FailedPreconditionReason::DataCoverageGap,
            serde_json::json!({}),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "FAILED_PRECONDITION");
        assert_eq!(json["reason"], "DATA_COVERAGE_GAP");
    }
}
