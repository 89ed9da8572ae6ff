//! Artifact writer and run lifecycle (spec §4.10).
//!
//! Fail-safe invariants this module exists to uphold:
//! 1. The run directory is created before any other work, and must not
//!    pre-exist.
//! 2. `run_meta.json` is written before strategy execution begins.
//! 3. `run_result.json` is written at termination on every path.
//! 4. `run_manifest.json` is written after meta and finalized at
//!    termination; a manifest-writing failure must never crash the
//!    writing of `run_result.json`.
//! 5. `error_stacktrace.txt` is written only on `ERROR`, carrying the
//!    same `error_id` as `run_result.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use trendlab_core::domain::{EquityPoint, Fill, Intent, LedgerEntry, RunResult, TradeRecord};
use trendlab_core::gates::{CoverageOutcome, SlaReport};
use trendlab_core::metrics::RunMetrics;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("run directory {0} already exists")]
    RunDirAlreadyExists(PathBuf),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, String),
}

/// Creates `run_dir`, failing if it already exists (spec §4.10 invariant
/// 1, §8 property 1).
pub fn create_run_dir(run_dir: &Path) -> Result<(), ArtifactError> {
    if run_dir.exists() {
        return Err(ArtifactError::RunDirAlreadyExists(run_dir.to_path_buf()));
    }
    std::fs::create_dir_all(run_dir)
        .map_err(|e| ArtifactError::WriteFailed(run_dir.to_path_buf(), e.to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub run_name: String,
    pub strategy_id: String,
    pub strategy_version: String,
    pub symbol: String,
    pub timeframe: String,
    pub started_at: DateTime<Utc>,
}

pub fn write_run_meta(run_dir: &Path, meta: &RunMeta) -> Result<(), ArtifactError> {
    write_json(&run_dir.join("run_meta.json"), meta)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyIdentity {
    pub key: String,
    pub impl_version: String,
    pub profile_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSpec {
    pub symbol: String,
    pub timeframe: String,
    pub base_tf_used: String,
    pub requested_end: DateTime<Utc>,
    pub lookback_days: i64,
    pub warmup_days: i64,
    pub bars_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GateResults {
    pub coverage: Option<CoverageOutcome>,
    pub sla: Option<SlaReport>,
}

/// Full reproducibility context (spec §4.10): identity, strategy
/// `(key, impl_version, profile_version)`, parameters, data spec
/// including `base_tf_used`, gate results, the final result, and the
/// artifact index. Written once after `run_meta`, then finalized at
/// termination — a failure finalizing this file must never prevent
/// `run_result.json` from being written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub commit_hash: Option<String>,
    pub strategy: StrategyIdentity,
    pub parameters: serde_json::Value,
    pub data: DataSpec,
    pub gates: GateResults,
    pub schema_fingerprint: String,
    pub intent_hash: String,
    pub fills_hash: String,
    pub final_result: Option<RunResult>,
    pub artifact_index: Vec<String>,
}

pub fn write_manifest(run_dir: &Path, manifest: &RunManifest) -> Result<(), ArtifactError> {
    write_json(&run_dir.join("run_manifest.json"), manifest)
}

pub fn write_result(run_dir: &Path, result: &RunResult) -> Result<(), ArtifactError> {
    write_json(&run_dir.join("run_result.json"), result)
}

/// Written only when `result.status` is `ERROR`; `error_id` must match
/// the one embedded in `run_result.json`.
pub fn write_error_stacktrace(run_dir: &Path, error_id: &str, trace: &str) -> Result<(), ArtifactError> {
    let path = run_dir.join("error_stacktrace.txt");
    let body = format!("error_id: {error_id}\n\n{trace}\n");
    std::fs::write(&path, body).map_err(|e| ArtifactError::WriteFailed(path, e.to_string()))
}

pub fn write_intents(run_dir: &Path, intents: &[Intent]) -> Result<(), ArtifactError> {
    let path = run_dir.join("events_intent.csv");
    let csv = trendlab_core::domain::intent::canonical_csv(intents);
    std::fs::write(&path, csv).map_err(|e| ArtifactError::WriteFailed(path, e.to_string()))
}

pub fn write_fills(run_dir: &Path, fills: &[Fill]) -> Result<(), ArtifactError> {
    let path = run_dir.join("fills.csv");
    let csv = trendlab_core::fill_model::canonical_csv(fills);
    std::fs::write(&path, csv).map_err(|e| ArtifactError::WriteFailed(path, e.to_string()))
}

pub fn write_trades(run_dir: &Path, trades: &[TradeRecord]) -> Result<(), ArtifactError> {
    write_csv_records(&run_dir.join("trades.csv"), trades)
}

pub fn write_equity_curve(run_dir: &Path, equity: &[EquityPoint]) -> Result<(), ArtifactError> {
    write_csv_records(&run_dir.join("equity_curve.csv"), equity)
}

pub fn write_portfolio_ledger(run_dir: &Path, ledger: &[LedgerEntry]) -> Result<(), ArtifactError> {
    write_csv_records(&run_dir.join("portfolio_ledger.csv"), ledger)
}

pub fn write_metrics(run_dir: &Path, metrics: &RunMetrics) -> Result<(), ArtifactError> {
    write_json(&run_dir.join("metrics.json"), metrics)
}

pub fn write_coverage_check(run_dir: &Path, outcome: &CoverageOutcome) -> Result<(), ArtifactError> {
    write_json(&run_dir.join("coverage_check.json"), outcome)
}

pub fn write_sla_check(run_dir: &Path, report: &SlaReport) -> Result<(), ArtifactError> {
    write_json(&run_dir.join("sla_check.json"), report)
}

pub fn write_trade_evidence(run_dir: &Path, rows: &[crate::trade_evidence::TradeEvidence]) -> Result<(), ArtifactError> {
    write_csv_records(&run_dir.join("trade_evidence.csv"), rows)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ArtifactError::WriteFailed(path.to_path_buf(), e.to_string()))?;
    std::fs::write(path, json).map_err(|e| ArtifactError::WriteFailed(path.to_path_buf(), e.to_string()))
}

fn write_csv_records<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), ArtifactError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| ArtifactError::WriteFailed(path.to_path_buf(), e.to_string()))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| ArtifactError::WriteFailed(path.to_path_buf(), e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| ArtifactError::WriteFailed(path.to_path_buf(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_run_dir_rejects_pre_existing_directory() {
        let parent = tempfile::tempdir().unwrap();
        let run_dir = parent.path().join("backtests").join("r1");
        create_run_dir(&run_dir).unwrap();
        assert!(matches!(
            create_run_dir(&run_dir),
            Err(ArtifactError::RunDirAlreadyExists(_))
        ));
    }

    #[test]
    fn run_result_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let result = RunResult::success("r1", serde_json::json!({"num_trades": 2}));
        write_result(dir.path(), &result).unwrap();
        let raw = std::fs::read_to_string(dir.path().join("run_result.json")).unwrap();
        let read_back: RunResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(read_back, result);
    }

    #[test]
    fn error_stacktrace_embeds_the_same_error_id() {
        let dir = tempfile::tempdir().unwrap();
        write_error_stacktrace(dir.path(), "E_PANIC_001", "boom").unwrap();
        let content = std::fs::read_to_string(dir.path().join("error_stacktrace.txt")).unwrap();
        assert!(content.contains("E_PANIC_001"));
        assert!(content.contains("boom"));
    }
}
