//! Step tracker (spec §4.11) — append-only `run_steps.jsonl`.
//!
//! One JSON object per line. A step is opened with `started` and closed
//! with `completed` or `failed`; a UI consumer finds "the current step"
//! as the highest-indexed `started` event without a matching terminal
//! one. Skipped steps are written directly without a `started` pair.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEvent {
    pub step_index: u32,
    pub step_name: String,
    pub status: StepStatus,
    pub timestamp: chrono::DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Writes `run_steps.jsonl` for one run. Each call to `start`/`complete`/
/// `fail`/`skip` appends a line and flushes immediately, so a crash
/// mid-pipeline still leaves a readable partial trail.
pub struct StepTracker {
    path: PathBuf,
    file: File,
    next_index: u32,
}

impl StepTracker {
    pub fn create(run_dir: &Path) -> std::io::Result<Self> {
        let path = run_dir.join("run_steps.jsonl");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            next_index: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_event(&mut self, event: &StepEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(event).expect("StepEvent always serializes");
        writeln!(self.file, "{line}")?;
        self.file.flush()
    }

    /// Opens a new step, returning its index for the matching `complete`
    /// or `fail` call.
    pub fn start(&mut self, step_name: &str) -> std::io::Result<u32> {
        let index = self.next_index;
        self.next_index += 1;
        self.write_event(&StepEvent {
            step_index: index,
            step_name: step_name.to_string(),
            status: StepStatus::Started,
            timestamp: Utc::now(),
            details: None,
        })?;
        Ok(index)
    }

    pub fn complete(&mut self, index: u32, step_name: &str, details: Option<serde_json::Value>) -> std::io::Result<()> {
        self.write_event(&StepEvent {
            step_index: index,
            step_name: step_name.to_string(),
            status: StepStatus::Completed,
            timestamp: Utc::now(),
            details,
        })
    }

    pub fn fail(&mut self, index: u32, step_name: &str, details: Option<serde_json::Value>) -> std::io::Result<()> {
        self.write_event(&StepEvent {
            step_index: index,
            step_name: step_name.to_string(),
            status: StepStatus::Failed,
            timestamp: Utc::now(),
            details,
        })
    }

    /// Gate-dependent later phases (e.g. everything past a failed
    /// coverage gate) are recorded as `skipped` rather than never
    /// appearing at all, so the full plan stays visible.
    pub fn skip(&mut self, step_name: &str, reason: &str) -> std::io::Result<u32> {
        let index = self.next_index;
        self.next_index += 1;
        self.write_event(&StepEvent {
            step_index: index,
            step_name: step_name.to_string(),
            status: StepStatus::Skipped,
            timestamp: Utc::now(),
            details: Some(serde_json::json!({ "reason": reason })),
        })?;
        Ok(index)
    }
}

/// Reads back a `run_steps.jsonl` file, used by tests and any UI
/// consumer replaying the trail.
pub fn read_events(path: &Path) -> std::io::Result<Vec<StepEvent>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("run_steps.jsonl line is valid JSON"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_step_closes_with_completed() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = StepTracker::create(dir.path()).unwrap();
        let idx = tracker.start("load_bars").unwrap();
        tracker.complete(idx, "load_bars", None).unwrap();

        let events = read_events(tracker.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, StepStatus::Started);
        assert_eq!(events[1].status, StepStatus::Completed);
        assert_eq!(events[0].step_index, events[1].step_index);
    }

    #[test]
    fn skipped_step_needs_no_started_pair() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = StepTracker::create(dir.path()).unwrap();
        tracker.skip("generate_intents", "coverage gate failed").unwrap();

        let events = read_events(tracker.path()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, StepStatus::Skipped);
    }

    #[test]
    fn step_indices_increase_monotonically() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = StepTracker::create(dir.path()).unwrap();
        let a = tracker.start("a").unwrap();
        tracker.complete(a, "a", None).unwrap();
        let b = tracker.start("b").unwrap();
        tracker.complete(b, "b", None).unwrap();
        assert!(b > a);
    }
}
