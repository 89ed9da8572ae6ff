//! Identifier types for run-scoped entities.
//!
//! `RunId` is caller-supplied (the CLI's `--run-id`); `OcoGroupId` is a
//! sequential counter scoped to a single intent-generation pass. Content
//! hashes (`bars_hash`, `intent_hash`, `fills_hash`, schema fingerprints) are
//! SHA-256 and live in [`crate::hashing`], not here — they are outputs of a
//! stage, not identifiers minted by it.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! seq_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

seq_id!(OcoGroupId);

/// Monotonically increasing generator for [`OcoGroupId`]s within one
/// intent-generation pass. Not persisted; scoped to a single call.
#[derive(Debug, Default)]
pub struct OcoGroupIdGen {
    next: u64,
}

impl OcoGroupIdGen {
    pub fn next_id(&mut self) -> OcoGroupId {
        let id = OcoGroupId(self.next);
        self.next += 1;
        id
    }
}

/// Run identifier, supplied by the caller (e.g. the CLI's `--run-id`).
///
/// Unlike the teacher's `RunId`, this is never derived by hashing config —
/// `run_dir` is the single source of truth for a run's identity (spec §3,
/// `RunContext`), and the run id is just its human-facing label.
pub type RunId = String;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oco_group_id_gen_is_monotonic() {
        let mut gen = OcoGroupIdGen::default();
        let a = gen.next_id();
        let b = gen.next_id();
        assert!(b.0 > a.0);
    }
}
