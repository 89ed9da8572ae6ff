//! Precondition gates (spec §4.12, §4.13): coverage and data-quality
//! checks run after the bars snapshot is loaded and before strategy
//! execution. A gate failure is a first-class `FailedPrecondition` run
//! outcome, not an exception (spec §7).

pub mod coverage;
pub mod sla;

pub use coverage::{check_coverage, BarsMeta, CoverageGap, CoverageOutcome};
pub use sla::{check_sla, SlaReport, SlaSeverity, SlaViolation};
