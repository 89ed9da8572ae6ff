//! TrendLab Core — data contracts, strategy registry, intent generation,
//! deterministic fill simulation, execution/sizing, metrics, and
//! precondition gates for the backtesting pipeline.
//!
//! This crate owns everything that must be deterministic and
//! content-hashable: bars, signal frames, intents, fills, trades, equity.
//! It holds no filesystem or network I/O — that lives in
//! `trendlab-runner`, which wires this crate's pure functions into a run.

pub mod domain;
pub mod execution;
pub mod fill_model;
pub mod gates;
pub mod hashing;
pub mod intent_gen;
pub mod metrics;
pub mod registry;
pub mod warmup;
