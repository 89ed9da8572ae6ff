//! Example strategy plugins.
//!
//! Framework code (`trendlab-core`, `trendlab-runner`) never depends on
//! this crate — strategies are registered explicitly by the CLI at
//! process start (spec §4.5, §9: "discovery is explicit at process
//! start, not import-time side effects"). This crate exists so the
//! pipeline is exercisable end-to-end without any concrete strategy
//! living inside the framework.

pub mod inside_bar;
pub mod ma_crossover;

use trendlab_core::registry::StrategyRegistry;

/// Registers every strategy plugin this crate ships. The CLI calls this
/// once at startup; nothing in `trendlab-core` or `trendlab-runner` ever
/// calls it, or knows it exists.
pub fn register_all(registry: &mut StrategyRegistry) {
    registry.register("inside_bar", Box::new(inside_bar::InsideBarStrategy));
    registry.register("ma_crossover", Box::new(ma_crossover::MaCrossoverStrategy));
}
