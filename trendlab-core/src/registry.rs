//! Strategy registry — isolates the framework from strategy internals
//! (spec §4.5, §9 redesign flag: duck-typed plugins become an explicit
//! interface capability set with a registry keyed by string).
//!
//! Framework code must never statically depend on a concrete strategy
//! module. Plugins are registered explicitly by the CLI at process start
//! (`StrategyRegistry::register`), never discovered via import-time side
//! effects.

use crate::domain::signal_frame::SignalFrameSchema;
use crate::domain::{Bar, SignalRow};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown strategy id: {0}")]
    UnknownStrategy(String),
    #[error("strategy {strategy_id} has no schema for version {version}")]
    UnknownVersion { strategy_id: String, version: String },
    #[error("invalid strategy params: {0}")]
    InvalidParams(String),
}

/// A pure projection from bars and parameters into rows conforming to the
/// strategy's schema. Strategy-specific indicator/debug columns travel in
/// each row's `context` map; the base and generic columns are typed
/// fields, not dynamic lookups (spec §9 redesign flag).
pub trait StrategyPlugin: Send + Sync {
    /// The strategy's versioned contract for `version`.
    fn get_schema(&self, version: &str) -> Result<SignalFrameSchema, RegistryError>;

    /// Projects `bars` into rows conforming to `get_schema(version)`,
    /// parameterized by `params` (a free-form strategy-specific config
    /// bag, validated by the strategy itself).
    fn extend_signal_frame(
        &self,
        bars: &[Bar],
        version: &str,
        params: &serde_json::Value,
    ) -> Result<Vec<SignalRow>, RegistryError>;
}

/// Resolves a `strategy_id` to its registered plugin. Holds no knowledge
/// of which plugins exist until `register` is called.
#[derive(Default)]
pub struct StrategyRegistry {
    plugins: HashMap<String, Box<dyn StrategyPlugin>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy_id: impl Into<String>, plugin: Box<dyn StrategyPlugin>) {
        self.plugins.insert(strategy_id.into(), plugin);
    }

    pub fn get(&self, strategy_id: &str) -> Result<&dyn StrategyPlugin, RegistryError> {
        self.plugins
            .get(strategy_id)
            .map(|b| b.as_ref())
            .ok_or_else(|| RegistryError::UnknownStrategy(strategy_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal_frame::ColumnKind;
    use crate::domain::{ColumnSpec, SemanticDtype};

    struct StubPlugin;

    impl StrategyPlugin for StubPlugin {
        fn get_schema(&self, version: &str) -> Result<SignalFrameSchema, RegistryError> {
            Ok(SignalFrameSchema {
                strategy_id: "stub".into(),
                strategy_tag: "default".into(),
                version: version.into(),
                columns: vec![ColumnSpec::new(
                    "signal_side",
                    SemanticDtype::String,
                    true,
                    ColumnKind::RequiredGeneric,
                )],
            })
        }

        fn extend_signal_frame(
            &self,
            bars: &[Bar],
            _version: &str,
            _params: &serde_json::Value,
        ) -> Result<Vec<SignalRow>, RegistryError> {
            Ok(bars
                .iter()
                .map(|bar| SignalRow {
                    timestamp: bar.timestamp,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                    symbol: "STUB".into(),
                    timeframe: "M5".into(),
                    strategy_id: "stub".into(),
                    strategy_version: "1.0.0".into(),
                    signal_side: None,
                    oco_group_id: None,
                    signal_reason: None,
                    entry_price: None,
                    stop_price: None,
                    take_profit_price: None,
                    template_id: None,
                    exit_ts: None,
                    exit_reason: None,
                    context: std::collections::BTreeMap::new(),
                })
                .collect())
        }
    }

    #[test]
    fn unknown_strategy_is_an_error() {
        let registry = StrategyRegistry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(RegistryError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn registered_strategy_resolves() {
        let mut registry = StrategyRegistry::new();
        registry.register("stub", Box::new(StubPlugin));
        let plugin = registry.get("stub").unwrap();
        let schema = plugin.get_schema("1.0.0").unwrap();
        assert_eq!(schema.version, "1.0.0");
    }
}
