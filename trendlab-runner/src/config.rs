//! Runtime configuration loader (spec §4.1).
//!
//! Resolves `paths`, `services`, and `runtime` from a YAML file, with
//! environment-variable fallbacks and CLI overrides layered on top.
//! Cached once per process behind an explicit `init`/`reset_for_tests`
//! pair rather than a hidden global (spec §9 redesign flag).

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};
use thiserror::Error;

const WELL_KNOWN_LOCATIONS: &[&str] = &[
    "./trading_config.yaml",
    "./config/trading_config.yaml",
    "/etc/trendlab/trading_config.yaml",
];

const TRUTHY: &[&str] = &["1", "true", "yes", "y", "on"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required path '{0}' is missing from the runtime config")]
    MissingRequiredPath(String),
    #[error("path '{0}' must be absolute, got: {1}")]
    NotAbsolute(String, String),
    #[error("failed to read config file {0}: {1}")]
    Unreadable(PathBuf, String),
    #[error("malformed config file {0}: {1}")]
    Malformed(PathBuf, String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PathsConfig {
    pub marketdata_data_root: Option<PathBuf>,
    pub trading_artifacts_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServicesConfig {
    pub marketdata_stream_url: Option<String>,
    pub marketdata_stream_timeout_sec: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuntimeFlags {
    pub pipeline_consumer_only: bool,
    pub pipeline_auto_ensure_bars: bool,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self {
            pipeline_consumer_only: true,
            pipeline_auto_ensure_bars: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    pub paths: PathsConfig,
    pub services: ServicesConfig,
    pub runtime: RuntimeFlags,
}

/// Parses one of the truthy strings in spec §4.1 (`{1,true,yes,y,on}`,
/// case-insensitive). Anything else, including absence, is `false`.
pub fn as_bool(value: &str) -> bool {
    TRUTHY.iter().any(|t| t.eq_ignore_ascii_case(value))
}

fn require_absolute(field: &str, path: &Path) -> Result<(), ConfigError> {
    if !path.is_absolute() {
        return Err(ConfigError::NotAbsolute(
            field.to_string(),
            path.display().to_string(),
        ));
    }
    Ok(())
}

fn env_var_path(name: &str) -> Option<PathBuf> {
    env::var(name).ok().map(PathBuf::from)
}

fn env_var_str(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn env_var_bool(name: &str) -> Option<bool> {
    env::var(name).ok().map(|v| as_bool(&v))
}

fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Some(p) = env_var_path("TRADING_CONFIG") {
        return Some(p);
    }
    WELL_KNOWN_LOCATIONS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn load_from_file(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Unreadable(path.to_path_buf(), e.to_string()))?;
    serde_yaml::from_str(&raw).map_err(|e| ConfigError::Malformed(path.to_path_buf(), e.to_string()))
}

fn apply_env_overrides(mut cfg: RuntimeConfig) -> RuntimeConfig {
    if cfg.paths.marketdata_data_root.is_none() {
        cfg.paths.marketdata_data_root = env_var_path("MARKETDATA_DATA_ROOT");
    }
    if cfg.paths.trading_artifacts_root.is_none() {
        cfg.paths.trading_artifacts_root = env_var_path("TRADING_ARTIFACTS_ROOT")
            .or_else(|| env_var_path("TRADERUNNER_ARTIFACTS_ROOT"));
    }
    if cfg.services.marketdata_stream_url.is_none() {
        cfg.services.marketdata_stream_url = env_var_str("MARKETDATA_STREAM_URL");
    }
    if cfg.services.marketdata_stream_timeout_sec.is_none() {
        cfg.services.marketdata_stream_timeout_sec = env_var_str("MARKETDATA_STREAM_TIMEOUT_SEC")
            .and_then(|v| v.parse().ok());
    }
    if let Some(v) = env_var_bool("PIPELINE_AUTO_ENSURE_BARS") {
        cfg.runtime.pipeline_auto_ensure_bars = v;
    }
    if let Some(v) = env_var_bool("PIPELINE_CONSUMER_ONLY") {
        cfg.runtime.pipeline_consumer_only = v;
    }
    cfg
}

/// Resolves the runtime config per spec §4.1's precedence: explicit path,
/// then `TRADING_CONFIG`, then the first existing well-known location,
/// then per-field environment variables. `strict` requires both root
/// paths to be present and absolute.
pub fn resolve(explicit: Option<&Path>, strict: bool) -> Result<RuntimeConfig, ConfigError> {
    let from_file = match locate_config_file(explicit) {
        Some(path) => load_from_file(&path)?,
        None => RuntimeConfig::default(),
    };
    let cfg = apply_env_overrides(from_file);

    if let Some(p) = &cfg.paths.marketdata_data_root {
        require_absolute("paths.marketdata_data_root", p)?;
    } else if strict {
        return Err(ConfigError::MissingRequiredPath(
            "paths.marketdata_data_root".into(),
        ));
    }
    if let Some(p) = &cfg.paths.trading_artifacts_root {
        require_absolute("paths.trading_artifacts_root", p)?;
    } else if strict {
        return Err(ConfigError::MissingRequiredPath(
            "paths.trading_artifacts_root".into(),
        ));
    }

    Ok(cfg)
}

static CACHE: OnceLock<RwLock<Option<RuntimeConfig>>> = OnceLock::new();

fn cache() -> &'static RwLock<Option<RuntimeConfig>> {
    CACHE.get_or_init(|| RwLock::new(None))
}

/// Loads and caches the runtime config for the rest of the process.
/// Called once by the CLI before any run begins.
pub fn init(explicit: Option<&Path>, strict: bool) -> Result<(), ConfigError> {
    let cfg = resolve(explicit, strict)?;
    *cache().write().expect("runtime config lock poisoned") = Some(cfg);
    Ok(())
}

/// Returns the cached config. Panics if `init` was never called — a
/// programmer error, not a runtime condition.
pub fn current() -> RuntimeConfig {
    cache()
        .read()
        .expect("runtime config lock poisoned")
        .clone()
        .expect("runtime config accessed before init()")
}

/// Clears the cache so the next `init` call re-resolves from scratch.
pub fn reset_for_tests() {
    *cache().write().expect("runtime config lock poisoned") = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn truthy_strings_are_case_insensitive() {
        assert!(as_bool("TRUE"));
        assert!(as_bool("Yes"));
        assert!(as_bool("on"));
        assert!(!as_bool("nah"));
        assert!(!as_bool(""));
    }

    #[test]
    fn strict_mode_requires_both_roots() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("MARKETDATA_DATA_ROOT");
        env::remove_var("TRADING_ARTIFACTS_ROOT");
        env::remove_var("TRADING_CONFIG");
        let err = resolve(None, true).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequiredPath(_)));
    }

    #[test]
    fn non_strict_mode_tolerates_missing_paths() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("MARKETDATA_DATA_ROOT");
        env::remove_var("TRADING_ARTIFACTS_ROOT");
        env::remove_var("TRADING_CONFIG");
        assert!(resolve(None, false).is_ok());
    }

    #[test]
    fn relative_root_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("MARKETDATA_DATA_ROOT", "relative/path");
        let err = resolve(None, false).unwrap_err();
        env::remove_var("MARKETDATA_DATA_ROOT");
        assert!(matches!(err, ConfigError::NotAbsolute(_, _)));
    }

    #[test]
    fn legacy_artifacts_root_alias_is_honored() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("TRADING_ARTIFACTS_ROOT");
        env::set_var("TRADERUNNER_ARTIFACTS_ROOT", "/var/trendlab/artifacts");
        let cfg = resolve(None, false).unwrap();
        env::remove_var("TRADERUNNER_ARTIFACTS_ROOT");
        assert_eq!(
            cfg.paths.trading_artifacts_root,
            Some(PathBuf::from("/var/trendlab/artifacts"))
        );
    }

    #[test]
    fn reset_for_tests_clears_the_cache() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset_for_tests();
        env::set_var("MARKETDATA_DATA_ROOT", "/data/market");
        env::set_var("TRADING_ARTIFACTS_ROOT", "/data/artifacts");
        init(None, true).unwrap();
        assert!(current().paths.marketdata_data_root.is_some());
        reset_for_tests();
        env::remove_var("MARKETDATA_DATA_ROOT");
        env::remove_var("TRADING_ARTIFACTS_ROOT");
    }
}
