//! TrendLab CLI — headless entry point for one backtest run (spec §6).
//!
//! Resolves runtime configuration, registers the strategy plugins this
//! binary ships, and runs the pipeline once. Exit code mirrors
//! `run_result.json`'s status: `0` on `SUCCESS`, non-zero otherwise — the
//! full detail always lives in the artifact, never only in stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::Parser;
use trendlab_core::domain::run::RunStatus;
use trendlab_core::execution::sizing::SizingConfig;
use trendlab_core::intent_gen::{OrderValidityPolicy, ValidFromPolicy};
use trendlab_core::registry::StrategyRegistry;
use trendlab_core::warmup::SessionMode;
use trendlab_runner::pipeline::RunRequest;

/// Runs a single backtest against a bars snapshot produced by the market
/// data pipeline, or directly against an explicit bars file.
#[derive(Debug, Parser)]
#[command(name = "trendlab", version, about)]
struct Cli {
    /// Caller-supplied run identifier; also the artifact directory name
    /// under `<out-dir>/backtests/`.
    #[arg(long)]
    run_id: String,

    /// Human-readable run label, distinct from `run_id` (spec §3).
    #[arg(long, default_value = "")]
    run_name: String,

    /// Artifacts root; the run directory is `<out-dir>/backtests/<run-id>`.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Explicit runtime config file; otherwise resolved via `TRADING_CONFIG`
    /// or the well-known locations (spec §4.1).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bypasses the data fetcher entirely and reads bars straight from
    /// this path instead of the producer's on-disk layout.
    #[arg(long)]
    bars_path: Option<PathBuf>,

    #[arg(long)]
    strategy_id: String,

    #[arg(long)]
    strategy_version: String,

    /// Free-form JSON passed through to the strategy's `extend_signal_frame`.
    #[arg(long, default_value = "{}")]
    strategy_params: String,

    #[arg(long)]
    symbol: String,

    #[arg(long)]
    timeframe: String,

    #[arg(long, alias = "valid-to")]
    requested_end: DateTime<Utc>,

    #[arg(long, default_value_t = 100)]
    lookback_days: i64,

    #[arg(long, default_value_t = false)]
    compound_enabled: bool,

    /// Only `cash_only` is accepted (spec §6).
    #[arg(long, default_value = "cash_only")]
    compound_equity_basis: String,

    #[arg(long, default_value_t = 100_000.0)]
    initial_cash: f64,

    #[arg(long, default_value_t = 0.0)]
    fees_bps: f64,

    #[arg(long, default_value_t = 0.0)]
    slippage_bps: f64,

    #[arg(long, default_value = "signal_ts")]
    valid_from_policy: String,

    #[arg(long, default_value = "session_end")]
    order_validity_policy: String,

    #[arg(long)]
    fixed_minutes: Option<u32>,

    #[arg(long, default_value = "America/New_York")]
    market_tz: String,

    #[arg(long, default_value = "rth")]
    session_mode: String,

    #[arg(long, default_value = "fixed")]
    sizing_mode: String,

    #[arg(long, default_value_t = 1.0)]
    fixed_qty: f64,

    #[arg(long, default_value_t = 10.0)]
    pos_pct: f64,

    #[arg(long, default_value_t = 1.0)]
    risk_pct: f64,

    #[arg(long, default_value_t = 100.0)]
    max_pos_pct: f64,

    #[arg(long, default_value_t = 1.0)]
    tick_size: f64,

    #[arg(long, default_value_t = 0.0)]
    min_qty: f64,

    #[arg(long, default_value_t = 14)]
    required_warmup_bars: u32,

    #[arg(long, default_value_t = false)]
    requires_consecutive_bars: bool,

    #[arg(long, default_value_t = false)]
    require_rth_evidence: bool,
}

fn parse_order_validity_policy(s: &str) -> anyhow::Result<OrderValidityPolicy> {
    match s {
        "session_end" => Ok(OrderValidityPolicy::SessionEnd),
        "fixed_minutes" => Ok(OrderValidityPolicy::FixedMinutes),
        "one_bar" => Ok(OrderValidityPolicy::OneBar),
        other => anyhow::bail!("unknown --order-validity-policy {other}"),
    }
}

fn parse_valid_from_policy(s: &str) -> anyhow::Result<ValidFromPolicy> {
    match s {
        "signal_ts" => Ok(ValidFromPolicy::SignalTs),
        "next_bar" => Ok(ValidFromPolicy::NextBar),
        other => anyhow::bail!("unknown --valid-from-policy {other}"),
    }
}

fn parse_session_mode(s: &str) -> anyhow::Result<SessionMode> {
    match s {
        "rth" => Ok(SessionMode::Rth),
        "raw" => Ok(SessionMode::Raw),
        other => anyhow::bail!("unknown --session-mode {other}"),
    }
}

fn build_sizing(cli: &Cli) -> anyhow::Result<SizingConfig> {
    match cli.sizing_mode.as_str() {
        "fixed" => Ok(SizingConfig::Fixed { fixed_qty: cli.fixed_qty }),
        "pct_equity" => Ok(SizingConfig::PctEquity { pos_pct: cli.pos_pct }),
        "risk_based" => Ok(SizingConfig::RiskBased {
            risk_pct: cli.risk_pct,
            max_pos_pct: cli.max_pos_pct,
        }),
        other => anyhow::bail!("unknown --sizing-mode {other}"),
    }
}

fn run(cli: Cli) -> anyhow::Result<RunStatus> {
    if cli.compound_equity_basis != "cash_only" {
        anyhow::bail!("--compound-equity-basis only accepts cash_only, got {}", cli.compound_equity_basis);
    }

    trendlab_runner::config::init(cli.config.as_deref(), false)?;
    let runtime_config = trendlab_runner::config::current();

    let market_tz: chrono_tz::Tz = cli
        .market_tz
        .parse()
        .map_err(|_| anyhow::anyhow!("unrecognized --market-tz {}", cli.market_tz))?;

    let out_dir = cli
        .out_dir
        .clone()
        .or_else(|| runtime_config.paths.trading_artifacts_root.clone())
        .ok_or_else(|| anyhow::anyhow!("no --out-dir given and no trading_artifacts_root configured"))?;
    let run_dir = out_dir.join("backtests").join(&cli.run_id);

    let strategy_params: serde_json::Value = serde_json::from_str(&cli.strategy_params)?;

    let request = RunRequest {
        run_id: cli.run_id.clone(),
        run_name: if cli.run_name.is_empty() { cli.run_id.clone() } else { cli.run_name.clone() },
        run_dir,
        bars_path: cli.bars_path.clone(),
        data_root: runtime_config.paths.marketdata_data_root.clone(),
        strategy_id: cli.strategy_id.clone(),
        strategy_version: cli.strategy_version.clone(),
        symbol: cli.symbol.clone(),
        timeframe: cli.timeframe.clone(),
        requested_end: cli.requested_end,
        lookback_days: cli.lookback_days,
        compound_enabled: cli.compound_enabled,
        initial_cash: cli.initial_cash,
        fees_bps: cli.fees_bps,
        slippage_bps: cli.slippage_bps,
        valid_from_policy: parse_valid_from_policy(&cli.valid_from_policy)?,
        order_validity_policy: parse_order_validity_policy(&cli.order_validity_policy)?,
        fixed_minutes: cli.fixed_minutes,
        market_tz,
        market_tz_name: cli.market_tz.clone(),
        session_mode: parse_session_mode(&cli.session_mode)?,
        sizing: build_sizing(&cli)?,
        strategy_params,
        required_warmup_bars: cli.required_warmup_bars,
        requires_consecutive_bars: cli.requires_consecutive_bars,
        tick_size: cli.tick_size,
        min_qty: cli.min_qty,
        require_rth_evidence: cli.require_rth_evidence,
    };

    let mut registry = StrategyRegistry::new();
    trendlab_strategies::register_all(&mut registry);

    let result = trendlab_runner::pipeline::execute(&registry, &request)?;
    tracing::info!(run_id = %result.run_id, status = ?result.status, "run finished");
    Ok(result.status)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(RunStatus::Success) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %err, "run failed before a result could be produced");
            ExitCode::FAILURE
        }
    }
}
