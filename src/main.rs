//! bts-ewma - command line runner
//!
//! Loads a config and a price series, runs the backtest, prints the metrics
//! and optionally writes a JSON report with the config, the run log and the
//! chart series.

use std::{fs::File, io::BufWriter, path::PathBuf};

use anyhow::{Context, Result};
use bts_ewma::prelude::{
    Backtest, BacktestConfig, BacktestLog, Chart, MemoryFeed, Metrics, SyntheticFeed, build_charts, get_ticks_from_file,
};
use clap::Parser;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// CLI arguments for the runner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON config file; defaults are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a JSON price file; a synthetic series is generated when absent
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Seed of the synthetic series
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Probability of a missing close in the synthetic series
    #[arg(long, default_value_t = 0.0)]
    gap_rate: f64,

    /// Overrides the starting cash
    #[arg(long)]
    cash: Option<Decimal>,

    /// Overrides the fast average decay
    #[arg(long)]
    fast_decay: Option<Decimal>,

    /// Overrides the slow average decay
    #[arg(long)]
    slow_decay: Option<Decimal>,

    /// Where to write the JSON report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error), `RUST_LOG` takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Serialize)]
struct Report<'a> {
    config: &'a BacktestConfig,
    metrics: &'a Metrics,
    log: &'a BacktestLog,
    charts: Vec<Chart>,
}

fn load_config(args: &Args) -> Result<BacktestConfig> {
    let mut config = match &args.config {
        Some(path) => {
            BacktestConfig::from_file(path).with_context(|| format!("failed to load config {}", path.display()))?
        }
        None => BacktestConfig::default(),
    };

    if let Some(cash) = args.cash {
        config.initial_cash = cash;
    }
    if let Some(fast) = args.fast_decay {
        config.fast_decay = fast;
    }
    if let Some(slow) = args.slow_decay {
        config.slow_decay = slow;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    let config = load_config(&args)?;
    let mut backtest = Backtest::new(config.clone()).context("failed to create backtest")?;

    let result = match &args.data {
        Some(path) => {
            let ticks = get_ticks_from_file(path).with_context(|| format!("failed to read prices {}", path.display()))?;
            info!(path = %path.display(), ticks = ticks.len(), "price file loaded");
            backtest.run(MemoryFeed::from(ticks))
        }
        None => {
            info!(seed = args.seed, gap_rate = args.gap_rate, "using synthetic prices");
            backtest.run(SyntheticFeed::from_config(&config, args.gap_rate, args.seed))
        }
    };

    if let Err(err) = &result {
        warn!(%err, entries = backtest.log().len(), "run aborted, reporting partial log");
    }

    let metrics = Metrics::from(&backtest);
    println!("{metrics}");

    if let Some(path) = &args.output {
        let report = Report {
            config: &config,
            metrics: &metrics,
            log: backtest.log(),
            charts: build_charts(backtest.log()),
        };
        let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report).context("failed to write report")?;
        info!(path = %path.display(), "report written");
    }

    result.context("backtest aborted")
}
