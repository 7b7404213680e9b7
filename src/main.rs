//! Delta-hedged options mispricing backtester.
//!
//! # Usage
//!
//! ```bash
//! # Run a single backtest
//! deltahedge-backtest run --config config/default.toml --data data/quotes.csv
//!
//! # Emit the full result as JSON
//! deltahedge-backtest run --config config/default.toml --data data/quotes.csv --json
//!
//! # Sweep volatility and threshold
//! deltahedge-backtest sweep --config config/default.toml --data data/quotes.csv \
//!     --volatility 0.15,0.2,0.25 --threshold 0.01,0.02,0.05 --top 5
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use deltahedge_backtest::data::{QuoteLoader, Snapshot};
use deltahedge_backtest::{BacktestConfig, BacktestEngine, ParameterGrid, ParameterSweep};

#[derive(Parser)]
#[command(name = "deltahedge-backtest")]
#[command(about = "Delta-hedged options mispricing backtester")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest with given configuration
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "config/default.toml")]
        config: String,

        /// Path to quote CSV
        #[arg(short, long)]
        data: String,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a parameter sweep over volatility, threshold and rate
    Sweep {
        /// Path to base configuration file
        #[arg(short, long, default_value = "config/default.toml")]
        config: String,

        /// Path to quote CSV
        #[arg(short, long)]
        data: String,

        /// Comma-separated volatilities
        #[arg(long)]
        volatility: String,

        /// Comma-separated thresholds
        #[arg(long)]
        threshold: String,

        /// Comma-separated risk-free rates (defaults to the config's rate)
        #[arg(long)]
        rate: Option<String>,

        /// Show only the best N outcomes
        #[arg(long)]
        top: Option<usize>,

        /// Print outcomes as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_list(values: &str, name: &str) -> Result<Vec<f64>> {
    let parsed = values
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .with_context(|| format!("Invalid {} value '{}'", name, s))
        })
        .collect::<Result<Vec<_>>>()?;
    if parsed.is_empty() {
        bail!("No {} values given", name);
    }
    Ok(parsed)
}

fn load_snapshots(data: &str) -> Result<Vec<Snapshot>> {
    let quotes = QuoteLoader::new(data)
        .load()
        .with_context(|| format!("Failed to load quotes from {}", data))?;
    Ok(Snapshot::group(quotes))
}

fn cmd_run(config: &str, data: &str, json: bool) -> Result<()> {
    let config = BacktestConfig::load(config)
        .with_context(|| format!("Failed to load config {}", config))?;
    let snapshots = load_snapshots(data)?;

    let mut engine = BacktestEngine::new(config)?;
    let result = engine.run_snapshots(&snapshots).context("Backtest failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.summary());
    }
    Ok(())
}

fn cmd_sweep(
    config: &str,
    data: &str,
    volatility: &str,
    threshold: &str,
    rate: Option<&str>,
    top: Option<usize>,
    json: bool,
) -> Result<()> {
    let base = BacktestConfig::load(config)
        .with_context(|| format!("Failed to load config {}", config))?;
    let grid = ParameterGrid {
        volatility: parse_list(volatility, "volatility")?,
        threshold: parse_list(threshold, "threshold")?,
        risk_free_rate: match rate {
            Some(rates) => parse_list(rates, "rate")?,
            None => Vec::new(),
        },
    };
    let snapshots = load_snapshots(data)?;

    let total = grid.total_combinations();
    info!("Sweeping {} combinations", total);

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_message("sweeping");

    let sweep = ParameterSweep::new(base, grid);
    let mut outcomes = sweep
        .run_with_progress(&snapshots, |done, _| pb.set_position(done as u64))
        .context("Sweep failed")?;
    pb.finish_with_message("complete");

    if let Some(n) = top {
        outcomes.truncate(n);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }

    println!(
        "{:<32} {:>14} {:>8} {:>8}",
        "Parameters", "Total PnL", "Options", "Hedges"
    );
    for outcome in &outcomes {
        println!(
            "{:<32} {:>14.2} {:>8} {:>8}",
            outcome.key, outcome.total_pnl, outcome.option_trades, outcome.hedge_trades
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("deltahedge_backtest=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, data, json } => cmd_run(&config, &data, json)?,
        Commands::Sweep {
            config,
            data,
            volatility,
            threshold,
            rate,
            top,
            json,
        } => cmd_sweep(
            &config,
            &data,
            &volatility,
            &threshold,
            rate.as_deref(),
            top,
            json,
        )?,
    }

    Ok(())
}
