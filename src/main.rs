//! fibgrid - main entry point
//!
//! This binary provides two subcommands:
//! - backtest: replay a CSV bar series through the grid engine
//! - paper: run the live runner against a replayed bar series

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

const DEFAULT_CONFIG: &str = "configs/eurusd_1h.json";

#[derive(Parser, Debug)]
#[command(name = "fibgrid")]
#[command(about = "Fibonacci martingale grid trader for FX pairs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a backtest over CSV bars
    Backtest {
        /// Path to configuration file (defaults to $GRID_CONFIG)
        #[arg(short, long)]
        config: Option<String>,

        /// CSV bar file (overrides backtest.data_file)
        #[arg(short, long)]
        data: Option<String>,

        /// Initial cash
        #[arg(long)]
        capital: Option<f64>,
    },

    /// Paper trade against replayed CSV bars
    Paper {
        /// Path to configuration file (defaults to $GRID_CONFIG)
        #[arg(short, long)]
        config: Option<String>,

        /// CSV bar file (overrides backtest.data_file)
        #[arg(short, long)]
        data: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());
    Ok(())
}

/// Explicit flag, then $GRID_CONFIG, then the bundled sample
fn resolve_config(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var("GRID_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Backtest { .. } => "backtest",
        Commands::Paper { .. } => "paper",
    };
    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Backtest {
            config,
            data,
            capital,
        } => commands::backtest::run(resolve_config(config), data, capital),

        Commands::Paper { config, data } => commands::paper::run(resolve_config(config), data),
    }
}
