//! Paper trading command
//!
//! Runs the live runner against a replayed bar series.

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use fibgrid::broker::PaperBroker;
use fibgrid::indicators::TaIndicators;
use fibgrid::live::{LiveRunner, RunOutcome};
use fibgrid::{data, Config, Money, TradingError};

pub fn run(config_path: String, data_override: Option<String>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config_path, data_override))
}

async fn run_async(config_path: String, data_override: Option<String>) -> Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    let data_file = data_override
        .or_else(|| config.backtest.data_file.clone())
        .context("No data file: pass --data or set backtest.data_file")?;
    let bars = data::load_csv(&data_file)
        .with_context(|| format!("Failed to load bars from {}", data_file))?;

    info!(
        "Paper session: {} on {} bars, base size {}, {} rungs x{}",
        config.strategy.pair,
        bars.len(),
        config.trading.base_size,
        config.trading.martingale_rungs,
        config.trading.martingale_multiplier
    );

    let broker = PaperBroker::new(
        bars,
        Money::from_f64(config.backtest.initial_cash),
        config.warmup_bars(),
    );

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => {
                error!("Error setting up signal handler: {}", e);
            }
        }
    });

    let mut runner = LiveRunner::new(config, broker, TaIndicators).with_shutdown(shutdown_rx);
    let outcome = match runner.run().await {
        Ok(outcome) => outcome,
        Err(TradingError::ConnectionFailure(reason)) if runner.broker().cursor().is_some() => {
            warn!("Replay ended: {}", reason);
            RunOutcome::Shutdown
        }
        Err(e) => return Err(e).context("Paper session failed"),
    };

    info!(
        "Paper session ended ({:?}) after {} completed cycles, {} events, cash {}",
        outcome,
        runner.cycles(),
        runner.events().len(),
        runner.broker().account().cash
    );
    Ok(())
}
