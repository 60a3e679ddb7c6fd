//! Backtest command implementation

use anyhow::{Context, Result};
use fibgrid::{backtest::Backtester, data, Config, CycleEvent};
use tracing::info;

pub fn run(
    config_path: String,
    data_override: Option<String>,
    capital_override: Option<f64>,
) -> Result<()> {
    info!("Starting backtest");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(capital) = capital_override {
        info!("Overriding initial cash to: {:.2}", capital);
        config.backtest.initial_cash = capital;
        config.validate().context("Invalid capital override")?;
    }

    let data_file = data_override
        .or_else(|| config.backtest.data_file.clone())
        .context("No data file: pass --data or set backtest.data_file")?;
    let bars = data::load_csv(&data_file)
        .with_context(|| format!("Failed to load bars from {}", data_file))?;

    let backtester = Backtester::new(config.clone());
    info!("Running backtest...");
    let result = backtester.run(&bars)?;

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS: {}", config.strategy.pair);
    println!("{}", "=".repeat(60));
    println!("Bars:               {}", result.bars);
    println!("Initial Cash:       {:.2}", result.initial_cash.to_f64());
    println!("Ending Equity:      {:.2}", result.ending_equity.to_f64());
    println!(
        "Profit:             {:.2} ({:.2}%)",
        result.profit.to_f64(),
        result.profit_pct()
    );
    println!("Completed Cycles:   {}", result.cycles);
    if result.halted {
        println!("Status:             HALTED (max drawdown liquidation)");
    } else if result.open_position {
        println!("Status:             position still open at end of data");
    }
    println!("{}", "=".repeat(60));

    if !result.events.is_empty() {
        println!("\nEvents:");
        for event in &result.events {
            println!("  {}", describe(event));
        }
    }

    Ok(())
}

fn describe(event: &CycleEvent) -> String {
    match event {
        CycleEvent::Opened { side, price } => format!("Opened {} @ {}", side, price),
        CycleEvent::RungFilled {
            rung,
            take_profit,
            size,
        } => format!("Rung {} filled; take profit {} @ {}", rung, size, take_profit),
        CycleEvent::TakeProfitFilled { price } => format!("Take profit filled @ {}", price),
        CycleEvent::DrawdownBreached { flatten } => {
            format!("Max drawdown breached; flattening {}", flatten)
        }
        CycleEvent::Liquidated { price } => format!("Liquidated @ {}", price),
        CycleEvent::Closed { outcome } => format!("Cycle closed ({:?})", outcome),
    }
}
