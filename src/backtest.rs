//! Backtest runner
//!
//! Replays a bar series through the same `GridEngine` the live runner uses.
//! Fills are simulated against each bar's close with the shared execution
//! rule, so a backtest and a paper session over the same bars produce the
//! same cycle events.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::{Action, CycleEvent, CycleOutcome, GridEngine, PositionState};
use crate::error::{TradingError, TradingResult};
use crate::grid::GridPlanner;
use crate::indicators::{IndicatorService, TaIndicators};
use crate::oms::{check_fill, SimAccount};
use crate::risk::DrawdownGuard;
use crate::signal::SignalAggregator;
use crate::{Candle, Money};

/// Summary of one backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub events: Vec<CycleEvent>,
    /// Cycles closed at take-profit
    pub cycles: usize,
    pub initial_cash: Money,
    /// Equity marked at the last processed bar
    pub ending_equity: Money,
    pub profit: Money,
    /// A drawdown liquidation stopped the run
    pub halted: bool,
    /// Data ran out with a cycle still open
    pub open_position: bool,
    pub bars: usize,
}

impl BacktestResult {
    pub fn profit_pct(&self) -> f64 {
        if self.initial_cash.is_zero() {
            return 0.0;
        }
        (self.profit / self.initial_cash).to_f64() * 100.0
    }
}

/// Backtest engine
pub struct Backtester<I: IndicatorService = TaIndicators> {
    config: Config,
    indicators: I,
}

impl Backtester<TaIndicators> {
    pub fn new(config: Config) -> Self {
        Self::with_indicators(config, TaIndicators)
    }
}

impl<I: IndicatorService> Backtester<I> {
    pub fn with_indicators(config: Config, indicators: I) -> Self {
        Self { config, indicators }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the strategy over `bars`, oldest first
    pub fn run(&self, bars: &[Candle]) -> TradingResult<BacktestResult> {
        let warmup = self.config.warmup_bars();
        if bars.len() <= warmup {
            return Err(TradingError::DataUnavailable(format!(
                "{} bars, need more than {} for warmup",
                bars.len(),
                warmup
            )));
        }

        let strategy = &self.config.strategy;
        let aggregator = SignalAggregator::from_config(strategy);
        let mut engine = GridEngine::new(
            self.config.symbol(),
            GridPlanner::from_config(&self.config.trading),
            DrawdownGuard::new(Money::from_f64(self.config.trading.max_drawdown)),
        );
        let initial_cash = Money::from_f64(self.config.backtest.initial_cash);
        let mut account = SimAccount::new(initial_cash);
        let mut cycles = 0;
        let mut halted = false;
        let mut last = warmup;

        info!(
            "Backtesting {} over {} bars (replay from bar {})",
            engine.symbol(),
            bars.len(),
            warmup
        );

        for i in warmup..bars.len() {
            last = i;
            let close = bars[i].close_money();

            if engine.state() == PositionState::Idle {
                let Some(entry) = aggregator.decide(&self.indicators, &bars[..=i], strategy)
                else {
                    continue;
                };
                debug!("Bar {} ({}): opening {}", i, bars[i].datetime, entry.side);
                let baseline = account.equity(close);
                let actions = engine.open(entry.side, baseline, entry.high, entry.low)?;
                simulate(&mut engine, &mut account, actions, close)?;
            } else {
                // Orders placed while processing this bar wait for the next one.
                for id in engine.ledger().pending_ids() {
                    let fill = engine.ledger().get(id).and_then(|o| check_fill(o, close));
                    if let Some(price) = fill {
                        let actions = fill_order(&mut engine, &mut account, id, price)?;
                        simulate(&mut engine, &mut account, actions, close)?;
                    }
                }

                if engine.state().is_guarded() {
                    let actions = engine.on_equity(account.equity(close))?;
                    simulate(&mut engine, &mut account, actions, close)?;
                }
            }

            match engine.outcome() {
                Some(CycleOutcome::Liquidated) => {
                    warn!("Bar {}: drawdown liquidation, halting", i);
                    halted = true;
                    break;
                }
                Some(CycleOutcome::TakeProfit) => {
                    cycles += 1;
                    info!("Bar {}: cycle {} closed at take profit", i, cycles);
                    if !self.config.trading.monitor_forever {
                        break;
                    }
                    engine.reset();
                }
                None => {}
            }
        }

        let ending_equity = account.equity(bars[last].close_money());
        let open_position = engine.state().is_guarded();
        if open_position {
            warn!("Data ended with an open position; equity is marked to the last close");
        }

        Ok(BacktestResult {
            events: engine.events().to_vec(),
            cycles,
            initial_cash,
            ending_equity,
            profit: ending_equity - initial_cash,
            halted,
            open_position,
            bars: bars.len(),
        })
    }
}

fn fill_order(
    engine: &mut GridEngine,
    account: &mut SimAccount,
    id: crate::oms::OrderId,
    price: Money,
) -> TradingResult<Vec<Action>> {
    if let Some(order) = engine.ledger().get(id) {
        account.apply_fill(order.side, order.quantity, price);
    }
    engine.on_fill(id, price)
}

/// Carry out engine actions; market orders fill immediately at `close`
fn simulate(
    engine: &mut GridEngine,
    account: &mut SimAccount,
    actions: Vec<Action>,
    close: Money,
) -> TradingResult<()> {
    let mut queue: VecDeque<Action> = actions.into();
    while let Some(action) = queue.pop_front() {
        let Action::Submit(id) = action else {
            continue;
        };
        let is_market = engine.ledger().get(id).is_some_and(|o| o.is_market());
        if is_market {
            queue.extend(fill_order(engine, account, id, close)?);
        }
    }
    Ok(())
}
