//! Integration tests for the fibgrid system
//!
//! These tests drive full cycles through the backtest and the live runner
//! over hand-built price paths with a scripted indicator feed.

use std::time::Duration;

use approx::assert_relative_eq;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc::UnboundedReceiver;

use fibgrid::backtest::Backtester;
use fibgrid::broker::{AccountSummary, Broker, BrokerEvent, PaperBroker};
use fibgrid::grid::GridPlanner;
use fibgrid::indicators::{BandOutput, IndicatorService};
use fibgrid::live::{LiveRunner, RunOutcome};
use fibgrid::oms::{OrderHandle, OrderSpec};
use fibgrid::risk::check_capital;
use fibgrid::{
    Candle, Config, CycleEvent, CycleOutcome, Money, PositionState, Side, Symbol, TradingError,
    TradingResult,
};

// =============================================================================
// Test Utilities
// =============================================================================

/// Emits a bullish crossover plus an overbought RSI when exactly
/// `signal_len` closes are supplied, and nothing otherwise.
struct ScriptedIndicators {
    signal_len: usize,
}

impl ScriptedIndicators {
    fn tail(&self, len: usize, prev: f64, curr: f64) -> Vec<Option<f64>> {
        if len != self.signal_len || len < 2 {
            return vec![None; len];
        }
        let mut series = vec![None; len - 2];
        series.push(Some(prev));
        series.push(Some(curr));
        series
    }
}

impl IndicatorService for ScriptedIndicators {
    fn sma(&self, closes: &[f64], window: usize) -> Vec<Option<f64>> {
        if window == 2 {
            self.tail(closes.len(), 1.12, 1.10)
        } else {
            self.tail(closes.len(), 1.11, 1.11)
        }
    }

    fn rsi(&self, closes: &[f64], _window: usize) -> Vec<Option<f64>> {
        self.tail(closes.len(), 50.0, 75.0)
    }

    fn bollinger(&self, closes: &[f64], _window: usize, _num_std: f64) -> BandOutput {
        let none = vec![None; closes.len()];
        (none.clone(), none.clone(), none)
    }
}

fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle::new_unchecked(
        Utc.with_ymd_and_hms(2024, 8, 15, 0, 0, 0).unwrap() + chrono::Duration::hours(i),
        open,
        high,
        low,
        close,
        0.0,
    )
}

/// Four bars of history; the last one triggers a long at 1.1000 with a
/// 1.0900 - 1.1100 range
fn history() -> Vec<Candle> {
    vec![
        bar(0, 1.1000, 1.1005, 1.0995, 1.1000),
        bar(1, 1.1000, 1.1100, 1.0990, 1.1050),
        bar(2, 1.1050, 1.1060, 1.0900, 1.0950),
        bar(3, 1.0950, 1.1005, 1.0945, 1.1000),
    ]
}

/// Dips through rung 1, then rallies through the rebalanced target
fn take_profit_path() -> Vec<Candle> {
    let mut bars = history();
    bars.push(bar(4, 1.1000, 1.1005, 1.0945, 1.0950));
    bars.push(bar(5, 1.0950, 1.1095, 1.0945, 1.1090));
    bars.push(bar(6, 1.1090, 1.1095, 1.1085, 1.1090));
    bars.push(bar(7, 1.1090, 1.1095, 1.1085, 1.1090));
    bars
}

/// Dips through rungs 1 and 2 and keeps falling
fn drawdown_path() -> Vec<Candle> {
    let mut bars = history();
    bars.push(bar(4, 1.1000, 1.1005, 1.0945, 1.0950));
    bars.push(bar(5, 1.0950, 1.0955, 1.0905, 1.0910));
    bars.push(bar(6, 1.0910, 1.0915, 1.0880, 1.0890));
    bars.push(bar(7, 1.0890, 1.0895, 1.0870, 1.0880));
    bars
}

/// Rallies through the first rung of a short ladder, then drops through the
/// rebalanced target
fn short_take_profit_path() -> Vec<Candle> {
    let mut bars = history();
    bars.push(bar(4, 1.1000, 1.1055, 1.0995, 1.1050));
    bars.push(bar(5, 1.1050, 1.1055, 1.0905, 1.0910));
    bars.push(bar(6, 1.0910, 1.0915, 1.0905, 1.0910));
    bars.push(bar(7, 1.0910, 1.0915, 1.0905, 1.0910));
    bars
}

fn test_config(max_drawdown: f64) -> Config {
    let mut config = Config::default();
    config.strategy.sma_short = 2;
    config.strategy.sma_long = 3;
    config.strategy.fibonacci_lookback = 4;
    config.trading.base_size = 10_000.0;
    config.trading.martingale_multiplier = 1.5;
    config.trading.martingale_rungs = 3;
    config.trading.take_profit = 0.01;
    config.trading.max_drawdown = max_drawdown;
    config.trading.poll_interval_ms = 1;
    config.trading.monitor_interval_ms = 1;
    config.trading.cooldown_ms = 1;
    config.backtest.initial_cash = 100_000.0;
    config
}

fn m(value: f64) -> Money {
    Money::from_f64(value)
}

fn backtest(config: Config, bars: &[Candle]) -> fibgrid::backtest::BacktestResult {
    Backtester::with_indicators(config, ScriptedIndicators { signal_len: 4 })
        .run(bars)
        .unwrap()
}

struct PaperSession {
    outcome: TradingResult<RunOutcome>,
    events: Vec<CycleEvent>,
    cash: Money,
    cycles: usize,
}

async fn paper_run(config: Config, bars: Vec<Candle>) -> PaperSession {
    let warmup = config.warmup_bars();
    let broker = PaperBroker::new(bars, m(config.backtest.initial_cash), warmup);
    let mut runner = LiveRunner::new(config, broker, ScriptedIndicators { signal_len: 4 });
    let outcome = tokio::time::timeout(Duration::from_secs(10), runner.run())
        .await
        .expect("live runner timed out");
    PaperSession {
        outcome,
        events: runner.events().to_vec(),
        cash: runner.broker().account().cash,
        cycles: runner.cycles(),
    }
}

/// Paper venue that refuses the first market order it is sent
struct RejectFirstMarket {
    inner: PaperBroker,
    submits: usize,
    rejected: bool,
}

#[async_trait]
impl Broker for RejectFirstMarket {
    async fn connect(&mut self) -> TradingResult<AccountSummary> {
        self.inner.connect().await
    }

    async fn fetch_historical_bars(
        &mut self,
        symbol: &Symbol,
        interval: &str,
        duration: &str,
    ) -> TradingResult<Vec<Candle>> {
        self.inner
            .fetch_historical_bars(symbol, interval, duration)
            .await
    }

    async fn fetch_account_equity(&mut self) -> TradingResult<Money> {
        self.inner.fetch_account_equity().await
    }

    async fn fetch_quote(&mut self, symbol: &Symbol) -> TradingResult<Money> {
        self.inner.fetch_quote(symbol).await
    }

    async fn submit_order(&mut self, spec: &OrderSpec) -> TradingResult<OrderHandle> {
        self.submits += 1;
        if spec.limit_price.is_none() && !self.rejected {
            self.rejected = true;
            return Err(TradingError::OrderRejected {
                order: spec.client_id,
                reason: "insufficient margin".to_string(),
            });
        }
        self.inner.submit_order(spec).await
    }

    async fn cancel_order(&mut self, handle: OrderHandle) -> TradingResult<()> {
        self.inner.cancel_order(handle).await
    }

    fn subscribe(&mut self) -> UnboundedReceiver<BrokerEvent> {
        self.inner.subscribe()
    }
}

// =============================================================================
// Backtest Scenarios
// =============================================================================

#[test]
fn test_backtest_take_profit_cycle() {
    let result = backtest(test_config(0.10), &take_profit_path());

    assert_eq!(
        result.events,
        vec![
            CycleEvent::Opened {
                side: Side::Buy,
                price: m(1.1),
            },
            CycleEvent::RungFilled {
                rung: 1,
                take_profit: m(1.1082),
                size: m(25_000.0),
            },
            CycleEvent::TakeProfitFilled { price: m(1.1082) },
            CycleEvent::Closed {
                outcome: CycleOutcome::TakeProfit,
            },
        ]
    );
    assert_eq!(result.cycles, 1);
    assert!(!result.halted);
    assert!(!result.open_position);
    assert_eq!(result.ending_equity, m(100_275.5));
    assert_eq!(result.profit, m(275.5));
    assert_relative_eq!(result.profit_pct(), 0.2755, epsilon = 1e-9);
}

#[test]
fn test_backtest_drawdown_liquidates_and_halts() {
    let result = backtest(test_config(0.001), &drawdown_path());

    assert_eq!(
        result.events,
        vec![
            CycleEvent::Opened {
                side: Side::Buy,
                price: m(1.1),
            },
            CycleEvent::RungFilled {
                rung: 1,
                take_profit: m(1.1082),
                size: m(25_000.0),
            },
            CycleEvent::RungFilled {
                rung: 2,
                take_profit: m(1.1059),
                size: m(47_500.0),
            },
            CycleEvent::DrawdownBreached {
                flatten: m(47_500.0),
            },
            CycleEvent::Liquidated { price: m(1.091) },
            CycleEvent::Closed {
                outcome: CycleOutcome::Liquidated,
            },
        ]
    );
    assert!(result.halted);
    assert_eq!(result.cycles, 0);
    assert_eq!(result.ending_equity, m(99_814.0));
    assert!(result.ending_equity < m(99_900.0));
}

#[test]
fn test_backtest_within_limit_keeps_position_open() {
    let result = backtest(test_config(0.10), &drawdown_path());

    assert!(!result.halted);
    assert!(result.open_position);
    // Rung 3 at 1.0900 fills on the 1.0890 close
    assert!(matches!(
        result.events.last(),
        Some(CycleEvent::RungFilled { rung: 3, size, .. }) if *size == m(81_250.0)
    ));
}

#[test]
fn test_backtest_monitor_forever_rearms() {
    let mut config = test_config(0.10);
    config.trading.monitor_forever = true;
    let result = backtest(config, &take_profit_path());

    assert_eq!(result.cycles, 1);
    assert_eq!(result.bars, 8);
    assert!(!result.open_position);
    // The scripted feed only fires once, so the re-armed engine stays idle
    assert_eq!(result.events.len(), 4);
}

#[test]
fn test_counter_trend_short_cycle() {
    let mut config = test_config(0.10);
    config.strategy.trending = false;
    let result = backtest(config, &short_take_profit_path());

    assert_eq!(
        result.events,
        vec![
            CycleEvent::Opened {
                side: Side::Sell,
                price: m(1.1),
            },
            CycleEvent::RungFilled {
                rung: 1,
                take_profit: m(1.0918),
                size: m(25_000.0),
            },
            CycleEvent::TakeProfitFilled { price: m(1.0918) },
            CycleEvent::Closed {
                outcome: CycleOutcome::TakeProfit,
            },
        ]
    );
    assert_eq!(result.cycles, 1);
    assert_eq!(result.ending_equity, m(100_275.5));
}

// =============================================================================
// Capital Pre-flight
// =============================================================================

#[test]
fn test_capital_check_against_quote_currency_account() {
    let planner = GridPlanner::new(m(10_000.0), m(1.5), 3, m(0.01));
    assert_eq!(planner.max_exposure(), m(81_250.0));

    let account = AccountSummary {
        home_currency: "USD".to_string(),
        available_funds: m(100_000.0),
        net_liquidation: m(100_000.0),
    };
    let exposure = check_capital(&Symbol::new("EURUSD"), &planner, &account, m(1.1)).unwrap();
    assert_eq!(exposure, m(89_375.0));

    let small = AccountSummary {
        available_funds: m(99_000.0),
        ..account.clone()
    };
    assert!(matches!(
        check_capital(&Symbol::new("EURUSD"), &planner, &small, m(1.1)),
        Err(TradingError::InsufficientCapital { .. })
    ));

    let foreign = AccountSummary {
        home_currency: "JPY".to_string(),
        ..account
    };
    assert!(matches!(
        check_capital(&Symbol::new("EURUSD"), &planner, &foreign, m(1.1)),
        Err(TradingError::ForeignPair { .. })
    ));
}

// =============================================================================
// Live Runner against the Paper Venue
// =============================================================================

#[tokio::test]
async fn test_live_take_profit_matches_backtest() {
    let config = test_config(0.10);
    let expected = backtest(config.clone(), &take_profit_path());

    let session = paper_run(config, take_profit_path()).await;
    assert_eq!(session.outcome.unwrap(), RunOutcome::Completed);
    assert_eq!(session.events, expected.events);
    assert_eq!(session.cash, expected.ending_equity);
    assert_eq!(session.cycles, 1);
}

#[tokio::test]
async fn test_live_drawdown_matches_backtest() {
    let config = test_config(0.001);
    let expected = backtest(config.clone(), &drawdown_path());

    let session = paper_run(config, drawdown_path()).await;
    assert_eq!(session.outcome.unwrap(), RunOutcome::Halted);
    assert_eq!(session.events, expected.events);
    assert_eq!(session.cash, expected.ending_equity);
}

#[tokio::test]
async fn test_live_short_cycle_matches_backtest() {
    let mut config = test_config(0.10);
    config.strategy.trending = false;
    let expected = backtest(config.clone(), &short_take_profit_path());

    let session = paper_run(config, short_take_profit_path()).await;
    assert_eq!(session.outcome.unwrap(), RunOutcome::Completed);
    assert_eq!(session.events, expected.events);
    assert_eq!(session.cash, expected.ending_equity);
}

#[tokio::test]
async fn test_live_monitor_forever_rearms_after_cooldown() {
    let mut config = test_config(0.10);
    config.trading.monitor_forever = true;
    let expected = backtest(config.clone(), &take_profit_path());

    let session = paper_run(config, take_profit_path()).await;
    // Re-armed and kept polling until the replay ran out
    assert!(matches!(
        session.outcome,
        Err(TradingError::ConnectionFailure(_))
    ));
    assert_eq!(session.cycles, 1);
    assert_eq!(session.events, expected.events);
    assert_eq!(session.cash, expected.ending_equity);
}

#[tokio::test]
async fn test_live_rejected_opening_order_returns_to_idle() {
    let config = test_config(0.10);
    let warmup = config.warmup_bars();
    let bars = take_profit_path();
    let last = bars.len() - 1;
    let broker = RejectFirstMarket {
        inner: PaperBroker::new(bars, m(100_000.0), warmup),
        submits: 0,
        rejected: false,
    };
    let mut runner = LiveRunner::new(config, broker, ScriptedIndicators { signal_len: 4 });

    let outcome = tokio::time::timeout(Duration::from_secs(10), runner.run())
        .await
        .expect("live runner timed out");

    // The cycle aborted and the runner went back to polling the feed
    assert!(matches!(outcome, Err(TradingError::ConnectionFailure(_))));
    assert_eq!(runner.engine().state(), PositionState::Idle);
    assert!(runner.events().is_empty());
    assert_eq!(runner.broker().submits, 1);
    assert_eq!(runner.broker().inner.cursor(), Some(last));
    assert!(runner.broker().inner.account().is_flat());
}

#[tokio::test]
async fn test_live_rejects_underfunded_account() {
    let mut config = test_config(0.10);
    config.backtest.initial_cash = 50_000.0;
    let warmup = config.warmup_bars();
    let broker = PaperBroker::new(take_profit_path(), m(50_000.0), warmup);
    let mut runner = LiveRunner::new(config, broker, ScriptedIndicators { signal_len: 4 });

    assert!(matches!(
        runner.run().await,
        Err(TradingError::InsufficientCapital { .. })
    ));
    assert_eq!(runner.engine().state(), PositionState::Idle);
    assert!(runner.events().is_empty());
}
