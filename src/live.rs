//! Live runner
//!
//! Drives `GridEngine` against a `Broker` session:
//! - Idle: poll bars, evaluate the signal, sleep `poll_interval` when nothing fires
//! - Open cycle: suspend on the broker event channel or the equity timer
//! - Closed: halt after a drawdown liquidation, otherwise exit or re-arm
//!
//! Events are preferred over the timer, and any already-delivered events are
//! drained before each drawdown evaluation, so the engine always judges
//! equity with every known fill applied.

use std::time::Duration;
use tokio::sync::mpsc::{Receiver, UnboundedReceiver};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, BrokerEvent, VenueStatus};
use crate::config::Config;
use crate::engine::{Action, CycleEvent, CycleOutcome, GridEngine, PositionState};
use crate::error::{TradingError, TradingResult};
use crate::grid::GridPlanner;
use crate::indicators::IndicatorService;
use crate::risk::{check_capital, DrawdownGuard};
use crate::signal::{EntrySignal, SignalAggregator};
use crate::{Money, Symbol};

/// Why `LiveRunner::run` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Take-profit reached and the runner is not set to monitor forever
    Completed,
    /// Drawdown liquidation; trading stops to preserve capital
    Halted,
    Shutdown,
}

/// Resolves when a shutdown is requested; never resolves without a receiver
async fn shutdown_requested(rx: &mut Option<Receiver<()>>) {
    match rx {
        Some(rx) => {
            if rx.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

/// Sleep for `duration`; true if a shutdown arrived first
async fn pause(duration: Duration, shutdown: &mut Option<Receiver<()>>) -> bool {
    tokio::select! {
        _ = sleep(duration) => false,
        _ = shutdown_requested(shutdown) => true,
    }
}

pub struct LiveRunner<B: Broker, I: IndicatorService> {
    config: Config,
    symbol: Symbol,
    broker: B,
    indicators: I,
    aggregator: SignalAggregator,
    engine: GridEngine,
    shutdown: Option<Receiver<()>>,
    cycles: usize,
}

impl<B: Broker, I: IndicatorService> LiveRunner<B, I> {
    pub fn new(config: Config, broker: B, indicators: I) -> Self {
        let symbol = config.symbol();
        let engine = GridEngine::new(
            symbol.clone(),
            GridPlanner::from_config(&config.trading),
            DrawdownGuard::new(Money::from_f64(config.trading.max_drawdown)),
        );
        Self {
            aggregator: SignalAggregator::from_config(&config.strategy),
            symbol,
            config,
            broker,
            indicators,
            engine,
            shutdown: None,
            cycles: 0,
        }
    }

    /// Stop at the next suspension point when a message arrives on `rx`
    pub fn with_shutdown(mut self, rx: Receiver<()>) -> Self {
        self.shutdown = Some(rx);
        self
    }

    pub fn engine(&self) -> &GridEngine {
        &self.engine
    }

    pub fn events(&self) -> &[CycleEvent] {
        self.engine.events()
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Completed take-profit cycles
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub async fn run(&mut self) -> TradingResult<RunOutcome> {
        let mut shutdown = self.shutdown.take();

        let account = self.broker.connect().await?;
        info!(
            "Account: home currency {}, available funds {}, net liquidation {}",
            account.home_currency, account.available_funds, account.net_liquidation
        );
        let quote = self.broker.fetch_quote(&self.symbol).await?;
        check_capital(&self.symbol, self.engine.planner(), &account, quote)?;

        let mut events = self.broker.subscribe();
        let poll = self.config.trading.poll_interval();

        loop {
            let entry = match self.poll_signal().await {
                Ok(entry) => entry,
                Err(e) if e.is_retryable() => {
                    warn!("{}. Retrying in {:?}", e, poll);
                    None
                }
                Err(e) => return Err(e),
            };

            let Some(entry) = entry else {
                if pause(poll, &mut shutdown).await {
                    info!("Shutdown requested while idle");
                    return Ok(RunOutcome::Shutdown);
                }
                continue;
            };

            let outcome = match self.run_cycle(entry, &mut events, &mut shutdown).await {
                Ok(outcome) => outcome,
                Err(e @ TradingError::OrderRejected { .. })
                    if self.engine.state() == PositionState::Idle =>
                {
                    warn!("{}. Cycle aborted.", e);
                    if pause(poll, &mut shutdown).await {
                        return Ok(RunOutcome::Shutdown);
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            match outcome {
                None => {
                    warn!(
                        "Shutdown requested in state {:?}; working orders stay at the venue",
                        self.engine.state()
                    );
                    return Ok(RunOutcome::Shutdown);
                }
                Some(CycleOutcome::Liquidated) => {
                    warn!("Max drawdown liquidation complete. Halting.");
                    return Ok(RunOutcome::Halted);
                }
                Some(CycleOutcome::TakeProfit) => {
                    self.cycles += 1;
                    info!("Cycle {} closed at take profit", self.cycles);
                    if !self.config.trading.monitor_forever {
                        return Ok(RunOutcome::Completed);
                    }
                    if pause(self.config.trading.cooldown(), &mut shutdown).await {
                        return Ok(RunOutcome::Shutdown);
                    }
                    self.engine.reset();
                }
            }
        }
    }

    async fn poll_signal(&mut self) -> TradingResult<Option<EntrySignal>> {
        let strategy = &self.config.strategy;
        let bars = self
            .broker
            .fetch_historical_bars(&self.symbol, &strategy.bar_interval, &strategy.history_duration)
            .await?;
        if bars.len() < 2 {
            return Err(TradingError::DataUnavailable(format!(
                "{} bars for {}",
                bars.len(),
                self.symbol
            )));
        }
        debug!("Fetched {} bars for {}", bars.len(), self.symbol);
        Ok(self.aggregator.decide(&self.indicators, &bars, strategy))
    }

    /// One position from the opening order to Closed. `None` on shutdown.
    async fn run_cycle(
        &mut self,
        entry: EntrySignal,
        events: &mut UnboundedReceiver<BrokerEvent>,
        shutdown: &mut Option<Receiver<()>>,
    ) -> TradingResult<Option<CycleOutcome>> {
        let baseline = self.broker.fetch_account_equity().await?;
        info!(
            "Signal {} (sum {}). Baseline equity {}",
            entry.side,
            entry.signal.sum(),
            baseline
        );
        let actions = self
            .engine
            .open(entry.side, baseline, entry.high, entry.low)?;
        self.execute(actions).await?;

        let mut monitor = interval(self.config.trading.monitor_interval());
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
        monitor.tick().await;

        loop {
            if let Some(outcome) = self.engine.outcome() {
                return Ok(Some(outcome));
            }

            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await?,
                    None => {
                        return Err(TradingError::ConnectionFailure(
                            "broker event stream closed".to_string(),
                        ))
                    }
                },
                _ = monitor.tick() => {
                    let equity = self.broker.fetch_account_equity().await?;
                    self.drain(events).await?;
                    if self.engine.outcome().is_some() {
                        continue;
                    }
                    let actions = self.engine.on_equity(equity)?;
                    self.execute(actions).await?;
                }
                _ = shutdown_requested(shutdown) => return Ok(None),
            }
        }
    }

    /// Apply every event already waiting in the channel
    async fn drain(&mut self, events: &mut UnboundedReceiver<BrokerEvent>) -> TradingResult<()> {
        while let Ok(event) = events.try_recv() {
            self.handle_event(event).await?;
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: BrokerEvent) -> TradingResult<()> {
        let Some(id) = self.engine.id_for_handle(event.handle()) else {
            warn!("Event for unknown order {}: {:?}", event.handle(), event);
            return Ok(());
        };

        match event {
            BrokerEvent::Fill { price, .. } => match self.engine.on_fill(id, price) {
                Ok(actions) => self.execute(actions).await,
                // Already logged as critical; left for the operator.
                Err(TradingError::Ledger(_)) => Ok(()),
                Err(e) => Err(e),
            },
            BrokerEvent::Status {
                status: VenueStatus::Cancelled,
                ..
            } => {
                if let Err(e) = self.engine.on_cancelled(id) {
                    error!("Cancel status for {}: {}", id, e);
                }
                Ok(())
            }
            BrokerEvent::Status {
                status: VenueStatus::Rejected(reason),
                ..
            } => self.engine.on_rejected(id, &reason),
        }
    }

    async fn execute(&mut self, actions: Vec<Action>) -> TradingResult<()> {
        for action in actions {
            match action {
                Action::Submit(id) => {
                    let spec = self
                        .engine
                        .ledger()
                        .get(id)
                        .map(|order| order.spec(&self.symbol))
                        .ok_or(crate::oms::LedgerError::UnknownOrder(id))?;
                    match self.broker.submit_order(&spec).await {
                        Ok(handle) => {
                            debug!("Submitted {} as {}", id, handle);
                            self.engine.attach_handle(id, handle)?;
                        }
                        Err(TradingError::OrderRejected { reason, .. }) => {
                            self.engine.on_rejected(id, &reason)?;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Action::Cancel(id) => {
                    let handle = self.engine.ledger().get(id).and_then(|o| o.handle);
                    match handle {
                        Some(handle) => self.broker.cancel_order(handle).await?,
                        None => debug!("Cancel of {} never reached the venue", id),
                    }
                }
            }
        }
        Ok(())
    }
}
