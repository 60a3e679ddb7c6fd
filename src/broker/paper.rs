//! Paper venue replaying a bar series
//!
//! Orders are filled with the backtest rule against the current bar's close.
//! The replay cursor moves forward one bar per `fetch_historical_bars` call
//! and, while orders are working, one bar per `fetch_account_equity` call, so
//! each equity poll of the live runner sees exactly one new bar.

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use super::{AccountSummary, Broker, BrokerEvent, VenueStatus};
use crate::error::{TradingError, TradingResult};
use crate::oms::{fill_price, OrderHandle, OrderSpec, SimAccount};
use crate::{Candle, Money, Symbol};

#[derive(Debug, Clone)]
struct WorkingOrder {
    handle: OrderHandle,
    spec: OrderSpec,
}

pub struct PaperBroker {
    bars: Vec<Candle>,
    /// First bar served; earlier bars are history only
    warmup: usize,
    cursor: Option<usize>,
    home_currency: String,
    account: SimAccount,
    working: Vec<WorkingOrder>,
    next_handle: u64,
    events: Option<UnboundedSender<BrokerEvent>>,
}

impl PaperBroker {
    pub fn new(bars: Vec<Candle>, initial_cash: Money, warmup: usize) -> Self {
        Self {
            bars,
            warmup,
            cursor: None,
            home_currency: "USD".to_string(),
            account: SimAccount::new(initial_cash),
            working: Vec::new(),
            next_handle: 1,
            events: None,
        }
    }

    pub fn account(&self) -> &SimAccount {
        &self.account
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn working_orders(&self) -> usize {
        self.working.len()
    }

    fn exhausted() -> TradingError {
        TradingError::ConnectionFailure("paper feed exhausted".to_string())
    }

    /// Close of the current bar, or of the first served bar before replay starts
    fn mark(&self) -> TradingResult<Money> {
        let index = self.cursor.unwrap_or(self.warmup);
        self.bars
            .get(index)
            .map(Candle::close_money)
            .ok_or_else(|| TradingError::DataUnavailable("no bars to price against".into()))
    }

    fn advance(&mut self) -> TradingResult<usize> {
        let next = self.cursor.map_or(self.warmup, |c| c + 1);
        if next >= self.bars.len() {
            return Err(Self::exhausted());
        }
        self.cursor = Some(next);
        Ok(next)
    }

    fn emit(&self, event: BrokerEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening any more.
            let _ = tx.send(event);
        }
    }

    fn execute(&mut self, handle: OrderHandle, spec: &OrderSpec, price: Money) {
        self.account.apply_fill(spec.side, spec.quantity, price);
        debug!(
            "Paper fill {} {} {} @ {}",
            handle, spec.side, spec.quantity, price
        );
        self.emit(BrokerEvent::Fill {
            handle,
            price,
            quantity: spec.quantity,
        });
    }

    /// Evaluate a snapshot of working orders, in submission order, at `close`
    fn match_working(&mut self, close: Money) {
        let snapshot = std::mem::take(&mut self.working);
        for order in snapshot {
            match fill_price(order.spec.side, order.spec.limit_price, close) {
                Some(price) => self.execute(order.handle, &order.spec, price),
                None => self.working.push(order),
            }
        }
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn connect(&mut self) -> TradingResult<AccountSummary> {
        if self.bars.len() <= self.warmup {
            return Err(TradingError::ConnectionFailure(format!(
                "paper feed has {} bars, needs more than {}",
                self.bars.len(),
                self.warmup
            )));
        }
        let equity = self.account.equity(self.mark()?);
        info!(
            "Paper session connected: {} bars, replay from bar {}",
            self.bars.len(),
            self.warmup
        );
        Ok(AccountSummary {
            home_currency: self.home_currency.clone(),
            available_funds: self.account.cash,
            net_liquidation: equity,
        })
    }

    async fn fetch_historical_bars(
        &mut self,
        _symbol: &Symbol,
        _interval: &str,
        _duration: &str,
    ) -> TradingResult<Vec<Candle>> {
        let cursor = self.advance()?;
        Ok(self.bars[..=cursor].to_vec())
    }

    async fn fetch_account_equity(&mut self) -> TradingResult<Money> {
        if !self.working.is_empty() {
            let cursor = self.advance()?;
            let close = self.bars[cursor].close_money();
            self.match_working(close);
        }
        Ok(self.account.equity(self.mark()?))
    }

    async fn fetch_quote(&mut self, _symbol: &Symbol) -> TradingResult<Money> {
        self.mark()
    }

    async fn submit_order(&mut self, spec: &OrderSpec) -> TradingResult<OrderHandle> {
        let handle = OrderHandle(self.next_handle);
        self.next_handle += 1;

        if spec.limit_price.is_none() {
            let close = self.mark()?;
            self.execute(handle, spec, close);
        } else {
            self.working.push(WorkingOrder {
                handle,
                spec: spec.clone(),
            });
        }
        Ok(handle)
    }

    async fn cancel_order(&mut self, handle: OrderHandle) -> TradingResult<()> {
        let before = self.working.len();
        self.working.retain(|o| o.handle != handle);
        if self.working.len() < before {
            self.emit(BrokerEvent::Status {
                handle,
                status: VenueStatus::Cancelled,
            });
        }
        Ok(())
    }

    fn subscribe(&mut self) -> UnboundedReceiver<BrokerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }
}
