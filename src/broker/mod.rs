//! Broker session seam
//!
//! The live runner only talks to a venue through `Broker`. Fill and status
//! notifications are not callbacks: the venue pushes them into an unbounded
//! channel handed out by `subscribe`, and the runner drains it from its single
//! control flow.

pub mod paper;

pub use paper::PaperBroker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::TradingResult;
use crate::oms::{OrderHandle, OrderSpec};
use crate::{Candle, Money, Symbol};

/// Account snapshot reported on connect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    /// Currency the available funds are denominated in
    pub home_currency: String,
    pub available_funds: Money,
    pub net_liquidation: Money,
}

/// Terminal status reported by the venue for a working order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VenueStatus {
    Cancelled,
    Rejected(String),
}

/// Asynchronous notification from the venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BrokerEvent {
    Fill {
        handle: OrderHandle,
        price: Money,
        quantity: Money,
    },
    Status {
        handle: OrderHandle,
        status: VenueStatus,
    },
}

impl BrokerEvent {
    pub fn handle(&self) -> OrderHandle {
        match self {
            BrokerEvent::Fill { handle, .. } | BrokerEvent::Status { handle, .. } => *handle,
        }
    }
}

/// A trading venue session. Every call is a fallible remote call.
#[async_trait]
pub trait Broker: Send {
    /// Open the session and report the account
    async fn connect(&mut self) -> TradingResult<AccountSummary>;

    /// Bars for `symbol` at `interval` covering `duration`, oldest first
    async fn fetch_historical_bars(
        &mut self,
        symbol: &Symbol,
        interval: &str,
        duration: &str,
    ) -> TradingResult<Vec<Candle>>;

    /// Current net liquidation value
    async fn fetch_account_equity(&mut self) -> TradingResult<Money>;

    /// Current exchange rate for `symbol`
    async fn fetch_quote(&mut self, symbol: &Symbol) -> TradingResult<Money>;

    async fn submit_order(&mut self, spec: &OrderSpec) -> TradingResult<OrderHandle>;

    /// Best effort: the order may fill before the cancel lands
    async fn cancel_order(&mut self, handle: OrderHandle) -> TradingResult<()>;

    /// Event stream for orders submitted through this session
    fn subscribe(&mut self) -> UnboundedReceiver<BrokerEvent>;
}
