//! Core OMS types
//!
//! Orders, their identities and the specs sent to a venue.
//! Uses Money for all prices and sizes.

use crate::{Money, Side, Symbol};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger-assigned order identity, sequential per ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Venue-assigned handle returned by a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderHandle(pub u64);

impl fmt::Display for OrderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "venue-{}", self.0)
    }
}

/// What an order is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Fills immediately at the prevailing price; opens or flattens a position
    Market,

    /// Martingale rung `n` (1-based), a resting limit order
    GridRung(usize),

    /// Resting limit order closing the whole filled exposure
    TakeProfit,
}

/// Order lifecycle. Filled and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Money,
    /// Absent for market orders
    pub limit_price: Option<Money>,
    pub status: OrderStatus,
    pub handle: Option<OrderHandle>,
    pub fill_price: Option<Money>,
}

impl Order {
    pub(crate) fn new(
        id: OrderId,
        side: Side,
        kind: OrderKind,
        quantity: Money,
        limit_price: Option<Money>,
    ) -> Self {
        Self {
            id,
            side,
            kind,
            quantity,
            limit_price,
            status: OrderStatus::Pending,
            handle: None,
            fill_price: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    pub fn is_market(&self) -> bool {
        self.kind == OrderKind::Market
    }

    pub fn rung(&self) -> Option<usize> {
        match self.kind {
            OrderKind::GridRung(n) => Some(n),
            _ => None,
        }
    }

    /// Venue submission for this order
    pub fn spec(&self, symbol: &Symbol) -> OrderSpec {
        OrderSpec {
            client_id: self.id,
            symbol: symbol.clone(),
            side: self.side,
            quantity: self.quantity,
            limit_price: self.limit_price,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.limit_price {
            Some(price) => write!(
                f,
                "{} {:?} {} {} @ {}",
                self.id, self.kind, self.side, self.quantity, price
            ),
            None => write!(
                f,
                "{} {:?} {} {}",
                self.id, self.kind, self.side, self.quantity
            ),
        }
    }
}

/// What a venue needs to accept an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub client_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Money,
    pub limit_price: Option<Money>,
}
