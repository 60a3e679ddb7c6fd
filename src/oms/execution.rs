//! Simulated execution against bar closes
//!
//! Shared by the backtest runner and the paper venue so both produce the same
//! fills and the same equity for a given price path.

use crate::oms::types::Order;
use crate::{Money, Side};

/// Price at which an order fills on a bar closing at `close`, if it fills.
///
/// Orders without a limit are market orders and fill at the close. A resting
/// Buy fills once the close is at or below its limit, a resting Sell once the
/// close is at or above it; both fill at the limit price.
pub fn fill_price(side: Side, limit_price: Option<Money>, close: Money) -> Option<Money> {
    match (limit_price, side) {
        (None, _) => Some(close),
        (Some(limit), Side::Buy) => (close <= limit).then_some(limit),
        (Some(limit), Side::Sell) => (close >= limit).then_some(limit),
    }
}

/// `fill_price` for a ledger order; terminal orders never fill
pub fn check_fill(order: &Order, close: Money) -> Option<Money> {
    if !order.is_pending() {
        return None;
    }
    fill_price(order.side, order.limit_price, close)
}

/// Cash plus a signed base-currency position, valued in the quote currency
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimAccount {
    pub cash: Money,
    /// Positive when long, negative when short
    pub position: Money,
}

impl SimAccount {
    pub fn new(cash: Money) -> Self {
        Self {
            cash,
            position: Money::ZERO,
        }
    }

    /// Buys debit cash and sells credit it, symmetrically
    pub fn apply_fill(&mut self, side: Side, quantity: Money, price: Money) {
        let signed = side.sign() * quantity;
        self.cash -= signed * price;
        self.position += signed;
    }

    /// Mark-to-market equity at `mark`
    pub fn equity(&self, mark: Money) -> Money {
        self.cash + self.position * mark
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_zero()
    }
}
