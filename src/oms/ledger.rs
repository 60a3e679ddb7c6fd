//! Order ledger: the single source of truth for order identity and status
//!
//! Orders are stored in submission order; `OrderId(n)` lives at index `n - 1`.
//! Status only moves Pending → Filled or Pending → Cancelled; both are sticky.

use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::grid::GridPlan;
use crate::oms::types::{Order, OrderHandle, OrderId, OrderKind, OrderStatus};
use crate::{Money, Side};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("unknown order {0}")]
    UnknownOrder(OrderId),

    #[error("a grid is already active for the current position")]
    GridAlreadyActive,

    /// The venue filled an order the ledger had already cancelled
    #[error("fill received for cancelled order {0}")]
    FillAfterCancel(OrderId),
}

/// Result of a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// Filled is sticky; the cancel is a no-op
    AlreadyFilled,
    AlreadyCancelled,
}

/// What a fill corresponds to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Market,
    Rung(usize),
    TakeProfit,
    /// Re-delivery of a fill already recorded
    Duplicate,
}

#[derive(Debug, Default)]
pub struct OrderLedger {
    orders: Vec<Order>,
    handles: HashMap<OrderHandle, OrderId>,
    grid_active: bool,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(
        &mut self,
        side: Side,
        kind: OrderKind,
        quantity: Money,
        limit_price: Option<Money>,
    ) -> Order {
        let id = OrderId(self.orders.len() as u64 + 1);
        let order = Order::new(id, side, kind, quantity, limit_price);
        debug!("Ledger: recorded {}", order);
        self.orders.push(order.clone());
        order
    }

    /// Record a market order
    pub fn open_market(&mut self, side: Side, size: Money) -> Order {
        self.insert(side, OrderKind::Market, size, None)
    }

    /// Record every rung of `plan` as a pending limit order, all at once
    pub fn place_grid(&mut self, plan: &GridPlan) -> Result<Vec<Order>, LedgerError> {
        if self.grid_active {
            return Err(LedgerError::GridAlreadyActive);
        }
        self.grid_active = true;
        Ok(plan
            .rungs
            .iter()
            .map(|rung| {
                self.insert(
                    plan.side,
                    OrderKind::GridRung(rung.index),
                    rung.size,
                    Some(rung.price),
                )
            })
            .collect())
    }

    /// Record a take-profit limit order
    pub fn place_take_profit(&mut self, side: Side, size: Money, price: Money) -> Order {
        self.insert(side, OrderKind::TakeProfit, size, Some(price))
    }

    /// Forget the active grid so the next position can place its own
    pub fn end_position(&mut self) {
        self.grid_active = false;
    }

    pub fn cancel(&mut self, id: OrderId) -> Result<CancelOutcome, LedgerError> {
        let order = self.get_mut(id)?;
        match order.status {
            OrderStatus::Pending => {
                order.status = OrderStatus::Cancelled;
                debug!("Ledger: cancelled {}", id);
                Ok(CancelOutcome::Cancelled)
            }
            OrderStatus::Filled => {
                debug!("Ledger: cancel of filled order {} ignored", id);
                Ok(CancelOutcome::AlreadyFilled)
            }
            OrderStatus::Cancelled => Ok(CancelOutcome::AlreadyCancelled),
        }
    }

    /// Mark an order filled at `price` and report what it was
    pub fn on_fill(&mut self, id: OrderId, price: Money) -> Result<FillOutcome, LedgerError> {
        let order = self.get_mut(id)?;
        match order.status {
            OrderStatus::Filled => {
                debug!("Ledger: duplicate fill for {} ignored", id);
                Ok(FillOutcome::Duplicate)
            }
            OrderStatus::Cancelled => Err(LedgerError::FillAfterCancel(id)),
            OrderStatus::Pending => {
                order.status = OrderStatus::Filled;
                order.fill_price = Some(price);
                Ok(match order.kind {
                    OrderKind::Market => FillOutcome::Market,
                    OrderKind::GridRung(n) => FillOutcome::Rung(n),
                    OrderKind::TakeProfit => FillOutcome::TakeProfit,
                })
            }
        }
    }

    /// A venue refusal leaves the order cancelled
    pub fn reject(&mut self, id: OrderId) -> Result<OrderKind, LedgerError> {
        let order = self.get_mut(id)?;
        if order.status == OrderStatus::Pending {
            order.status = OrderStatus::Cancelled;
        } else {
            warn!(
                "Ledger: rejection for {} arrived in terminal state {:?}",
                id, order.status
            );
        }
        Ok(order.kind)
    }

    pub fn attach_handle(&mut self, id: OrderId, handle: OrderHandle) -> Result<(), LedgerError> {
        self.get_mut(id)?.handle = Some(handle);
        self.handles.insert(handle, id);
        Ok(())
    }

    pub fn id_for_handle(&self, handle: OrderHandle) -> Option<OrderId> {
        self.handles.get(&handle).copied()
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        let idx = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.orders.get(idx)
    }

    fn get_mut(&mut self, id: OrderId) -> Result<&mut Order, LedgerError> {
        usize::try_from(id.0)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| self.orders.get_mut(idx))
            .ok_or(LedgerError::UnknownOrder(id))
    }

    /// Pending orders in submission order
    pub fn pending(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(|o| o.is_pending())
    }

    /// Snapshot of pending ids, safe to iterate while mutating the ledger
    pub fn pending_ids(&self) -> Vec<OrderId> {
        self.pending().map(|o| o.id).collect()
    }

    /// Pending rung ids in submission order
    pub fn pending_rungs(&self) -> Vec<OrderId> {
        self.pending()
            .filter(|o| matches!(o.kind, OrderKind::GridRung(_)))
            .map(|o| o.id)
            .collect()
    }

    pub fn live_take_profits(&self) -> usize {
        self.pending()
            .filter(|o| o.kind == OrderKind::TakeProfit)
            .count()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
