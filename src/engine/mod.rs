//! Grid cycle state machine
//!
//! `GridEngine` owns the order ledger, the current position and the drawdown
//! guard. It reacts to three inputs (fills, venue rejections, equity
//! observations) and answers with the venue actions to perform. It never
//! talks to a venue itself, so the live runner and the backtest drive the
//! exact same transitions.

pub mod position;
pub mod rebalancer;

pub use position::{CycleOutcome, Position, PositionState};
pub use rebalancer::TakeProfitRebalancer;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{TradingError, TradingResult};
use crate::grid::GridPlanner;
use crate::oms::{CancelOutcome, FillOutcome, OrderHandle, OrderId, OrderKind, OrderLedger};
use crate::risk::DrawdownGuard;
use crate::{Money, Side, Symbol};

/// Venue-side effect requested by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Submit(OrderId),
    Cancel(OrderId),
}

/// Observable milestones of a cycle; identical between backtest and live runs
/// of the same price path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CycleEvent {
    Opened { side: Side, price: Money },
    RungFilled { rung: usize, take_profit: Money, size: Money },
    TakeProfitFilled { price: Money },
    DrawdownBreached { flatten: Money },
    Liquidated { price: Money },
    Closed { outcome: CycleOutcome },
}

pub struct GridEngine {
    symbol: Symbol,
    planner: GridPlanner,
    guard: DrawdownGuard,
    ledger: OrderLedger,
    position: Option<Position>,
    events: Vec<CycleEvent>,
}

impl GridEngine {
    pub fn new(symbol: Symbol, planner: GridPlanner, guard: DrawdownGuard) -> Self {
        Self {
            symbol,
            planner,
            guard,
            ledger: OrderLedger::new(),
            position: None,
            events: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn state(&self) -> PositionState {
        self.position
            .as_ref()
            .map_or(PositionState::Idle, |p| p.state)
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    pub fn planner(&self) -> &GridPlanner {
        &self.planner
    }

    pub fn events(&self) -> &[CycleEvent] {
        &self.events
    }

    pub fn outcome(&self) -> Option<CycleOutcome> {
        self.position.as_ref().and_then(|p| p.outcome)
    }

    fn invalid(&self, event: &'static str) -> TradingError {
        TradingError::InvalidTransition {
            from: self.state(),
            event,
        }
    }

    /// Idle → Opening: record the market order and arm the guard at `baseline`
    pub fn open(
        &mut self,
        side: Side,
        baseline: Money,
        high: Money,
        low: Money,
    ) -> TradingResult<Vec<Action>> {
        if self.state() != PositionState::Idle {
            return Err(self.invalid("open"));
        }
        let order = self
            .ledger
            .open_market(side, self.planner.base_size());
        info!(
            "Opening {} {} {} (range {} - {})",
            side,
            order.quantity,
            self.symbol,
            low,
            high
        );
        self.guard.arm(baseline);
        self.position = Some(Position::opening(side, order.id, high, low));
        Ok(vec![Action::Submit(order.id)])
    }

    pub fn attach_handle(&mut self, id: OrderId, handle: OrderHandle) -> TradingResult<()> {
        Ok(self.ledger.attach_handle(id, handle)?)
    }

    pub fn id_for_handle(&self, handle: OrderHandle) -> Option<OrderId> {
        self.ledger.id_for_handle(handle)
    }

    /// Apply a fill for `id` at `price`
    pub fn on_fill(&mut self, id: OrderId, price: Money) -> TradingResult<Vec<Action>> {
        let outcome = match self.ledger.on_fill(id, price) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("CRITICAL: {} (exposure may be unprotected)", e);
                return Err(e.into());
            }
        };

        let Some(position) = self.position.as_mut() else {
            warn!("Fill for {} with no open position", id);
            return Ok(vec![]);
        };

        match outcome {
            FillOutcome::Duplicate => Ok(vec![]),
            FillOutcome::Market if id == position.entry_order => {
                Self::on_entry_fill(
                    &mut self.ledger,
                    &self.planner,
                    position,
                    price,
                    &mut self.events,
                )
            }
            FillOutcome::Market if Some(id) == position.liquidation => {
                info!("Liquidation filled @ {}. Cycle closed.", price);
                position.close(CycleOutcome::Liquidated);
                self.guard.disarm();
                self.ledger.end_position();
                self.events.push(CycleEvent::Liquidated { price });
                self.events.push(CycleEvent::Closed {
                    outcome: CycleOutcome::Liquidated,
                });
                Ok(vec![])
            }
            FillOutcome::Market => {
                warn!("Unexpected market fill for {}", id);
                Ok(vec![])
            }
            FillOutcome::Rung(rung) => {
                if position.state != PositionState::GridActive {
                    warn!(
                        "Rung {} filled in state {:?}; not rebalancing",
                        rung, position.state
                    );
                    return Ok(vec![]);
                }
                TakeProfitRebalancer::on_rung_fill(
                    &mut self.ledger,
                    position,
                    rung,
                    &mut self.events,
                )
            }
            FillOutcome::TakeProfit => {
                if position.state != PositionState::GridActive {
                    warn!("Take profit filled in state {:?}", position.state);
                    return Ok(vec![]);
                }
                let actions = TakeProfitRebalancer::on_take_profit_fill(
                    &mut self.ledger,
                    position,
                    price,
                    &mut self.events,
                )?;
                self.guard.disarm();
                self.ledger.end_position();
                Ok(actions)
            }
        }
    }

    /// Opening → GridActive: plan the ladder and place it with the initial target
    fn on_entry_fill(
        ledger: &mut OrderLedger,
        planner: &GridPlanner,
        position: &mut Position,
        price: Money,
        events: &mut Vec<CycleEvent>,
    ) -> TradingResult<Vec<Action>> {
        info!("Market order filled @ {}", price);
        let plan = planner.plan(position.side, price, position.high, position.low);

        let mut actions: Vec<Action> = ledger
            .place_grid(&plan)?
            .iter()
            .map(|order| {
                info!("Placing limit order: {}", order);
                Action::Submit(order.id)
            })
            .collect();

        let tp = ledger.place_take_profit(
            position.side.opposite(),
            plan.base_size,
            plan.initial_take_profit,
        );
        info!("Placing take profit: {}", tp);
        actions.push(Action::Submit(tp.id));

        position.entry_price = Some(price);
        position.take_profit = Some(tp.id);
        position.plan = Some(plan);
        position.state = PositionState::GridActive;
        events.push(CycleEvent::Opened {
            side: position.side,
            price,
        });
        Ok(actions)
    }

    /// Apply a venue refusal.
    ///
    /// A refused opening order aborts the cycle back to Idle and is returned
    /// as an error. A refused grid or take-profit order is logged and the
    /// cycle continues without it.
    pub fn on_rejected(&mut self, id: OrderId, reason: &str) -> TradingResult<()> {
        let kind = self.ledger.reject(id)?;
        let entry = self.position.as_ref().map(|p| p.entry_order);

        match kind {
            OrderKind::Market if Some(id) == entry => {
                warn!("Opening order {} rejected: {}. Back to idle.", id, reason);
                self.position = None;
                self.guard.disarm();
                self.ledger.end_position();
                Err(TradingError::OrderRejected {
                    order: id,
                    reason: reason.to_string(),
                })
            }
            OrderKind::Market => {
                error!(
                    "CRITICAL: liquidation order {} rejected: {}. Position left open.",
                    id, reason
                );
                Err(TradingError::OrderRejected {
                    order: id,
                    reason: reason.to_string(),
                })
            }
            OrderKind::GridRung(n) => {
                error!(
                    "CRITICAL: grid rung {} ({}) rejected: {}. Grid incomplete.",
                    n, id, reason
                );
                Ok(())
            }
            OrderKind::TakeProfit => {
                error!(
                    "CRITICAL: take profit {} rejected: {}. Position has no exit target.",
                    id, reason
                );
                if let Some(position) = self.position.as_mut() {
                    if position.take_profit == Some(id) {
                        position.take_profit = None;
                    }
                }
                Ok(())
            }
        }
    }

    /// Venue reported a cancellation; a no-op when the engine requested it
    pub fn on_cancelled(&mut self, id: OrderId) -> TradingResult<()> {
        if self.ledger.cancel(id)? == CancelOutcome::Cancelled {
            warn!("Venue cancelled {} unprompted", id);
        }
        Ok(())
    }

    /// Compare `equity` against the drawdown floor and liquidate on breach
    pub fn on_equity(&mut self, equity: Money) -> TradingResult<Vec<Action>> {
        let Some(position) = self.position.as_mut() else {
            return Ok(vec![]);
        };
        if !position.state.is_guarded() {
            return Ok(vec![]);
        }
        if !self.guard.is_breached(equity) {
            if let Some(pct) = self.guard.change_pct(equity) {
                info!("Monitoring open orders and balance [{:.2}%]", pct);
            }
            return Ok(vec![]);
        }

        warn!(
            "Max drawdown reached: equity {} below floor {}. Closing all orders.",
            equity,
            self.guard.floor().unwrap_or(Money::ZERO)
        );

        let mut actions = Vec::new();
        for id in self.ledger.pending_ids() {
            if self.ledger.cancel(id)? == CancelOutcome::Cancelled {
                actions.push(Action::Cancel(id));
            }
        }
        position.take_profit = None;

        if position.state == PositionState::Opening {
            // Entry never filled: nothing to flatten.
            position.close(CycleOutcome::Liquidated);
            self.guard.disarm();
            self.ledger.end_position();
            self.events.push(CycleEvent::DrawdownBreached {
                flatten: Money::ZERO,
            });
            self.events.push(CycleEvent::Closed {
                outcome: CycleOutcome::Liquidated,
            });
            return Ok(actions);
        }

        let size = position.exposure();
        let order = self.ledger.open_market(position.side.opposite(), size);
        info!("Market order placed to flatten: {}", order);
        position.liquidation = Some(order.id);
        position.state = PositionState::Liquidating;
        self.events
            .push(CycleEvent::DrawdownBreached { flatten: size });
        actions.push(Action::Submit(order.id));
        Ok(actions)
    }

    /// Closed → Idle for the next cycle. Returns false if a cycle is still live.
    pub fn reset(&mut self) -> bool {
        match self.state() {
            PositionState::Idle => true,
            PositionState::Closed => {
                self.position = None;
                true
            }
            _ => false,
        }
    }
}
