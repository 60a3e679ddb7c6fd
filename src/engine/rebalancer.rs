//! Take-profit rebalancer
//!
//! Each rung fill moves the break-even, so the live take-profit is swapped
//! for the plan's target at the new filled-rung count. The old order is
//! cancelled before the new one is recorded, so the ledger never holds two
//! pending take-profits for a position.

use tracing::{info, warn};

use super::position::{CycleOutcome, Position};
use super::{Action, CycleEvent};
use crate::error::TradingResult;
use crate::oms::{CancelOutcome, OrderLedger};
use crate::Money;

pub struct TakeProfitRebalancer;

impl TakeProfitRebalancer {
    /// Swap the take-profit after a rung fill
    pub fn on_rung_fill(
        ledger: &mut OrderLedger,
        position: &mut Position,
        rung: usize,
        events: &mut Vec<CycleEvent>,
    ) -> TradingResult<Vec<Action>> {
        let mut actions = Vec::new();
        position.filled_rungs += 1;
        let filled = position.filled_rungs;

        let Some((size, price)) = position
            .plan
            .as_ref()
            .and_then(|plan| plan.take_profit_for(filled))
        else {
            warn!("Rung {} filled with no plan entry for count {}", rung, filled);
            return Ok(actions);
        };

        info!(
            "Rung {} filled ({} of grid). Adjusting take profit to {} @ {}",
            rung, filled, size, price
        );

        if let Some(old) = position.take_profit.take() {
            match ledger.cancel(old)? {
                CancelOutcome::Cancelled => actions.push(Action::Cancel(old)),
                CancelOutcome::AlreadyFilled => {
                    // The target was hit in the same pass; the close handles the rest.
                    warn!("Take profit {} already filled, not replacing", old);
                    position.take_profit = Some(old);
                    return Ok(actions);
                }
                CancelOutcome::AlreadyCancelled => {}
            }
        }

        let order = ledger.place_take_profit(position.side.opposite(), size, price);
        position.take_profit = Some(order.id);
        actions.push(Action::Submit(order.id));

        events.push(CycleEvent::RungFilled {
            rung: filled,
            take_profit: price,
            size,
        });
        Ok(actions)
    }

    /// Close the cycle after the take-profit fills
    pub fn on_take_profit_fill(
        ledger: &mut OrderLedger,
        position: &mut Position,
        price: Money,
        events: &mut Vec<CycleEvent>,
    ) -> TradingResult<Vec<Action>> {
        info!("Take profit filled @ {}. Cancelling remaining grid.", price);
        let mut actions = Vec::new();
        for id in ledger.pending_rungs() {
            if ledger.cancel(id)? == CancelOutcome::Cancelled {
                actions.push(Action::Cancel(id));
            }
        }
        position.close(CycleOutcome::TakeProfit);

        events.push(CycleEvent::TakeProfitFilled { price });
        events.push(CycleEvent::Closed {
            outcome: CycleOutcome::TakeProfit,
        });
        Ok(actions)
    }
}
