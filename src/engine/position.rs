//! Position record for one grid cycle

use serde::{Deserialize, Serialize};

use crate::grid::GridPlan;
use crate::oms::OrderId;
use crate::{Money, Side};

/// Cycle lifecycle.
///
/// ```text
/// Idle -> Opening -> GridActive -> Closed
///            \           \
///             +-----------+--> Liquidating -> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Idle,
    Opening,
    GridActive,
    Liquidating,
    Closed,
}

impl PositionState {
    /// Whether the drawdown guard watches this state
    pub fn is_guarded(self) -> bool {
        matches!(self, PositionState::Opening | PositionState::GridActive)
    }
}

/// How a closed cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleOutcome {
    TakeProfit,
    Liquidated,
}

#[derive(Debug, Clone)]
pub struct Position {
    pub state: PositionState,
    pub side: Side,
    /// High/low of the lookback window at the moment the signal fired
    pub high: Money,
    pub low: Money,
    pub entry_order: OrderId,
    pub entry_price: Option<Money>,
    pub plan: Option<GridPlan>,
    /// Counts rung fills; the plan entry for this count is the live target
    pub filled_rungs: usize,
    pub take_profit: Option<OrderId>,
    pub liquidation: Option<OrderId>,
    pub outcome: Option<CycleOutcome>,
}

impl Position {
    pub fn opening(side: Side, entry_order: OrderId, high: Money, low: Money) -> Self {
        Self {
            state: PositionState::Opening,
            side,
            high,
            low,
            entry_order,
            entry_price: None,
            plan: None,
            filled_rungs: 0,
            take_profit: None,
            liquidation: None,
            outcome: None,
        }
    }

    /// Filled exposure in base units: opening size, or the cumulative size
    /// of the last filled rung
    pub fn exposure(&self) -> Money {
        match &self.plan {
            Some(plan) => plan.exposure_for(self.filled_rungs),
            None => Money::ZERO,
        }
    }

    pub fn close(&mut self, outcome: CycleOutcome) {
        self.state = PositionState::Closed;
        self.outcome = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridPlanner;

    #[test]
    fn test_exposure_tracks_filled_rungs() {
        let mut position = Position::opening(
            Side::Buy,
            OrderId(1),
            Money::from_f64(1.11),
            Money::from_f64(1.09),
        );
        assert_eq!(position.exposure(), Money::ZERO);

        position.plan = Some(
            GridPlanner::new(
                Money::from_f64(10000.0),
                Money::from_f64(1.5),
                3,
                Money::from_f64(0.01),
            )
            .plan(Side::Buy, Money::from_f64(1.1), position.high, position.low),
        );
        assert_eq!(position.exposure(), Money::from_f64(10000.0));
        position.filled_rungs = 2;
        assert_eq!(position.exposure(), Money::from_f64(47500.0));
    }

    #[test]
    fn test_guarded_states() {
        assert!(PositionState::Opening.is_guarded());
        assert!(PositionState::GridActive.is_guarded());
        assert!(!PositionState::Liquidating.is_guarded());
        assert!(!PositionState::Closed.is_guarded());
        assert!(!PositionState::Idle.is_guarded());
    }
}
