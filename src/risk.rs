//! Risk controls
//!
//! Two guards sit around a grid cycle:
//!
//! - **Capital pre-flight**: before trading starts, the worst-case exposure of a
//!   fully filled ladder must fit inside 90% of the account's available funds.
//! - **Drawdown guard**: while a position is open, equity is compared against a
//!   floor derived from the equity captured when the position opened.
//!
//! ```text
//! floor = baseline * (1 - max_drawdown)
//! breach  <=>  equity < floor
//! ```

use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::broker::AccountSummary;
use crate::error::{TradingError, TradingResult};
use crate::grid::GridPlanner;
use crate::{Money, Symbol};

/// Share of available funds the worst-case exposure may use
pub const CAPITAL_USAGE_LIMIT: Money = Money::from_decimal(dec!(0.9));

#[derive(Debug, Clone)]
pub struct DrawdownGuard {
    max_drawdown: Money,
    baseline: Option<Money>,
}

impl DrawdownGuard {
    pub fn new(max_drawdown: Money) -> Self {
        Self {
            max_drawdown,
            baseline: None,
        }
    }

    /// Capture the equity the floor is measured from
    pub fn arm(&mut self, baseline: Money) {
        debug!(
            "Drawdown guard armed: baseline {} floor {}",
            baseline,
            Self::floor_for(baseline, self.max_drawdown)
        );
        self.baseline = Some(baseline);
    }

    pub fn disarm(&mut self) {
        self.baseline = None;
    }

    fn floor_for(baseline: Money, max_drawdown: Money) -> Money {
        baseline * (Money::ONE - max_drawdown)
    }

    pub fn floor(&self) -> Option<Money> {
        self.baseline
            .map(|baseline| Self::floor_for(baseline, self.max_drawdown))
    }

    /// Strictly below the floor; an unarmed guard never fires
    pub fn is_breached(&self, equity: Money) -> bool {
        self.floor().is_some_and(|floor| equity < floor)
    }

    /// Equity change relative to the baseline, in percent
    pub fn change_pct(&self, equity: Money) -> Option<f64> {
        let baseline = self.baseline.filter(|b| !b.is_zero())?;
        Some(((equity - baseline) / baseline).round_dp(4).to_f64() * 100.0)
    }
}

/// Check that a fully filled ladder fits the account.
///
/// Sizes are in base-currency units, so the exposure is converted with
/// `quote` when the home currency is the pair's quote currency. Returns the
/// exposure in the home currency.
pub fn check_capital(
    symbol: &Symbol,
    planner: &GridPlanner,
    account: &AccountSummary,
    quote: Money,
) -> TradingResult<Money> {
    let home = account.home_currency.to_ascii_uppercase();
    let pair = symbol.as_str().to_ascii_uppercase();
    if !pair.contains(&home) {
        return Err(TradingError::ForeignPair {
            pair: symbol.to_string(),
            home: account.home_currency.clone(),
        });
    }

    let units = planner.max_exposure();
    let exposure = if symbol.quote_currency().eq_ignore_ascii_case(&home) {
        units * quote
    } else {
        units
    };
    let limit = account.available_funds * CAPITAL_USAGE_LIMIT;

    if exposure > limit {
        return Err(TradingError::InsufficientCapital {
            exposure: exposure.to_f64(),
            limit: limit.to_f64(),
            currency: home,
        });
    }

    info!(
        "Capital check passed: worst-case exposure {} {} within {} limit",
        exposure.round_dp(2),
        home,
        limit.round_dp(2)
    );
    Ok(exposure)
}
