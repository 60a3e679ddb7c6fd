//! Fibonacci grid planner
//!
//! Turns the fill price of an opening market order and the recent high/low
//! range into a martingale ladder: one resting limit order per rung, each
//! bigger than the last, with the take-profit that applies once that rung
//! has filled. The plan is computed once per position and never changes.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::{TradingConfig, MAX_RUNGS};
use crate::{Money, Side};

/// Retracement ratios, one per rung
pub const FIB_RATIOS: [Decimal; 5] = [dec!(0.236), dec!(0.382), dec!(0.5), dec!(0.618), dec!(0.786)];

/// Decimal places for grid prices and sizes
pub const PRICE_DP: u32 = 4;

/// Both candidate prices for one retracement ratio
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetracementLevel {
    pub rung: usize,
    pub ratio: Money,
    /// `fill + range * ratio`, used by short grids
    pub above: Money,
    /// `fill - range * ratio`, used by long grids
    pub below: Money,
}

impl RetracementLevel {
    pub fn price_for(&self, side: Side) -> Money {
        match side {
            Side::Buy => self.below,
            Side::Sell => self.above,
        }
    }
}

/// Retracement levels around `fill` for the `high - low` range
pub fn retracement_levels(fill: Money, high: Money, low: Money) -> Vec<RetracementLevel> {
    let range = high - low;
    FIB_RATIOS
        .iter()
        .enumerate()
        .map(|(i, &ratio)| {
            let ratio = Money::from_decimal(ratio);
            let offset = range * ratio;
            RetracementLevel {
                rung: i + 1,
                ratio,
                above: (fill + offset).round_dp(PRICE_DP),
                below: (fill - offset).round_dp(PRICE_DP),
            }
        })
        .collect()
}

/// One step of the ladder and the take-profit that applies once it fills
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridRung {
    /// 1-based
    pub index: usize,
    pub price: Money,
    pub size: Money,
    /// Opening size plus every rung up to and including this one
    pub cumulative_size: Money,
    pub break_even: Money,
    pub take_profit: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPlan {
    pub side: Side,
    pub fill_price: Money,
    pub base_size: Money,
    pub initial_take_profit: Money,
    pub rungs: Vec<GridRung>,
}

impl GridPlan {
    pub fn rung(&self, index: usize) -> Option<&GridRung> {
        index.checked_sub(1).and_then(|i| self.rungs.get(i))
    }

    /// Take-profit size and price once `filled` rungs have filled
    pub fn take_profit_for(&self, filled: usize) -> Option<(Money, Money)> {
        if filled == 0 {
            return Some((self.base_size, self.initial_take_profit));
        }
        self.rung(filled)
            .map(|rung| (rung.cumulative_size, rung.take_profit))
    }

    /// Exposure to flatten once `filled` rungs have filled
    pub fn exposure_for(&self, filled: usize) -> Money {
        self.take_profit_for(filled)
            .map(|(size, _)| size)
            .unwrap_or(self.base_size)
    }
}

/// Price `reference` moved by `fraction` in the profitable direction for `side`
fn profit_target(side: Side, reference: Money, fraction: Money) -> Money {
    let factor = match side {
        Side::Buy => Money::ONE + fraction,
        Side::Sell => Money::ONE - fraction,
    };
    (reference * factor).round_dp(PRICE_DP)
}

#[derive(Debug, Clone)]
pub struct GridPlanner {
    base_size: Money,
    multiplier: Money,
    rungs: usize,
    take_profit: Money,
}

impl GridPlanner {
    pub fn new(base_size: Money, multiplier: Money, rungs: usize, take_profit: Money) -> Self {
        Self {
            base_size,
            multiplier,
            rungs: rungs.min(MAX_RUNGS).min(FIB_RATIOS.len()),
            take_profit,
        }
    }

    pub fn from_config(config: &TradingConfig) -> Self {
        Self::new(
            Money::from_f64(config.base_size),
            Money::from_f64(config.martingale_multiplier),
            config.martingale_rungs,
            Money::from_f64(config.take_profit),
        )
    }

    pub fn base_size(&self) -> Money {
        self.base_size
    }

    /// Size of rung `index`: `base * multiplier^index`, rounded
    pub fn rung_size(&self, index: usize) -> Money {
        (self.base_size * self.multiplier.pow(index as u32)).round_dp(PRICE_DP)
    }

    /// Opening size plus every rung
    pub fn max_exposure(&self) -> Money {
        (1..=self.rungs).fold(self.base_size, |acc, i| acc + self.rung_size(i))
    }

    pub fn initial_take_profit(&self, side: Side, fill: Money) -> Money {
        profit_target(side, fill, self.take_profit)
    }

    /// Build the ladder for a position opened on `side` at `fill`
    pub fn plan(&self, side: Side, fill: Money, high: Money, low: Money) -> GridPlan {
        let levels = retracement_levels(fill, high, low);

        let mut cumulative_size = self.base_size;
        let mut notional = self.base_size * fill;
        let rungs = levels
            .iter()
            .take(self.rungs)
            .map(|level| {
                let price = level.price_for(side);
                let size = self.rung_size(level.rung);
                cumulative_size += size;
                notional += size * price;
                let break_even = notional / cumulative_size;
                GridRung {
                    index: level.rung,
                    price,
                    size,
                    cumulative_size: cumulative_size.round_dp(PRICE_DP),
                    break_even,
                    take_profit: profit_target(side, break_even, self.take_profit),
                }
            })
            .collect();

        GridPlan {
            side,
            fill_price: fill,
            base_size: self.base_size,
            initial_take_profit: self.initial_take_profit(side, fill),
            rungs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(value: Decimal) -> Money {
        Money::from_decimal(value)
    }

    fn planner(rungs: usize) -> GridPlanner {
        GridPlanner::new(m(dec!(10000)), m(dec!(1.5)), rungs, m(dec!(0.01)))
    }

    #[test]
    fn test_long_ladder_scenario() {
        let plan = planner(3).plan(Side::Buy, m(dec!(1.1000)), m(dec!(1.1100)), m(dec!(1.0900)));

        let first = plan.rung(1).unwrap();
        assert_eq!(first.price, m(dec!(1.0953)));
        assert_eq!(first.size, m(dec!(15000)));
        assert_eq!(first.cumulative_size, m(dec!(25000)));
        assert_eq!(first.break_even, m(dec!(1.09718)));
        assert_eq!(first.take_profit, m(dec!(1.1082)));

        let second = plan.rung(2).unwrap();
        assert_eq!(second.price, m(dec!(1.0924)));
        assert_eq!(second.size, m(dec!(22500)));
        assert_eq!(second.cumulative_size, m(dec!(47500)));
        assert_eq!(second.take_profit, m(dec!(1.1059)));

        let third = plan.rung(3).unwrap();
        assert_eq!(third.price, m(dec!(1.0900)));
        assert_eq!(third.size, m(dec!(33750)));
        assert_eq!(third.cumulative_size, m(dec!(81250)));
        assert_eq!(third.take_profit, m(dec!(1.1038)));

        assert_eq!(plan.initial_take_profit, m(dec!(1.1110)));
        assert!(plan.rung(0).is_none());
        assert!(plan.rung(4).is_none());
    }

    #[test]
    fn test_short_ladder_sits_above_fill() {
        let plan = planner(3).plan(Side::Sell, m(dec!(1.1000)), m(dec!(1.1100)), m(dec!(1.0900)));
        let prices: Vec<Money> = plan.rungs.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![m(dec!(1.1047)), m(dec!(1.1076)), m(dec!(1.1100))]);
        assert_eq!(plan.initial_take_profit, m(dec!(1.0890)));
        for rung in &plan.rungs {
            assert!(rung.take_profit < rung.break_even);
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        let p = planner(5);
        let a = p.plan(Side::Buy, m(dec!(1.2345)), m(dec!(1.2500)), m(dec!(1.2200)));
        let b = p.plan(Side::Buy, m(dec!(1.2345)), m(dec!(1.2500)), m(dec!(1.2200)));
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_rung_bound() {
        let plan = planner(9).plan(Side::Buy, m(dec!(1.1)), m(dec!(1.11)), m(dec!(1.09)));
        assert_eq!(plan.rungs.len(), MAX_RUNGS);
    }

    #[test]
    fn test_take_profit_lookup() {
        let plan = planner(3).plan(Side::Buy, m(dec!(1.1000)), m(dec!(1.1100)), m(dec!(1.0900)));
        assert_eq!(plan.take_profit_for(0), Some((m(dec!(10000)), m(dec!(1.1110)))));
        assert_eq!(plan.take_profit_for(1), Some((m(dec!(25000)), m(dec!(1.1082)))));
        assert_eq!(plan.take_profit_for(4), None);
        assert_eq!(plan.exposure_for(2), m(dec!(47500)));
        assert_eq!(plan.exposure_for(0), m(dec!(10000)));
    }

    #[test]
    fn test_max_exposure() {
        assert_eq!(planner(3).max_exposure(), m(dec!(81250)));
    }

    #[test]
    fn test_levels_cover_every_ratio() {
        let levels = retracement_levels(m(dec!(1.1000)), m(dec!(1.1100)), m(dec!(1.0900)));
        assert_eq!(levels.len(), 5);
        assert_eq!(levels[2].above, m(dec!(1.1100)));
        assert_eq!(levels[2].below, m(dec!(1.0900)));
        assert_eq!(levels[4].below, m(dec!(1.0843)));
    }
}
