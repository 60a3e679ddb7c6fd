//! Signal aggregator
//!
//! Three independent votes (SMA crossover, RSI thresholds, Bollinger break)
//! summed into one decision. Pure: no state, no I/O.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::StrategyConfig;
use crate::indicators::{IndicatorService, IndicatorSet};
use crate::types::high_low;
use crate::{Candle, Money, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vote {
    Long,
    Short,
    Neutral,
}

impl Vote {
    pub fn value(self) -> i8 {
        match self {
            Vote::Long => 1,
            Vote::Short => -1,
            Vote::Neutral => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSignal {
    pub crossover: Vote,
    pub rsi: Vote,
    pub bollinger: Vote,
}

impl AggregateSignal {
    pub const NEUTRAL: AggregateSignal = AggregateSignal {
        crossover: Vote::Neutral,
        rsi: Vote::Neutral,
        bollinger: Vote::Neutral,
    };

    /// Signed sum in [-3, 3]
    pub fn sum(&self) -> i8 {
        self.crossover.value() + self.rsi.value() + self.bollinger.value()
    }

    /// Number of indicators casting a non-neutral vote
    pub fn agreement(&self) -> u8 {
        [self.crossover, self.rsi, self.bollinger]
            .iter()
            .filter(|v| **v != Vote::Neutral)
            .count() as u8
    }
}

/// Last two values of a series, or `None` when either is missing
fn last_two(series: &[Option<f64>]) -> Option<(f64, f64)> {
    match series {
        [.., Some(prev), Some(curr)] => Some((*prev, *curr)),
        _ => None,
    }
}

/// Decision to open a position on the latest bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntrySignal {
    pub side: Side,
    pub signal: AggregateSignal,
    /// Lookback high/low the grid is anchored to
    pub high: Money,
    pub low: Money,
}

#[derive(Debug, Clone)]
pub struct SignalAggregator {
    rsi_high: f64,
    rsi_low: f64,
    min_to_open: i8,
    trending: bool,
}

impl SignalAggregator {
    pub fn new(rsi_high: f64, rsi_low: f64, min_to_open: u8, trending: bool) -> Self {
        Self {
            rsi_high,
            rsi_low,
            min_to_open: min_to_open as i8,
            trending,
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(
            config.rsi_high,
            config.rsi_low,
            config.min_indicators_to_open,
            config.trending,
        )
    }

    /// Short SMA crossing above the long one votes Short; crossing below votes Long
    pub fn crossover_vote(short: &[Option<f64>], long: &[Option<f64>]) -> Vote {
        let (Some((short_prev, short_curr)), Some((long_prev, long_curr))) =
            (last_two(short), last_two(long))
        else {
            return Vote::Neutral;
        };
        if short_curr > long_curr && short_prev < long_prev {
            Vote::Short
        } else if short_curr < long_curr && short_prev > long_prev {
            Vote::Long
        } else {
            Vote::Neutral
        }
    }

    pub fn rsi_vote(&self, rsi: &[Option<f64>]) -> Vote {
        match last_two(rsi) {
            Some((_, last)) if last > self.rsi_high => Vote::Long,
            Some((_, last)) if last < self.rsi_low => Vote::Short,
            _ => Vote::Neutral,
        }
    }

    pub fn bollinger_vote(close: &[f64], upper: &[Option<f64>], lower: &[Option<f64>]) -> Vote {
        let (Some(&close), Some((_, upper)), Some((_, lower))) =
            (close.last(), last_two(upper), last_two(lower))
        else {
            return Vote::Neutral;
        };
        if close > upper {
            Vote::Long
        } else if close < lower {
            Vote::Short
        } else {
            Vote::Neutral
        }
    }

    pub fn evaluate(&self, set: &IndicatorSet) -> AggregateSignal {
        AggregateSignal {
            crossover: Self::crossover_vote(&set.sma_short, &set.sma_long),
            rsi: self.rsi_vote(&set.rsi),
            bollinger: Self::bollinger_vote(
                &set.close,
                &set.bollinger_upper,
                &set.bollinger_lower,
            ),
        }
    }

    /// Direction to open, if the votes agree strongly enough.
    ///
    /// Trend-following keeps the sign of the sum; counter-trend inverts it.
    pub fn direction(&self, signal: &AggregateSignal) -> Option<Side> {
        let sum = signal.sum();
        let raw = if sum >= self.min_to_open {
            Side::Buy
        } else if sum <= -self.min_to_open {
            Side::Sell
        } else {
            return None;
        };
        Some(if self.trending { raw } else { raw.opposite() })
    }

    /// Evaluate the latest bar of `bars`.
    ///
    /// The live runner and the backtest both call this with every bar up to
    /// and including the current one.
    pub fn decide<S: IndicatorService + ?Sized>(
        &self,
        service: &S,
        bars: &[Candle],
        config: &StrategyConfig,
    ) -> Option<EntrySignal> {
        let closes: Vec<f64> = bars.iter().map(|c| c.close).collect();
        let set = IndicatorSet::compute(service, &closes, config);
        let signal = self.evaluate(&set);
        info!("{} indicators met (sum {})", signal.agreement(), signal.sum());
        debug!("Votes: {:?}", signal);

        let side = self.direction(&signal)?;
        let (high, low) = high_low(bars, config.fibonacci_lookback)?;
        Some(EntrySignal {
            side,
            signal,
            high,
            low,
        })
    }
}
