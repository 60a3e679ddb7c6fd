//! Technical indicators powered by the `ta` crate
//!
//! The signal aggregator only needs SMA, RSI and Bollinger Bands over bar
//! closes. They sit behind `IndicatorService` so tests and alternative
//! feeds can supply precomputed series.

use ta::indicators::{BollingerBands as TaBB, RelativeStrengthIndex, SimpleMovingAverage};
use ta::Next;

use crate::config::StrategyConfig;

/// Type alias for band indicators (upper, middle, lower)
pub type BandOutput = (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>);

/// Source of indicator series aligned with the input closes.
///
/// Entries are `None` until the window is populated.
pub trait IndicatorService: Send + Sync {
    fn sma(&self, closes: &[f64], window: usize) -> Vec<Option<f64>>;

    fn rsi(&self, closes: &[f64], window: usize) -> Vec<Option<f64>>;

    fn bollinger(&self, closes: &[f64], window: usize, num_std: f64) -> BandOutput;
}

/// Default service backed by the `ta` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct TaIndicators;

impl IndicatorService for TaIndicators {
    fn sma(&self, closes: &[f64], window: usize) -> Vec<Option<f64>> {
        sma(closes, window)
    }

    fn rsi(&self, closes: &[f64], window: usize) -> Vec<Option<f64>> {
        rsi(closes, window)
    }

    fn bollinger(&self, closes: &[f64], window: usize, num_std: f64) -> BandOutput {
        bollinger_bands(closes, window, num_std)
    }
}

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let sma_val = indicator.next(value);
            (i + 1 >= period).then_some(sma_val)
        })
        .collect()
}

/// Calculate RSI (Relative Strength Index)
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match RelativeStrengthIndex::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let rsi_val = indicator.next(value);
            (i + 1 >= period).then_some(rsi_val)
        })
        .collect()
}

/// Calculate Bollinger Bands
pub fn bollinger_bands(values: &[f64], period: usize, num_std: f64) -> BandOutput {
    if values.is_empty() || period == 0 {
        return (vec![], vec![], vec![]);
    }

    let mut indicator = match TaBB::new(period, num_std) {
        Ok(i) => i,
        Err(_) => {
            return (
                vec![None; values.len()],
                vec![None; values.len()],
                vec![None; values.len()],
            )
        }
    };

    let mut upper = Vec::with_capacity(values.len());
    let mut middle = Vec::with_capacity(values.len());
    let mut lower = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let bb = indicator.next(value);
        if i + 1 >= period {
            upper.push(Some(bb.upper));
            middle.push(Some(bb.average));
            lower.push(Some(bb.lower));
        } else {
            upper.push(None);
            middle.push(None);
            lower.push(None);
        }
    }

    (upper, middle, lower)
}

/// Every series the signal aggregator reads, for one close-price window
#[derive(Debug, Clone, Default)]
pub struct IndicatorSet {
    pub close: Vec<f64>,
    pub sma_short: Vec<Option<f64>>,
    pub sma_long: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
    pub bollinger_upper: Vec<Option<f64>>,
    pub bollinger_lower: Vec<Option<f64>>,
}

impl IndicatorSet {
    pub fn compute<S: IndicatorService + ?Sized>(
        service: &S,
        closes: &[f64],
        config: &StrategyConfig,
    ) -> Self {
        let (upper, _, lower) =
            service.bollinger(closes, config.bollinger_window, config.bollinger_std_dev);
        Self {
            close: closes.to_vec(),
            sma_short: service.sma(closes, config.sma_short),
            sma_long: service.sma(closes, config.sma_long),
            rsi: service.rsi(closes, config.rsi_window),
            bollinger_upper: upper,
            bollinger_lower: lower,
        }
    }
}
