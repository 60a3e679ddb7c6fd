//! Configuration management
//!
//! Strategy parameters are read from a JSON file once at startup, validated,
//! and handed to the core as an immutable structure.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::Symbol;

/// Hard ceiling on martingale rungs; bounds worst-case capital exposure
pub const MAX_RUNGS: usize = 5;

/// Ceiling on sizes and cash; keeps the full ladder within exact decimal range
pub const MAX_AMOUNT: f64 = 1e15;

/// Ceiling on the martingale multiplier
pub const MAX_MULTIPLIER: f64 = 10.0;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("martingale_rungs must be between 1 and {MAX_RUNGS}, got {0}")]
    RungCount(usize),

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} must be a fraction in (0, 1), got {value}")]
    NotAFraction { field: &'static str, value: f64 },

    #[error("sma_short ({short}) must be smaller than sma_long ({long})")]
    SmaWindows { short: usize, long: usize },

    #[error("rsi_low ({low}) must be below rsi_high ({high})")]
    RsiThresholds { low: f64, high: f64 },

    #[error("min_indicators_to_open must be 1..=3, got {0}")]
    Agreement(u8),

    #[error("{field} must be at most {max}, got {value}")]
    TooLarge {
        field: &'static str,
        value: f64,
        max: f64,
    },

    #[error("pair must be a six-letter FX symbol, got {0:?}")]
    Pair(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub strategy: StrategyConfig,
    pub trading: TradingConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

impl Config {
    /// Load and validate configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Check every parameter once; the core assumes a validated config
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.strategy;
        let t = &self.trading;

        if s.pair.len() != 6 || !s.pair.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Pair(s.pair.clone()));
        }

        for (field, value) in [
            ("sma_short", s.sma_short),
            ("sma_long", s.sma_long),
            ("rsi_window", s.rsi_window),
            ("bollinger_window", s.bollinger_window),
            ("fibonacci_lookback", s.fibonacci_lookback),
        ] {
            if value == 0 {
                return Err(ConfigError::NonPositive {
                    field,
                    value: value as f64,
                });
            }
        }
        if s.sma_short >= s.sma_long {
            return Err(ConfigError::SmaWindows {
                short: s.sma_short,
                long: s.sma_long,
            });
        }
        if s.rsi_low >= s.rsi_high {
            return Err(ConfigError::RsiThresholds {
                low: s.rsi_low,
                high: s.rsi_high,
            });
        }
        if !(1..=3).contains(&s.min_indicators_to_open) {
            return Err(ConfigError::Agreement(s.min_indicators_to_open));
        }

        for (field, value) in [
            ("bollinger_std_dev", s.bollinger_std_dev),
            ("base_size", t.base_size),
            ("martingale_multiplier", t.martingale_multiplier),
            ("initial_cash", self.backtest.initial_cash),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        for (field, value, max) in [
            ("base_size", t.base_size, MAX_AMOUNT),
            ("initial_cash", self.backtest.initial_cash, MAX_AMOUNT),
            ("martingale_multiplier", t.martingale_multiplier, MAX_MULTIPLIER),
        ] {
            if value > max {
                return Err(ConfigError::TooLarge { field, value, max });
            }
        }
        for (field, value) in [
            ("poll_interval_ms", t.poll_interval_ms),
            ("monitor_interval_ms", t.monitor_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::NonPositive {
                    field,
                    value: value as f64,
                });
            }
        }

        if t.martingale_rungs == 0 || t.martingale_rungs > MAX_RUNGS {
            return Err(ConfigError::RungCount(t.martingale_rungs));
        }

        for (field, value) in [
            ("take_profit", t.take_profit),
            ("max_drawdown", t.max_drawdown),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigError::NotAFraction { field, value });
            }
        }

        Ok(())
    }

    pub fn symbol(&self) -> Symbol {
        Symbol::new(&self.strategy.pair)
    }

    /// First bar index at which every indicator window can be populated
    pub fn warmup_bars(&self) -> usize {
        self.strategy.sma_long
    }
}

/// Signal and grid-geometry parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Six-letter FX pair, e.g. "EURUSD"
    pub pair: String,
    /// Bar size requested from the venue, e.g. "1 hour"
    pub bar_interval: String,
    /// History window requested from the venue, e.g. "5 D"
    pub history_duration: String,
    pub sma_short: usize,
    pub sma_long: usize,
    pub rsi_window: usize,
    pub rsi_high: f64,
    pub rsi_low: f64,
    pub bollinger_window: usize,
    pub bollinger_std_dev: f64,
    /// Bars used to measure the high/low range for retracements
    pub fibonacci_lookback: usize,
    pub min_indicators_to_open: u8,
    /// Follow the aggregated signal (true) or fade it (false)
    pub trending: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            pair: "EURUSD".to_string(),
            bar_interval: "1 hour".to_string(),
            history_duration: "5 D".to_string(),
            sma_short: 5,
            sma_long: 25,
            rsi_window: 14,
            rsi_high: 70.0,
            rsi_low: 30.0,
            bollinger_window: 20,
            bollinger_std_dev: 2.0,
            fibonacci_lookback: 50,
            min_indicators_to_open: 2,
            trending: true,
        }
    }
}

/// Sizing, exit and scheduling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Size of the opening market order, in base-currency units
    pub base_size: f64,
    pub martingale_multiplier: f64,
    /// Number of grid rungs placed after the opening fill (at most 5)
    pub martingale_rungs: usize,
    /// Take-profit distance from break-even as a fraction
    pub take_profit: f64,
    /// Equity decline from the opening baseline that triggers liquidation
    pub max_drawdown: f64,
    /// Restart the cycle after a take-profit instead of exiting
    #[serde(default)]
    pub monitor_forever: bool,
    /// Sleep between signal evaluations while idle
    pub poll_interval_ms: u64,
    /// Equity polling period while a position is open
    pub monitor_interval_ms: u64,
    /// Pause before re-arming after a closed cycle
    #[serde(default)]
    pub cooldown_ms: u64,
}

impl TradingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            base_size: 10_000.0,
            martingale_multiplier: 1.5,
            martingale_rungs: 3,
            take_profit: 0.01,
            max_drawdown: 0.10,
            monitor_forever: false,
            poll_interval_ms: 60_000,
            monitor_interval_ms: 5_000,
            cooldown_ms: 60_000,
        }
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_cash: f64,
    /// CSV file with datetime,open,high,low,close[,volume] rows
    #[serde(default)]
    pub data_file: Option<String>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_cash: 100_000.0,
            data_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_rung_count_bound() {
        let mut config = Config::default();
        config.trading.martingale_rungs = 6;
        assert_eq!(config.validate(), Err(ConfigError::RungCount(6)));

        config.trading.martingale_rungs = MAX_RUNGS;
        assert!(config.validate().is_ok());

        config.trading.martingale_rungs = 0;
        assert_eq!(config.validate(), Err(ConfigError::RungCount(0)));
    }

    #[test]
    fn test_rejects_non_positive_size() {
        let mut config = Config::default();
        config.trading.base_size = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                field: "base_size",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_bad_fractions() {
        let mut config = Config::default();
        config.trading.max_drawdown = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotAFraction {
                field: "max_drawdown",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_amounts_beyond_decimal_range() {
        let mut config = Config::default();
        config.trading.base_size = 1e30;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooLarge {
                field: "base_size",
                ..
            })
        ));

        config.trading.base_size = MAX_AMOUNT;
        assert!(config.validate().is_ok());

        config.trading.martingale_multiplier = 50.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooLarge {
                field: "martingale_multiplier",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_inverted_windows() {
        let mut config = Config::default();
        config.strategy.sma_short = 30;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SmaWindows { .. })
        ));
    }

    #[test]
    fn test_parses_json_with_boolean_flags() {
        let json = r#"{
            "strategy": {
                "pair": "EURUSD", "bar_interval": "1 hour", "history_duration": "5 D",
                "sma_short": 5, "sma_long": 25, "rsi_window": 14,
                "rsi_high": 70, "rsi_low": 30,
                "bollinger_window": 20, "bollinger_std_dev": 2,
                "fibonacci_lookback": 50, "min_indicators_to_open": 2,
                "trending": false
            },
            "trading": {
                "base_size": 10000, "martingale_multiplier": 1.5, "martingale_rungs": 3,
                "take_profit": 0.01, "max_drawdown": 0.1, "monitor_forever": true,
                "poll_interval_ms": 1000, "monitor_interval_ms": 500
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(!config.strategy.trending);
        assert!(config.trading.monitor_forever);
        assert_eq!(config.trading.cooldown_ms, 0);
        assert_eq!(config.backtest.initial_cash, 100_000.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_string_booleans_are_rejected() {
        let json = r#"{"base_size": 1, "martingale_multiplier": 1.5, "martingale_rungs": 3,
            "take_profit": 0.01, "max_drawdown": 0.1, "monitor_forever": "true",
            "poll_interval_ms": 1, "monitor_interval_ms": 1}"#;
        assert!(serde_json::from_str::<TradingConfig>(json).is_err());
    }
}
