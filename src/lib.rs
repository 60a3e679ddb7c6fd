//! Fibonacci martingale grid trader
//!
//! Opens a position when SMA crossover, RSI and Bollinger votes agree, lays
//! a ladder of averaging orders at Fibonacci retracements of the recent
//! range, moves the take-profit to the break-even of every filled rung, and
//! liquidates everything when account equity falls past the drawdown limit.
//! The same engine drives both the live runner and the backtest.

pub mod backtest;
pub mod broker;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod grid;
pub mod indicators;
pub mod live;
pub mod oms;
pub mod risk;
pub mod signal;
pub mod types;

pub use config::Config;
pub use engine::{CycleEvent, CycleOutcome, GridEngine, PositionState};
pub use error::{TradingError, TradingResult};
pub use types::*;
