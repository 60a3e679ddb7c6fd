//! CLI subcommands

pub mod backtest;
pub mod paper;
