//! Core backtest components.
//!
//! This module provides the fundamental types for a single-asset run:
//! - `Tick` / `PriceFeed`: the ordered price input, gaps included.
//! - `StreamingAverage`: the EWMA indicator.
//! - `PositionState`: shares and cash.
//! - `StrategyEngine`: the flat/invested decision state machine.
//! - `Backtest`: the runner tying them together and writing the log.

mod average;
mod bts;
mod feed;
mod journal;
mod order;
mod position;
mod strategy;

pub use average::*;
pub use bts::*;
pub use feed::*;
pub use journal::*;
pub use order::*;
pub use position::*;
pub use strategy::*;
