//! # BTS-EWMA: BackTest a calendar strategy over an EWMA pair
//!
//! **BTS-EWMA** replays a daily price series for one instrument through a
//! small, deterministic strategy and records what it did.
//!
//! ## How a run works
//! | Step | Description |
//! |------|-------------|
//! | **Feed** | A `PriceFeed` yields `Tick`s in time order; a tick is a price or a gap. |
//! | **Indicators** | Two `StreamingAverage`s (fast `0.01`, slow `0.001` by default) take every price. |
//! | **Decision** | `StrategyEngine` buys with all cash when flat on days of month divisible by 13, else liquidates when invested on days divisible by 21. |
//! | **Execution** | `Backtest` applies the intent to `PositionState` at the close. |
//! | **Output** | `BacktestLog` gets trades, resampled indicator snapshots, skipped steps and the terminal price. |
//!
//! Gaps and unusable prices skip their step and never stop a run. Broken
//! invariants (selling while flat, buying zero shares, ...) stop it and the
//! partial log stays available.
//!
//! ## Getting Started
//! ```rust
//! use bts_ewma::prelude::*;
//! use chrono::{TimeZone, Utc};
//! use rust_decimal::Decimal;
//!
//! let day = |d| Utc.with_ymd_and_hms(2016, 1, d, 0, 0, 0).unwrap();
//! let feed = MemoryFeed::from(vec![
//!     Tick::from((day(13), Some(Decimal::from(100)))),
//!     Tick::from((day(14), None)),
//!     Tick::from((day(21), Some(Decimal::from(110)))),
//! ]);
//!
//! let mut backtest = Backtest::new(BacktestConfig::default()).unwrap();
//! backtest.run(feed).unwrap();
//!
//! assert_eq!(backtest.log().trades().count(), 2);
//! assert_eq!(backtest.cash(), Decimal::from(110_000));
//! ```
//!
//! ## Features
//! | Feature | Description |
//! |---------|-------------|
//! | `metrics` *(default)* | Run summary: return, drawdown, win rate, profit factor. |
//! | `serde` | Serialize logs and configs, load JSON price files. |
//! | `optimizer` | Parallel sweep over decay pairs with [`rayon`](https://crates.io/crates/rayon). |
//! | `cli` | The `bts-ewma` binary. |
//!
//! ## License
//! MIT
#![warn(missing_docs)]

/// Core components: feed, averages, position, strategy and runner.
pub mod engine;

/// Run configuration.
pub mod config;

/// Error types for the library.
pub mod errors;

/// Chart series built from a run log.
pub mod charts;

/// Data helpers: price files and synthetic feeds.
pub mod utils;

/// Performance metrics: return, drawdown, win rate, etc.
#[cfg(feature = "metrics")]
pub mod metrics;

/// Decay parameter optimization.
#[cfg(feature = "optimizer")]
pub mod optimizer;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use super::*;
    pub use crate::charts::*;
    pub use crate::config::*;
    pub use crate::engine::*;
    pub use crate::errors::*;
    pub use crate::utils::*;

    #[cfg(feature = "metrics")]
    pub use crate::metrics::*;

    #[cfg(feature = "optimizer")]
    pub use crate::optimizer::*;
}

use rust_decimal::Decimal;

/// Trait for percentage calculations on money amounts.
pub trait PercentCalculus: Sized {
    /// Calculates the percentage change between two values.
    ///
    /// ### Arguments
    /// * `new` - The new value to compare with.
    ///
    /// ### Returns
    /// The percentage change from the original value to the new value,
    /// or `None` when the original value is zero.
    fn change(self, new: Self) -> Option<Self>;
}

impl PercentCalculus for Decimal {
    fn change(self, new: Self) -> Option<Self> {
        if self.is_zero() {
            return None;
        }
        Some((new - self) / self * Decimal::ONE_HUNDRED)
    }
}
