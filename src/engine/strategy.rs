use std::fmt;

use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{OrderIntent, PositionState, StreamingAverage, Tick};
use crate::config::BacktestConfig;
use crate::errors::{Error, Result, Violation};

/// The two states of the strategy.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyState {
    /// No position held.
    #[default]
    Flat,
    /// A position is held.
    Invested,
}

impl fmt::Display for StrategyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StrategyState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Invested => "invested",
        }
    }
}

/// Calendar-driven strategy over a fast/slow EWMA pair.
///
/// Each step updates both averages, then buys with all available cash when
/// flat on a day of month divisible by `entry_modulus`, or else liquidates
/// when invested on a day divisible by `exit_modulus`. The exit rule is only
/// looked at when the entry rule did not fire, so a step yields at most one
/// intent.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct StrategyEngine {
    fast: StreamingAverage,
    slow: StreamingAverage,
    entry_modulus: u32,
    exit_modulus: u32,
    state: StrategyState,
}

impl StrategyEngine {
    /// Creates a flat engine from decay factors and day-of-month moduli.
    pub fn new(fast_decay: Decimal, slow_decay: Decimal, entry_modulus: u32, exit_modulus: u32) -> Result<Self> {
        for modulus in [entry_modulus, exit_modulus] {
            if modulus == 0 {
                return Err(Error::InvalidModulus(modulus));
            }
        }

        Ok(Self {
            fast: StreamingAverage::new(fast_decay)?,
            slow: StreamingAverage::new(slow_decay)?,
            entry_modulus,
            exit_modulus,
            state: StrategyState::Flat,
        })
    }

    /// Creates an engine from the strategy part of a config.
    pub fn from_config(config: &BacktestConfig) -> Result<Self> {
        Self::new(
            config.fast_decay,
            config.slow_decay,
            config.entry_modulus,
            config.exit_modulus,
        )
    }

    /// Returns the current state.
    pub fn state(&self) -> StrategyState {
        self.state
    }

    /// Returns the fast average.
    pub fn fast(&self) -> &StreamingAverage {
        &self.fast
    }

    /// Returns the slow average.
    pub fn slow(&self) -> &StreamingAverage {
        &self.slow
    }

    /// Processes one tick and returns the intent to apply, if any.
    ///
    /// ### Errors
    /// * `Error::DataGap` for a gap tick: nothing is updated.
    /// * `Error::InvalidPrice` for a non-positive close: nothing is updated,
    ///   no order is emitted and the state holds.
    /// * `Error::InvariantViolation` when the state disagrees with `position`
    ///   or a buy sizes to zero shares.
    pub fn step(&mut self, tick: &Tick, position: &PositionState) -> Result<Option<OrderIntent>> {
        let observation = tick.observation()?;
        self.check_state(position)?;

        // a fill needs a positive close; reject before touching the averages or the state
        let price = observation.close();
        if price <= Decimal::ZERO {
            return Err(Error::InvalidPrice(price));
        }
        self.fast.update(price);
        self.slow.update(price);

        let day = observation.day();
        if self.state == StrategyState::Flat && day % self.entry_modulus == 0 {
            let quantity = position.size_for(price, position.cash())?;
            let intent = OrderIntent::buy(quantity)?;
            self.state = StrategyState::Invested;
            Ok(Some(intent))
        } else if self.state == StrategyState::Invested && day % self.exit_modulus == 0 {
            self.state = StrategyState::Flat;
            Ok(Some(OrderIntent::Liquidate))
        } else {
            Ok(None)
        }
    }

    /// Resets the averages and returns to flat.
    pub fn reset(&mut self) -> Result<()> {
        *self = Self::new(self.fast.decay(), self.slow.decay(), self.entry_modulus, self.exit_modulus)?;
        Ok(())
    }

    fn check_state(&self, position: &PositionState) -> Result<()> {
        let invested = self.state == StrategyState::Invested;
        if invested != position.invested() {
            return Err(Violation::StateMismatch {
                engine: self.state.as_str(),
                position: position.invested(),
            }
            .into());
        }
        Ok(())
    }
}
