use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Exponentially weighted moving average updated one price at a time.
///
/// The first update seeds the average with the price itself. Every later
/// update applies `value = decay * price + (1 - decay) * value`, so the value
/// is always a convex combination of the prices seen so far.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingAverage {
    decay: Decimal,
    value: Decimal,
    initialized: bool,
}

impl StreamingAverage {
    /// Creates an uninitialized average. `decay` must be in (0, 1].
    pub fn new(decay: Decimal) -> Result<Self> {
        if decay <= Decimal::ZERO || decay > Decimal::ONE {
            return Err(Error::InvalidDecay(decay));
        }

        Ok(Self {
            decay,
            value: Decimal::ZERO,
            initialized: false,
        })
    }

    /// Feeds one price and returns the updated value.
    pub fn update(&mut self, price: Decimal) -> Decimal {
        if self.initialized {
            self.value = self.decay * price + (Decimal::ONE - self.decay) * self.value;
        } else {
            self.value = price;
            self.initialized = true;
        }
        self.value
    }

    /// Returns the current value, or `None` before the first update.
    pub fn value(&self) -> Option<Decimal> {
        self.initialized.then_some(self.value)
    }

    /// Returns the decay factor.
    pub fn decay(&self) -> Decimal {
        self.decay
    }

    /// Returns true once the average has been seeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}
