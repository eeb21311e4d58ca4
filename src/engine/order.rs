#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Result, Violation};

/// Represents the side of a trade (buy or sell).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    /// Shares bought with cash.
    Buy,
    /// Shares sold for cash.
    Sell,
}

/// An instruction produced by the strategy for the current step.
///
/// Intents are consumed by the runner right away and never stored.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderIntent {
    /// Buy a whole number of shares (always > 0).
    Buy {
        /// Shares to buy.
        quantity: u64,
    },
    /// Sell the entire position.
    Liquidate,
}

impl OrderIntent {
    /// Builds a buy intent. A zero quantity is an invariant violation.
    pub fn buy(quantity: u64) -> Result<Self> {
        if quantity == 0 {
            return Err(Violation::NonPositiveQuantity.into());
        }
        Ok(Self::Buy { quantity })
    }

    /// Returns the trade side of the intent.
    pub fn side(&self) -> OrderSide {
        match self {
            Self::Buy { .. } => OrderSide::Buy,
            Self::Liquidate => OrderSide::Sell,
        }
    }
}

#[cfg(test)]
#[test]
fn create_buy_intent() {
    let intent = OrderIntent::buy(1000).unwrap();
    assert_eq!(intent, OrderIntent::Buy { quantity: 1000 });
    assert_eq!(intent.side(), OrderSide::Buy);
}

#[cfg(test)]
#[test]
fn zero_buy_is_rejected() {
    use crate::errors::Error;

    assert!(matches!(
        OrderIntent::buy(0),
        Err(Error::InvariantViolation(Violation::NonPositiveQuantity))
    ));
}

#[cfg(test)]
#[test]
fn liquidate_sells() {
    assert_eq!(OrderIntent::Liquidate.side(), OrderSide::Sell);
}
