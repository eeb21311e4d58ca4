use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result, Violation};

/// Single-instrument position and cash.
///
/// Being invested is not stored: it is `quantity > 0`, so the flag can never
/// drift from the quantity.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PositionState {
    // Initial cash used for reset
    initial_cash: Decimal,
    // Cash not tied up in the position
    cash: Decimal,
    // Shares held
    quantity: u64,
}

impl PositionState {
    /// Creates a flat position holding `cash`.
    /// Non-positive cash is rejected.
    pub fn new(cash: Decimal) -> Result<Self> {
        if cash <= Decimal::ZERO {
            return Err(Error::NegZeroCash(cash));
        }

        Ok(Self {
            initial_cash: cash,
            cash,
            quantity: 0,
        })
    }

    /// Returns true while shares are held.
    pub fn invested(&self) -> bool {
        self.quantity > 0
    }

    /// Returns the number of shares held.
    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    /// Returns the available cash.
    pub fn cash(&self) -> Decimal {
        self.cash
    }

    /// Returns the cash the position started with.
    pub fn initial_cash(&self) -> Decimal {
        self.initial_cash
    }

    /// Returns cash plus the held shares valued at `mark_price`.
    pub fn equity(&self, mark_price: Decimal) -> Decimal {
        self.cash + Decimal::from(self.quantity) * mark_price
    }

    /// Returns how many whole shares `available_cash` buys at `price`.
    pub fn size_for(&self, price: Decimal, available_cash: Decimal) -> Result<u64> {
        if price <= Decimal::ZERO {
            return Err(Error::InvalidPrice(price));
        }
        if available_cash <= Decimal::ZERO {
            return Ok(0);
        }
        // a quotient beyond u64 cannot be paid for anyway
        Ok((available_cash / price).floor().to_u64().unwrap_or(u64::MAX))
    }

    /// Opens the position with `quantity` shares bought at `price`.
    pub(crate) fn apply_buy(&mut self, quantity: u64, price: Decimal) -> Result<()> {
        if quantity == 0 {
            return Err(Violation::NonPositiveQuantity.into());
        }
        if self.invested() {
            return Err(Violation::BuyWhileInvested.into());
        }
        if price <= Decimal::ZERO {
            return Err(Error::InvalidPrice(price));
        }
        let required = Decimal::from(quantity) * price;
        if required > self.cash {
            return Err(Violation::InsufficientCash {
                required,
                available: self.cash,
            }
            .into());
        }
        self.cash -= required;
        self.quantity += quantity;
        Ok(())
    }

    /// Sells every held share at `price`. Fails while flat.
    pub(crate) fn apply_liquidate(&mut self, price: Decimal) -> Result<()> {
        if !self.invested() {
            return Err(Violation::LiquidateWhileFlat.into());
        }
        if price <= Decimal::ZERO {
            return Err(Error::InvalidPrice(price));
        }
        self.cash += Decimal::from(self.quantity) * price;
        self.quantity = 0;
        Ok(())
    }

    /// Resets to the initial cash, flat.
    pub(crate) fn reset(&mut self) {
        self.quantity = 0;
        self.cash = self.initial_cash;
    }
}

#[cfg(test)]
use rust_decimal_macros::dec;

#[cfg(test)]
#[test]
fn new_position_valid_cash() {
    let position = PositionState::new(dec!(100000)).unwrap();
    assert_eq!(position.cash(), dec!(100000));
    assert_eq!(position.quantity(), 0);
    assert!(!position.invested());
}

#[cfg(test)]
#[test]
fn new_position_invalid_cash() {
    let result = PositionState::new(dec!(0));
    assert!(matches!(result, Err(Error::NegZeroCash(_))));

    let result = PositionState::new(dec!(-10));
    assert!(matches!(result, Err(Error::NegZeroCash(_))));
}

#[cfg(test)]
#[test]
fn size_floors_to_whole_shares() {
    let position = PositionState::new(dec!(100000)).unwrap();
    assert_eq!(position.size_for(dec!(100), dec!(100000)).unwrap(), 1000);
    assert_eq!(position.size_for(dec!(203.27), dec!(100000)).unwrap(), 491);
    assert_eq!(position.size_for(dec!(150), dec!(149.99)).unwrap(), 0);
    assert_eq!(position.size_for(dec!(150), dec!(0)).unwrap(), 0);
}

#[cfg(test)]
#[test]
fn size_rejects_non_positive_price() {
    let position = PositionState::new(dec!(1000)).unwrap();
    assert!(matches!(position.size_for(dec!(0), dec!(1000)), Err(Error::InvalidPrice(_))));
    assert!(matches!(position.size_for(dec!(-1), dec!(1000)), Err(Error::InvalidPrice(_))));
}

#[cfg(test)]
#[test]
fn buy_then_liquidate() {
    let mut position = PositionState::new(dec!(100000)).unwrap();

    position.apply_buy(1000, dec!(100)).unwrap();
    assert!(position.invested());
    assert_eq!(position.quantity(), 1000);
    assert_eq!(position.cash(), dec!(0));
    assert_eq!(position.equity(dec!(105)), dec!(105000));

    position.apply_liquidate(dec!(110)).unwrap();
    assert!(!position.invested());
    assert_eq!(position.quantity(), 0);
    assert_eq!(position.cash(), dec!(110000));
}

#[cfg(test)]
#[test]
fn buy_preconditions() {
    let mut position = PositionState::new(dec!(1000)).unwrap();
    assert!(matches!(
        position.apply_buy(0, dec!(10)),
        Err(Error::InvariantViolation(Violation::NonPositiveQuantity))
    ));
    assert!(matches!(
        position.apply_buy(11, dec!(100)),
        Err(Error::InvariantViolation(Violation::InsufficientCash { .. }))
    ));
    assert!(!position.invested());
    assert_eq!(position.cash(), dec!(1000));

    position.apply_buy(5, dec!(100)).unwrap();
    assert!(matches!(
        position.apply_buy(1, dec!(100)),
        Err(Error::InvariantViolation(Violation::BuyWhileInvested))
    ));
    assert_eq!(position.quantity(), 5);
}

#[cfg(test)]
#[test]
fn second_liquidate_is_rejected() {
    let mut position = PositionState::new(dec!(1000)).unwrap();
    position.apply_buy(5, dec!(100)).unwrap();
    position.apply_liquidate(dec!(90)).unwrap();
    assert!(matches!(
        position.apply_liquidate(dec!(90)),
        Err(Error::InvariantViolation(Violation::LiquidateWhileFlat))
    ));
    assert_eq!(position.cash(), dec!(950));
}

#[cfg(test)]
#[test]
fn liquidate_rejects_non_positive_price() {
    let mut position = PositionState::new(dec!(1000)).unwrap();
    position.apply_buy(5, dec!(100)).unwrap();
    assert!(matches!(position.apply_liquidate(dec!(0)), Err(Error::InvalidPrice(_))));
    assert!(matches!(position.apply_liquidate(dec!(-5)), Err(Error::InvalidPrice(_))));
    assert_eq!(position.quantity(), 5);
    assert_eq!(position.cash(), dec!(500));
}

#[cfg(test)]
#[test]
fn invested_tracks_quantity() {
    let mut position = PositionState::new(dec!(1000)).unwrap();
    let steps: [(bool, Decimal); 6] = [
        (true, dec!(10)),
        (false, dec!(12)),
        (false, dec!(12)),
        (true, dec!(20)),
        (true, dec!(20)),
        (false, dec!(8)),
    ];
    for (buy, price) in steps {
        let _ = if buy {
            let quantity = position.size_for(price, position.cash()).unwrap();
            position.apply_buy(quantity, price)
        } else {
            position.apply_liquidate(price)
        };
        assert_eq!(position.invested(), position.quantity() > 0);
    }
}

#[cfg(test)]
#[test]
fn reset_position() {
    let mut position = PositionState::new(dec!(1000)).unwrap();
    position.apply_buy(5, dec!(100)).unwrap();
    position.reset();
    assert_eq!(position.cash(), dec!(1000));
    assert_eq!(position.quantity(), 0);
    assert_eq!(position.initial_cash(), dec!(1000));
}
