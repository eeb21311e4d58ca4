use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Result alias for the library.
pub type Result<T> = std::result::Result<T, Error>;

/// A broken state invariant. Always fatal: it means a logic defect, not bad data.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Violation {
    /// A liquidation was applied while no position was held.
    #[error("liquidate called while flat")]
    LiquidateWhileFlat,

    /// A buy was applied while a position was already held.
    #[error("buy called while already invested")]
    BuyWhileInvested,

    /// A buy was sized to zero shares.
    #[error("buy sized to a non-positive quantity")]
    NonPositiveQuantity,

    /// The buy costs more than the available cash.
    #[error("insufficient cash: required {required}, available {available}")]
    InsufficientCash {
        /// Cost of the buy.
        required: Decimal,
        /// Cash on hand.
        available: Decimal,
    },

    /// The strategy state and the position disagree about being invested.
    #[error("strategy is {engine} but position invested = {position}")]
    StateMismatch {
        /// Strategy state name.
        engine: &'static str,
        /// Position invested flag.
        position: bool,
    },
}

/// Errors raised by the library.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The step has no price. Recoverable: the step is skipped.
    #[error("Data gap at {0}: no price for this step")]
    DataGap(DateTime<Utc>),

    /// A non-positive price reached order sizing. Recoverable: the order is skipped.
    #[error("Price must be positive (got: {0})")]
    InvalidPrice(Decimal),

    /// A state invariant was broken. Fatal.
    #[error("Invariant violation: {0}")]
    InvariantViolation(#[from] Violation),

    /// The feed yielded a timestamp earlier than the previous one.
    #[error("Out of order observation: {current} after {previous}")]
    OutOfOrder {
        /// Timestamp of the previous tick.
        previous: DateTime<Utc>,
        /// Timestamp of the offending tick.
        current: DateTime<Utc>,
    },

    /// Decay factor outside of (0, 1].
    #[error("Decay factor must be in (0, 1] (got: {0})")]
    InvalidDecay(Decimal),

    /// The initial cash is not positive.
    #[error("Cash must be positive (got: {0})")]
    NegZeroCash(Decimal),

    /// The run period is empty or reversed.
    #[error("Invalid period: start {start} must be before end {end}")]
    InvalidPeriod {
        /// Start of the run.
        start: DateTime<Utc>,
        /// End of the run.
        end: DateTime<Utc>,
    },

    /// A day-of-month modulus of zero.
    #[error("Day modulus must be positive (got: {0})")]
    InvalidModulus(u32),

    /// Zero resampling points.
    #[error("Resample points must be positive")]
    InvalidResamplePoints,

    /// The optimizer was given no parameter combination.
    #[error("No parameter combination to evaluate")]
    EmptyParameters,

    /// I/O error occurred.
    // utils.rs, config.rs
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error occurred.
    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    /// Returns true when the run may continue past the failing step.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DataGap(_) | Self::InvalidPrice(_))
    }
}

#[cfg(test)]
#[test]
fn recoverable_errors() {
    assert!(Error::DataGap(DateTime::default()).is_recoverable());
    assert!(Error::InvalidPrice(Decimal::ZERO).is_recoverable());
    assert!(!Error::InvariantViolation(Violation::LiquidateWhileFlat).is_recoverable());
    assert!(!Error::InvalidDecay(Decimal::TWO).is_recoverable());
}

#[cfg(test)]
#[test]
fn violation_message() {
    let err = Error::from(Violation::InsufficientCash {
        required: Decimal::from(110),
        available: Decimal::from(100),
    });
    assert_eq!(
        err.to_string(),
        "Invariant violation: insufficient cash: required 110, available 100"
    );
}
