use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// A timestamped closing price for one instrument.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceObservation {
    timestamp: DateTime<Utc>,
    close: Decimal,
}

impl From<(DateTime<Utc>, Decimal)> for PriceObservation {
    fn from((timestamp, close): (DateTime<Utc>, Decimal)) -> Self {
        Self { timestamp, close }
    }
}

impl PriceObservation {
    /// Returns the observation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the closing price.
    pub fn close(&self) -> Decimal {
        self.close
    }

    /// Returns the calendar day of month (1..=31).
    pub fn day(&self) -> u32 {
        self.timestamp.day()
    }
}

/// One step of the feed: a price, or a step with no valid price.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// A valid observation.
    Price(PriceObservation),
    /// No price was available at this time.
    Gap {
        /// Time of the missing observation.
        timestamp: DateTime<Utc>,
    },
}

impl From<(DateTime<Utc>, Option<Decimal>)> for Tick {
    fn from((timestamp, close): (DateTime<Utc>, Option<Decimal>)) -> Self {
        match close {
            Some(close) => Self::Price((timestamp, close).into()),
            None => Self::Gap { timestamp },
        }
    }
}

impl Tick {
    /// Returns the tick time, whatever its kind.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Price(observation) => observation.timestamp(),
            Self::Gap { timestamp } => *timestamp,
        }
    }

    /// Returns the observation, or `Error::DataGap` for a gap.
    pub fn observation(&self) -> Result<&PriceObservation> {
        match self {
            Self::Price(observation) => Ok(observation),
            Self::Gap { timestamp } => Err(Error::DataGap(*timestamp)),
        }
    }

    /// Returns true for a gap.
    pub fn is_gap(&self) -> bool {
        matches!(self, Self::Gap { .. })
    }
}

/// A finite, ordered, lazily produced sequence of ticks for one instrument.
///
/// `None` marks the end of the stream. An `Err` is a fatal feed failure;
/// missing prices are not errors but [`Tick::Gap`] items. A feed is consumed
/// by the run that drains it: a fresh run needs a fresh feed.
pub trait PriceFeed: Iterator<Item = Result<Tick>> {}

impl<I> PriceFeed for I where I: Iterator<Item = Result<Tick>> {}

/// An in-memory feed over shared ticks.
///
/// Clones share the same data, so one loaded series can drive many runs.
/// Timestamps going backwards end the stream with `Error::OutOfOrder`.
#[derive(Debug, Clone)]
pub struct MemoryFeed {
    ticks: Arc<[Tick]>,
    index: usize,
    previous: Option<DateTime<Utc>>,
    failed: bool,
}

impl MemoryFeed {
    /// Creates a feed that starts at the first tick.
    pub fn new(ticks: Arc<[Tick]>) -> Self {
        Self {
            ticks,
            index: 0,
            previous: None,
            failed: false,
        }
    }

    /// Returns the number of ticks not yet served.
    pub fn remaining(&self) -> usize {
        self.ticks.len().saturating_sub(self.index)
    }
}

impl From<Vec<Tick>> for MemoryFeed {
    fn from(ticks: Vec<Tick>) -> Self {
        Self::new(Arc::from(ticks))
    }
}

impl Iterator for MemoryFeed {
    type Item = Result<Tick>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let tick = *self.ticks.get(self.index)?;
        self.index += 1;

        let current = tick.timestamp();
        if let Some(previous) = self.previous
            && current < previous
        {
            self.failed = true;
            return Some(Err(Error::OutOfOrder { previous, current }));
        }
        self.previous = Some(current);
        Some(Ok(tick))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}
