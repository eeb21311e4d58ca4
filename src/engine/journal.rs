use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::OrderSide;

/// An applied order.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeLogEntry {
    /// Time of the step that produced the order.
    pub timestamp: DateTime<Utc>,
    /// Buy or sell.
    pub side: OrderSide,
    /// Fill price.
    pub price: Decimal,
    /// Shares held after the fill.
    pub resulting_quantity: u64,
}

/// Fast and slow averages sampled at the resampling cadence.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    /// Time of the sample.
    pub timestamp: DateTime<Utc>,
    /// Fast average value.
    pub fast: Decimal,
    /// Slow average value.
    pub slow: Decimal,
}

/// Why a step was skipped.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The step had no price.
    DataGap,
    /// The price could not be used to size an order.
    InvalidPrice,
}

/// One record of the run output.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogEntry {
    /// An order was applied.
    Trade(TradeLogEntry),
    /// Periodic indicator sample.
    Snapshot(IndicatorSnapshot),
    /// The step was skipped; its price is recorded as zero.
    Skipped {
        /// Time of the skipped step.
        timestamp: DateTime<Utc>,
        /// Always zero.
        price: Decimal,
        /// Cause of the skip.
        reason: SkipReason,
    },
    /// Last observed price, written once the feed is exhausted.
    Terminal {
        /// Time of the last tick.
        timestamp: DateTime<Utc>,
        /// Last valid price seen.
        price: Decimal,
    },
}

impl LogEntry {
    /// Returns the time of the record.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Trade(trade) => trade.timestamp,
            Self::Snapshot(snapshot) => snapshot.timestamp,
            Self::Skipped { timestamp, .. } | Self::Terminal { timestamp, .. } => *timestamp,
        }
    }
}

/// Append-only record of a run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktestLog {
    entries: Vec<LogEntry>,
}

impl BacktestLog {
    pub(crate) fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns an iterator over every entry in order.
    pub fn entries(&self) -> std::slice::Iter<'_, LogEntry> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the applied trades.
    pub fn trades(&self) -> impl Iterator<Item = &TradeLogEntry> {
        self.entries.iter().filter_map(|entry| match entry {
            LogEntry::Trade(trade) => Some(trade),
            _ => None,
        })
    }

    /// Returns the indicator samples.
    pub fn snapshots(&self) -> impl Iterator<Item = &IndicatorSnapshot> {
        self.entries.iter().filter_map(|entry| match entry {
            LogEntry::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        })
    }

    /// Returns the skipped steps with their reason.
    pub fn skipped(&self) -> impl Iterator<Item = (DateTime<Utc>, SkipReason)> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            LogEntry::Skipped { timestamp, reason, .. } => Some((*timestamp, *reason)),
            _ => None,
        })
    }

    /// Returns the terminal price record, if the run reached the end of its feed.
    pub fn terminal(&self) -> Option<(DateTime<Utc>, Decimal)> {
        self.entries.iter().rev().find_map(|entry| match entry {
            LogEntry::Terminal { timestamp, price } => Some((*timestamp, *price)),
            _ => None,
        })
    }
}

#[cfg(test)]
#[test]
fn filters_entries_by_kind() {
    use rust_decimal_macros::dec;

    let t = DateTime::<Utc>::default();
    let mut log = BacktestLog::default();
    assert!(log.is_empty());

    log.push(LogEntry::Snapshot(IndicatorSnapshot {
        timestamp: t,
        fast: dec!(1),
        slow: dec!(1),
    }));
    log.push(LogEntry::Trade(TradeLogEntry {
        timestamp: t,
        side: OrderSide::Buy,
        price: dec!(1),
        resulting_quantity: 3,
    }));
    log.push(LogEntry::Skipped {
        timestamp: t,
        price: Decimal::ZERO,
        reason: SkipReason::DataGap,
    });
    log.push(LogEntry::Terminal { timestamp: t, price: dec!(2) });

    assert_eq!(log.len(), 4);
    assert_eq!(log.trades().count(), 1);
    assert_eq!(log.snapshots().count(), 1);
    assert_eq!(log.skipped().collect::<Vec<_>>(), vec![(t, SkipReason::DataGap)]);
    assert_eq!(log.terminal(), Some((t, dec!(2))));
    assert!(log.entries().all(|e| e.timestamp() == t));

    log.clear();
    assert!(log.terminal().is_none());
}
