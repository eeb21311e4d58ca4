use chrono::{DateTime, Datelike, TimeDelta, Utc, Weekday};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::Deserialize;

use crate::config::BacktestConfig;
use crate::engine::{PriceObservation, Tick};
use crate::errors::Result;

// [
//   { "time": "2016-01-04T00:00:00Z", "close": 201.02 },
//   { "time": "2016-01-05T00:00:00Z", "close": null },
//   { "time": "2016-01-06T00:00:00Z", "close": "198.82" }
// ]

/// One row of a JSON price file. A `null` or missing close is a gap.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Deserialize)]
pub struct PriceRecord {
    #[serde(alias = "timestamp", alias = "date")]
    time: DateTime<Utc>,
    #[serde(default, alias = "close_price")]
    close: Option<Decimal>,
}

#[cfg(feature = "serde")]
impl From<PriceRecord> for Tick {
    fn from(record: PriceRecord) -> Self {
        Tick::from((record.time, record.close))
    }
}

#[cfg(feature = "serde")]
/// Reads ticks from `filepath`, a JSON array of `{ "time", "close" }` rows.
pub fn get_ticks_from_file(filepath: impl AsRef<std::path::Path>) -> Result<Vec<Tick>> {
    use std::{fs::File, io::BufReader};

    let file = File::open(filepath)?;
    let reader = BufReader::new(file);
    let records: Vec<PriceRecord> = serde_json::from_reader(reader)?;
    Ok(records.into_iter().map(Tick::from).collect())
}

/// Deterministic pseudo-random daily closes, weekdays only.
///
/// The close moves by a random amount of cents each day and never drops
/// below 1. Each weekday is a gap with probability `gap_rate`. The same seed
/// always yields the same series.
#[derive(Debug, Clone)]
pub struct SyntheticFeed {
    rng: StdRng,
    current: DateTime<Utc>,
    end: DateTime<Utc>,
    close: Decimal,
    gap_rate: f64,
}

impl SyntheticFeed {
    /// Creates a feed covering `[start, end)` starting from `base_price`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, base_price: Decimal, gap_rate: f64, seed: u64) -> Self {
        let gap_rate = if gap_rate.is_finite() {
            gap_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            rng: StdRng::seed_from_u64(seed),
            current: start,
            end,
            close: base_price.max(Decimal::ONE),
            gap_rate,
        }
    }

    /// Creates a feed over the config period, starting at 200.
    pub fn from_config(config: &BacktestConfig, gap_rate: f64, seed: u64) -> Self {
        Self::new(config.start, config.end, Decimal::from(200), gap_rate, seed)
    }
}

impl Iterator for SyntheticFeed {
    type Item = Result<Tick>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current < self.end {
            let timestamp = self.current;
            self.current += TimeDelta::days(1);
            if matches!(timestamp.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            }

            let cents: i64 = self.rng.random_range(-150..=160);
            self.close = (self.close + Decimal::new(cents, 2)).max(Decimal::ONE);

            if self.rng.random_bool(self.gap_rate) {
                return Some(Ok(Tick::Gap { timestamp }));
            }
            return Some(Ok(Tick::Price(PriceObservation::from((timestamp, self.close)))));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(gap_rate: f64, seed: u64) -> SyntheticFeed {
        SyntheticFeed::from_config(&BacktestConfig::default(), gap_rate, seed)
    }

    #[test]
    fn synthetic_feed_is_deterministic() {
        let first = feed(0.05, 7).collect::<Result<Vec<_>>>().unwrap();
        let second = feed(0.05, 7).collect::<Result<Vec<_>>>().unwrap();
        let other = feed(0.05, 8).collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn synthetic_feed_covers_weekdays_of_the_period() {
        let ticks = feed(0.0, 1).collect::<Result<Vec<_>>>().unwrap();
        // 2016 has 261 weekdays
        assert_eq!(ticks.len(), 261);
        assert!(ticks.iter().all(|t| !t.is_gap()));
        assert!(ticks.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));
        assert!(
            ticks
                .iter()
                .all(|t| t.observation().map(|o| o.close() >= Decimal::ONE).unwrap_or(false))
        );
    }

    #[test]
    fn synthetic_feed_gap_rate_bounds() {
        assert!(feed(1.0, 3).all(|t| t.unwrap().is_gap()));
        assert!(feed(f64::NAN, 3).all(|t| !t.unwrap().is_gap()));
        assert!(feed(-2.0, 3).all(|t| !t.unwrap().is_gap()));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn price_file_rows_become_ticks() {
        use rust_decimal_macros::dec;

        let json = r#"[
            { "time": "2016-01-04T00:00:00Z", "close": 201.02 },
            { "time": "2016-01-05T00:00:00Z", "close": null },
            { "timestamp": "2016-01-06T00:00:00Z" },
            { "time": "2016-01-07T00:00:00Z", "close": "198.82" }
        ]"#;
        let records: Vec<PriceRecord> = serde_json::from_str(json).unwrap();
        let ticks = records.into_iter().map(Tick::from).collect::<Vec<_>>();

        assert_eq!(ticks.len(), 4);
        assert_eq!(ticks[0].observation().unwrap().close(), dec!(201.02));
        assert!(ticks[1].is_gap());
        assert!(ticks[2].is_gap());
        assert_eq!(ticks[3].observation().unwrap().close(), dec!(198.82));
    }
}
