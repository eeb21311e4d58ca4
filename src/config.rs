//! Run parameters.
//!
//! Defaults reproduce the reference run: one year of daily SPY closes from
//! 2016-01-01, 100 000 in cash, a 0.01 / 0.001 EWMA pair, entry on days of
//! month divisible by 13, exit on days divisible by 21, and at most 2000
//! indicator samples over the period.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// The strategy knobs of a config: average decays and calendar moduli.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyParameters {
    /// Decay of the fast average.
    pub fast_decay: Decimal,
    /// Decay of the slow average.
    pub slow_decay: Decimal,
    /// Entry day-of-month modulus.
    pub entry_modulus: u32,
    /// Exit day-of-month modulus.
    pub exit_modulus: u32,
}

/// Configuration of a backtest run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    /// Instrument name, used for logs and reports only.
    pub symbol: String,
    /// Start of the run period.
    pub start: DateTime<Utc>,
    /// End of the run period.
    pub end: DateTime<Utc>,
    /// Starting cash.
    pub initial_cash: Decimal,
    /// Decay of the fast average.
    pub fast_decay: Decimal,
    /// Decay of the slow average.
    pub slow_decay: Decimal,
    /// Buy when flat on days of month divisible by this.
    pub entry_modulus: u32,
    /// Liquidate when invested on days of month divisible by this.
    pub exit_modulus: u32,
    /// Number of indicator samples spread over the period.
    pub resample_points: u32,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            symbol: "SPY".to_string(),
            // 2016-01-01T00:00:00Z
            start: DateTime::from_timestamp(1_451_606_400, 0).unwrap_or_default(),
            // 2017-01-01T00:00:00Z
            end: DateTime::from_timestamp(1_483_228_800, 0).unwrap_or_default(),
            initial_cash: Decimal::from(100_000),
            fast_decay: Decimal::new(1, 2),
            slow_decay: Decimal::new(1, 3),
            entry_modulus: 13,
            exit_modulus: 21,
            resample_points: 2000,
        }
    }
}

impl BacktestConfig {
    /// Checks every field, returning the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return Err(Error::InvalidPeriod {
                start: self.start,
                end: self.end,
            });
        }
        if self.initial_cash <= Decimal::ZERO {
            return Err(Error::NegZeroCash(self.initial_cash));
        }
        for decay in [self.fast_decay, self.slow_decay] {
            if decay <= Decimal::ZERO || decay > Decimal::ONE {
                return Err(Error::InvalidDecay(decay));
            }
        }
        for modulus in [self.entry_modulus, self.exit_modulus] {
            if modulus == 0 {
                return Err(Error::InvalidModulus(modulus));
            }
        }
        if self.resample_points == 0 {
            return Err(Error::InvalidResamplePoints);
        }
        Ok(())
    }

    /// Returns the interval between two indicator samples: `(end - start) / resample_points`.
    pub fn resample_period(&self) -> Result<TimeDelta> {
        let points = i32::try_from(self.resample_points)
            .ok()
            .filter(|points| *points > 0)
            .ok_or(Error::InvalidResamplePoints)?;
        Ok((self.end - self.start) / points)
    }

    /// Returns a copy with other average decays.
    pub fn with_decays(&self, fast_decay: Decimal, slow_decay: Decimal) -> Self {
        Self {
            fast_decay,
            slow_decay,
            ..self.clone()
        }
    }

    /// Returns a copy with other calendar moduli.
    pub fn with_moduli(&self, entry_modulus: u32, exit_modulus: u32) -> Self {
        Self {
            entry_modulus,
            exit_modulus,
            ..self.clone()
        }
    }

    /// Returns a copy using every strategy knob of `parameters`.
    pub fn with_parameters(&self, parameters: StrategyParameters) -> Self {
        self.with_decays(parameters.fast_decay, parameters.slow_decay)
            .with_moduli(parameters.entry_modulus, parameters.exit_modulus)
    }

    /// Returns the strategy knobs of this config.
    pub fn parameters(&self) -> StrategyParameters {
        StrategyParameters {
            fast_decay: self.fast_decay,
            slow_decay: self.slow_decay,
            entry_modulus: self.entry_modulus,
            exit_modulus: self.exit_modulus,
        }
    }

    /// Reads a JSON config file; missing fields take their default value.
    #[cfg(feature = "serde")]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use std::{fs::File, io::BufReader};

        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn default_matches_reference_run() {
        let config = BacktestConfig::default();
        assert_eq!(config.start, Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(config.end, Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(config.initial_cash, dec!(100000));
        assert_eq!(config.fast_decay, dec!(0.01));
        assert_eq!(config.slow_decay, dec!(0.001));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn resample_period_splits_the_run() {
        let config = BacktestConfig::default();
        // 366 days (leap year) / 2000
        let expected = TimeDelta::days(366) / 2000;
        assert_eq!(config.resample_period().unwrap(), expected);

        let config = BacktestConfig {
            resample_points: 0,
            ..BacktestConfig::default()
        };
        assert!(matches!(config.resample_period(), Err(Error::InvalidResamplePoints)));
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let base = BacktestConfig::default();

        let reversed = BacktestConfig {
            start: base.end,
            end: base.start,
            ..base.clone()
        };
        assert!(matches!(reversed.validate(), Err(Error::InvalidPeriod { .. })));

        let broke = BacktestConfig {
            initial_cash: dec!(0),
            ..base.clone()
        };
        assert!(matches!(broke.validate(), Err(Error::NegZeroCash(_))));

        let decay = base.with_decays(dec!(0.01), dec!(0));
        assert!(matches!(decay.validate(), Err(Error::InvalidDecay(_))));

        let modulus = BacktestConfig {
            exit_modulus: 0,
            ..base.clone()
        };
        assert!(matches!(modulus.validate(), Err(Error::InvalidModulus(0))));

        let points = BacktestConfig {
            resample_points: 0,
            ..base
        };
        assert!(matches!(points.validate(), Err(Error::InvalidResamplePoints)));
    }

    #[test]
    fn builders_replace_strategy_knobs_only() {
        let base = BacktestConfig::default();
        let parameters = StrategyParameters {
            fast_decay: dec!(0.2),
            slow_decay: dec!(0.02),
            entry_modulus: 5,
            exit_modulus: 7,
        };

        let config = base.with_parameters(parameters);
        assert_eq!(config.parameters(), parameters);
        assert_eq!(config.initial_cash, base.initial_cash);
        assert_eq!(config.resample_points, base.resample_points);

        let moduli = base.with_moduli(3, 11);
        assert_eq!((moduli.entry_modulus, moduli.exit_modulus), (3, 11));
        assert_eq!(moduli.fast_decay, base.fast_decay);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json_uses_defaults() {
        let config: BacktestConfig =
            serde_json::from_str(r#"{ "symbol": "QQQ", "initial_cash": "2500.50", "entry_modulus": 7 }"#).unwrap();
        assert_eq!(config.symbol, "QQQ");
        assert_eq!(config.initial_cash, dec!(2500.50));
        assert_eq!(config.entry_modulus, 7);
        assert_eq!(config.exit_modulus, 21);
        assert_eq!(config.fast_decay, dec!(0.01));
    }
}
