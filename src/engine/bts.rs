use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::{
    config::BacktestConfig,
    engine::*,
    errors::{Error, Result},
};

/// Backtest runner: drains a feed through the strategy and records the run.
///
/// Each tick is fully processed (indicator update, decision, order
/// application, logging) before the next one is pulled.
#[derive(Debug, Clone)]
pub struct Backtest {
    config: BacktestConfig,
    engine: StrategyEngine,
    position: PositionState,
    log: BacktestLog,
    resample_period: TimeDelta,
    next_sample: DateTime<Utc>,
    last_price: Option<Decimal>,
}

impl std::ops::Deref for Backtest {
    type Target = PositionState;

    fn deref(&self) -> &Self::Target {
        &self.position
    }
}

impl Backtest {
    /// Creates a new backtest from a validated config.
    ///
    /// ### Example
    /// ```rust
    /// use bts_ewma::prelude::*;
    /// use chrono::{TimeZone, Utc};
    /// use rust_decimal::Decimal;
    ///
    /// let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
    /// let day = Utc.with_ymd_and_hms(2016, 1, 13, 0, 0, 0).unwrap();
    /// let feed = MemoryFeed::from(vec![Tick::from((day, Some(Decimal::from(100))))]);
    /// bts.run(feed).unwrap();
    /// assert_eq!(bts.quantity(), 1000);
    /// ```
    pub fn new(config: BacktestConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            engine: StrategyEngine::from_config(&config)?,
            position: PositionState::new(config.initial_cash)?,
            resample_period: config.resample_period()?,
            next_sample: DateTime::<Utc>::MIN_UTC,
            log: BacktestLog::default(),
            last_price: None,
            config,
        })
    }

    /// Returns the run configuration.
    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Returns the strategy engine.
    pub fn engine(&self) -> &StrategyEngine {
        &self.engine
    }

    /// Returns the position.
    pub fn position(&self) -> &PositionState {
        &self.position
    }

    /// Returns the run log. After a failed run it holds everything recorded
    /// up to the failing step.
    pub fn log(&self) -> &BacktestLog {
        &self.log
    }

    /// Returns the last positive price seen.
    pub fn last_price(&self) -> Option<Decimal> {
        self.last_price
    }

    /// Returns cash plus the position valued at the last price.
    pub fn equity(&self) -> Decimal {
        self.position.equity(self.last_price.unwrap_or_default())
    }

    /// Runs the backtest over every tick of `feed`.
    ///
    /// Data gaps and unusable prices skip their step and are recorded as
    /// `LogEntry::Skipped`. Feed errors and invariant violations stop the
    /// run and are returned; the log keeps what was recorded before.
    /// Reaching the end of the feed appends a `LogEntry::Terminal` with the
    /// last price.
    pub fn run<F>(&mut self, feed: F) -> Result<()>
    where
        F: PriceFeed,
    {
        info!(symbol = %self.config.symbol, cash = %self.position.cash(), "starting backtest");

        let mut last_timestamp = None;
        for item in feed {
            let tick = item.inspect_err(|err| error!(%err, "feed failed, aborting run"))?;
            last_timestamp = Some(tick.timestamp());

            if let Err(err) = self.step(&tick) {
                if !err.is_recoverable() {
                    error!(%err, timestamp = %tick.timestamp(), "aborting run");
                    return Err(err);
                }
                warn!(%err, timestamp = %tick.timestamp(), "step skipped");
                self.log.push(LogEntry::Skipped {
                    timestamp: tick.timestamp(),
                    price: Decimal::ZERO,
                    reason: match err {
                        Error::DataGap(_) => SkipReason::DataGap,
                        _ => SkipReason::InvalidPrice,
                    },
                });
            }
        }

        if let Some(timestamp) = last_timestamp {
            self.log.push(LogEntry::Terminal {
                timestamp,
                price: self.last_price.unwrap_or_default(),
            });
        }

        info!(
            trades = self.log.trades().count(),
            skipped = self.log.skipped().count(),
            equity = %self.equity(),
            "backtest completed"
        );
        Ok(())
    }

    /// Resets the backtest to its initial state.
    pub fn reset(&mut self) -> Result<()> {
        self.engine.reset()?;
        self.position.reset();
        self.log.clear();
        self.next_sample = DateTime::<Utc>::MIN_UTC;
        self.last_price = None;
        Ok(())
    }

    fn step(&mut self, tick: &Tick) -> Result<()> {
        let decision = match self.engine.step(tick, &self.position) {
            Err(err) if !err.is_recoverable() => return Err(err),
            decision => decision,
        };

        let observation = *tick.observation()?;
        if observation.close() > Decimal::ZERO {
            self.last_price = Some(observation.close());
        }
        self.sample(observation.timestamp());

        match decision? {
            Some(intent) => self.apply(intent, &observation),
            None => Ok(()),
        }
    }

    /// Records the averages when the resampling interval has elapsed.
    fn sample(&mut self, timestamp: DateTime<Utc>) {
        if timestamp <= self.next_sample {
            return;
        }
        self.next_sample = timestamp
            .checked_add_signed(self.resample_period)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        if let (Some(fast), Some(slow)) = (self.engine.fast().value(), self.engine.slow().value()) {
            debug!(%timestamp, %fast, %slow, "indicator snapshot");
            self.log.push(LogEntry::Snapshot(IndicatorSnapshot { timestamp, fast, slow }));
        }
    }

    fn apply(&mut self, intent: OrderIntent, observation: &PriceObservation) -> Result<()> {
        let price = observation.close();
        match intent {
            OrderIntent::Buy { quantity } => self.position.apply_buy(quantity, price)?,
            OrderIntent::Liquidate => self.position.apply_liquidate(price)?,
        }

        let trade = TradeLogEntry {
            timestamp: observation.timestamp(),
            side: intent.side(),
            price,
            resulting_quantity: self.position.quantity(),
        };
        debug!(?trade, cash = %self.position.cash(), "order applied");
        self.log.push(LogEntry::Trade(trade));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, TimeZone};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::errors::Violation;

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, month, day, 0, 0, 0).unwrap()
    }

    fn price(month: u32, day: u32, close: Decimal) -> Tick {
        Tick::from((at(month, day), Some(close)))
    }

    fn gap(month: u32, day: u32) -> Tick {
        Tick::Gap { timestamp: at(month, day) }
    }

    /// Weekday closes for 2016 drifting between 95 and 115.
    fn year_of_ticks() -> Vec<Tick> {
        let mut ticks = Vec::new();
        let mut day = at(1, 1);
        let mut i = 0i64;
        while day < at(12, 31) {
            if day.weekday().num_days_from_monday() < 5 {
                let cents = 10_500 + ((i * 37) % 2_000) - 1_000;
                ticks.push(Tick::from((day, Some(Decimal::new(cents, 2)))));
                i += 1;
            }
            day += TimeDelta::days(1);
        }
        ticks
    }

    #[test]
    fn scenario_buy_on_13th_and_liquidate_on_21st() {
        let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
        let feed = MemoryFeed::from(vec![price(1, 13, dec!(100)), price(1, 21, dec!(110))]);

        bts.run(feed).unwrap();

        let trades = bts.log().trades().copied().collect::<Vec<_>>();
        assert_eq!(
            trades,
            vec![
                TradeLogEntry {
                    timestamp: at(1, 13),
                    side: OrderSide::Buy,
                    price: dec!(100),
                    resulting_quantity: 1000,
                },
                TradeLogEntry {
                    timestamp: at(1, 21),
                    side: OrderSide::Sell,
                    price: dec!(110),
                    resulting_quantity: 0,
                },
            ]
        );
        assert_eq!(bts.log().terminal(), Some((at(1, 21), dec!(110))));
        assert_eq!(
            bts.log().entries().filter(|e| matches!(e, LogEntry::Terminal { .. })).count(),
            1
        );
        assert_eq!(bts.engine().state(), StrategyState::Flat);
        assert!(!bts.invested());
        assert_eq!(bts.cash(), dec!(110000));
    }

    #[test]
    fn scenario_gap_on_entry_day() {
        let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
        let feed = MemoryFeed::from(vec![price(1, 12, dec!(99)), gap(1, 13), price(1, 14, dec!(101))]);

        bts.run(feed).unwrap();

        assert_eq!(bts.log().trades().count(), 0);
        assert_eq!(bts.engine().state(), StrategyState::Flat);
        assert!(!bts.invested());
        assert_eq!(bts.log().skipped().collect::<Vec<_>>(), vec![(at(1, 13), SkipReason::DataGap)]);
        assert!(bts.log().entries().any(|e| matches!(
            e,
            LogEntry::Skipped { price, .. } if price.is_zero()
        )));
        assert_eq!(bts.log().terminal(), Some((at(1, 14), dec!(101))));
        // the gap did not touch the averages: 0.01 * 101 + 0.99 * 99
        assert_eq!(bts.engine().fast().value(), Some(dec!(99.02)));
    }

    #[test]
    fn trailing_gap_keeps_last_valid_price() {
        let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
        bts.run(MemoryFeed::from(vec![price(1, 4, dec!(99)), gap(1, 5)])).unwrap();
        assert_eq!(bts.log().terminal(), Some((at(1, 5), dec!(99))));

        let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
        bts.run(MemoryFeed::from(vec![gap(1, 5)])).unwrap();
        assert_eq!(bts.log().terminal(), Some((at(1, 5), Decimal::ZERO)));
    }

    #[test]
    fn empty_feed_records_nothing() {
        let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
        bts.run(MemoryFeed::from(vec![])).unwrap();
        assert!(bts.log().is_empty());
    }

    #[test]
    fn invalid_price_on_entry_day_is_skipped() {
        let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
        let feed = MemoryFeed::from(vec![price(1, 13, dec!(0)), price(1, 26, dec!(50))]);

        bts.run(feed).unwrap();

        assert_eq!(bts.log().skipped().collect::<Vec<_>>(), vec![(at(1, 13), SkipReason::InvalidPrice)]);
        assert_eq!(bts.log().trades().count(), 1);
        assert_eq!(bts.quantity(), 2000);
    }

    #[test]
    fn invalid_price_on_exit_day_keeps_position_and_state_together() {
        for close in [dec!(-5), dec!(0)] {
            let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
            let feed = MemoryFeed::from(vec![price(1, 13, dec!(100)), price(1, 21, close), price(1, 22, dec!(100))]);

            bts.run(feed).unwrap();

            assert_eq!(bts.log().skipped().collect::<Vec<_>>(), vec![(at(1, 21), SkipReason::InvalidPrice)]);
            assert_eq!(bts.log().trades().count(), 1);
            assert_eq!(bts.engine().state(), StrategyState::Invested);
            assert!(bts.invested());
            assert_eq!(bts.quantity(), 1000);
            assert_eq!(bts.cash(), dec!(0));
            assert_eq!(bts.log().terminal(), Some((at(1, 22), dec!(100))));
        }
    }

    #[test]
    fn violation_aborts_with_partial_log() {
        let config = BacktestConfig {
            initial_cash: dec!(50),
            ..BacktestConfig::default()
        };
        let mut bts = Backtest::new(config).unwrap();
        let feed = MemoryFeed::from(vec![price(1, 12, dec!(40)), price(1, 13, dec!(100)), price(1, 14, dec!(100))]);

        let result = bts.run(feed);

        assert!(matches!(
            result,
            Err(Error::InvariantViolation(Violation::NonPositiveQuantity))
        ));
        assert_eq!(bts.log().snapshots().count(), 1);
        assert!(bts.log().terminal().is_none());
        assert!(!bts.invested());
    }

    #[test]
    fn feed_error_aborts_run() {
        let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
        let feed = MemoryFeed::from(vec![price(1, 13, dec!(100)), price(1, 12, dec!(100))]);

        let result = bts.run(feed);

        assert!(matches!(result, Err(Error::OutOfOrder { .. })));
        assert_eq!(bts.log().trades().count(), 1);
        assert!(bts.log().terminal().is_none());
    }

    #[test]
    fn snapshots_follow_resample_cadence() {
        // 10 day period: a sample is taken on the first tick strictly past the previous one plus the period
        let config = BacktestConfig {
            end: at(1, 1) + TimeDelta::days(100),
            resample_points: 10,
            ..BacktestConfig::default()
        };
        let mut bts = Backtest::new(config).unwrap();
        let ticks = (0..100)
            .map(|i| Tick::from((at(1, 1) + TimeDelta::days(i), Some(dec!(100)))))
            .collect::<Vec<_>>();

        bts.run(MemoryFeed::from(ticks)).unwrap();

        let times = bts.log().snapshots().map(|s| s.timestamp).collect::<Vec<_>>();
        assert_eq!(times.len(), 10);
        assert_eq!(times[0], at(1, 1));
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], TimeDelta::days(11));
        }
    }

    #[test]
    fn snapshot_precedes_trade_on_the_same_step() {
        let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
        bts.run(MemoryFeed::from(vec![price(1, 13, dec!(100))])).unwrap();
        let kinds = bts
            .log()
            .entries()
            .map(|e| match e {
                LogEntry::Trade(_) => "trade",
                LogEntry::Snapshot(_) => "snapshot",
                LogEntry::Skipped { .. } => "skipped",
                LogEntry::Terminal { .. } => "terminal",
            })
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec!["snapshot", "trade", "terminal"]);
    }

    #[test]
    fn full_year_respects_calendar_rules_and_invariants() {
        let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
        bts.run(MemoryFeed::from(year_of_ticks())).unwrap();

        let trades = bts.log().trades().copied().collect::<Vec<_>>();
        assert!(!trades.is_empty());
        for (i, trade) in trades.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(trade.side, OrderSide::Buy);
                assert_eq!(trade.timestamp.day() % 13, 0);
                assert!(trade.resulting_quantity > 0);
            } else {
                assert_eq!(trade.side, OrderSide::Sell);
                assert_eq!(trade.timestamp.day() % 21, 0);
                assert_eq!(trade.resulting_quantity, 0);
            }
        }
        // one trade per step at most
        let mut days = trades.iter().map(|t| t.timestamp).collect::<Vec<_>>();
        days.dedup();
        assert_eq!(days.len(), trades.len());

        assert_eq!(bts.invested(), bts.quantity() > 0);
        assert!(bts.cash() >= Decimal::ZERO);
        assert!(bts.log().snapshots().count() <= 2000);
    }

    #[test]
    fn reset_allows_a_fresh_run() {
        let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
        bts.run(MemoryFeed::from(year_of_ticks())).unwrap();
        let first = bts.log().clone();
        let equity = bts.equity();

        bts.reset().unwrap();
        assert!(bts.log().is_empty());
        assert_eq!(bts.cash(), dec!(100000));
        assert_eq!(bts.last_price(), None);

        bts.run(MemoryFeed::from(year_of_ticks())).unwrap();
        assert_eq!(bts.log(), &first);
        assert_eq!(bts.equity(), equity);
    }

    #[test]
    fn rejects_invalid_config() {
        let config = BacktestConfig {
            fast_decay: dec!(0),
            ..BacktestConfig::default()
        };
        assert!(matches!(Backtest::new(config), Err(Error::InvalidDecay(_))));
    }
}
