//! Performance metrics for a finished run.
//!
//! This module provides tools to calculate:
//! - Total return
//! - Max drawdown
//! - Profit factor
//! - Win rate
//!
//! Metrics are computed from the trades of the run log. A round trip is a buy
//! followed by the liquidation of the same shares.
//!
//! It needs to enable `metrics` feature to use it.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{PercentCalculus, engine::*};

/// A completed buy and sell pair.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundTrip {
    /// Time of the buy.
    pub entry_time: DateTime<Utc>,
    /// Time of the sell.
    pub exit_time: DateTime<Utc>,
    /// Buy price.
    pub entry_price: Decimal,
    /// Sell price.
    pub exit_price: Decimal,
    /// Shares held during the trip.
    pub quantity: u64,
}

impl RoundTrip {
    /// Returns the realized profit or loss.
    pub fn pnl(&self) -> Decimal {
        (self.exit_price - self.entry_price) * Decimal::from(self.quantity)
    }
}

/// Key performance indicators of a run.
///
/// Built from a `Backtest` once its feed has been drained. The values are
/// expressed in the account currency, percentages are in `[0, 100]` scale.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    initial_cash: Decimal,
    final_equity: Decimal,
    trades: Vec<TradeLogEntry>,
}

impl From<&Backtest> for Metrics {
    fn from(value: &Backtest) -> Self {
        Self {
            initial_cash: value.initial_cash(),
            final_equity: value.equity(),
            trades: value.log().trades().copied().collect(),
        }
    }
}

impl Metrics {
    /// Creates metrics from the applied trades, the starting cash and the equity at the end.
    pub fn new(trades: Vec<TradeLogEntry>, initial_cash: Decimal, final_equity: Decimal) -> Self {
        Self {
            initial_cash,
            final_equity,
            trades,
        }
    }

    /// Returns the starting cash.
    pub fn initial_cash(&self) -> Decimal {
        self.initial_cash
    }

    /// Returns cash plus the open position valued at the last price.
    pub fn final_equity(&self) -> Decimal {
        self.final_equity
    }

    /// Returns the trades.
    pub fn trades(&self) -> std::slice::Iter<'_, TradeLogEntry> {
        self.trades.iter()
    }

    /// Returns the total return as a percentage of the starting cash.
    pub fn total_return(&self) -> Decimal {
        self.initial_cash.change(self.final_equity).unwrap_or_default()
    }

    /// Returns the completed round trips. An open position at the end is not counted.
    pub fn round_trips(&self) -> Vec<RoundTrip> {
        let mut trips = Vec::new();
        let mut entry: Option<&TradeLogEntry> = None;

        for trade in &self.trades {
            match trade.side {
                OrderSide::Buy => entry = Some(trade),
                OrderSide::Sell => {
                    if let Some(buy) = entry.take() {
                        trips.push(RoundTrip {
                            entry_time: buy.timestamp,
                            exit_time: trade.timestamp,
                            entry_price: buy.price,
                            exit_price: trade.price,
                            quantity: buy.resulting_quantity,
                        });
                    }
                }
            }
        }
        trips
    }

    /// Computes the maximum drawdown as a percentage.
    ///
    /// Equity is sampled after each trade and at the end of the run.
    pub fn max_drawdown(&self) -> Decimal {
        let mut cash = self.initial_cash;
        let mut held = Decimal::ZERO;
        let mut equity_history = Vec::with_capacity(self.trades.len() + 1);

        for trade in &self.trades {
            match trade.side {
                OrderSide::Buy => {
                    held = Decimal::from(trade.resulting_quantity);
                    cash -= trade.price * held;
                }
                OrderSide::Sell => {
                    cash += trade.price * held;
                    held = Decimal::ZERO;
                }
            }
            equity_history.push(cash + trade.price * held);
        }
        equity_history.push(self.final_equity);

        let mut max_peak = self.initial_cash;
        let mut max_drawdown = Decimal::ZERO;

        for equity in equity_history {
            if equity > max_peak {
                max_peak = equity;
            }
            if max_peak.is_zero() {
                continue;
            }
            let drawdown = (max_peak - equity) / max_peak;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }

        max_drawdown * Decimal::ONE_HUNDRED
    }

    /// Computes the profit factor: gross gains over gross losses.
    ///
    /// Returns `None` when no round trip lost money.
    pub fn profit_factor(&self) -> Option<Decimal> {
        let mut total_gains = Decimal::ZERO;
        let mut total_losses = Decimal::ZERO;

        for trip in self.round_trips() {
            let pnl = trip.pnl();
            if pnl > Decimal::ZERO {
                total_gains += pnl;
            } else {
                total_losses += pnl.abs();
            }
        }

        if total_losses.is_zero() {
            return None;
        }

        Some(total_gains / total_losses)
    }

    /// Computes the win rate as a percentage of winning round trips.
    pub fn win_rate(&self) -> Decimal {
        let trips = self.round_trips();
        if trips.is_empty() {
            return Decimal::ZERO;
        }

        let winning = trips.iter().filter(|t| t.pnl() > Decimal::ZERO).count();
        Decimal::from(winning) / Decimal::from(trips.len()) * Decimal::ONE_HUNDRED
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Backtest Metrics ===")?;
        writeln!(f, "Initial Cash: {:.2}", self.initial_cash)?;
        writeln!(f, "Final Equity: {:.2}", self.final_equity)?;
        writeln!(f, "Total Return: {:.2}%", self.total_return())?;
        writeln!(f, "Trades: {}", self.trades.len())?;
        writeln!(f, "Round Trips: {}", self.round_trips().len())?;
        writeln!(f)?;
        writeln!(f, "Max Drawdown: {:.2}%", self.max_drawdown())?;
        match self.profit_factor() {
            Some(pf) => writeln!(f, "Profit Factor: {pf:.2}")?,
            None => writeln!(f, "Profit Factor: n/a")?,
        }
        writeln!(f, "Win Rate: {:.2}%", self.win_rate())
    }
}

#[cfg(test)]
fn trade(day: u32, side: OrderSide, price: Decimal, resulting_quantity: u64) -> TradeLogEntry {
    use chrono::TimeZone;

    TradeLogEntry {
        timestamp: Utc.with_ymd_and_hms(2016, 1, day, 0, 0, 0).unwrap(),
        side,
        price,
        resulting_quantity,
    }
}

#[cfg(test)]
#[test]
fn round_trips_pair_buys_with_sells() {
    use rust_decimal_macros::dec;

    let trades = vec![
        trade(1, OrderSide::Buy, dec!(100), 10),
        trade(2, OrderSide::Sell, dec!(120), 0),
        trade(3, OrderSide::Buy, dec!(110), 10),
    ];
    let metrics = Metrics::new(trades, dec!(1000), dec!(1200));
    let trips = metrics.round_trips();
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].pnl(), dec!(200));
    assert_eq!(metrics.total_return(), dec!(20));
}

#[cfg(test)]
#[test]
fn max_drawdown() {
    use rust_decimal_macros::dec;

    // equity: 1000 -> buy 1000 -> sell 1200 -> buy 1200 -> sell 900
    let trades = vec![
        trade(1, OrderSide::Buy, dec!(100), 10),
        trade(2, OrderSide::Sell, dec!(120), 0),
        trade(3, OrderSide::Buy, dec!(120), 10),
        trade(4, OrderSide::Sell, dec!(90), 0),
    ];
    let metrics = Metrics::new(trades, dec!(1000), dec!(900));
    assert_eq!(metrics.max_drawdown(), dec!(25)); // (1200 - 900) / 1200
}

#[cfg(test)]
#[test]
fn max_drawdown_no_trades() {
    use rust_decimal_macros::dec;

    let metrics = Metrics::new(vec![], dec!(1000), dec!(1000));
    assert_eq!(metrics.max_drawdown(), Decimal::ZERO);
    assert_eq!(metrics.total_return(), Decimal::ZERO);
}

#[cfg(test)]
#[test]
fn profit_factor_and_win_rate() {
    use rust_decimal_macros::dec;

    let trades = vec![
        trade(1, OrderSide::Buy, dec!(100), 1),
        trade(2, OrderSide::Sell, dec!(120), 0),
        trade(3, OrderSide::Buy, dec!(120), 1),
        trade(4, OrderSide::Sell, dec!(110), 0),
    ];
    let metrics = Metrics::new(trades, dec!(1000), dec!(1010));
    assert_eq!(metrics.profit_factor(), Some(dec!(2))); // 20 / 10
    assert_eq!(metrics.win_rate(), dec!(50));
}

#[cfg(test)]
#[test]
fn profit_factor_no_losses() {
    use rust_decimal_macros::dec;

    let trades = vec![trade(1, OrderSide::Buy, dec!(100), 1), trade(2, OrderSide::Sell, dec!(120), 0)];
    let metrics = Metrics::new(trades, dec!(1000), dec!(1020));
    assert_eq!(metrics.profit_factor(), None);
    assert_eq!(metrics.win_rate(), dec!(100));

    let metrics = Metrics::new(vec![], dec!(1000), dec!(1000));
    assert_eq!(metrics.profit_factor(), None);
    assert_eq!(metrics.win_rate(), Decimal::ZERO);
}

#[cfg(test)]
#[test]
fn from_backtest() {
    use crate::{config::BacktestConfig, engine::MemoryFeed};
    use rust_decimal_macros::dec;

    let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
    let day = |d| trade(d, OrderSide::Buy, Decimal::ZERO, 0).timestamp;
    let feed = MemoryFeed::from(vec![
        Tick::from((day(13), Some(dec!(100)))),
        Tick::from((day(21), Some(dec!(110)))),
    ]);
    bts.run(feed).unwrap();

    let metrics = Metrics::from(&bts);
    assert_eq!(metrics.final_equity(), dec!(110000));
    assert_eq!(metrics.total_return(), dec!(10));
    assert_eq!(metrics.round_trips().len(), 1);
    assert_eq!(metrics.max_drawdown(), Decimal::ZERO);
    assert!(metrics.to_string().starts_with("=== Backtest Metrics ==="));
}
