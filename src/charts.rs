//! Chart series built from a run log.
//!
//! A run is presented as two charts:
//! - `Trade Plot`: `Buy` and `Sell` scatter points at fill prices, and a
//!   `Price` line made of skipped steps (plotted at zero) and the terminal price.
//! - `Strategy Equity`: `FastMA` and `SlowMA` lines from the resampled snapshots.
//!
//! Nothing is rendered here: the charts are plain data for whatever sink
//! displays them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::{BacktestLog, LogEntry, OrderSide};

/// Name of the trades chart.
pub const TRADE_PLOT: &str = "Trade Plot";
/// Name of the averages chart.
pub const STRATEGY_EQUITY: &str = "Strategy Equity";

/// How a series is drawn.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesType {
    /// Connected points.
    Line,
    /// Separate markers.
    Scatter,
}

/// A named list of points.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Series name.
    pub name: String,
    /// Drawing style.
    pub kind: SeriesType,
    /// Points in time order.
    pub points: Vec<(DateTime<Utc>, Decimal)>,
}

impl Series {
    fn new(name: &str, kind: SeriesType) -> Self {
        Self {
            name: name.to_string(),
            kind,
            points: Vec::new(),
        }
    }
}

/// A named group of series sharing one axis.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    /// Chart name.
    pub name: String,
    /// Series of the chart.
    pub series: Vec<Series>,
}

impl Chart {
    /// Returns the series called `name`.
    pub fn series(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.name == name)
    }
}

/// Builds the trade and averages charts from `log`.
pub fn build_charts(log: &BacktestLog) -> Vec<Chart> {
    let mut buy = Series::new("Buy", SeriesType::Scatter);
    let mut sell = Series::new("Sell", SeriesType::Scatter);
    let mut price = Series::new("Price", SeriesType::Line);
    let mut fast = Series::new("FastMA", SeriesType::Line);
    let mut slow = Series::new("SlowMA", SeriesType::Line);

    for entry in log.entries() {
        match *entry {
            LogEntry::Trade(trade) => match trade.side {
                OrderSide::Buy => buy.points.push((trade.timestamp, trade.price)),
                OrderSide::Sell => sell.points.push((trade.timestamp, trade.price)),
            },
            LogEntry::Snapshot(snapshot) => {
                fast.points.push((snapshot.timestamp, snapshot.fast));
                slow.points.push((snapshot.timestamp, snapshot.slow));
            }
            LogEntry::Skipped {
                timestamp, price: p, ..
            }
            | LogEntry::Terminal { timestamp, price: p } => price.points.push((timestamp, p)),
        }
    }

    vec![
        Chart {
            name: TRADE_PLOT.to_string(),
            series: vec![buy, sell, price],
        },
        Chart {
            name: STRATEGY_EQUITY.to_string(),
            series: vec![fast, slow],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use crate::config::BacktestConfig;
    use crate::engine::{Backtest, MemoryFeed, Tick};

    #[test]
    fn charts_from_a_run() {
        let day = |d| Utc.with_ymd_and_hms(2016, 1, d, 0, 0, 0).unwrap();
        let mut bts = Backtest::new(BacktestConfig::default()).unwrap();
        let feed = MemoryFeed::from(vec![
            Tick::from((day(13), Some(dec!(100)))),
            Tick::from((day(14), None)),
            Tick::from((day(21), Some(dec!(110)))),
        ]);
        bts.run(feed).unwrap();

        let charts = build_charts(bts.log());
        assert_eq!(charts.len(), 2);

        let trades = &charts[0];
        assert_eq!(trades.name, TRADE_PLOT);
        assert_eq!(trades.series("Buy").unwrap().points, vec![(day(13), dec!(100))]);
        assert_eq!(trades.series("Sell").unwrap().points, vec![(day(21), dec!(110))]);
        assert_eq!(
            trades.series("Price").unwrap().points,
            vec![(day(14), dec!(0)), (day(21), dec!(110))]
        );
        assert_eq!(trades.series("Buy").unwrap().kind, SeriesType::Scatter);

        let averages = &charts[1];
        assert_eq!(averages.name, STRATEGY_EQUITY);
        let fast = averages.series("FastMA").unwrap();
        let slow = averages.series("SlowMA").unwrap();
        assert_eq!(fast.points.len(), 2);
        assert_eq!(fast.points[0], (day(13), dec!(100)));
        // 0.01 * 110 + 0.99 * 100
        assert_eq!(fast.points[1], (day(21), dec!(100.1)));
        // 0.001 * 110 + 0.999 * 100
        assert_eq!(slow.points[1], (day(21), dec!(100.01)));
        assert!(averages.series("Volume").is_none());
    }

    #[test]
    fn empty_log_gives_empty_series() {
        let charts = build_charts(&BacktestLog::default());
        assert!(charts.iter().flat_map(|c| &c.series).all(|s| s.points.is_empty()));
    }
}
