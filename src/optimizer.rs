//! Strategy parameter optimization.
//!
//! This module runs the same strategy over one price series for many
//! parameter sets: average decays and the entry/exit day moduli. The
//! `Optimizer` owns the shared series and the base config, the
//! `ParameterCombination` trait defines which sets to test.
//!
//! Runs are independent: each one builds its own `Backtest` and reads the
//! ticks through a cloned `Arc`.

use std::sync::Arc;

use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::{
    config::{BacktestConfig, StrategyParameters},
    engine::{Backtest, MemoryFeed, Tick},
    errors::{Error, Result},
};

/// Trait defining which parameter sets an optimization tests.
pub trait ParameterCombination: Sync {
    /// Generates all parameter sets to test.
    ///
    /// ### Returns
    /// A vector containing every combination.
    fn generate(&self) -> Vec<StrategyParameters>;
}

/// Cartesian product of candidates for every strategy knob.
///
/// Sets where the fast decay is not above the slow one are left out.
#[derive(Debug, Clone, Default)]
pub struct ParameterGrid {
    /// Fast decay candidates.
    pub fast_decay: Vec<Decimal>,
    /// Slow decay candidates.
    pub slow_decay: Vec<Decimal>,
    /// Entry modulus candidates.
    pub entry_modulus: Vec<u32>,
    /// Exit modulus candidates.
    pub exit_modulus: Vec<u32>,
}

impl From<&BacktestConfig> for ParameterGrid {
    /// A grid holding only the values of `config`.
    fn from(config: &BacktestConfig) -> Self {
        Self {
            fast_decay: vec![config.fast_decay],
            slow_decay: vec![config.slow_decay],
            entry_modulus: vec![config.entry_modulus],
            exit_modulus: vec![config.exit_modulus],
        }
    }
}

impl ParameterCombination for ParameterGrid {
    fn generate(&self) -> Vec<StrategyParameters> {
        let mut combinations = Vec::new();
        for &fast_decay in &self.fast_decay {
            for &slow_decay in self.slow_decay.iter().filter(|&&slow| fast_decay > slow) {
                for &entry_modulus in &self.entry_modulus {
                    for &exit_modulus in &self.exit_modulus {
                        combinations.push(StrategyParameters {
                            fast_decay,
                            slow_decay,
                            entry_modulus,
                            exit_modulus,
                        });
                    }
                }
            }
        }
        combinations
    }
}

impl ParameterCombination for Vec<StrategyParameters> {
    fn generate(&self) -> Vec<StrategyParameters> {
        self.clone()
    }
}

/// Optimizer running one backtest per decay pair on a rayon pool.
#[derive(Debug, Clone)]
pub struct Optimizer {
    ticks: Arc<[Tick]>,
    config: BacktestConfig,
}

impl From<&Backtest> for Optimizer {
    fn from(value: &Backtest) -> Self {
        Self::new(Vec::<Tick>::new(), value.config().clone())
    }
}

impl Optimizer {
    /// Creates a new `Optimizer`.
    ///
    /// ### Arguments
    /// * `ticks` - Price series shared by every run.
    /// * `config` - Base config; only the strategy knobs change between runs.
    pub fn new(ticks: impl Into<Arc<[Tick]>>, config: BacktestConfig) -> Self {
        Self {
            ticks: ticks.into(),
            config,
        }
    }

    /// Replaces the price series.
    pub fn with_ticks(mut self, ticks: impl Into<Arc<[Tick]>>) -> Self {
        self.ticks = ticks.into();
        self
    }

    /// Returns the shared price series.
    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    /// Runs every combination and returns each one with its final equity.
    ///
    /// Results keep the order of `combinations.generate()`.
    ///
    /// ### Errors
    /// `Error::EmptyParameters` when there is nothing to test, otherwise the
    /// first config or run error met.
    pub fn run<PC>(&self, combinations: &PC) -> Result<Vec<(StrategyParameters, Decimal)>>
    where
        PC: ParameterCombination,
    {
        let combinations = combinations.generate();
        if combinations.is_empty() {
            return Err(Error::EmptyParameters);
        }

        let num_cpus = num_cpus::get();
        let chunk_size = combinations.len().div_ceil(num_cpus).max(1);
        info!(runs = combinations.len(), chunk_size, "starting optimization");

        combinations
            .par_chunks(chunk_size)
            .map::<_, Result<_>>(|par_combinations| {
                let mut local_results = Vec::with_capacity(par_combinations.len());

                for &parameters in par_combinations {
                    let mut backtest = Backtest::new(self.config.with_parameters(parameters))?;
                    backtest.run(MemoryFeed::new(Arc::clone(&self.ticks)))?;
                    debug!(?parameters, equity = %backtest.equity(), "run finished");
                    local_results.push((parameters, backtest.equity()));
                }

                Ok(local_results)
            })
            .collect::<Result<Vec<_>>>()
            .map(|chunks| chunks.into_iter().flatten().collect())
    }

    /// Runs every combination and returns the one with the highest equity.
    /// Ties go to the first generated.
    pub fn best<PC>(&self, combinations: &PC) -> Result<(StrategyParameters, Decimal)>
    where
        PC: ParameterCombination,
    {
        self.run(combinations)?
            .into_iter()
            .reduce(|best, next| if next.1 > best.1 { next } else { best })
            .ok_or(Error::EmptyParameters)
    }
}
