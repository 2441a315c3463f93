//! Single equity path simulation.
//!
//! Each trade risks a slice of current equity (or a fixed dollar amount),
//! multiplies it by a sampled R-multiple, and books the profit. A path that
//! reaches zero or negative equity is ruined and stops immediately.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, RiskSizing, SimulationConfig};
use crate::rng::RandomSource;
use crate::sampler::TradeSampler;

/// Outcome of one simulated path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathResult {
    /// Equity after each trade; index 0 is the initial capital.
    pub equity_series: Vec<f64>,
    /// Per-trade return as a fraction of equity before the trade.
    pub returns_per_trade: Vec<f64>,
    /// Per-trade dollar P&L.
    pub profits_per_trade: Vec<f64>,
    pub trades_simulated: usize,
    pub final_equity: f64,
    /// Largest peak-to-trough decline as a positive fraction in `[0, 1]`.
    pub max_drawdown: f64,
    pub ruined: bool,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComputationError {
    #[error("equity became non-finite ({equity}) at trade {trade}")]
    NonFiniteEquity { trade: usize, equity: f64 },
}

/// Runs equity paths for one validated configuration.
///
/// Holds only read-only state, so one simulator can be shared across threads.
#[derive(Debug, Clone)]
pub struct PathSimulator {
    initial_capital: f64,
    max_trades: usize,
    sizing: RiskSizing,
    sampler: TradeSampler,
}

impl PathSimulator {
    pub fn new(config: &SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            initial_capital: config.initial_capital,
            max_trades: config.max_trades_per_run,
            sizing: config.sizing()?,
            sampler: config.sampler(),
        })
    }

    pub fn sampler(&self) -> &TradeSampler {
        &self.sampler
    }

    /// Simulate one path, drawing every outcome from `source`.
    pub fn simulate<R: RandomSource + ?Sized>(
        &self,
        source: &mut R,
    ) -> Result<PathResult, ComputationError> {
        let mut equity = self.initial_capital;
        let mut peak = equity;
        let mut max_drawdown = 0.0_f64;

        let mut equity_series = Vec::with_capacity(self.max_trades + 1);
        let mut returns_per_trade = Vec::with_capacity(self.max_trades);
        let mut profits_per_trade = Vec::with_capacity(self.max_trades);
        equity_series.push(equity);

        let mut ruined = false;
        for trade in 0..self.max_trades {
            let r_multiple = self.sampler.draw(source);
            let risk = self.sizing.risk_dollars(equity);
            let profit = r_multiple * risk;
            let previous = equity;
            equity += profit;

            if !equity.is_finite() {
                return Err(ComputationError::NonFiniteEquity { trade, equity });
            }

            equity_series.push(equity);
            profits_per_trade.push(profit);
            returns_per_trade.push(if previous != 0.0 { profit / previous } else { 0.0 });

            if equity > peak {
                peak = equity;
            }
            if peak > 0.0 {
                let drawdown = ((peak - equity) / peak).min(1.0);
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }

            if equity <= 0.0 {
                ruined = true;
                break;
            }
        }

        Ok(PathResult {
            trades_simulated: returns_per_trade.len(),
            final_equity: equity,
            equity_series,
            returns_per_trade,
            profits_per_trade,
            max_drawdown,
            ruined,
        })
    }
}

/// Convenience wrapper: validate `config` and simulate a single path.
pub fn simulate_path<R: RandomSource + ?Sized>(
    config: &SimulationConfig,
    source: &mut R,
) -> Result<PathResult, SimulateError> {
    let simulator = PathSimulator::new(config)?;
    Ok(simulator.simulate(source)?)
}

#[derive(Debug, Error)]
pub enum SimulateError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Computation(#[from] ComputationError),
}
