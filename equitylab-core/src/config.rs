//! Simulation configuration — serializable, validated before any path runs.
//!
//! Field names serialize as camelCase so that a persisted history record
//! round-trips unchanged. The same layout is accepted from TOML files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sampler::TradeSampler;

/// Default annualization factor (trading days per year).
pub const DEFAULT_TRADES_PER_YEAR: f64 = 252.0;

/// Default number of raw paths retained alongside a summary.
pub const DEFAULT_SAMPLE_RUNS: usize = 20;

/// Immutable configuration for one simulation run set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Free-form strategy or category tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,

    /// Number of independent paths to simulate.
    pub simulations: usize,
    /// Trades per path. Zero yields a single-point equity series.
    pub max_trades_per_run: usize,
    #[serde(default = "default_trades_per_year")]
    pub trades_per_year: f64,

    // ── Parametric model ──
    #[serde(default)]
    pub win_prob: f64,
    #[serde(default)]
    pub expectancy_r: f64,

    // ── Position sizing (exactly one) ──
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_per_trade_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_per_trade_value: Option<f64>,

    pub initial_capital: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Historical R-multiples. When non-empty, outcomes are bootstrapped
    /// from this sample and the parametric fields are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empirical_sample: Option<Vec<f64>>,

    #[serde(default = "default_sample_runs")]
    pub sample_runs_to_keep: usize,
    /// Completed paths between progress notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_interval: Option<usize>,
}

fn default_trades_per_year() -> f64 {
    DEFAULT_TRADES_PER_YEAR
}

fn default_sample_runs() -> usize {
    DEFAULT_SAMPLE_RUNS
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            id: None,
            name: None,
            strategy: None,
            simulations: 1_000,
            max_trades_per_run: 100,
            trades_per_year: DEFAULT_TRADES_PER_YEAR,
            win_prob: 0.5,
            expectancy_r: 1.5,
            risk_per_trade_pct: Some(0.01),
            risk_per_trade_value: None,
            initial_capital: 10_000.0,
            seed: None,
            empirical_sample: None,
            sample_runs_to_keep: DEFAULT_SAMPLE_RUNS,
            progress_interval: None,
        }
    }
}

/// Position-sizing rule resolved from the two mutually exclusive fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskSizing {
    /// Fraction of current equity risked per trade.
    Percent(f64),
    /// Fixed dollar amount risked per trade.
    Fixed(f64),
}

impl RiskSizing {
    /// Dollars at risk for a trade taken at `equity`.
    pub fn risk_dollars(&self, equity: f64) -> f64 {
        match *self {
            RiskSizing::Percent(pct) => pct * equity,
            RiskSizing::Fixed(value) => value,
        }
    }
}

/// Errors raised before any simulation work is performed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("simulations must be > 0")]
    InvalidSimulations,
    #[error("initialCapital must be a finite value > 0, got {0}")]
    InvalidInitialCapital(f64),
    #[error("tradesPerYear must be a finite value > 0, got {0}")]
    InvalidTradesPerYear(f64),
    #[error("winProb must be within [0, 1], got {0}")]
    InvalidWinProb(f64),
    #[error("expectancyR must be finite, got {0}")]
    InvalidExpectancy(f64),
    #[error("riskPerTradePct must be within [0, 1], got {0}")]
    InvalidRiskPct(f64),
    #[error("riskPerTradeValue must be a finite value >= 0, got {0}")]
    InvalidRiskValue(f64),
    #[error("riskPerTradePct and riskPerTradeValue are mutually exclusive")]
    ConflictingSizing,
    #[error("one of riskPerTradePct or riskPerTradeValue is required")]
    MissingSizing,
    #[error("empiricalSample[{index}] is not finite")]
    NonFiniteSample { index: usize },
    #[error("progressInterval must be > 0")]
    InvalidProgressInterval,
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
}

impl SimulationConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check every field. Fails on the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulations == 0 {
            return Err(ConfigError::InvalidSimulations);
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(ConfigError::InvalidInitialCapital(self.initial_capital));
        }
        if !self.trades_per_year.is_finite() || self.trades_per_year <= 0.0 {
            return Err(ConfigError::InvalidTradesPerYear(self.trades_per_year));
        }
        if !(0.0..=1.0).contains(&self.win_prob) {
            return Err(ConfigError::InvalidWinProb(self.win_prob));
        }
        if !self.expectancy_r.is_finite() {
            return Err(ConfigError::InvalidExpectancy(self.expectancy_r));
        }
        self.sizing()?;
        if let Some(sample) = &self.empirical_sample {
            if let Some(index) = sample.iter().position(|r| !r.is_finite()) {
                return Err(ConfigError::NonFiniteSample { index });
            }
        }
        if self.progress_interval == Some(0) {
            return Err(ConfigError::InvalidProgressInterval);
        }
        Ok(())
    }

    /// Resolve the position-sizing rule.
    pub fn sizing(&self) -> Result<RiskSizing, ConfigError> {
        match (self.risk_per_trade_pct, self.risk_per_trade_value) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingSizing),
            (None, None) => Err(ConfigError::MissingSizing),
            (Some(pct), None) => {
                if (0.0..=1.0).contains(&pct) {
                    Ok(RiskSizing::Percent(pct))
                } else {
                    Err(ConfigError::InvalidRiskPct(pct))
                }
            }
            (None, Some(value)) => {
                if value.is_finite() && value >= 0.0 {
                    Ok(RiskSizing::Fixed(value))
                } else {
                    Err(ConfigError::InvalidRiskValue(value))
                }
            }
        }
    }

    /// Outcome sampler for this configuration (bootstrap when a non-empty
    /// empirical sample is present).
    pub fn sampler(&self) -> TradeSampler {
        TradeSampler::from_config(self)
    }

    /// Paths between progress notifications: explicit interval, else ~1%.
    pub fn effective_progress_interval(&self) -> usize {
        self.progress_interval
            .unwrap_or(self.simulations / 100)
            .max(1)
    }

    /// Deterministic BLAKE3 hash of the parameters that affect results.
    ///
    /// Identity fields (id, name, strategy) and reporting knobs are excluded,
    /// so renaming a config does not change its simulated paths.
    pub fn config_hash(&self) -> String {
        let canonical = serde_json::json!({
            "simulations": self.simulations,
            "maxTradesPerRun": self.max_trades_per_run,
            "tradesPerYear": self.trades_per_year,
            "winProb": self.win_prob,
            "expectancyR": self.expectancy_r,
            "riskPerTradePct": self.risk_per_trade_pct,
            "riskPerTradeValue": self.risk_per_trade_value,
            "initialCapital": self.initial_capital,
            "empiricalSample": self.empirical_sample,
        });
        blake3::hash(canonical.to_string().as_bytes())
            .to_hex()
            .to_string()
    }
}
