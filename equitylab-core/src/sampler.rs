//! Trade outcome sampling — parametric win/loss or bootstrap resampling.
//!
//! Every outcome is an R-multiple: profit expressed as a multiple of the
//! capital risked on the trade.
//!
//! The parametric model wins `+expectancy_r` with probability `win_prob` and
//! otherwise loses exactly `-1R`. Losses never scale with expectancy; this
//! mirrors how journal expectancy is entered (as average win size).

use crate::config::SimulationConfig;
use crate::rng::RandomSource;

/// R-multiple of a parametric loss.
pub const LOSS_R: f64 = -1.0;

#[derive(Debug, Clone, PartialEq)]
pub enum TradeSampler {
    Parametric { win_prob: f64, expectancy_r: f64 },
    /// Resample with replacement from historical R-multiples. An empty
    /// sample draws `LOSS_R` every time.
    Bootstrap { sample: Vec<f64> },
}

impl TradeSampler {
    /// Bootstrap when the config carries a non-empty empirical sample,
    /// parametric otherwise.
    pub fn from_config(config: &SimulationConfig) -> Self {
        match &config.empirical_sample {
            Some(sample) if !sample.is_empty() => TradeSampler::Bootstrap {
                sample: sample.clone(),
            },
            _ => TradeSampler::Parametric {
                win_prob: config.win_prob,
                expectancy_r: config.expectancy_r,
            },
        }
    }

    pub fn is_bootstrap(&self) -> bool {
        matches!(self, TradeSampler::Bootstrap { .. })
    }

    /// Draw one R-multiple. Consumes exactly one uniform draw.
    pub fn draw<R: RandomSource + ?Sized>(&self, source: &mut R) -> f64 {
        let u = source.next_unit();
        match self {
            TradeSampler::Parametric {
                win_prob,
                expectancy_r,
            } => {
                if u < *win_prob {
                    *expectancy_r
                } else {
                    LOSS_R
                }
            }
            TradeSampler::Bootstrap { sample } => {
                let Some(last) = sample.len().checked_sub(1) else {
                    return LOSS_R;
                };
                // u < 1.0 keeps the index in range; clamp anyway for sources
                // that hand back exactly 1.0.
                let index = ((u * sample.len() as f64).floor() as usize).min(last);
                sample[index]
            }
        }
    }
}
