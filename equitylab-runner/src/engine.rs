//! Simulation engine — runs many independent paths with progress and cancel.
//!
//! Paths are processed in batches of `progress_interval`. After each batch the
//! engine reports integer percent complete through an optional callback. A
//! cooperative cancel flag is checked before every path; once it is set the
//! engine stops scheduling work and returns `EngineError::Cancelled` without
//! building a summary.
//!
//! Each path is reduced to a `PathDigest` as soon as it finishes. Only the
//! first `sample_runs_to_keep` full paths are retained, so memory grows with
//! one `f64` per path rather than with whole equity series.
//!
//! Every path draws from its own seeded sub-stream, so the parallel mode
//! produces exactly the same paths as the sequential one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use equitylab_core::{
    ComputationError, ConfigError, PathResult, PathSimulator, SeedHierarchy, SimulationConfig,
};

use crate::summary::{PathDigest, SimulationSummary, SummaryAccumulator};

/// Upper bound on paths simulated between cancel and progress checks.
const CHUNK_SIZE: usize = 1024;

/// How paths are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// Fan each batch out over a private rayon pool.
    Parallel { threads: usize },
}

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub mode: ExecutionMode,
}

/// Completed run: summary plus the bounded sample of raw paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    /// Master seed actually used (drawn from entropy when the config has none).
    pub master_seed: u64,
    pub summary: SimulationSummary,
    pub sample_runs: Vec<PathResult>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("path {path} failed: {source}")]
    Computation {
        path: usize,
        #[source]
        source: ComputationError,
    },
    #[error("simulation cancelled")]
    Cancelled,
    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),
    #[error("simulation worker panicked")]
    WorkerPanicked,
    #[error("failed to spawn simulation worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Orchestrates run sets for one set of engine options.
#[derive(Debug, Clone, Default)]
pub struct SimulationEngine {
    options: EngineOptions,
}

impl SimulationEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run synchronously on the calling thread (plus the pool in parallel mode).
    pub fn run(
        &self,
        config: &SimulationConfig,
        progress_cb: Option<&dyn Fn(u8)>,
        cancel: Option<&AtomicBool>,
    ) -> Result<SimulationReport, EngineError> {
        run_simulation(config, &self.options, progress_cb, cancel)
    }
}

/// Run `config.simulations` paths and summarize them.
///
/// # Arguments
/// - `config`: validated before any path runs.
/// - `options`: sequential or parallel scheduling.
/// - `progress_cb`: receives percent complete (0–100), non-decreasing, ending at 100.
/// - `cancel`: cooperative stop flag.
pub fn run_simulation(
    config: &SimulationConfig,
    options: &EngineOptions,
    progress_cb: Option<&dyn Fn(u8)>,
    cancel: Option<&AtomicBool>,
) -> Result<SimulationReport, EngineError> {
    let simulator = PathSimulator::new(config)?;
    let start_time = Instant::now();

    let master_seed = config
        .seed
        .unwrap_or_else(SeedHierarchy::random_master_seed);
    let seeds = SeedHierarchy::new(master_seed, config.config_hash());
    let total = config.simulations;
    let interval = config.effective_progress_interval();

    let pool = match options.mode {
        ExecutionMode::Sequential => None,
        ExecutionMode::Parallel { threads } => Some(
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads.max(1))
                .thread_name(|i| format!("equitylab-sim-{i}"))
                .build()
                .map_err(|e| EngineError::ThreadPool(e.to_string()))?,
        ),
    };

    info!(
        simulations = total,
        max_trades = config.max_trades_per_run,
        bootstrap = simulator.sampler().is_bootstrap(),
        mode = ?options.mode,
        master_seed,
        "starting simulation"
    );

    let is_cancelled = || cancel.is_some_and(|c| c.load(Ordering::Relaxed));
    let keep = config.sample_runs_to_keep;
    let run_one = |index: usize| -> Result<(PathDigest, Option<PathResult>), EngineError> {
        if is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let mut source = seeds.source_for(index as u64);
        let path = simulator
            .simulate(&mut source)
            .map_err(|source| EngineError::Computation {
                path: index,
                source,
            })?;
        let digest = PathDigest::from_path(&path);
        Ok((digest, (index < keep).then_some(path)))
    };

    let mut acc = SummaryAccumulator::new();
    let mut sample_runs: Vec<PathResult> = Vec::new();
    let mut last_percent: Option<u8> = None;
    let mut completed = 0;
    let mut next_mark = interval.min(total);

    while completed < total {
        if is_cancelled() {
            info!(completed, "simulation cancelled");
            return Err(EngineError::Cancelled);
        }
        let chunk_end = completed.saturating_add(CHUNK_SIZE).min(next_mark);

        let chunk = match &pool {
            None => (completed..chunk_end)
                .map(&run_one)
                .collect::<Result<Vec<_>, _>>(),
            Some(pool) => pool.install(|| {
                (completed..chunk_end)
                    .into_par_iter()
                    .map(&run_one)
                    .collect::<Result<Vec<_>, _>>()
            }),
        };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(EngineError::Cancelled) => {
                info!(completed, "simulation cancelled");
                return Err(EngineError::Cancelled);
            }
            Err(e) => return Err(e),
        };
        for (digest, path) in chunk {
            acc.push(&digest);
            sample_runs.extend(path);
        }
        completed = chunk_end;

        if completed == next_mark {
            next_mark = next_mark.saturating_add(interval).min(total);
            let percent = (completed as u128 * 100 / total as u128) as u8;
            debug!(completed, total, percent, "batch complete");
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                if let Some(cb) = progress_cb {
                    cb(percent);
                }
            }
        }
    }

    if is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let summary = acc.finish(config);
    let elapsed_secs = start_time.elapsed().as_secs_f64();

    info!(
        simulations = summary.simulations_completed,
        avg_final = summary.avg_final,
        prob_ruin = summary.prob_ruin,
        elapsed_secs,
        "simulation complete"
    );

    Ok(SimulationReport {
        master_seed,
        summary,
        sample_runs,
        elapsed_secs,
    })
}
