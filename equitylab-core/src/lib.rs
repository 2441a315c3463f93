//! EquityLab Core — the pure half of the Monte Carlo equity simulator.
//!
//! This crate contains everything that runs inside a single path:
//! - Validated, serializable simulation configuration
//! - Injectable random sources and per-path seed derivation
//! - Trade outcome sampling (parametric or bootstrap)
//! - Path simulation with position sizing and ruin detection
//! - Numeric helpers for distribution statistics

pub mod config;
pub mod path;
pub mod rng;
pub mod sampler;
pub mod stats;

pub use config::{ConfigError, RiskSizing, SimulationConfig};
pub use path::{simulate_path, ComputationError, PathResult, PathSimulator, SimulateError};
pub use rng::{FixedSequence, RandomSource, SeedHierarchy, SeededSource};
pub use sampler::TradeSampler;
