//! Injectable randomness and deterministic per-path sub-streams.
//!
//! A master seed generates a sub-seed for each `(config_hash, path_index)`
//! pair. Sub-seeds are derived via BLAKE3 hashing, independently of thread
//! scheduling order, so results are identical regardless of thread count.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform random numbers in `[0, 1)`.
pub trait RandomSource {
    fn next_unit(&mut self) -> f64;
}

/// `StdRng`-backed source.
#[derive(Debug, Clone)]
pub struct SeededSource {
    rng: StdRng,
}

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededSource {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Replays a fixed list of draws, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct FixedSequence {
    values: Vec<f64>,
    cursor: usize,
}

impl FixedSequence {
    /// `None` when `values` is empty.
    pub fn new(values: Vec<f64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self { values, cursor: 0 })
    }

    /// A source that always returns `value`.
    pub fn constant(value: f64) -> Self {
        Self {
            values: vec![value],
            cursor: 0,
        }
    }
}

impl RandomSource for FixedSequence {
    fn next_unit(&mut self) -> f64 {
        let value = self.values[self.cursor];
        self.cursor = (self.cursor + 1) % self.values.len();
        value
    }
}

/// Deterministic seed hierarchy for one run set.
///
/// Because derivation is hash-based (not order-dependent), the same master
/// seed produces identical sub-seeds regardless of the order in which paths
/// are processed.
#[derive(Debug, Clone)]
pub struct SeedHierarchy {
    master_seed: u64,
    config_hash: String,
}

impl SeedHierarchy {
    pub fn new(master_seed: u64, config_hash: impl Into<String>) -> Self {
        Self {
            master_seed,
            config_hash: config_hash.into(),
        }
    }

    /// Draw a fresh master seed from OS entropy.
    pub fn random_master_seed() -> u64 {
        rand::random::<u64>()
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive the sub-seed for one path.
    pub fn sub_seed(&self, path_index: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(self.config_hash.as_bytes());
        hasher.update(&path_index.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Seeded source for one path.
    pub fn source_for(&self, path_index: u64) -> SeededSource {
        SeededSource::new(self.sub_seed(path_index))
    }
}
