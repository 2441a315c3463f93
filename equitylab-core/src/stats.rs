//! Pure numeric helpers shared by the aggregator.
//!
//! Slice functions return a scalar; `RunningMoments` accumulates the same
//! kind of statistics incrementally. Empty and degenerate inputs return 0.0
//! rather than NaN.

/// Arithmetic mean. 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (n denominator).
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Streaming mean / variance / downside accumulator (Welford, with Chan's
/// pairwise merge).
///
/// Lets per-trade return statistics be gathered one path at a time without
/// keeping the returns around. Merging in a fixed order gives bit-identical
/// results however the inputs were produced.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMoments {
    count: u64,
    mean: f64,
    m2: f64,
    downside_sq: f64,
}

impl RunningMoments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slice(values: &[f64]) -> Self {
        let mut moments = Self::new();
        for &v in values {
            moments.push(v);
        }
        moments
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        if value < 0.0 {
            self.downside_sq += value * value;
        }
    }

    /// Fold `other` in as if its values had been pushed after ours.
    pub fn merge(&mut self, other: &RunningMoments) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let n = n_a + n_b;
        let delta = other.mean - self.mean;
        self.mean += delta * n_b / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;
        self.downside_sq += other.downside_sq;
        self.count += other.count;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// 0.0 when empty.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample standard deviation (n - 1 denominator). 0.0 below two values.
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2.max(0.0) / (self.count - 1) as f64).sqrt()
    }

    /// Downside deviation against a zero target, averaged over the full count
    /// (Sortino convention).
    pub fn downside_deviation(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.downside_sq / self.count as f64).sqrt()
    }
}

/// Copy and sort ascending. NaN sorts last via `total_cmp`.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Median of an ascending slice; even counts take the lower middle value.
pub fn median_sorted(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    sorted[(sorted.len() - 1) / 2]
}

/// Nearest-rank percentile of an ascending slice, `p` in `[0, 100]`.
///
/// rank = ceil(p / 100 * n), clamped to `[1, n]`.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let rank = ((p / 100.0) * n as f64).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

/// Skewness: population third standardized moment.
pub fn skewness(values: &[f64]) -> f64 {
    standardized_moment(values, 3)
}

/// Excess kurtosis: population fourth standardized moment minus 3.
pub fn excess_kurtosis(values: &[f64]) -> f64 {
    if values.len() < 2 || population_std_dev(values) < 1e-15 {
        return 0.0;
    }
    standardized_moment(values, 4) - 3.0
}

fn standardized_moment(values: &[f64], order: i32) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let std = population_std_dev(values);
    if std < 1e-15 {
        return 0.0;
    }
    values.iter().map(|v| ((v - m) / std).powi(order)).sum::<f64>() / values.len() as f64
}
