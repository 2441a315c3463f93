//! Summary aggregation — reduce a set of paths to distribution statistics.
//!
//! The engine reduces each path to a `PathDigest` and streams digests into a
//! `SummaryAccumulator`, so raw series never pile up. `summarize` does the
//! same over a slice. Same digests in the same order produce the same summary
//! bit for bit; the engine always pushes in path-index order, so parallel and
//! sequential runs agree exactly.
//!
//! Edge-case policy:
//! - empty input: every statistic is 0.0
//! - median of an even count: lower middle value
//! - percentiles: nearest rank
//! - profit factor with no losing trades: `PROFIT_FACTOR_CAP` if anything was
//!   won, 0.0 otherwise
//! - CAGR when average final equity is not positive: -1.0
//! - ratios with a zero denominator: 0.0

use serde::{Deserialize, Serialize};

use equitylab_core::stats::{
    excess_kurtosis, mean, median_sorted, percentile_sorted, skewness, sorted, RunningMoments,
};
use equitylab_core::{PathResult, SimulationConfig};

/// Upper bound reported for the profit factor.
pub const PROFIT_FACTOR_CAP: f64 = 1e6;

/// Distribution statistics for one run set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub total_runs: usize,
    pub simulations_completed: usize,

    // ── Final equity distribution ──
    pub avg_final: f64,
    pub median_final: f64,
    pub p05: f64,
    pub p25: f64,
    pub p75: f64,
    pub p95: f64,
    pub min_final: f64,
    pub max_final: f64,

    // ── Risk ──
    /// Worst single-path drawdown.
    pub max_drawdown: f64,
    pub avg_drawdown: f64,
    pub prob_ruin: f64,
    pub skewness: f64,
    /// Excess kurtosis.
    pub kurtosis: f64,

    // ── Reward ──
    pub cagr: f64,
    pub calmar: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub profit_factor: f64,
    /// Mean dollar profit per trade across every path.
    pub expected_value: f64,
    pub avg_trades_simulated: f64,
}

/// Everything the summary needs from one path, without its series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathDigest {
    pub final_equity: f64,
    pub max_drawdown: f64,
    pub trades_simulated: usize,
    pub returns: RunningMoments,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_sum: f64,
}

impl PathDigest {
    pub fn from_path(path: &PathResult) -> Self {
        let mut gross_profit = 0.0;
        let mut gross_loss = 0.0;
        let mut profit_sum = 0.0;
        for &p in &path.profits_per_trade {
            if p > 0.0 {
                gross_profit += p;
            } else if p < 0.0 {
                gross_loss += -p;
            }
            profit_sum += p;
        }
        Self {
            final_equity: path.final_equity,
            max_drawdown: path.max_drawdown,
            trades_simulated: path.trades_simulated,
            returns: RunningMoments::from_slice(&path.returns_per_trade),
            gross_profit,
            gross_loss,
            profit_sum,
        }
    }
}

/// Streaming summary builder.
///
/// Keeps one final equity per path (percentiles need the full distribution)
/// and running sums for everything else. Push digests in path-index order for
/// reproducible output.
#[derive(Debug, Clone, Default)]
pub struct SummaryAccumulator {
    finals: Vec<f64>,
    drawdown_sum: f64,
    max_drawdown: f64,
    trades_sum: f64,
    returns: RunningMoments,
    gross_profit: f64,
    gross_loss: f64,
    profit_sum: f64,
}

impl SummaryAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, digest: &PathDigest) {
        self.finals.push(digest.final_equity);
        self.drawdown_sum += digest.max_drawdown;
        self.max_drawdown = self.max_drawdown.max(digest.max_drawdown);
        self.trades_sum += digest.trades_simulated as f64;
        self.returns.merge(&digest.returns);
        self.gross_profit += digest.gross_profit;
        self.gross_loss += digest.gross_loss;
        self.profit_sum += digest.profit_sum;
    }

    pub fn finish(self, config: &SimulationConfig) -> SimulationSummary {
        let n = self.finals.len();
        let per_path = |sum: f64| if n > 0 { sum / n as f64 } else { 0.0 };

        let sorted_finals = sorted(&self.finals);
        let avg_final = mean(&self.finals);
        let avg_drawdown = per_path(self.drawdown_sum);
        let avg_trades_simulated = per_path(self.trades_sum);

        let ruined = self.finals.iter().filter(|&&f| f <= 0.0).count();
        let prob_ruin = per_path(ruined as f64);

        let cagr = cagr(
            avg_final,
            config.initial_capital,
            avg_trades_simulated,
            config.trades_per_year,
        );
        let calmar = if self.max_drawdown > 1e-15 {
            cagr / self.max_drawdown
        } else {
            0.0
        };
        let trade_count = self.returns.count();
        let expected_value = if trade_count > 0 {
            self.profit_sum / trade_count as f64
        } else {
            0.0
        };

        SimulationSummary {
            total_runs: config.simulations,
            simulations_completed: n,
            avg_final: finite(avg_final),
            median_final: median_sorted(&sorted_finals),
            p05: percentile_sorted(&sorted_finals, 5.0),
            p25: percentile_sorted(&sorted_finals, 25.0),
            p75: percentile_sorted(&sorted_finals, 75.0),
            p95: percentile_sorted(&sorted_finals, 95.0),
            min_final: sorted_finals.first().copied().unwrap_or(0.0),
            max_final: sorted_finals.last().copied().unwrap_or(0.0),
            max_drawdown: self.max_drawdown,
            avg_drawdown,
            prob_ruin,
            skewness: finite(skewness(&self.finals)),
            kurtosis: finite(excess_kurtosis(&self.finals)),
            cagr: finite(cagr),
            calmar: finite(calmar),
            sharpe: finite(sharpe_ratio(&self.returns, config.trades_per_year)),
            sortino: finite(sortino_ratio(&self.returns, config.trades_per_year)),
            profit_factor: profit_factor(self.gross_profit, self.gross_loss),
            expected_value: finite(expected_value),
            avg_trades_simulated,
        }
    }
}

/// Reduce `results` to a summary. Never panics.
pub fn summarize(results: &[PathResult], config: &SimulationConfig) -> SimulationSummary {
    let mut acc = SummaryAccumulator::new();
    for path in results {
        acc.push(&PathDigest::from_path(path));
    }
    acc.finish(config)
}

/// Compound growth of the average path, annualized by `trades_per_year`.
pub fn cagr(avg_final: f64, initial_capital: f64, avg_trades: f64, trades_per_year: f64) -> f64 {
    if initial_capital <= 0.0 {
        return 0.0;
    }
    if avg_final <= 0.0 {
        return -1.0;
    }
    let years = avg_trades / trades_per_year;
    if years <= 0.0 {
        return 0.0;
    }
    (avg_final / initial_capital).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe of per-trade returns.
pub fn sharpe_ratio(returns: &RunningMoments, trades_per_year: f64) -> f64 {
    let std = returns.std_dev();
    if std < 1e-15 {
        return 0.0;
    }
    returns.mean() / std * trades_per_year.sqrt()
}

/// Annualized Sortino of per-trade returns (downside deviation only).
pub fn sortino_ratio(returns: &RunningMoments, trades_per_year: f64) -> f64 {
    if returns.count() < 2 {
        return 0.0;
    }
    let downside = returns.downside_deviation();
    if downside < 1e-15 {
        return 0.0;
    }
    returns.mean() / downside * trades_per_year.sqrt()
}

/// Gross profit over gross loss (both positive), capped at `PROFIT_FACTOR_CAP`.
pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { PROFIT_FACTOR_CAP } else { 0.0 };
    }
    (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
}

// Keeps the summary JSON-representable.
fn finite(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(f64::MIN, f64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(simulations: usize) -> SimulationConfig {
        SimulationConfig {
            simulations,
            max_trades_per_run: 2,
            win_prob: 1.0,
            expectancy_r: 0.5,
            risk_per_trade_pct: Some(0.1),
            initial_capital: 1000.0,
            ..SimulationConfig::default()
        }
    }

    /// Path from an equity series; profits and returns are derived.
    fn path(series: &[f64]) -> PathResult {
        let profits: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
        let returns: Vec<f64> = series.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
        let mut peak = series[0];
        let mut max_dd = 0.0_f64;
        for &e in series {
            peak = peak.max(e);
            max_dd = max_dd.max(((peak - e) / peak).min(1.0));
        }
        let final_equity = *series.last().unwrap();
        PathResult {
            equity_series: series.to_vec(),
            trades_simulated: returns.len(),
            returns_per_trade: returns,
            profits_per_trade: profits,
            final_equity,
            max_drawdown: max_dd,
            ruined: final_equity <= 0.0,
        }
    }

    #[test]
    fn deterministic_scenario_summary() {
        let runs = vec![path(&[1000.0, 1050.0, 1102.5]); 3];
        let s = summarize(&runs, &config(3));

        assert_eq!(s.avg_final, 1102.5);
        assert_eq!(s.median_final, 1102.5);
        assert_eq!(s.p05, 1102.5);
        assert_eq!(s.p95, 1102.5);
        assert_eq!(s.prob_ruin, 0.0);
        assert_eq!(s.max_drawdown, 0.0);
        assert_eq!(s.total_runs, 3);
        assert_eq!(s.simulations_completed, 3);
        assert_eq!(s.profit_factor, PROFIT_FACTOR_CAP);
        assert!((s.expected_value - 51.25).abs() < 1e-12);
        assert_eq!(s.avg_trades_simulated, 2.0);
    }

    #[test]
    fn prob_ruin_is_exact_fraction() {
        let runs = vec![
            path(&[1000.0, 1100.0]),
            path(&[1000.0, 900.0]),
            path(&[1000.0, 1200.0]),
            path(&[1000.0, 0.0]),
        ];
        let s = summarize(&runs, &config(4));
        assert_eq!(s.prob_ruin, 0.25);
        assert_eq!(s.max_drawdown, 1.0);
    }

    #[test]
    fn percentiles_are_monotone() {
        let runs: Vec<PathResult> = (0..50)
            .map(|i| path(&[1000.0, 900.0 + (i * 37 % 50) as f64 * 10.0]))
            .collect();
        let s = summarize(&runs, &config(50));
        assert!(s.p05 <= s.p25);
        assert!(s.p25 <= s.median_final);
        assert!(s.median_final <= s.p75);
        assert!(s.p75 <= s.p95);
        assert!(s.min_final <= s.p05 && s.p95 <= s.max_final);
    }

    #[test]
    fn median_of_even_count_is_lower_middle() {
        let runs = vec![
            path(&[1000.0, 1400.0]),
            path(&[1000.0, 1100.0]),
            path(&[1000.0, 1300.0]),
            path(&[1000.0, 1200.0]),
        ];
        let s = summarize(&runs, &config(4));
        assert_eq!(s.median_final, 1200.0);
    }

    #[test]
    fn empty_results_do_not_panic() {
        let s = summarize(&[], &config(10));
        assert_eq!(s.simulations_completed, 0);
        assert_eq!(s.avg_final, 0.0);
        assert_eq!(s.prob_ruin, 0.0);
        assert_eq!(s.profit_factor, 0.0);
        assert_eq!(s.sharpe, 0.0);
    }

    #[test]
    fn single_run_is_defined() {
        let s = summarize(&[path(&[1000.0, 1100.0, 1050.0])], &config(1));
        assert_eq!(s.avg_final, 1050.0);
        assert_eq!(s.skewness, 0.0);
        assert_eq!(s.kurtosis, 0.0);
        assert!((s.profit_factor - 2.0).abs() < 1e-12);
        assert!(s.sharpe.is_finite());
    }

    #[test]
    fn all_ruined_runs_are_defined() {
        let runs = vec![path(&[1000.0, 0.0]), path(&[1000.0, 500.0, -10.0])];
        let s = summarize(&runs, &config(2));
        assert_eq!(s.prob_ruin, 1.0);
        assert_eq!(s.cagr, -1.0);
        assert_eq!(s.profit_factor, 0.0);
        assert!(s.calmar.is_finite());
    }

    #[test]
    fn summarize_is_deterministic() {
        let runs: Vec<PathResult> = (0..20)
            .map(|i| path(&[1000.0, 1000.0 + i as f64 * 13.7, 990.0 + i as f64 * 7.1]))
            .collect();
        let a = summarize(&runs, &config(20));
        let b = summarize(&runs, &config(20));
        assert_eq!(a, b);
        assert_eq!(a.sharpe.to_bits(), b.sharpe.to_bits());
    }

    #[test]
    fn cagr_annualizes_by_trades_per_year() {
        // 252 trades at 252 per year = one year, 10% growth
        let c = cagr(1100.0, 1000.0, 252.0, 252.0);
        assert!((c - 0.1).abs() < 1e-12);
        // half a year of trades doubles the annualized rate (compounded)
        let c = cagr(1100.0, 1000.0, 126.0, 252.0);
        assert!((c - 0.21).abs() < 1e-12);
        assert_eq!(cagr(1100.0, 1000.0, 0.0, 252.0), 0.0);
    }

    #[test]
    fn profit_factor_ratio_and_sentinels() {
        assert!((profit_factor(40.0, 20.0) - 2.0).abs() < 1e-12);
        assert_eq!(profit_factor(5.0, 0.0), PROFIT_FACTOR_CAP);
        assert_eq!(profit_factor(0.0, 5.0), 0.0);
        assert_eq!(profit_factor(0.0, 0.0), 0.0);
        assert_eq!(profit_factor(1e12, 1.0), PROFIT_FACTOR_CAP);
    }

    #[test]
    fn digest_splits_gross_profit_and_loss() {
        let digest = PathDigest::from_path(&path(&[1000.0, 1030.0, 1020.0, 1030.0, 1020.0]));
        assert!((digest.gross_profit - 40.0).abs() < 1e-9);
        assert!((digest.gross_loss - 20.0).abs() < 1e-9);
        assert!((digest.profit_sum - 20.0).abs() < 1e-9);
        assert_eq!(digest.returns.count(), 4);
        assert_eq!(digest.trades_simulated, 4);
    }

    #[test]
    fn sortino_ignores_upside_volatility() {
        let returns = RunningMoments::from_slice(&[0.05, 0.10, -0.01, 0.20, -0.01]);
        let sortino = sortino_ratio(&returns, 252.0);
        let sharpe = sharpe_ratio(&returns, 252.0);
        assert!(sortino > sharpe);
    }

    #[test]
    fn calmar_uses_worst_path_drawdown() {
        // Drawdowns 0.1 and 0.5: average 0.3, worst 0.5.
        let runs = vec![
            path(&[1000.0, 1200.0, 1080.0, 1300.0]),
            path(&[1000.0, 1400.0, 700.0, 1500.0]),
        ];
        let s = summarize(&runs, &config(2));
        assert!((s.max_drawdown - 0.5).abs() < 1e-12);
        assert!((s.avg_drawdown - 0.3).abs() < 1e-12);
        assert!(s.cagr > 0.0);
        assert_eq!(s.calmar, s.cagr / s.max_drawdown);
        assert_ne!(s.calmar, s.cagr / s.avg_drawdown);
    }

    #[test]
    fn accumulator_matches_batch_summary() {
        let runs: Vec<PathResult> = (0..30)
            .map(|i| path(&[1000.0, 1000.0 + i as f64 * 9.0, 980.0 + i as f64 * 4.5]))
            .collect();
        let mut acc = SummaryAccumulator::new();
        for run in &runs {
            acc.push(&PathDigest::from_path(run));
        }
        assert_eq!(acc.finish(&config(30)), summarize(&runs, &config(30)));
    }

    #[test]
    fn summary_serializes_camel_case() {
        let s = summarize(&[path(&[1000.0, 1100.0])], &config(1));
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"avgFinal\""));
        assert!(json.contains("\"probRuin\""));
        let back: SimulationSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
