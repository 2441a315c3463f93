//! Property tests for path invariants.
//!
//! Uses proptest to verify:
//! 1. Series shape — equity has one more point than there are returns
//! 2. Final equity — always the last point of the series
//! 3. Ruin — a ruined path stops early and never trades again
//! 4. Drawdown — always a fraction in [0, 1]
//! 5. Bootstrap — a single-value sample pins every R-multiple

use equitylab_core::{PathSimulator, SeededSource, SimulationConfig};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_config() -> impl Strategy<Value = SimulationConfig> {
    (
        0usize..200,
        0.0..=1.0_f64,
        -1.0..5.0_f64,
        0.0..=1.0_f64,
        100.0..1_000_000.0_f64,
    )
        .prop_map(|(max_trades, win_prob, expectancy_r, risk_pct, capital)| {
            SimulationConfig {
                simulations: 1,
                max_trades_per_run: max_trades,
                win_prob,
                expectancy_r,
                risk_per_trade_pct: Some(risk_pct),
                initial_capital: capital,
                ..SimulationConfig::default()
            }
        })
}

fn arb_fixed_risk_config() -> impl Strategy<Value = SimulationConfig> {
    (1usize..200, 0.0..=1.0_f64, 0.0..5_000.0_f64).prop_map(|(max_trades, win_prob, risk)| {
        SimulationConfig {
            simulations: 1,
            max_trades_per_run: max_trades,
            win_prob,
            expectancy_r: 1.0,
            risk_per_trade_pct: None,
            risk_per_trade_value: Some(risk),
            initial_capital: 10_000.0,
            ..SimulationConfig::default()
        }
    })
}

proptest! {
    #[test]
    fn equity_series_is_one_longer_than_returns(config in arb_config(), seed in any::<u64>()) {
        let sim = PathSimulator::new(&config).unwrap();
        let path = sim.simulate(&mut SeededSource::new(seed)).unwrap();

        prop_assert_eq!(path.equity_series.len(), path.returns_per_trade.len() + 1);
        prop_assert_eq!(path.profits_per_trade.len(), path.returns_per_trade.len());
        prop_assert_eq!(path.trades_simulated, path.returns_per_trade.len());
        prop_assert_eq!(path.equity_series[0], config.initial_capital);
        prop_assert_eq!(path.final_equity, *path.equity_series.last().unwrap());
        prop_assert!(path.trades_simulated <= config.max_trades_per_run);
    }

    #[test]
    fn ruined_paths_stop_at_first_non_positive_equity(
        config in arb_fixed_risk_config(),
        seed in any::<u64>(),
    ) {
        let sim = PathSimulator::new(&config).unwrap();
        let path = sim.simulate(&mut SeededSource::new(seed)).unwrap();

        let first_ruin = path.equity_series.iter().position(|&e| e <= 0.0);
        match first_ruin {
            Some(idx) => {
                prop_assert!(path.ruined);
                prop_assert_eq!(idx, path.equity_series.len() - 1);
                prop_assert!(path.final_equity <= 0.0);
                // Ruin on the final trade leaves a full-length path.
                prop_assert!(path.trades_simulated <= config.max_trades_per_run);
                prop_assert_eq!(path.trades_simulated, idx);
            }
            None => {
                prop_assert!(!path.ruined);
                prop_assert_eq!(path.trades_simulated, config.max_trades_per_run);
            }
        }
    }

    #[test]
    fn drawdown_is_a_fraction(config in arb_config(), seed in any::<u64>()) {
        let sim = PathSimulator::new(&config).unwrap();
        let path = sim.simulate(&mut SeededSource::new(seed)).unwrap();
        prop_assert!((0.0..=1.0).contains(&path.max_drawdown));
    }

    #[test]
    fn single_value_bootstrap_pins_every_trade(
        max_trades in 1usize..100,
        seed in any::<u64>(),
    ) {
        let config = SimulationConfig {
            simulations: 1,
            max_trades_per_run: max_trades,
            win_prob: 0.0,
            expectancy_r: 9.0,
            risk_per_trade_pct: Some(0.5),
            initial_capital: 1_000.0,
            empirical_sample: Some(vec![0.02]),
            ..SimulationConfig::default()
        };
        let sim = PathSimulator::new(&config).unwrap();
        let path = sim.simulate(&mut SeededSource::new(seed)).unwrap();

        prop_assert_eq!(path.trades_simulated, max_trades);
        for (i, profit) in path.profits_per_trade.iter().enumerate() {
            let risk = 0.5 * path.equity_series[i];
            prop_assert!((profit / risk - 0.02).abs() < 1e-9);
        }
    }
}
