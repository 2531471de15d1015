//! Many independent simulations with aggregate statistics.
//!
//! Simulation `i` draws from keystream `i` of the batch seed, so results are the
//! same whether the batch runs on one thread or across the rayon pool.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rollquest_types::constants::HISTOGRAM_BINS;
use rollquest_types::simulation::{BatchDistribution, BatchStatistics, Histogram};
use rollquest_types::{BatchResult, EngineError, SimulationParams, SimulationSummary};
use tracing::debug;

use crate::monte_carlo::{EngineLimits, Simulation};
use crate::rng::{generate_seed, DiceRng};

/// Run `num_simulations` copies of `params`, each seeded from its own stream.
pub fn run_batch(
    params: SimulationParams,
    num_simulations: u64,
    limits: &EngineLimits,
) -> Result<BatchResult, EngineError> {
    if num_simulations == 0 || num_simulations > limits.max_batch_simulations {
        return Err(EngineError::invalid_parameter(format!(
            "num_simulations must be between 1 and {} (got {num_simulations})",
            limits.max_batch_simulations
        )));
    }
    let seed = params.seed.unwrap_or_else(generate_seed);
    let simulation = Simulation::new(params, limits.max_batch_trials)?;
    let trials_per_simulation = simulation.params().num_trials;

    let summaries = run_all(&simulation, seed, num_simulations);
    debug!(
        simulations = num_simulations,
        trials = trials_per_simulation,
        seed,
        "batch finished"
    );

    let final_balances: Vec<f64> = summaries.iter().map(|s| s.final_balance).collect();
    let profits: Vec<f64> = summaries.iter().map(|s| s.profit).collect();
    let statistics = BatchStatistics {
        mean_final_balance: mean(&final_balances),
        std_final_balance: std_dev(&final_balances),
        median_final_balance: median(&final_balances),
        mean_profit: mean(&profits),
        std_profit: std_dev(&profits),
        median_profit: median(&profits),
        min_profit: profits.iter().copied().fold(f64::INFINITY, f64::min),
        max_profit: profits.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean_win_rate: mean(&summaries.iter().map(|s| s.win_rate).collect::<Vec<_>>()),
        ruin_probability: summaries.iter().filter(|s| s.went_bankrupt).count() as f64
            / summaries.len() as f64,
        value_at_risk_5: value_at_risk(&profits, 0.05),
    };
    let histogram = histogram(&profits, HISTOGRAM_BINS);

    Ok(BatchResult {
        num_simulations,
        trials_per_simulation,
        seed,
        statistics,
        distribution: BatchDistribution {
            profits,
            final_balances,
            histogram,
        },
    })
}

#[cfg(feature = "parallel")]
fn run_all(simulation: &Simulation, seed: u64, count: u64) -> Vec<SimulationSummary> {
    (0..count)
        .into_par_iter()
        .map(|stream| run_one(simulation, seed, stream))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn run_all(simulation: &Simulation, seed: u64, count: u64) -> Vec<SimulationSummary> {
    (0..count)
        .map(|stream| run_one(simulation, seed, stream))
        .collect()
}

fn run_one(simulation: &Simulation, seed: u64, stream: u64) -> SimulationSummary {
    let mut rng = DiceRng::for_stream(seed, stream);
    simulation.run(&mut rng).summary
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

fn median(values: &[f64]) -> f64 {
    let sorted = sorted(values);
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// Profit at the `tail` quantile: the value at index `floor(tail * n)` of the
/// sorted sample.
fn value_at_risk(values: &[f64], tail: f64) -> f64 {
    let sorted = sorted(values);
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((tail * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Equal-width histogram over the sample range. The last bin is closed.
fn histogram(values: &[f64], bins: usize) -> Histogram {
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = if !lo.is_finite() || !hi.is_finite() {
        (-0.5, 0.5)
    } else if lo == hi {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    };

    let width = (hi - lo) / bins as f64;
    let edges = (0..=bins)
        .map(|i| if i == bins { hi } else { lo + width * i as f64 })
        .collect();
    let mut counts = vec![0u64; bins];
    for value in values {
        let slot = (((value - lo) / width).floor() as usize).min(bins - 1);
        counts[slot] += 1;
    }
    Histogram { counts, bins: edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollquest_types::BetStrategy;

    fn params(num_trials: u64, seed: u64) -> SimulationParams {
        SimulationParams {
            num_trials,
            seed: Some(seed),
            ..SimulationParams::default()
        }
    }

    #[test]
    fn test_batch_is_reproducible() {
        let limits = EngineLimits::default();
        let a = run_batch(params(200, 9), 50, &limits).unwrap();
        let b = run_batch(params(200, 9), 50, &limits).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.seed, 9);
        assert_eq!(a.distribution.profits.len(), 50);
    }

    #[test]
    fn test_batch_matches_individual_streams() {
        let limits = EngineLimits::default();
        let batch = run_batch(params(100, 5), 8, &limits).unwrap();
        let simulation = Simulation::new(params(100, 5), limits.max_batch_trials).unwrap();
        for (i, profit) in batch.distribution.profits.iter().enumerate() {
            let mut rng = DiceRng::for_stream(5, i as u64);
            assert_eq!(simulation.run(&mut rng).summary.profit, *profit);
        }
    }

    #[test]
    fn test_batch_aggregates_match_runs() {
        let limits = EngineLimits::default();
        let mut p = params(200, 21);
        p.starting_balance = 50.0;
        p.bet_amount = 10.0;
        p.bet_strategy = BetStrategy::Martingale;
        p.target_face = Some(1);
        let n = 40u64;
        let batch = run_batch(p.clone(), n, &limits).unwrap();
        let simulation = Simulation::new(p, limits.max_batch_trials).unwrap();

        let summaries: Vec<SimulationSummary> = (0..n)
            .map(|i| simulation.run(&mut DiceRng::for_stream(21, i)).summary)
            .collect();
        let mean_profit = summaries.iter().map(|s| s.profit).sum::<f64>() / n as f64;
        let bankrupt = summaries.iter().filter(|s| s.went_bankrupt).count();

        assert!(bankrupt > 0);
        assert!((batch.statistics.mean_profit - mean_profit).abs() < 1e-9);
        assert!(
            (batch.statistics.ruin_probability - bankrupt as f64 / n as f64).abs() < 1e-12
        );
    }

    #[test]
    fn test_batch_limits() {
        let limits = EngineLimits::default();
        assert!(matches!(
            run_batch(params(100, 1), 0, &limits),
            Err(EngineError::InvalidParameter(_))
        ));
        assert!(run_batch(params(100, 1), limits.max_batch_simulations + 1, &limits).is_err());
        assert!(run_batch(params(limits.max_batch_trials + 1, 1), 1, &limits).is_err());
    }

    #[test]
    fn test_statistics_are_consistent() {
        let mut p = params(300, 77);
        p.bet_strategy = BetStrategy::Martingale;
        let result = run_batch(p, 100, &EngineLimits::default()).unwrap();
        let stats = &result.statistics;
        assert!(stats.min_profit <= stats.median_profit);
        assert!(stats.median_profit <= stats.max_profit);
        assert!(stats.value_at_risk_5 <= stats.median_profit);
        assert!((0.0..=1.0).contains(&stats.ruin_probability));
        assert!((stats.mean_final_balance - stats.mean_profit - 1_000.0).abs() < 1e-6);
        let histogram = &result.distribution.histogram;
        assert_eq!(histogram.counts.len(), HISTOGRAM_BINS);
        assert_eq!(histogram.bins.len(), HISTOGRAM_BINS + 1);
        assert_eq!(histogram.counts.iter().sum::<u64>(), 100);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0);
        let values: Vec<f64> = (0..100).map(f64::from).collect();
        assert_eq!(value_at_risk(&values, 0.05), 5.0);
    }

    #[test]
    fn test_histogram_degenerate_range() {
        let h = histogram(&[7.0, 7.0, 7.0], 20);
        assert_eq!(h.counts.iter().sum::<u64>(), 3);
        assert_eq!(h.bins[0], 6.5);
        assert_eq!(*h.bins.last().unwrap(), 7.5);
    }

    #[test]
    fn test_histogram_includes_max() {
        let h = histogram(&[0.0, 10.0], 5);
        assert_eq!(h.counts, vec![1, 0, 0, 0, 1]);
    }
}
