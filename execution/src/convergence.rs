//! Empirical frequency of one face as the number of rolls grows.

use rollquest_types::constants::{MAX_CONVERGENCE_CHECKPOINTS, Z_95};
use rollquest_types::{ConvergenceResult, Distribution, EngineError, Face};
use tracing::debug;

use crate::rng::DiceRng;

/// Up to `count` roll counts spaced evenly on a log scale from 1 to `max`.
///
/// Duplicates after rounding are dropped; 1 and `max` are always present.
/// `count` is capped at `MAX_CONVERGENCE_CHECKPOINTS`.
pub fn log_checkpoints(max: u64, count: usize) -> Vec<u64> {
    let count = count.min(MAX_CONVERGENCE_CHECKPOINTS);
    if max == 0 {
        return Vec::new();
    }
    if count < 2 || max == 1 {
        return vec![max];
    }
    let top = (max as f64).log10();
    let mut points: Vec<u64> = (0..count)
        .map(|i| {
            let exponent = top * i as f64 / (count - 1) as f64;
            (10f64.powf(exponent).round() as u64).clamp(1, max)
        })
        .collect();
    points[0] = 1;
    points[count - 1] = max;
    points.dedup();
    points
}

/// Wald interval for a proportion, clamped to `[0, 1]`.
pub fn wald_interval(p: f64, n: u64) -> [f64; 2] {
    if n == 0 {
        return [0.0, 1.0];
    }
    let half = Z_95 * (p * (1.0 - p) / n as f64).sqrt();
    [(p - half).max(0.0), (p + half).min(1.0)]
}

/// Roll `max_trials` times and record the running frequency of `target` at each
/// checkpoint.
pub fn track_convergence(
    max_trials: u64,
    distribution: &Distribution,
    target: Face,
    checkpoints: usize,
    rng: &mut DiceRng,
    limit: u64,
) -> Result<ConvergenceResult, EngineError> {
    if max_trials == 0 || max_trials > limit {
        return Err(EngineError::invalid_parameter(format!(
            "max_trials must be between 1 and {limit} (got {max_trials})"
        )));
    }
    if checkpoints == 0 || checkpoints > MAX_CONVERGENCE_CHECKPOINTS {
        return Err(EngineError::invalid_parameter(format!(
            "checkpoints must be between 1 and {MAX_CONVERGENCE_CHECKPOINTS} (got {checkpoints})"
        )));
    }

    let theoretical = distribution.probability(target);
    let points = log_checkpoints(max_trials, checkpoints);
    let mut empirical = Vec::with_capacity(points.len());
    let mut intervals = Vec::with_capacity(points.len());

    let mut hits = 0u64;
    let mut rolled = 0u64;
    for &point in &points {
        while rolled < point {
            if rng.sample(distribution) == target {
                hits += 1;
            }
            rolled += 1;
        }
        let p = hits as f64 / rolled as f64;
        empirical.push(p);
        intervals.push(wald_interval(p, rolled));
    }

    let final_empirical = empirical.last().copied().unwrap_or(0.0);
    debug!(
        max_trials,
        target = target.value(),
        final_empirical,
        "convergence tracked"
    );
    Ok(ConvergenceResult {
        target_face: target,
        theoretical_probability: theoretical,
        trials: points,
        empirical_probabilities: empirical,
        confidence_intervals: intervals,
        final_empirical,
        convergence_error: (final_empirical - theoretical).abs(),
        seed: rng.seed(),
    })
}
