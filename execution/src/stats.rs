//! Goodness-of-fit and proportion tests over dice outcomes.
//!
//! Chi-square p-values come from the regularized upper incomplete gamma
//! function, `Q(k/2, x/2)`. The normal tail uses `libm::erfc`.

use rollquest_types::analysis::{
    Better, ChiSquareResult, MetricComparison, ModeComparison, ModeResults, ZTestResult,
};
use rollquest_types::constants::{CHI_SQUARE_CRITICAL_95, CHI_SQUARE_DF, FACES, Z_95};
use rollquest_types::EngineError;

const EPSILON: f64 = 1e-15;
const FPMIN: f64 = 1e-300;
const MAX_ITERATIONS: usize = 500;
const SIGNIFICANCE: f64 = 0.05;
const STRONG_SIGNIFICANCE: f64 = 0.01;

/// Regularized upper incomplete gamma `Q(a, x)`.
pub fn regularized_gamma_q(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    if x < a + 1.0 {
        (1.0 - lower_series(a, x)).clamp(0.0, 1.0)
    } else {
        upper_continued_fraction(a, x).clamp(0.0, 1.0)
    }
}

fn prefactor(a: f64, x: f64) -> f64 {
    (-x + a * x.ln() - libm::lgamma(a)).exp()
}

fn lower_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut term = 1.0 / a;
    let mut sum = term;
    for _ in 0..MAX_ITERATIONS {
        ap += 1.0;
        term *= x / ap;
        sum += term;
        if term.abs() < sum.abs() * EPSILON {
            break;
        }
    }
    sum * prefactor(a, x)
}

// Modified Lentz evaluation.
fn upper_continued_fraction(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / FPMIN;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=MAX_ITERATIONS {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = b + an / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    h * prefactor(a, x)
}

/// `P(X > statistic)` for a chi-square variable with `df` degrees of freedom.
pub fn chi_square_survival(statistic: f64, df: u32) -> f64 {
    regularized_gamma_q(f64::from(df) / 2.0, statistic / 2.0)
}

/// Two-tailed standard normal tail `P(|Z| > |z|)`.
pub fn normal_two_tailed(z: f64) -> f64 {
    libm::erfc(z.abs() / std::f64::consts::SQRT_2).clamp(0.0, 1.0)
}

/// Validate raw per-face counts.
pub fn observed_counts(observed: &[i64]) -> Result<[u64; FACES], EngineError> {
    if observed.len() != FACES {
        return Err(EngineError::invalid_parameter(format!(
            "observed must have exactly {FACES} counts (got {})",
            observed.len()
        )));
    }
    let mut counts = [0u64; FACES];
    for (slot, &value) in counts.iter_mut().zip(observed) {
        *slot = u64::try_from(value).map_err(|_| {
            EngineError::invalid_parameter(format!(
                "observed counts must be non-negative (got {value})"
            ))
        })?;
    }
    Ok(counts)
}

/// Chi-square goodness-of-fit against a uniform die, or against
/// `expected_probs` when given (normalized to sum to one).
pub fn chi_square_test(
    observed: &[u64; FACES],
    expected_probs: Option<&[f64]>,
) -> Result<ChiSquareResult, EngineError> {
    let total: u64 = observed.iter().sum();
    if total == 0 {
        return Err(EngineError::InsufficientData(
            "observed counts sum to zero".to_string(),
        ));
    }
    let expected: Vec<f64> = match expected_probs {
        None => vec![total as f64 / FACES as f64; FACES],
        Some(probs) => expected_weights(probs)?
            .iter()
            .map(|w| w * total as f64)
            .collect(),
    };

    let statistic: f64 = observed
        .iter()
        .zip(&expected)
        .map(|(&o, &e)| {
            let diff = o as f64 - e;
            diff * diff / e
        })
        .sum();
    let p_value = chi_square_survival(statistic, CHI_SQUARE_DF);
    let is_fair = statistic <= CHI_SQUARE_CRITICAL_95;

    let interpretation = if p_value < STRONG_SIGNIFICANCE {
        format!(
            "Strong evidence of bias (p = {p_value:.6}); \
             the counts do not fit the expected distribution."
        )
    } else if !is_fair {
        "The die appears biased (rejected at 95% confidence).".to_string()
    } else {
        "The die appears fair (cannot reject the null hypothesis at 95% confidence).".to_string()
    };

    Ok(ChiSquareResult {
        chi_square_statistic: statistic,
        p_value,
        degrees_of_freedom: CHI_SQUARE_DF,
        critical_value_95: CHI_SQUARE_CRITICAL_95,
        is_fair_at_95_confidence: is_fair,
        interpretation,
        observed: observed.to_vec(),
        expected,
    })
}

fn expected_weights(probs: &[f64]) -> Result<[f64; FACES], EngineError> {
    if probs.len() != FACES {
        return Err(EngineError::invalid_parameter(format!(
            "expected_probs must have exactly {FACES} values (got {})",
            probs.len()
        )));
    }
    if probs.iter().any(|p| !p.is_finite() || *p <= 0.0) {
        return Err(EngineError::invalid_parameter(
            "expected_probs must all be positive",
        ));
    }
    let sum: f64 = probs.iter().sum();
    if !sum.is_finite() {
        return Err(EngineError::invalid_parameter(
            "expected_probs must sum to a finite value",
        ));
    }
    let mut weights = [0.0; FACES];
    for (slot, p) in weights.iter_mut().zip(probs) {
        *slot = p / sum;
    }
    Ok(weights)
}

/// Two-tailed z test of `wins / trials` against `expected_prob`.
pub fn z_test_proportion(
    wins: u64,
    trials: u64,
    expected_prob: f64,
) -> Result<ZTestResult, EngineError> {
    if trials == 0 {
        return Err(EngineError::InsufficientData("no trials".to_string()));
    }
    if wins > trials {
        return Err(EngineError::invalid_parameter(format!(
            "observed_wins ({wins}) exceeds total_trials ({trials})"
        )));
    }
    if !expected_prob.is_finite() || expected_prob <= 0.0 || expected_prob >= 1.0 {
        return Err(EngineError::invalid_parameter(format!(
            "expected_prob must be strictly between 0 and 1 (got {expected_prob})"
        )));
    }

    let n = trials as f64;
    let observed = wins as f64 / n;
    let se = (expected_prob * (1.0 - expected_prob) / n).sqrt();
    let z = (observed - expected_prob) / se;
    let p_value = normal_two_tailed(z);
    let half = Z_95 * (observed * (1.0 - observed) / n).sqrt();
    let significant = p_value < SIGNIFICANCE;

    Ok(ZTestResult {
        observed_wins: wins,
        total_trials: trials,
        observed_proportion: observed,
        expected_proportion: expected_prob,
        z_score: z,
        p_value,
        confidence_interval_95: [(observed - half).max(0.0), (observed + half).min(1.0)],
        is_significant_at_95: significant,
        interpretation: if significant {
            "Win rate differs significantly from expected (95% confidence).".to_string()
        } else {
            "Win rate is consistent with expected.".to_string()
        },
    })
}

/// Metric-by-metric comparison of a fair and a tweaked run. Higher is better.
pub fn compare_modes(fair: &ModeResults, tweaked: &ModeResults) -> ModeComparison {
    let (f, t) = (&fair.summary, &tweaked.summary);
    let metrics: Vec<MetricComparison> = [
        ("win_rate", f.win_rate, t.win_rate),
        ("final_balance", f.final_balance, t.final_balance),
        ("profit", f.profit, t.profit),
        ("max_balance", f.max_balance, t.max_balance),
    ]
    .into_iter()
    .map(|(metric, fair, tweaked)| {
        let difference = fair - tweaked;
        MetricComparison {
            metric,
            fair,
            tweaked,
            difference,
            better: better_of(difference),
        }
    })
    .collect();

    let fair_wins = metrics.iter().filter(|m| m.better == Better::Fair).count();
    let tweaked_wins = metrics.iter().filter(|m| m.better == Better::Tweaked).count();
    let (overall, conclusion) = match fair_wins.cmp(&tweaked_wins) {
        std::cmp::Ordering::Greater => (Better::Fair, "Fair game mode performed better overall."),
        std::cmp::Ordering::Less => (
            Better::Tweaked,
            "Tweaked game mode performed better overall.",
        ),
        std::cmp::Ordering::Equal => (Better::Equal, "Both modes performed similarly."),
    };

    ModeComparison {
        metrics,
        overall,
        conclusion: conclusion.to_string(),
    }
}

fn better_of(difference: f64) -> Better {
    if difference > 0.0 {
        Better::Fair
    } else if difference < 0.0 {
        Better::Tweaked
    } else {
        Better::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollquest_types::analysis::SummaryMetrics;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_normal_tail_matches_gamma_q() {
        for z in [0.5, 1.0, 1.96, 3.0] {
            assert!(close(
                normal_two_tailed(z),
                regularized_gamma_q(0.5, z * z / 2.0),
                1e-10
            ));
        }
    }

    #[test]
    fn test_chi_square_survival_reference_points() {
        assert!(close(chi_square_survival(11.0705, 5), 0.05, 1e-4));
        assert!(close(chi_square_survival(15.0863, 5), 0.01, 1e-4));
        assert!(close(chi_square_survival(0.0, 5), 1.0, 1e-12));
        // df = 2 has the closed form exp(-x/2).
        assert!(close(chi_square_survival(3.0, 2), (-1.5f64).exp(), 1e-10));
    }

    #[test]
    fn test_normal_two_tailed() {
        assert!(close(normal_two_tailed(1.96), 0.05, 1e-4));
        assert!(close(normal_two_tailed(0.0), 1.0, 1e-12));
        assert!(close(normal_two_tailed(-1.96), normal_two_tailed(1.96), 1e-12));
    }

    #[test]
    fn test_uniform_counts_are_fair() {
        let result = chi_square_test(&[100; 6], None).unwrap();
        assert!(result.chi_square_statistic.abs() < 1e-12);
        assert!(result.is_fair_at_95_confidence);
        assert!(close(result.p_value, 1.0, 1e-9));
        assert_eq!(result.degrees_of_freedom, 5);
        assert_eq!(result.expected, vec![100.0; 6]);
    }

    #[test]
    fn test_single_face_is_biased() {
        let result = chi_square_test(&[600, 0, 0, 0, 0, 0], None).unwrap();
        assert!(close(result.chi_square_statistic, 3_000.0, 1e-9));
        assert!(!result.is_fair_at_95_confidence);
        assert!(result.p_value < 1e-10);
        assert!(result.interpretation.starts_with("Strong evidence"));
    }

    #[test]
    fn test_chi_square_errors() {
        assert!(matches!(
            chi_square_test(&[0; 6], None),
            Err(EngineError::InsufficientData(_))
        ));
        assert!(matches!(
            chi_square_test(&[1; 6], Some(&[0.5, 0.5, 0.0, 0.0, 0.0, 0.0])),
            Err(EngineError::InvalidParameter(_))
        ));
        assert!(observed_counts(&[1, 2, 3]).is_err());
        assert!(observed_counts(&[1, 2, 3, 4, 5, -6]).is_err());
        assert_eq!(observed_counts(&[1, 2, 3, 4, 5, 6]).unwrap(), [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_chi_square_rejects_overflowing_weights() {
        assert!(matches!(
            chi_square_test(&[10; 6], Some(&[1e308; 6])),
            Err(EngineError::InvalidParameter(_))
        ));
        let result = chi_square_test(&[10; 6], Some(&[1e300; 6])).unwrap();
        assert!(result.chi_square_statistic.abs() < 1e-9);
        assert!(result.p_value.is_finite());
    }

    #[test]
    fn test_chi_square_with_expected_probs() {
        let probs = [0.5, 0.1, 0.1, 0.1, 0.1, 0.1];
        let result = chi_square_test(&[500, 100, 100, 100, 100, 100], Some(&probs)).unwrap();
        assert!(result.chi_square_statistic < 1e-9);
        assert!(result.is_fair_at_95_confidence);
    }

    #[test]
    fn test_z_test() {
        let result = z_test_proportion(1_000, 6_000, 1.0 / 6.0).unwrap();
        assert!(close(result.z_score, 0.0, 1e-9));
        assert!(!result.is_significant_at_95);

        let skewed = z_test_proportion(300, 1_000, 1.0 / 6.0).unwrap();
        assert!(skewed.z_score > 10.0);
        assert!(skewed.is_significant_at_95);
        assert!(skewed.confidence_interval_95[0] < 0.3);
        assert!(skewed.confidence_interval_95[1] > 0.3);

        assert!(matches!(
            z_test_proportion(0, 0, 0.5),
            Err(EngineError::InsufficientData(_))
        ));
        assert!(z_test_proportion(5, 4, 0.5).is_err());
        assert!(z_test_proportion(1, 4, 1.0).is_err());
    }

    #[test]
    fn test_compare_modes() {
        let fair = ModeResults {
            summary: SummaryMetrics {
                win_rate: 0.17,
                final_balance: 900.0,
                profit: -100.0,
                max_balance: 1_100.0,
            },
        };
        let tweaked = ModeResults {
            summary: SummaryMetrics {
                win_rate: 0.25,
                final_balance: 1_500.0,
                profit: 500.0,
                max_balance: 1_100.0,
            },
        };
        let comparison = compare_modes(&fair, &tweaked);
        assert_eq!(comparison.metrics.len(), 4);
        assert_eq!(comparison.overall, Better::Tweaked);
        assert_eq!(comparison.metrics[3].better, Better::Equal);
        assert_eq!(compare_modes(&fair, &fair).overall, Better::Equal);
    }
}
