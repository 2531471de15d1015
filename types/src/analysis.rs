use serde::{Deserialize, Serialize};

/// Chi-square goodness-of-fit outcome over the six faces.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChiSquareResult {
    pub chi_square_statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: u32,
    pub critical_value_95: f64,
    pub is_fair_at_95_confidence: bool,
    pub interpretation: String,
    pub observed: Vec<u64>,
    pub expected: Vec<f64>,
}

/// Two-tailed z test of an observed win proportion.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZTestResult {
    pub observed_wins: u64,
    pub total_trials: u64,
    pub observed_proportion: f64,
    pub expected_proportion: f64,
    pub z_score: f64,
    pub p_value: f64,
    pub confidence_interval_95: [f64; 2],
    pub is_significant_at_95: bool,
    pub interpretation: String,
}

/// Subset of a simulation summary used to compare game modes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryMetrics {
    pub win_rate: f64,
    pub final_balance: f64,
    pub profit: f64,
    pub max_balance: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeResults {
    pub summary: SummaryMetrics,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Better {
    Fair,
    Tweaked,
    Equal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricComparison {
    pub metric: &'static str,
    pub fair: f64,
    pub tweaked: f64,
    pub difference: f64,
    pub better: Better,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModeComparison {
    pub metrics: Vec<MetricComparison>,
    pub overall: Better,
    pub conclusion: String,
}
