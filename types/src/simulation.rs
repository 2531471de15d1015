use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BALANCE, DEFAULT_SIMULATION_TRIALS, FACES};
use crate::dice::{Distribution, Face, GameMode};
use crate::error::EngineError;

/// Stake sizing rule applied between rounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStrategy {
    #[default]
    Fixed,
    Martingale,
    AntiMartingale,
    Kelly,
}

impl BetStrategy {
    pub const ALL: [BetStrategy; 4] = [
        BetStrategy::Fixed,
        BetStrategy::Martingale,
        BetStrategy::AntiMartingale,
        BetStrategy::Kelly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BetStrategy::Fixed => "fixed",
            BetStrategy::Martingale => "martingale",
            BetStrategy::AntiMartingale => "anti_martingale",
            BetStrategy::Kelly => "kelly",
        }
    }
}

impl std::str::FromStr for BetStrategy {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "martingale" => Ok(Self::Martingale),
            "anti_martingale" | "anti-martingale" => Ok(Self::AntiMartingale),
            "kelly" => Ok(Self::Kelly),
            _ => Err("valid values: fixed, martingale, anti_martingale, kelly"),
        }
    }
}

/// Inputs for a single Monte Carlo run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub num_trials: u64,
    pub starting_balance: f64,
    pub bet_amount: f64,
    pub bet_strategy: BetStrategy,
    pub game_mode: GameMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_face: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            num_trials: DEFAULT_SIMULATION_TRIALS,
            starting_balance: DEFAULT_BALANCE,
            bet_amount: 10.0,
            bet_strategy: BetStrategy::Fixed,
            game_mode: GameMode::Fair,
            probabilities: None,
            target_face: None,
            seed: None,
        }
    }
}

impl SimulationParams {
    pub fn distribution(&self) -> Result<Distribution, EngineError> {
        Distribution::from_mode(self.game_mode, self.probabilities.as_deref())
    }

    pub fn target(&self) -> Result<Option<Face>, EngineError> {
        self.target_face.map(Face::try_from).transpose()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationSummary {
    pub total_rounds: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate: f64,
    pub final_balance: f64,
    pub profit: f64,
    pub profit_fraction: f64,
    pub max_balance: f64,
    pub min_balance: f64,
    pub went_bankrupt: bool,
}

/// Closed-form expectations for the configured bet.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Theoretical {
    pub expected_win_prob: f64,
    pub expected_value_per_bet: f64,
    pub house_edge: f64,
    pub dice_expected_value: f64,
    pub dice_variance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationResult {
    pub summary: SimulationSummary,
    pub theoretical: Theoretical,
    /// Balance before the first round followed by the balance after each round;
    /// always `num_trials + 1` entries (held flat after an early stop).
    pub balance_trajectory: Vec<f64>,
    pub face_distribution: [u64; FACES],
    pub parameters: SimulationParams,
}

impl SimulationResult {
    /// Downsample the trajectory to roughly `max_points` entries, keeping both ends.
    pub fn sampled_trajectory(&self, max_points: usize) -> Vec<f64> {
        let len = self.balance_trajectory.len();
        if max_points < 2 || len <= max_points {
            return self.balance_trajectory.clone();
        }
        let step = len.div_ceil(max_points - 1).max(1);
        let mut sampled: Vec<f64> = self.balance_trajectory.iter().step_by(step).copied().collect();
        if (len - 1) % step != 0 {
            sampled.push(self.balance_trajectory[len - 1]);
        }
        sampled
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchStatistics {
    pub mean_final_balance: f64,
    pub std_final_balance: f64,
    pub median_final_balance: f64,
    pub mean_profit: f64,
    pub std_profit: f64,
    pub median_profit: f64,
    pub min_profit: f64,
    pub max_profit: f64,
    pub mean_win_rate: f64,
    pub ruin_probability: f64,
    pub value_at_risk_5: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Histogram {
    pub counts: Vec<u64>,
    /// Bin edges; one more entry than `counts`.
    pub bins: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchDistribution {
    pub profits: Vec<f64>,
    pub final_balances: Vec<f64>,
    pub histogram: Histogram,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchResult {
    pub num_simulations: u64,
    pub trials_per_simulation: u64,
    pub seed: u64,
    pub statistics: BatchStatistics,
    pub distribution: BatchDistribution,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConvergenceResult {
    pub target_face: Face,
    pub theoretical_probability: f64,
    pub trials: Vec<u64>,
    pub empirical_probabilities: Vec<f64>,
    pub confidence_intervals: Vec<[f64; 2]>,
    pub final_empirical: f64,
    pub convergence_error: f64,
    pub seed: u64,
}
