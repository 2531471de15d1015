//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::analysis::ModeResults;
use crate::constants::{
    CONVERGENCE_CHECKPOINTS, DEFAULT_BALANCE, MAX_BATCH_TRIALS, MAX_CONVERGENCE_TRIALS,
};
use crate::dice::{Face, GameMode};
use crate::simulation::{BetStrategy, SimulationParams, SimulationResult};

const DEFAULT_BATCH_SIMULATIONS: u64 = 100;
const DEFAULT_BATCH_TRIALS: u64 = 1_000;
const DEFAULT_CONVERGENCE_TRIALS: u64 = 10_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RollRequest {
    /// Raw face so out-of-range values surface as an invalid bet rather than a decode error.
    pub bet_face: i64,
    pub bet_amount: f64,
    #[serde(default)]
    pub probabilities: Option<Vec<f64>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RollResponse {
    pub result: Face,
    pub won: bool,
    pub balance: f64,
    pub profit: f64,
    pub total_rounds: u64,
    pub win_rate: f64,
    pub wins: u64,
    pub losses: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: String,
    pub balance: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetPlayerRequest {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerResponse {
    pub player_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddFundsRequest {
    pub amount: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChiSquareRequest {
    pub observed: Vec<i64>,
    #[serde(default)]
    pub expected_probs: Option<Vec<f64>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZTestRequest {
    pub observed_wins: u64,
    pub total_trials: u64,
    #[serde(default)]
    pub expected_prob: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareModesRequest {
    pub fair_results: ModeResults,
    pub tweaked_results: ModeResults,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DistributionRequest {
    #[serde(default)]
    pub probabilities: Option<Vec<f64>>,
    /// Pin one face to a probability and rescale the others.
    #[serde(default)]
    pub adjust: Option<FaceAdjustment>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FaceAdjustment {
    pub face: u8,
    pub probability: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationRequest {
    #[serde(flatten)]
    pub params: SimulationParams,
    /// Downsample the returned trajectory to about this many points.
    #[serde(default)]
    pub trajectory_points: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SimulationResponse {
    #[serde(flatten)]
    pub result: SimulationResult,
    pub trajectory_sampled: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchRequest {
    pub num_simulations: u64,
    pub trials_per_sim: u64,
    pub starting_balance: f64,
    pub bet_amount: f64,
    pub bet_strategy: BetStrategy,
    pub game_mode: GameMode,
    pub probabilities: Option<Vec<f64>>,
    pub target_face: Option<u8>,
    pub seed: Option<u64>,
}

impl Default for BatchRequest {
    fn default() -> Self {
        Self {
            num_simulations: DEFAULT_BATCH_SIMULATIONS,
            trials_per_sim: DEFAULT_BATCH_TRIALS.min(MAX_BATCH_TRIALS),
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

impl BatchRequest {
    /// Per-run parameters; the batch seed is carried separately.
    pub fn params(&self) -> SimulationParams {
        SimulationParams {
            num_trials: self.trials_per_sim,
            starting_balance: self.starting_balance,
            bet_amount: self.bet_amount,
            bet_strategy: self.bet_strategy,
            game_mode: self.game_mode,
            probabilities: self.probabilities.clone(),
            target_face: self.target_face,
            seed: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceRequest {
    pub max_trials: u64,
    pub game_mode: GameMode,
    pub probabilities: Option<Vec<f64>>,
    pub target_face: u8,
    pub checkpoints: usize,
    pub seed: Option<u64>,
}

impl Default for ConvergenceRequest {
    fn default() -> Self {
        Self {
            max_trials: DEFAULT_CONVERGENCE_TRIALS.min(MAX_CONVERGENCE_TRIALS),
            game_mode: GameMode::Fair,
            probabilities: None,
            target_face: 1,
            checkpoints: CONVERGENCE_CHECKPOINTS,
            seed: None,
        }
    }
}
