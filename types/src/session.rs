use serde::{Deserialize, Serialize};

use crate::constants::FACES;
use crate::dice::Face;

/// One resolved round, as appended to a session's history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round: u64,
    pub bet_face: Face,
    pub bet_amount: f64,
    pub result: Face,
    pub won: bool,
    pub balance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BasicStats {
    pub player_name: String,
    pub initial_balance: f64,
    pub balance: f64,
    pub profit: f64,
    pub profit_fraction: f64,
    pub total_rounds: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate: f64,
}

/// Streak lengths are signed: positive for wins, negative for losses.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StreakAnalysis {
    pub current_streak: i64,
    pub max_win_streak: u64,
    pub max_lose_streak: u64,
    pub streak_history: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FaceDistribution {
    pub counts: [u64; FACES],
    pub fractions: [f64; FACES],
    pub total_rolls: u64,
    pub expected_fraction: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProfitOverTime {
    pub rounds: Vec<u64>,
    pub balances: Vec<f64>,
    pub profits: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FacePerformance {
    pub face: Face,
    pub times_bet: u64,
    pub wins: u64,
    pub win_rate: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BetAnalysis {
    pub total_wagered: f64,
    pub total_won: f64,
    pub total_lost: f64,
    pub avg_bet: f64,
    /// Only faces that were bet on at least once.
    pub bet_face_performance: Vec<FacePerformance>,
}

/// Read-only view of a session consumed by the analysis dashboard.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub basic_stats: BasicStats,
    pub streak_analysis: StreakAnalysis,
    pub face_distribution: FaceDistribution,
    pub profit_over_time: ProfitOverTime,
    pub bet_analysis: BetAnalysis,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionExport {
    pub player_name: String,
    pub balance: f64,
    pub initial_balance: f64,
    pub profit: f64,
    pub total_rounds: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate: f64,
    pub history: Vec<RoundOutcome>,
}
