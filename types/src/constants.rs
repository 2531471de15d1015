/// Number of faces on the die.
pub const FACES: usize = 6;

/// Gross payout multiplier on a winning bet (stake included).
pub const PAYOUT_MULTIPLIER: f64 = 6.0;

/// Net odds paid on a winning bet (`PAYOUT_MULTIPLIER - 1`).
pub const NET_ODDS: f64 = PAYOUT_MULTIPLIER - 1.0;

/// Starting balance for new sessions
pub const DEFAULT_BALANCE: f64 = 1_000.0;

/// Bet limits for single rounds
pub const MIN_BET: f64 = 1.0;
pub const MAX_BET: f64 = 10_000.0;

/// Largest single deposit accepted by `add_funds`.
pub const MAX_FUNDS_ADD: f64 = 100_000.0;

/// Maximum player name length (characters)
pub const MAX_NAME_LENGTH: usize = 20;

pub const DEFAULT_PLAYER_NAME: &str = "Player";

/// Simulation ceilings (requests above these are rejected).
pub const MAX_SIMULATION_TRIALS: u64 = 1_000_000;
pub const DEFAULT_SIMULATION_TRIALS: u64 = 10_000;
pub const MAX_BATCH_SIMULATIONS: u64 = 1_000;
pub const MAX_BATCH_TRIALS: u64 = 10_000;
pub const MAX_CONVERGENCE_TRIALS: u64 = 100_000;

/// Number of histogram bins used by batch runs.
pub const HISTOGRAM_BINS: usize = 20;

/// Requested number of convergence checkpoints (before deduplication).
pub const CONVERGENCE_CHECKPOINTS: usize = 50;

/// Largest checkpoint count a convergence run accepts.
pub const MAX_CONVERGENCE_CHECKPOINTS: usize = 1_000;

/// Chi-square degrees of freedom for a six-faced die.
pub const CHI_SQUARE_DF: u32 = 5;

/// Chi-square critical value at df=5, alpha=0.05.
pub const CHI_SQUARE_CRITICAL_95: f64 = 11.0705;

/// Two-sided z score for a 95% interval.
pub const Z_95: f64 = 1.96;

/// Rounds of history kept per session unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Number of trailing streaks reported by streak analysis.
pub const STREAK_HISTORY_LEN: usize = 20;
