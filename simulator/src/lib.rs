//! HTTP service around the rollquest engine.
//!
//! [`Simulator`] holds the service config, the session store, request metrics and
//! the service random source. [`Api`] builds the axum router on top of it.

use rollquest_execution::{
    chi_square_test, compare_modes, observed_counts, run_batch, simulate, track_convergence,
    z_test_proportion, DiceRng,
};
use rollquest_types::analysis::{ChiSquareResult, ModeComparison, ZTestResult};
use rollquest_types::api::{
    BatchRequest, ChiSquareRequest, CompareModesRequest, ConvergenceRequest, FaceAdjustment,
    RollRequest,
    RollResponse, SimulationRequest, SimulationResponse, ZTestRequest,
};
use rollquest_types::session::{SessionExport, SessionSnapshot};
use rollquest_types::{
    BatchResult, ConvergenceResult, Distribution, DistributionInfo, EngineError, Face,
};
use std::sync::Mutex;

mod api;
pub use api::Api;

mod metrics;
pub use metrics::{HttpMetricsSnapshot, LatencySnapshot};
use metrics::HttpMetrics;

mod state;
pub use state::{validate_session_id, SessionStore, SharedSession, SimulatorConfig};
use state::lock;

pub struct Simulator {
    config: SimulatorConfig,
    sessions: SessionStore,
    rng: Mutex<DiceRng>,
    http_metrics: HttpMetrics,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = DiceRng::from_optional_seed(config.seed);
        tracing::info!(seed = rng.seed(), "service rng initialized");
        let sessions = SessionStore::new(
            config.starting_balance,
            config.session_history_limit,
            config.max_sessions,
        );
        Self {
            config,
            sessions,
            rng: Mutex::new(rng),
            http_metrics: HttpMetrics::default(),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub(crate) fn http_metrics(&self) -> &HttpMetrics {
        &self.http_metrics
    }

    pub fn http_metrics_snapshot(&self) -> HttpMetricsSnapshot {
        self.http_metrics.snapshot()
    }

    /// Seed for a run that did not bring its own.
    pub fn next_seed(&self) -> u64 {
        lock(&self.rng).next_u64()
    }

    pub fn create_session(&self) -> (String, f64) {
        let (id, session) = self.sessions.create();
        let balance = lock(&session).balance();
        tracing::info!(session_id = %id, "session created");
        (id, balance)
    }

    pub fn delete_session(&self, id: &str) -> Result<(), EngineError> {
        self.sessions.remove(id)?;
        tracing::info!(session_id = id, "session deleted");
        Ok(())
    }

    pub fn roll(&self, id: &str, request: &RollRequest) -> Result<RollResponse, EngineError> {
        let distribution = Distribution::from_optional(request.probabilities.as_deref())?;
        let session = self.sessions.get_or_create(id)?;
        let mut session = lock(&session);
        let outcome = {
            let mut rng = lock(&self.rng);
            session.play_round(request.bet_face, request.bet_amount, &distribution, &mut rng)?
        };
        tracing::debug!(
            session_id = id,
            round = outcome.round,
            bet_face = outcome.bet_face.value(),
            result = outcome.result.value(),
            won = outcome.won,
            "round played"
        );
        Ok(RollResponse {
            result: outcome.result,
            won: outcome.won,
            balance: session.balance(),
            profit: session.profit(),
            total_rounds: session.total_rounds(),
            win_rate: session.win_rate(),
            wins: session.wins(),
            losses: session.losses(),
        })
    }

    pub fn session_stats(&self, id: &str) -> Result<SessionSnapshot, EngineError> {
        let session = self.sessions.get(id)?;
        let snapshot = lock(&session).snapshot();
        Ok(snapshot)
    }

    pub fn export_session(&self, id: &str) -> Result<SessionExport, EngineError> {
        let session = self.sessions.get(id)?;
        let export = lock(&session).export();
        Ok(export)
    }

    pub fn set_player_name(&self, id: &str, name: &str) -> Result<String, EngineError> {
        let session = self.sessions.get_or_create(id)?;
        let mut session = lock(&session);
        Ok(session.set_player_name(name).to_string())
    }

    pub fn add_funds(&self, id: &str, amount: f64) -> Result<f64, EngineError> {
        let session = self.sessions.get_or_create(id)?;
        let balance = lock(&session).add_funds(amount)?;
        Ok(balance)
    }

    pub fn reset_session(&self, id: &str) -> Result<f64, EngineError> {
        let session = self.sessions.get_or_create(id)?;
        let mut session = lock(&session);
        session.reset();
        tracing::info!(session_id = id, "session reset");
        Ok(session.balance())
    }

    /// Run one simulation. CPU-bound; call from a blocking context.
    pub fn run_simulation(
        &self,
        mut request: SimulationRequest,
    ) -> Result<SimulationResponse, EngineError> {
        let seed = match request.params.seed {
            Some(seed) => seed,
            None => self.next_seed(),
        };
        request.params.seed = Some(seed);
        let mut rng = DiceRng::from_seed(seed);
        let mut result = simulate(request.params, self.config.max_trials, &mut rng)?;

        let mut trajectory_sampled = false;
        if let Some(points) = request.trajectory_points {
            let sampled = result.sampled_trajectory(points);
            trajectory_sampled = sampled.len() != result.balance_trajectory.len();
            result.balance_trajectory = sampled;
        }
        tracing::info!(
            seed,
            trials = result.parameters.num_trials,
            strategy = result.parameters.bet_strategy.as_str(),
            went_bankrupt = result.summary.went_bankrupt,
            "simulation complete"
        );
        Ok(SimulationResponse {
            result,
            trajectory_sampled,
        })
    }

    /// Run a batch. CPU-bound; call from a blocking context.
    pub fn run_batch(&self, request: &BatchRequest) -> Result<BatchResult, EngineError> {
        let mut params = request.params();
        params.seed = Some(request.seed.unwrap_or_else(|| self.next_seed()));
        let result = run_batch(params, request.num_simulations, &self.config.limits())?;
        tracing::info!(
            seed = result.seed,
            simulations = result.num_simulations,
            trials = result.trials_per_simulation,
            ruin_probability = result.statistics.ruin_probability,
            "batch complete"
        );
        Ok(result)
    }

    /// Track convergence. CPU-bound; call from a blocking context.
    pub fn run_convergence(
        &self,
        request: &ConvergenceRequest,
    ) -> Result<ConvergenceResult, EngineError> {
        let distribution =
            Distribution::from_mode(request.game_mode, request.probabilities.as_deref())?;
        let target = Face::try_from(request.target_face)?;
        let seed = request.seed.unwrap_or_else(|| self.next_seed());
        let mut rng = DiceRng::from_seed(seed);
        let result = track_convergence(
            request.max_trials,
            &distribution,
            target,
            request.checkpoints,
            &mut rng,
            self.config.max_convergence_trials,
        )?;
        tracing::info!(
            seed,
            max_trials = request.max_trials,
            convergence_error = result.convergence_error,
            "convergence complete"
        );
        Ok(result)
    }

    pub fn chi_square(&self, request: &ChiSquareRequest) -> Result<ChiSquareResult, EngineError> {
        let observed = observed_counts(&request.observed)?;
        chi_square_test(&observed, request.expected_probs.as_deref())
    }

    pub fn z_test(&self, request: &ZTestRequest) -> Result<ZTestResult, EngineError> {
        let expected = request
            .expected_prob
            .unwrap_or(1.0 / rollquest_types::constants::FACES as f64);
        z_test_proportion(request.observed_wins, request.total_trials, expected)
    }

    pub fn compare_modes(&self, request: &CompareModesRequest) -> ModeComparison {
        compare_modes(&request.fair_results, &request.tweaked_results)
    }

    pub fn dice_info(
        &self,
        probabilities: Option<&[f64]>,
        adjust: Option<FaceAdjustment>,
    ) -> Result<DistributionInfo, EngineError> {
        let mut distribution = Distribution::from_optional(probabilities)?;
        if let Some(adjust) = adjust {
            distribution = distribution.adjust(Face::try_from(adjust.face)?, adjust.probability)?;
        }
        Ok(distribution.info())
    }
}
