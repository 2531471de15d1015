//! Monte Carlo simulation of a single player over many rounds.

use rollquest_types::constants::{
    FACES, MAX_BATCH_SIMULATIONS, MAX_BATCH_TRIALS, MAX_CONVERGENCE_TRIALS, MAX_SIMULATION_TRIALS,
    PAYOUT_MULTIPLIER,
};
use rollquest_types::simulation::Theoretical;
use rollquest_types::{
    Distribution, EngineError, Face, SimulationParams, SimulationResult, SimulationSummary,
};
use tracing::debug;

use crate::resolver::net_delta;
use crate::rng::DiceRng;
use crate::strategy::{Stake, Staking};

/// Upper bounds on simulation work. Requests above a limit are rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineLimits {
    pub max_trials: u64,
    pub max_batch_simulations: u64,
    pub max_batch_trials: u64,
    pub max_convergence_trials: u64,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_trials: MAX_SIMULATION_TRIALS,
            max_batch_simulations: MAX_BATCH_SIMULATIONS,
            max_batch_trials: MAX_BATCH_TRIALS,
            max_convergence_trials: MAX_CONVERGENCE_TRIALS,
        }
    }
}

/// A validated simulation ready to run.
#[derive(Clone, Debug)]
pub struct Simulation {
    params: SimulationParams,
    distribution: Distribution,
    target: Option<Face>,
}

impl Simulation {
    pub fn new(params: SimulationParams, max_trials: u64) -> Result<Self, EngineError> {
        if params.num_trials == 0 || params.num_trials > max_trials {
            return Err(EngineError::invalid_parameter(format!(
                "num_trials must be between 1 and {max_trials} (got {})",
                params.num_trials
            )));
        }
        if !params.starting_balance.is_finite() || params.starting_balance <= 0.0 {
            return Err(EngineError::invalid_parameter(format!(
                "starting_balance must be positive (got {})",
                params.starting_balance
            )));
        }
        if !params.bet_amount.is_finite() || params.bet_amount <= 0.0 {
            return Err(EngineError::invalid_parameter(format!(
                "bet_amount must be positive (got {})",
                params.bet_amount
            )));
        }
        let distribution = params.distribution()?;
        let target = params.target()?;
        Ok(Self {
            params,
            distribution,
            target,
        })
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    /// Win probability of a single bet. A random target wins one time in six.
    pub fn win_probability(&self) -> f64 {
        match self.target {
            Some(face) => self.distribution.probability(face),
            None => 1.0 / FACES as f64,
        }
    }

    pub fn theoretical(&self) -> Theoretical {
        let p = self.win_probability();
        Theoretical {
            expected_win_prob: p,
            expected_value_per_bet: (PAYOUT_MULTIPLIER * p - 1.0) * self.params.bet_amount,
            house_edge: 1.0 - PAYOUT_MULTIPLIER * p,
            dice_expected_value: self.distribution.expected_value(),
            dice_variance: self.distribution.variance(),
        }
    }

    /// Play `num_trials` rounds, stopping early on bankruptcy or when the
    /// strategy declines to bet.
    pub fn run(&self, rng: &mut DiceRng) -> SimulationResult {
        let num_trials = self.params.num_trials;
        let starting = self.params.starting_balance;
        let mut staking = Staking::new(
            self.params.bet_strategy,
            self.params.bet_amount,
            self.win_probability(),
        );

        let mut balance = starting;
        let mut max_balance = starting;
        let mut min_balance = starting;
        let mut wins = 0u64;
        let mut rounds = 0u64;
        let mut ran_dry = false;
        let mut face_distribution = [0u64; FACES];
        let mut trajectory = Vec::with_capacity(num_trials as usize + 1);
        trajectory.push(balance);

        while rounds < num_trials {
            let stake = match staking.next_stake(balance) {
                Stake::Bet(stake) => stake,
                Stake::Insufficient => {
                    ran_dry = true;
                    break;
                }
                Stake::Idle => break,
            };

            let bet_face = match self.target {
                Some(face) => face,
                None => rng.roll_uniform_face(),
            };
            let result = rng.sample(&self.distribution);
            let won = bet_face == result;
            face_distribution[result.index()] += 1;

            balance = (balance + net_delta(won, stake)).max(0.0);
            staking.record(won, stake);
            rounds += 1;
            if won {
                wins += 1;
            }
            max_balance = max_balance.max(balance);
            min_balance = min_balance.min(balance);
            trajectory.push(balance);
        }

        // Hold the final balance for rounds that were never played.
        trajectory.resize(num_trials as usize + 1, balance);

        let went_bankrupt = ran_dry || balance <= 0.0;
        let profit = balance - starting;
        debug!(
            trials = num_trials,
            rounds,
            wins,
            final_balance = balance,
            went_bankrupt,
            strategy = self.params.bet_strategy.as_str(),
            "simulation finished"
        );

        let mut parameters = self.params.clone();
        parameters.seed = Some(rng.seed());
        SimulationResult {
            summary: SimulationSummary {
                total_rounds: rounds,
                wins,
                losses: rounds - wins,
                win_rate: if rounds == 0 {
                    0.0
                } else {
                    wins as f64 / rounds as f64
                },
                final_balance: balance,
                profit,
                profit_fraction: profit / starting,
                max_balance,
                min_balance,
                went_bankrupt,
            },
            theoretical: self.theoretical(),
            balance_trajectory: trajectory,
            face_distribution,
            parameters,
        }
    }
}

/// Validate and run a simulation with the given generator.
pub fn simulate(
    params: SimulationParams,
    max_trials: u64,
    rng: &mut DiceRng,
) -> Result<SimulationResult, EngineError> {
    Ok(Simulation::new(params, max_trials)?.run(rng))
}

/// Run with the request's own seed, or a fresh one when absent.
pub fn simulate_seeded(
    params: SimulationParams,
    max_trials: u64,
) -> Result<SimulationResult, EngineError> {
    let simulation = Simulation::new(params, max_trials)?;
    let mut rng = DiceRng::from_optional_seed(simulation.params.seed);
    Ok(simulation.run(&mut rng))
}
