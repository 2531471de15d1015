//! Rollquest dice engine.
//!
//! This crate contains the game logic behind the rollquest service: outcome sampling,
//! bet resolution, the per-player session ledger, Monte Carlo simulation (single runs,
//! batches and convergence tracking) and the statistical tests used to judge fairness.
//!
//! ## Determinism requirements
//! - All randomness flows through an explicit [`DiceRng`]; never reach for `thread_rng`.
//! - A simulation is fully determined by its parameters and seed. The seed used is
//!   echoed back in every result so a run can be replayed.
//! - Batch run `i` uses keystream `i` of the batch seed, so output does not depend on
//!   the `parallel` feature or on scheduling.
//!
//! ## Example
//! ```rust
//! use rollquest_execution::{simulate, DiceRng};
//! use rollquest_types::SimulationParams;
//!
//! let params = SimulationParams {
//!     num_trials: 1_000,
//!     target_face: Some(1),
//!     ..SimulationParams::default()
//! };
//! let mut rng = DiceRng::from_seed(7);
//! let result = simulate(params, 10_000, &mut rng).unwrap();
//! assert_eq!(result.balance_trajectory.len(), 1_001);
//! assert_eq!(result.balance_trajectory[0], 1_000.0);
//! ```

pub mod batch;
pub mod convergence;
pub mod ledger;
pub mod monte_carlo;
pub mod resolver;
pub mod rng;
pub mod stats;
pub mod strategy;

pub use batch::run_batch;
pub use convergence::{log_checkpoints, track_convergence};
pub use ledger::{streak_analysis, Session};
pub use monte_carlo::{simulate, simulate_seeded, EngineLimits, Simulation};
pub use resolver::{resolve, Resolution};
pub use rng::{generate_seed, DiceRng};
pub use stats::{chi_square_test, compare_modes, observed_counts, z_test_proportion};
pub use strategy::{kelly_fraction, Stake, Staking};
