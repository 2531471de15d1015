//! Common types shared by the rollquest engine and service.

pub mod analysis;
pub mod api;
pub mod constants;
pub mod dice;
pub mod error;
pub mod session;
pub mod simulation;

pub use dice::{Distribution, DistributionInfo, Face, GameMode};
pub use error::{EngineError, ErrorKind, ErrorResponse};
pub use simulation::{
    BatchResult, BetStrategy, ConvergenceResult, SimulationParams, SimulationResult,
    SimulationSummary,
};
