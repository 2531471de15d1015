//! Die faces and probability distributions.
//!
//! A [`Distribution`] always holds exactly six non-negative weights summing to 1.
//! Caller-supplied weights are re-normalized on construction, so both fraction
//! form (`[0.5, 0.1, ...]`) and percentage form (`[50, 10, ...]`) are accepted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::FACES;
use crate::error::EngineError;

/// Tolerance used when comparing probability sums.
pub const PROBABILITY_EPSILON: f64 = 1e-9;

/// One face of a six-sided die (1..=6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Face(u8);

impl Face {
    pub const ONE: Face = Face(1);
    pub const SIX: Face = Face(6);

    pub fn new(value: u8) -> Option<Self> {
        (1..=FACES as u8).contains(&value).then_some(Face(value))
    }

    /// Face from a zero-based index (0..6).
    pub fn from_index(index: usize) -> Option<Self> {
        (index < FACES).then(|| Face(index as u8 + 1))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn all() -> impl Iterator<Item = Face> {
        (1..=FACES as u8).map(Face)
    }
}

impl TryFrom<u8> for Face {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Face::new(value).ok_or_else(|| {
            EngineError::invalid_parameter(format!("face must be between 1 and 6 (got {value})"))
        })
    }
}

impl From<Face> for u8 {
    fn from(face: Face) -> Self {
        face.0
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the die is weighted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[default]
    Fair,
    Tweaked,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Fair => "fair",
            GameMode::Tweaked => "tweaked",
        }
    }
}

impl std::str::FromStr for GameMode {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "fair" => Ok(Self::Fair),
            "tweaked" => Ok(Self::Tweaked),
            _ => Err("valid values: fair, tweaked"),
        }
    }
}

/// Categorical distribution over the six faces.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Distribution {
    mode: GameMode,
    probabilities: [f64; FACES],
}

impl Default for Distribution {
    fn default() -> Self {
        Self::fair()
    }
}

impl Distribution {
    pub fn fair() -> Self {
        Self {
            mode: GameMode::Fair,
            probabilities: [1.0 / FACES as f64; FACES],
        }
    }

    /// Build a weighted distribution, normalizing the weights to sum to 1.
    pub fn tweaked(weights: &[f64]) -> Result<Self, EngineError> {
        if weights.len() != FACES {
            return Err(EngineError::invalid_parameter(format!(
                "probabilities must have exactly {FACES} values (got {})",
                weights.len()
            )));
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(EngineError::invalid_parameter(format!(
                "probabilities must be finite and non-negative (got {bad})"
            )));
        }
        let total: f64 = weights.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(EngineError::invalid_parameter(format!(
                "probabilities must sum to a positive finite value (got {total})"
            )));
        }

        let mut probabilities = [0.0; FACES];
        for (slot, weight) in probabilities.iter_mut().zip(weights) {
            *slot = weight / total;
        }
        Ok(Self {
            mode: GameMode::Tweaked,
            probabilities,
        })
    }

    /// Resolve a distribution from a game mode and optional weights.
    ///
    /// Weights are ignored in fair mode and required in tweaked mode.
    pub fn from_mode(mode: GameMode, weights: Option<&[f64]>) -> Result<Self, EngineError> {
        match (mode, weights) {
            (GameMode::Fair, _) => Ok(Self::fair()),
            (GameMode::Tweaked, Some(weights)) => Self::tweaked(weights),
            (GameMode::Tweaked, None) => Err(EngineError::invalid_parameter(
                "tweaked mode requires probabilities",
            )),
        }
    }

    /// Tweaked when weights are present, fair otherwise.
    pub fn from_optional(weights: Option<&[f64]>) -> Result<Self, EngineError> {
        match weights {
            Some(weights) => Self::tweaked(weights),
            None => Ok(Self::fair()),
        }
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn probabilities(&self) -> &[f64; FACES] {
        &self.probabilities
    }

    pub fn probability(&self, face: Face) -> f64 {
        self.probabilities[face.index()]
    }

    /// E[X] of the rolled face value.
    pub fn expected_value(&self) -> f64 {
        Face::all()
            .map(|face| face.value() as f64 * self.probability(face))
            .sum()
    }

    pub fn variance(&self) -> f64 {
        let ev = self.expected_value();
        Face::all()
            .map(|face| {
                let diff = face.value() as f64 - ev;
                self.probability(face) * diff * diff
            })
            .sum()
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Pin `face` to `new_probability` and spread the remainder over the other
    /// faces in proportion to their current weights (equally if they are all zero).
    pub fn adjust(&self, face: Face, new_probability: f64) -> Result<Self, EngineError> {
        if !new_probability.is_finite() {
            return Err(EngineError::invalid_parameter("probability must be finite"));
        }
        let pinned = new_probability.clamp(0.0, 1.0);
        let remaining = 1.0 - pinned;
        let other_total: f64 = Face::all()
            .filter(|other| *other != face)
            .map(|other| self.probability(other))
            .sum();

        let mut probabilities = [0.0; FACES];
        for other in Face::all() {
            probabilities[other.index()] = if other == face {
                pinned
            } else if other_total > 0.0 {
                self.probability(other) / other_total * remaining
            } else {
                remaining / (FACES - 1) as f64
            };
        }
        Ok(Self {
            mode: GameMode::Tweaked,
            probabilities,
        })
    }

    /// True when every face carries weight 1/6.
    pub fn is_uniform(&self) -> bool {
        self.probabilities
            .iter()
            .all(|p| (p - 1.0 / FACES as f64).abs() < PROBABILITY_EPSILON)
    }

    pub fn info(&self) -> DistributionInfo {
        DistributionInfo {
            mode: self.mode,
            probabilities: self.probabilities,
            expected_value: self.expected_value(),
            variance: self.variance(),
            std_dev: self.std_dev(),
        }
    }
}

/// Summary of a distribution for display.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DistributionInfo {
    pub mode: GameMode,
    pub probabilities: [f64; FACES],
    pub expected_value: f64,
    pub variance: f64,
    pub std_dev: f64,
}
