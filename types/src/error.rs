use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the engine. Every variant is recoverable at the request boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid bet: {0}")]
    InvalidBet(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("no active session: {0}")]
    NoActiveSession(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Stable machine-readable error tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidParameter,
    InvalidBet,
    InsufficientData,
    NoActiveSession,
    InvalidState,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            EngineError::InvalidBet(_) => ErrorKind::InvalidBet,
            EngineError::InsufficientData(_) => ErrorKind::InsufficientData,
            EngineError::NoActiveSession(_) => ErrorKind::NoActiveSession,
            EngineError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        EngineError::InvalidParameter(message.into())
    }

    pub fn invalid_bet(message: impl Into<String>) -> Self {
        EngineError::InvalidBet(message.into())
    }
}

/// JSON body returned for failed requests.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind(),
        }
    }
}
