use thiserror::Error;

/// Trip-pipeline error types shared across crates
#[derive(Debug, Error)]
pub enum TripError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State store error: {0}")]
    StateStore(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<String> for TripError {
    fn from(msg: String) -> Self {
        TripError::Internal(msg)
    }
}

impl TripError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        TripError::Configuration(msg.into())
    }

    pub fn state_store<S: Into<String>>(msg: S) -> Self {
        TripError::StateStore(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        TripError::Internal(msg.into())
    }
}

/// Result type for trip-pipeline operations
pub type TripResult<T> = Result<T, TripError>;
