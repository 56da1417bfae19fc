use thiserror::Error;
use trip_shared::TripError;

/// Errors raised by the processor runtime
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Broker or client error from the Kafka layer
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// State table restore failure
    #[error("State restore failed: {message}")]
    StateRestore { message: String },

    /// Startup failure (bad configuration, unreachable brokers)
    #[error("Startup failed: {message}")]
    Startup { message: String },

    /// Monitoring endpoint failure
    #[error("Monitoring error: {message}")]
    Monitoring { message: String },

    /// Serialization error
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Error from the shared domain layer
    #[error(transparent)]
    Shared(#[from] TripError),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ProcessorError {
    pub fn state_restore(message: impl Into<String>) -> Self {
        Self::StateRestore {
            message: message.into(),
        }
    }

    pub fn startup(message: impl Into<String>) -> Self {
        Self::Startup {
            message: message.into(),
        }
    }

    pub fn monitoring(message: impl Into<String>) -> Self {
        Self::Monitoring {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type for processor operations
pub type ProcessorResult<T> = Result<T, ProcessorError>;
