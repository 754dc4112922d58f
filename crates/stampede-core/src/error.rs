// Error types for the load engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while configuring or running a load test
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration, surfaced before scheduling starts
    #[error("invalid {field}: {message}")]
    Config { field: String, message: String },

    /// A metric name was registered as one sink type and requested as another
    #[error("metric '{0}' is already registered as a different sink type")]
    SinkTypeConflict(String),

    /// A scenario references an entry point with no registered request factory
    #[error("no request factory registered for entry point '{0}'")]
    UnknownEntryPoint(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Create a configuration error naming the invalid field
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Config {
            field: field.into(),
            message: message.into(),
        }
    }
}
