use aggregator_execution_client_interface::ExecutionClientError;
use aggregator_signer_interface::SignerError;
use thiserror::Error;

use crate::queue::DatabaseError;
use crate::submitter::SubmissionError;

/// Result type for aggregator operations
pub type AggregatorResult<T> = Result<T, AggregatorError>;

/// Error types for the aggregator
#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Execution client error: {0}")]
    ExecutionClientError(#[from] ExecutionClientError),

    #[error("Signer error: {0}")]
    SignerError(#[from] SignerError),

    #[error("Submission error: {0}")]
    SubmissionError(#[from] SubmissionError),

    /// The backend answered a simulation with the wrong number of outcomes
    #[error("Simulation returned {got} outcomes for {expected} bundles")]
    SimulationMismatch { expected: usize, got: usize },

    #[error("Fee conversion error: {0}")]
    FeeConversionError(String),

    #[error("Concurrency limiter closed: {0}")]
    LimiterClosed(#[from] tokio::sync::AcquireError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Aggregator is shutting down")]
    ShuttingDown,
}
