// src/error.rs
// Standardized error types for the orchestrator

use thiserror::Error;

/// Main error type for the orchestrator library
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("batch state is corrupt or schema-mismatched: {0}")]
    CorruptState(String),

    #[error("budget exceeded: estimated cost {estimated:.4} exceeds limit {limit:.4}")]
    BudgetExceeded { estimated: f64, limit: f64 },

    #[error("recursion refused: {0}")]
    RecursionRefused(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience alias for Result using OrchestratorError
pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Convert to a user-facing string for CLI/event boundaries
    pub fn to_user_string(&self) -> String {
        self.to_string()
    }
}

impl From<String> for OrchestratorError {
    fn from(s: String) -> Self {
        OrchestratorError::Other(s)
    }
}

impl From<tokio::task::JoinError> for OrchestratorError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            OrchestratorError::Cancelled
        } else {
            OrchestratorError::Other(err.to_string())
        }
    }
}
