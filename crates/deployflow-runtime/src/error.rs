//! Runtime gateway error types.

use thiserror::Error;

/// Result type alias for runtime gateway operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors returned by the container runtime gateway.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to connect to container runtime: {0}")]
    Connect(String),

    #[error("image build failed: {0}")]
    Build(String),

    #[error("container run failed: {0}")]
    Run(String),

    #[error("container stop failed: {0}")]
    Stop(String),
}
