//! Orchestrator error types.

use deployflow_runtime::RuntimeError;
use deployflow_state::{DeploymentId, DeploymentStatus, ProjectId, StateError};
use thiserror::Error;

/// Errors that can occur while driving a deployment.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("deployment not found: {0}")]
    DeploymentNotFound(DeploymentId),

    #[error("cannot move deployment {id} from {from} to {to}")]
    InvalidTransition {
        id: DeploymentId,
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    #[error("failed to package build context: {0}")]
    Package(#[from] std::io::Error),

    #[error("{0}")]
    Build(#[source] RuntimeError),

    #[error("{0}")]
    Run(#[source] RuntimeError),

    #[error("{0}")]
    Stop(#[source] RuntimeError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type DeployResult<T> = Result<T, DeployError>;
