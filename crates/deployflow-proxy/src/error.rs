//! Routing error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use deployflow_state::StateError;
use thiserror::Error;

/// Why a request could not be delivered to a backend.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("malformed host: {0:?}")]
    MalformedHost(String),

    #[error("unknown project: {0}")]
    UnknownProject(String),

    #[error("no active backend for project: {0}")]
    NoActiveBackend(String),

    #[error("backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("failed to build upstream request: {0}")]
    RequestBuild(String),

    #[error("state store error: {0}")]
    Store(#[from] StateError),
}

impl RoutingError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedHost(_) => StatusCode::BAD_REQUEST,
            Self::UnknownProject(_) => StatusCode::NOT_FOUND,
            Self::NoActiveBackend(_) | Self::BackendUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::RequestBuild(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RoutingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "proxy request failed");
        }

        let message = match &self {
            Self::MalformedHost(_) => {
                "Invalid domain format. Use <project>.<domain>, e.g. my-app.localhost".to_owned()
            }
            Self::UnknownProject(name) => format!("Project not found: {name}"),
            Self::NoActiveBackend(name) => {
                format!("Service not running (no active deployment for {name})")
            }
            Self::BackendUnreachable(_) => "Backend unreachable".to_owned(),
            // Hide internal details.
            Self::RequestBuild(_) | Self::Store(_) => "Internal server error".to_owned(),
        };

        (status, message).into_response()
    }
}
