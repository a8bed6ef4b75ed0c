//! deployflow-api — management API for DeployFlow.
//!
//! Provides axum route handlers for creating projects, triggering
//! deployments and inspecting their status.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/projects` | Create a project |
//! | GET | `/api/v1/projects/{id}` | Get a project |
//! | GET | `/api/v1/projects/{id}/deployments` | List a project's deployments |
//! | POST | `/api/v1/deployments` | Build and run a new deployment |
//! | GET | `/api/v1/deployments/{id}` | Get deployment details |
//! | POST | `/api/v1/deployments/{id}/stop` | Stop a running deployment |
//! | GET | `/healthz` | Liveness check |
//!
//! Every route is wrapped in request tracing, panic recovery and a CORS
//! policy admitting browser dashboards served from `http://localhost:<port>`.

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{Method, request::Parts};
use axum::routing::{get, post};
use deployflow_orchestrator::Orchestrator;
use deployflow_state::RecordStore;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn RecordStore>,
    pub orchestrator: Orchestrator,
}

/// Build the complete management router.
pub fn build_router(orchestrator: Orchestrator) -> Router {
    let api_state = ApiState {
        store: Arc::clone(orchestrator.store()),
        orchestrator,
    };

    let api_routes = Router::new()
        .route("/projects", post(handlers::create_project))
        .route("/projects/{id}", get(handlers::get_project))
        .route(
            "/projects/{id}/deployments",
            get(handlers::list_project_deployments),
        )
        .route("/deployments", post(handlers::create_deployment))
        .route("/deployments/{id}", get(handlers::get_deployment))
        .route("/deployments/{id}/stop", post(handlers::stop_deployment))
        .with_state(api_state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
        .layer(CatchPanicLayer::new())
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Whether `origin` is a page served from the local machine.
fn is_local_origin(origin: &HeaderValue) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    match origin.strip_prefix("http://localhost") {
        Some("") => true,
        Some(port) => port
            .strip_prefix(':')
            .is_some_and(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}

/// CORS policy for local dashboards.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _: &Parts| is_local_origin(origin),
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .expose_headers([header::LINK])
        .allow_credentials(true)
        .max_age(Duration::from_secs(300))
}
