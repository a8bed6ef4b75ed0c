//! REST API handlers.
//!
//! Reads go straight to the record store; deployment creation and stopping
//! go through the orchestrator. Every response uses the same JSON envelope.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use deployflow_orchestrator::DeployError;
use deployflow_state::Project;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, axum::response::Response> {
    raw.parse::<Uuid>().map_err(|_| {
        error_response(&format!("invalid {what} id: {raw:?}"), StatusCode::BAD_REQUEST)
            .into_response()
    })
}

/// HTTP status for an orchestration failure.
fn deploy_error_status(err: &DeployError) -> StatusCode {
    match err {
        DeployError::ProjectNotFound(_) | DeployError::DeploymentNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        DeployError::InvalidTransition { .. } => StatusCode::CONFLICT,
        DeployError::Package(_)
        | DeployError::Build(_)
        | DeployError::Run(_)
        | DeployError::Stop(_)
        | DeployError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn deploy_error_response(err: DeployError) -> axum::response::Response {
    let status = deploy_error_status(&err);
    if status.is_server_error() {
        warn!(error = %err, "deployment request failed");
    }
    error_response(&err.to_string(), status).into_response()
}

// ── Projects ───────────────────────────────────────────────────

/// Create project request body.
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

/// POST /api/v1/projects
pub async fn create_project(
    State(state): State<ApiState>,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match payload {
        Ok(req) => req,
        Err(e) => return error_response(&e.body_text(), StatusCode::BAD_REQUEST).into_response(),
    };

    let project = match Project::new(&req.name) {
        Ok(project) => project,
        Err(e) => return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
    };

    match state.store.create_project(&project) {
        Ok(()) => {
            info!(project = %project.id, name = %project.name, "project created");
            (StatusCode::CREATED, ApiResponse::ok(project)).into_response()
        }
        Err(e) if e.is_conflict() => {
            error_response(&e.to_string(), StatusCode::CONFLICT).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/projects/{id}
pub async fn get_project(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_id(&id, "project") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.store.get_project(&id) {
        Ok(Some(project)) => ApiResponse::ok(project).into_response(),
        Ok(None) => error_response("project not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/projects/{id}/deployments
pub async fn list_project_deployments(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_id(&id, "project") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.store.get_project(&id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response("project not found", StatusCode::NOT_FOUND).into_response();
        }
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    }
    match state.store.list_deployments_for_project(&id) {
        Ok(deployments) => ApiResponse::ok(deployments).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Deployments ────────────────────────────────────────────────

/// Create deployment request body: the application source to build.
#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    pub project_id: String,
    pub code: String,
}

/// POST /api/v1/deployments
///
/// Responds once the deployment has reached `running` or `failed`.
pub async fn create_deployment(
    State(state): State<ApiState>,
    payload: Result<Json<CreateDeploymentRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match payload {
        Ok(req) => req,
        Err(e) => return error_response(&e.body_text(), StatusCode::BAD_REQUEST).into_response(),
    };
    let project_id = match parse_id(&req.project_id, "project") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state
        .orchestrator
        .create_deployment(project_id, &req.code)
        .await
    {
        Ok(deployment) => (StatusCode::CREATED, ApiResponse::ok(deployment)).into_response(),
        Err(e) => deploy_error_response(e),
    }
}

/// GET /api/v1/deployments/{id}
pub async fn get_deployment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_id(&id, "deployment") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.store.get_deployment(&id) {
        Ok(Some(deployment)) => ApiResponse::ok(deployment).into_response(),
        Ok(None) => error_response("deployment not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/deployments/{id}/stop
pub async fn stop_deployment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_id(&id, "deployment") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.orchestrator.stop_deployment(id).await {
        Ok(deployment) => ApiResponse::ok(deployment).into_response(),
        Err(e) => deploy_error_response(e),
    }
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}
