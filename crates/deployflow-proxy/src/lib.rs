//! DeployFlow request router — subdomain routing to live deployments.
//!
//! Every inbound request is resolved from scratch: the first DNS label of
//! its host names a project, the project's most recent `running` deployment
//! supplies a loopback port, and the request is streamed to that port.
//! Nothing is cached, so a stopped or replaced deployment is noticed on the
//! very next request.
//!
//! # Components
//!
//! - **`router`** — host → project → active deployment → backend address
//! - **`forward`** — streaming HTTP/1.1 forwarding to the backend
//! - **`error`** — `RoutingError` and its HTTP status mapping

pub mod error;
pub mod forward;
pub mod router;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::Response;
use deployflow_state::RecordStore;
use tracing::debug;

pub use error::RoutingError;
pub use forward::forward;
pub use router::{request_host, resolve_route, routing_key, Route};

/// Shared state for the proxy listener.
#[derive(Clone)]
pub struct ProxyState {
    pub store: Arc<dyn RecordStore>,
}

/// Build the proxy service: every path on every host goes through routing.
pub fn proxy_router(store: Arc<dyn RecordStore>) -> axum::Router {
    axum::Router::new()
        .fallback(proxy_request)
        .with_state(ProxyState { store })
}

/// Resolve the request's host and forward it to the live backend.
pub async fn proxy_request(
    State(state): State<ProxyState>,
    request: Request,
) -> Result<Response, RoutingError> {
    let host = request_host(&request)
        .ok_or_else(|| RoutingError::MalformedHost(String::new()))?
        .to_string();
    let route = resolve_route(state.store.as_ref(), &host)?;
    debug!(
        %host,
        project = %route.project.name,
        deployment = %route.deployment.id,
        backend = %route.backend,
        "routing request"
    );
    forward(&route, &host, request).await
}
