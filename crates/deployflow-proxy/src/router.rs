//! Host-based route resolution.
//!
//! The routing scheme is `<project>.<anything>`: the first DNS label of the
//! request host is the project name. Resolution reads the record store on
//! every call.

use std::net::{Ipv4Addr, SocketAddr};

use axum::extract::Request;
use axum::http::header;
use deployflow_state::{Deployment, Project, RecordStore};

use crate::error::RoutingError;

/// A resolved destination for one request.
#[derive(Debug, Clone)]
pub struct Route {
    pub project: Project,
    pub deployment: Deployment,
    pub backend: SocketAddr,
}

/// The host a request was addressed to: the `Host` header, falling back to
/// the URI authority for absolute-form requests.
pub fn request_host(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .filter(|h| !h.is_empty())
}

/// Extract the project name from a host, e.g. `cat-dog.localhost:8000` → `cat-dog`.
pub fn routing_key(host: &str) -> Result<String, RoutingError> {
    let malformed = || RoutingError::MalformedHost(host.to_string());

    // Bracketed IPv6 literals never name a project.
    if host.starts_with('[') {
        return Err(malformed());
    }
    let hostname = host.split_once(':').map_or(host, |(name, _)| name);

    let mut labels = hostname.split('.');
    let first = labels.next().unwrap_or_default();
    if labels.next().is_none() || first.is_empty() {
        return Err(malformed());
    }
    Ok(first.to_ascii_lowercase())
}

/// Resolve `host` to the backend currently serving its project.
pub fn resolve_route(store: &dyn RecordStore, host: &str) -> Result<Route, RoutingError> {
    let name = routing_key(host)?;

    let project = store
        .get_project_by_name(&name)?
        .ok_or_else(|| RoutingError::UnknownProject(name.clone()))?;

    let deployment = store
        .get_active_deployment(&project.id)?
        .filter(|d| d.port != 0)
        .ok_or_else(|| RoutingError::NoActiveBackend(name.clone()))?;

    let backend = SocketAddr::from((Ipv4Addr::LOCALHOST, deployment.port));
    Ok(Route {
        project,
        deployment,
        backend,
    })
}
