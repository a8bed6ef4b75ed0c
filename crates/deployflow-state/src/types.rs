//! Domain types for the DeployFlow record store.
//!
//! These types represent the persisted state of projects and deployments.
//! All types are serializable to/from JSON for storage in redb tables and
//! for the management API.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a project.
pub type ProjectId = Uuid;

/// Unique identifier for a deployment.
pub type DeploymentId = Uuid;

/// Longest name a single DNS label may carry.
pub const MAX_PROJECT_NAME_LEN: usize = 63;

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ── Project ───────────────────────────────────────────────────────

/// A named application; the name doubles as the routing subdomain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Unix timestamp (milliseconds) when the project was created.
    pub created_at: u64,
}

impl Project {
    /// Create a project with a fresh identity after validating the name.
    pub fn new(name: &str) -> Result<Self, NameError> {
        validate_project_name(name)?;
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now_millis(),
        })
    }

    /// Key used in the `projects` table.
    pub fn table_key(&self) -> String {
        self.id.to_string()
    }
}

/// Why a project name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("project name must not be empty")]
    Empty,

    #[error("project name is longer than 63 characters")]
    TooLong,

    #[error("project name may only contain lowercase letters, digits and '-' (found {0:?})")]
    InvalidChar(char),

    #[error("project name must not start or end with '-'")]
    EdgeHyphen,
}

/// Check that `name` is usable as a single lowercase DNS label.
pub fn validate_project_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_PROJECT_NAME_LEN {
        return Err(NameError::TooLong);
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(NameError::InvalidChar(c));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(NameError::EdgeHyphen);
    }
    Ok(())
}

// ── Deployment ────────────────────────────────────────────────────

/// Lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Queued,
    Building,
    Running,
    Failed,
    Stopped,
}

impl DeploymentStatus {
    /// Whether moving from `self` to `next` is a legal forward transition.
    ///
    /// `queued → building → {running | failed}` and `running → stopped`.
    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        matches!(
            (self, next),
            (Queued, Building) | (Building, Running) | (Building, Failed) | (Running, Stopped)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Building => "building",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One build-and-run attempt for a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deployment {
    pub id: DeploymentId,
    pub project_id: ProjectId,
    pub status: DeploymentStatus,
    /// Container runtime handle; empty until a container exists.
    pub container_id: String,
    /// Host port the container is reachable on; 0 until running.
    pub port: u16,
    /// Image built for this deployment; empty until the build succeeds.
    pub image_tag: String,
    /// Unix timestamp (milliseconds) when the deployment was created.
    pub created_at: u64,
    /// Unix timestamp (milliseconds) of the last status change.
    pub updated_at: u64,
}

impl Deployment {
    /// A fresh deployment record in `building` status.
    pub fn building(project_id: ProjectId) -> Self {
        let now = now_millis();
        Self {
            id: Uuid::new_v4(),
            project_id,
            status: DeploymentStatus::Building,
            container_id: String::new(),
            port: 0,
            image_tag: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Key used in the `deployments` table.
    pub fn table_key(&self) -> String {
        self.id.to_string()
    }

    /// Ordering used to pick the active deployment: newest first, ties on id.
    pub fn recency_key(&self) -> (u64, Uuid) {
        (self.created_at, self.id)
    }
}
