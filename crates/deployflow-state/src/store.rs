//! StateStore — redb-backed persistence for DeployFlow.
//!
//! Provides typed CRUD operations over projects and deployments. All values
//! are JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// The record store capability consumed by the orchestrator, router and API.
///
/// Implementations must be safe to share across many concurrent request
/// tasks.
pub trait RecordStore: Send + Sync {
    /// Insert a new project. Fails with [`StateError::Conflict`] if the name is taken.
    fn create_project(&self, project: &Project) -> StateResult<()>;

    /// Get a project by id.
    fn get_project(&self, id: &ProjectId) -> StateResult<Option<Project>>;

    /// Get a project by its unique name.
    fn get_project_by_name(&self, name: &str) -> StateResult<Option<Project>>;

    /// List all projects.
    fn list_projects(&self) -> StateResult<Vec<Project>>;

    /// Insert a new deployment record.
    fn create_deployment(&self, deployment: &Deployment) -> StateResult<()>;

    /// Get a deployment by id.
    fn get_deployment(&self, id: &DeploymentId) -> StateResult<Option<Deployment>>;

    /// Overwrite only the status (and `updated_at`) of a deployment.
    fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
    ) -> StateResult<()>;

    /// Overwrite the entire deployment record.
    fn update_deployment(&self, deployment: &Deployment) -> StateResult<()>;

    /// All deployments of a project, newest first.
    fn list_deployments_for_project(&self, project_id: &ProjectId)
    -> StateResult<Vec<Deployment>>;

    /// The most recently created `running` deployment of a project.
    fn get_active_deployment(&self, project_id: &ProjectId) -> StateResult<Option<Deployment>>;
}

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "record store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory record store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PROJECTS).map_err(map_err!(Table))?;
        txn.open_table(PROJECT_NAMES).map_err(map_err!(Table))?;
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn scan_deployments(
        &self,
        mut keep: impl FnMut(&Deployment) -> bool,
    ) -> StateResult<Vec<Deployment>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let deployment: Deployment =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(&deployment) {
                results.push(deployment);
            }
        }
        Ok(results)
    }
}

impl RecordStore for StateStore {
    // ── Projects ───────────────────────────────────────────────────

    fn create_project(&self, project: &Project) -> StateResult<()> {
        let key = project.table_key();
        let value = serde_json::to_vec(project).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut names = txn.open_table(PROJECT_NAMES).map_err(map_err!(Table))?;
            let taken = names
                .get(project.name.as_str())
                .map_err(map_err!(Read))?
                .is_some();
            if taken {
                // Dropping the uncommitted transaction discards it.
                return Err(StateError::Conflict(format!(
                    "project name already exists: {}",
                    project.name
                )));
            }
            names
                .insert(project.name.as_str(), key.as_str())
                .map_err(map_err!(Write))?;

            let mut table = txn.open_table(PROJECTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, name = %project.name, "project stored");
        Ok(())
    }

    fn get_project(&self, id: &ProjectId) -> StateResult<Option<Project>> {
        let key = id.to_string();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PROJECTS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let project: Project =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(project))
            }
            None => Ok(None),
        }
    }

    fn get_project_by_name(&self, name: &str) -> StateResult<Option<Project>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let names = txn.open_table(PROJECT_NAMES).map_err(map_err!(Table))?;
        let Some(id) = names.get(name).map_err(map_err!(Read))? else {
            return Ok(None);
        };
        let table = txn.open_table(PROJECTS).map_err(map_err!(Table))?;
        match table.get(id.value()).map_err(map_err!(Read))? {
            Some(guard) => {
                let project: Project =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(project))
            }
            None => Err(StateError::NotFound(format!(
                "name index points at missing project: {name}"
            ))),
        }
    }

    fn list_projects(&self) -> StateResult<Vec<Project>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PROJECTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let project: Project =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(project);
        }
        Ok(results)
    }

    // ── Deployments ────────────────────────────────────────────────

    fn create_deployment(&self, deployment: &Deployment) -> StateResult<()> {
        let key = deployment.table_key();
        let value = serde_json::to_vec(deployment).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, status = %deployment.status, "deployment stored");
        Ok(())
    }

    fn get_deployment(&self, id: &DeploymentId) -> StateResult<Option<Deployment>> {
        let key = id.to_string();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let deployment: Deployment =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(deployment))
            }
            None => Ok(None),
        }
    }

    fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
    ) -> StateResult<()> {
        let key = id.to_string();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let mut deployment: Deployment = match table.get(key.as_str()).map_err(map_err!(Read))?
            {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("deployment {key}"))),
            };
            deployment.status = status;
            deployment.updated_at = now_millis();
            let value = serde_json::to_vec(&deployment).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, %status, "deployment status updated");
        Ok(())
    }

    fn update_deployment(&self, deployment: &Deployment) -> StateResult<()> {
        let key = deployment.table_key();
        let value = serde_json::to_vec(deployment).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let exists = table.get(key.as_str()).map_err(map_err!(Read))?.is_some();
            if !exists {
                return Err(StateError::NotFound(format!("deployment {key}")));
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, status = %deployment.status, "deployment updated");
        Ok(())
    }

    fn list_deployments_for_project(
        &self,
        project_id: &ProjectId,
    ) -> StateResult<Vec<Deployment>> {
        let mut results = self.scan_deployments(|d| d.project_id == *project_id)?;
        results.sort_by_key(|d| std::cmp::Reverse(d.recency_key()));
        Ok(results)
    }

    fn get_active_deployment(&self, project_id: &ProjectId) -> StateResult<Option<Deployment>> {
        let running = self.scan_deployments(|d| {
            d.project_id == *project_id && d.status == DeploymentStatus::Running
        })?;
        Ok(running.into_iter().max_by_key(Deployment::recency_key))
    }
}
