//! The deployment orchestrator.
//!
//! `create_deployment` is long-running (an image build plus a container
//! start) and holds no lock while it waits; concurrent deployments, even for
//! the same project, proceed independently.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use deployflow_pack::BuildContext;
use deployflow_runtime::{RuntimeGateway, DEFAULT_STOP_GRACE};
use deployflow_state::{
    now_millis, Deployment, DeploymentId, DeploymentStatus, ProjectId, RecordStore,
};

use crate::error::{DeployError, DeployResult};

/// Image tag used for a deployment's build.
pub fn image_tag_for(id: &DeploymentId) -> String {
    format!("deployflow-{id}")
}

/// Drives deployments through build and run, keeping the record store in
/// step with the container runtime.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    runtime: Arc<dyn RuntimeGateway>,
    stop_grace: Duration,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn RecordStore>, runtime: Arc<dyn RuntimeGateway>) -> Self {
        Self {
            store,
            runtime,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Override the grace period used when stopping containers.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// The record store this orchestrator writes to.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Build and run `source` as a new deployment of `project_id`.
    ///
    /// Returns the final `running` record on success. On a build or run
    /// failure the record is left `failed` and the runtime's error is
    /// returned. Nothing is retried.
    pub async fn create_deployment(
        &self,
        project_id: ProjectId,
        source: &str,
    ) -> DeployResult<Deployment> {
        if self.store.get_project(&project_id)?.is_none() {
            return Err(DeployError::ProjectNotFound(project_id));
        }

        let mut deployment = Deployment::building(project_id);
        self.store.create_deployment(&deployment)?;
        let id = deployment.id;
        info!(deployment = %id, project = %project_id, "deployment created");

        let context = match BuildContext::for_source(source).pack(deployment.created_at / 1000) {
            Ok(packed) => packed,
            Err(e) => {
                self.mark_failed(&id);
                return Err(DeployError::Package(e));
            }
        };
        debug!(deployment = %id, sha256 = %context.sha256, "build context ready");

        let image_tag = image_tag_for(&id);
        if let Err(e) = self.runtime.build_image(&image_tag, context.bytes).await {
            warn!(deployment = %id, error = %e, "build failed");
            self.mark_failed(&id);
            return Err(DeployError::Build(e));
        }

        let container = match self.runtime.run_container(&image_tag).await {
            Ok(container) => container,
            Err(e) => {
                warn!(deployment = %id, error = %e, "run failed");
                self.mark_failed(&id);
                return Err(DeployError::Run(e));
            }
        };

        deployment.status = DeploymentStatus::Running;
        deployment.container_id = container.id;
        deployment.port = container.host_port;
        deployment.image_tag = image_tag;
        deployment.updated_at = now_millis();

        if let Err(e) = self.store.update_deployment(&deployment) {
            // The container is live but the record still says `building`.
            error!(
                deployment = %id,
                container = %deployment.container_id,
                port = deployment.port,
                error = %e,
                "failed to record running deployment"
            );
            return Err(e.into());
        }

        info!(
            deployment = %id,
            port = deployment.port,
            image = %deployment.image_tag,
            "deployment running"
        );
        Ok(deployment)
    }

    /// Stop a running deployment's container and mark it `stopped`.
    pub async fn stop_deployment(&self, id: DeploymentId) -> DeployResult<Deployment> {
        let mut deployment = self
            .store
            .get_deployment(&id)?
            .ok_or(DeployError::DeploymentNotFound(id))?;

        if !deployment
            .status
            .can_transition_to(DeploymentStatus::Stopped)
        {
            return Err(DeployError::InvalidTransition {
                id,
                from: deployment.status,
                to: DeploymentStatus::Stopped,
            });
        }

        self.runtime
            .stop_container(&deployment.container_id, self.stop_grace)
            .await
            .map_err(DeployError::Stop)?;

        deployment.status = DeploymentStatus::Stopped;
        deployment.updated_at = now_millis();
        self.store.update_deployment(&deployment)?;

        info!(deployment = %id, "deployment stopped");
        Ok(deployment)
    }

    /// Best-effort `failed` write; never masks the caller's error.
    fn mark_failed(&self, id: &DeploymentId) {
        if let Err(e) = self
            .store
            .update_deployment_status(id, DeploymentStatus::Failed)
        {
            error!(deployment = %id, error = %e, "failed to mark deployment failed");
        }
    }
}
