//! Docker Engine implementation of the runtime gateway.

use std::collections::HashMap;
use std::time::Duration;

use bollard::Docker;
use bollard::errors::Error as DockerError;
use bollard::models::{ContainerCreateBody, HostConfig, PortBinding, PortMap};
use bollard::query_parameters::{
    BuildImageOptionsBuilder, CreateContainerOptions, InspectContainerOptions,
    StartContainerOptions, StopContainerOptionsBuilder,
};
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::{debug, info, trace, warn};

use deployflow_pack::{APP_PORT, MANIFEST_FILE};

use crate::error::{RuntimeError, RuntimeResult};
use crate::gateway::{GatewayFuture, RunningContainer, RuntimeGateway};

/// Host interface the application port is published on.
const PUBLISH_HOST_IP: &str = "0.0.0.0";

/// Runtime gateway backed by a Docker daemon.
#[derive(Clone)]
pub struct DockerGateway {
    docker: Docker,
}

impl DockerGateway {
    /// Connect using the local defaults (`DOCKER_HOST`, or the platform socket).
    pub fn connect() -> RuntimeResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Wrap an existing client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Check that the daemon answers.
    pub async fn ping(&self) -> RuntimeResult<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Connect(e.to_string()))
    }

    async fn build(&self, tag: &str, context: Vec<u8>) -> RuntimeResult<()> {
        let options = BuildImageOptionsBuilder::default()
            .dockerfile(MANIFEST_FILE)
            .t(tag)
            .rm(true)
            .build();

        info!(%tag, context_bytes = context.len(), "building image");
        let mut progress =
            self.docker
                .build_image(options, None, Some(bollard::body_full(Bytes::from(context))));

        // The build only completes once its progress stream is consumed, so
        // keep draining after the first error.
        let mut failure: Option<String> = None;
        while let Some(item) = progress.next().await {
            match item {
                Ok(info) => {
                    if let Some(line) = info.stream {
                        trace!(%tag, line = line.trim_end(), "build output");
                    }
                    if let Some(err) = info.error {
                        failure.get_or_insert(err);
                    }
                }
                Err(e) => {
                    failure.get_or_insert(e.to_string());
                }
            }
        }

        match failure {
            Some(reason) => {
                warn!(%tag, %reason, "image build failed");
                Err(RuntimeError::Build(reason))
            }
            None => {
                info!(%tag, "image built");
                Ok(())
            }
        }
    }

    async fn run(&self, image_tag: &str) -> RuntimeResult<RunningContainer> {
        let key = port_key(APP_PORT);
        let binding = PortBinding {
            host_ip: Some(PUBLISH_HOST_IP.to_string()),
            // Port 0 asks the daemon for an ephemeral host port.
            host_port: Some("0".to_string()),
        };
        let config = ContainerCreateBody {
            image: Some(image_tag.to_string()),
            exposed_ports: Some(HashMap::from([(key.clone(), HashMap::new())])),
            host_config: Some(HostConfig {
                port_bindings: Some(HashMap::from([(key.clone(), Some(vec![binding]))])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let id = self
            .docker
            .create_container(None::<CreateContainerOptions>, config)
            .await
            .map_err(|e| RuntimeError::Run(format!("failed to create container: {e}")))?
            .id;
        debug!(container = %short_id(&id), %image_tag, "container created");

        self.docker
            .start_container(&id, None::<StartContainerOptions>)
            .await
            .map_err(|e| RuntimeError::Run(format!("failed to start container: {e}")))?;

        let inspect = self
            .docker
            .inspect_container(&id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| RuntimeError::Run(format!("failed to inspect container: {e}")))?;

        let ports = inspect.network_settings.and_then(|n| n.ports);
        let host_port = published_host_port(ports.as_ref(), &key).ok_or_else(|| {
            RuntimeError::Run(format!(
                "container {} started but {key} has no host port",
                short_id(&id)
            ))
        })?;

        info!(container = %short_id(&id), host_port, "container running");
        Ok(RunningContainer { id, host_port })
    }

    async fn stop(&self, container_id: &str, grace: Duration) -> RuntimeResult<()> {
        let grace_secs = i32::try_from(grace.as_secs()).unwrap_or(i32::MAX);
        let options = StopContainerOptionsBuilder::default().t(grace_secs).build();

        match self.docker.stop_container(container_id, Some(options)).await {
            Ok(()) => {
                info!(container = %short_id(container_id), "container stopped");
                Ok(())
            }
            Err(DockerError::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                debug!(container = %short_id(container_id), "container already stopped");
                Ok(())
            }
            Err(e) => Err(RuntimeError::Stop(e.to_string())),
        }
    }
}

impl RuntimeGateway for DockerGateway {
    fn build_image<'a>(&'a self, tag: &'a str, context: Vec<u8>) -> GatewayFuture<'a, ()> {
        Box::pin(self.build(tag, context))
    }

    fn run_container<'a>(&'a self, image_tag: &'a str) -> GatewayFuture<'a, RunningContainer> {
        Box::pin(self.run(image_tag))
    }

    fn stop_container<'a>(
        &'a self,
        container_id: &'a str,
        grace: Duration,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(self.stop(container_id, grace))
    }
}

/// Docker's key for a TCP container port, e.g. `8000/tcp`.
fn port_key(port: u16) -> String {
    format!("{port}/tcp")
}

/// First usable host port published for `key`.
fn published_host_port(ports: Option<&PortMap>, key: &str) -> Option<u16> {
    ports?
        .get(key)?
        .as_ref()?
        .iter()
        .filter_map(|b| b.host_port.as_deref()?.parse::<u16>().ok())
        .find(|port| *port != 0)
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
