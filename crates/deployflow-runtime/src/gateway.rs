//! The runtime gateway capability.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::RuntimeResult;

/// Grace period granted to a container before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Boxed future returned by gateway operations.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = RuntimeResult<T>> + Send + 'a>>;

/// A started container and the host port its application port is published on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningContainer {
    pub id: String,
    pub host_port: u16,
}

/// Image build and container lifecycle against a container runtime.
///
/// Shared as `Arc<dyn RuntimeGateway>` by every request task.
pub trait RuntimeGateway: Send + Sync {
    /// Build `context` (a tar stream) into an image tagged `tag`.
    ///
    /// Resolves only once the runtime has finished the build and its
    /// progress output has been fully consumed.
    fn build_image<'a>(&'a self, tag: &'a str, context: Vec<u8>) -> GatewayFuture<'a, ()>;

    /// Create and start a container from `image_tag`, publishing the
    /// application port on an ephemeral host port.
    ///
    /// Fails if no host port is reported once the container has started.
    fn run_container<'a>(&'a self, image_tag: &'a str) -> GatewayFuture<'a, RunningContainer>;

    /// Stop a container, killing it after `grace`. Stopping an already
    /// stopped container succeeds.
    fn stop_container<'a>(&'a self, container_id: &'a str, grace: Duration)
    -> GatewayFuture<'a, ()>;
}
