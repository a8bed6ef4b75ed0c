//! deployflow-runtime — the container runtime gateway.
//!
//! [`RuntimeGateway`] is the capability the orchestrator drives: build an
//! image from a packed context, run it with one published port, and stop it.
//! [`DockerGateway`] implements it against the Docker Engine API.
//!
//! Every call is cancellable by dropping its future. Dropping only abandons
//! the wait: a build or container start already accepted by the daemon may
//! still complete.

pub mod docker;
pub mod error;
pub mod gateway;

pub use docker::DockerGateway;
pub use error::{RuntimeError, RuntimeResult};
pub use gateway::{GatewayFuture, RunningContainer, RuntimeGateway, DEFAULT_STOP_GRACE};
