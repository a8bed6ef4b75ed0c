//! DeployFlow orchestration — the deployment state machine.
//!
//! A deployment moves `building → running` when both the image build and the
//! container start succeed, and `building → failed` as soon as either fails.
//! The record is persisted before any work starts, so a crash mid-build still
//! leaves a queryable `building` row behind.
//!
//! # Components
//!
//! - **`orchestrator`** — `create_deployment` and `stop_deployment`
//! - **`error`** — the `DeployError` taxonomy

pub mod error;
pub mod orchestrator;

pub use error::{DeployError, DeployResult};
pub use orchestrator::{image_tag_for, Orchestrator};
