//! deployflow-state — the durable record store for DeployFlow.
//!
//! Backed by [redb](https://docs.rs/redb), persists the two entities the
//! platform knows about: projects and their deployments.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Project names are indexed in a separate table so that name uniqueness is
//! enforced inside the same write transaction that inserts the project.
//!
//! Consumers depend on the [`RecordStore`] trait rather than the concrete
//! [`StateStore`], so the orchestrator and router can be exercised against
//! fakes.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{RecordStore, StateStore};
pub use types::*;
