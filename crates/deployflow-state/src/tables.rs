//! redb table definitions for the DeployFlow record store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types), except the name index which maps a name straight to an id.

use redb::TableDefinition;

/// Projects keyed by `{project_id}`.
pub const PROJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("projects");

/// Unique name index: `{project_name}` → `{project_id}`.
pub const PROJECT_NAMES: TableDefinition<&str, &str> = TableDefinition::new("project_names");

/// Deployments keyed by `{deployment_id}`.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");
