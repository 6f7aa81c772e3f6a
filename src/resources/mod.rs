//! Managed entities and their lifecycle.
//!
//! Each resource holds the gateway it was configured with and exposes
//! `reconcile_create`, `reconcile_read`, `reconcile_update` and
//! `reconcile_delete`. Every call re-fetches remote state; nothing is cached
//! between calls.

pub mod project;
pub mod projects;
pub mod repository;

pub use project::ProjectResource;
pub use projects::ProjectsDataSource;
pub use repository::RepositoryResource;

use chrono::{SecondsFormat, Utc};

use crate::error::ProviderError;

/// Resource type of a project.
pub const PROJECT_RESOURCE: &str = "space_project";

/// Resource type of a repository.
pub const REPOSITORY_RESOURCE: &str = "space_repository";

/// Data source listing all projects.
pub const PROJECTS_DATA_SOURCE: &str = "space_projects";

/// Split a repository import id of the form `name,projectId`.
pub fn parse_import_id(raw: &str) -> Result<(String, String), ProviderError> {
    let parts: Vec<&str> = raw.split(',').collect();
    match parts.as_slice() {
        [name, project_id] if !name.is_empty() && !project_id.is_empty() => {
            Ok((name.to_string(), project_id.to_string()))
        }
        _ => Err(ProviderError::Configuration(format!(
            "expected import id in the form 'name,projectId', got '{}'",
            raw
        ))),
    }
}

/// Timestamp recorded as `last_updated`.
pub(crate) fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
