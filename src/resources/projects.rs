//! The `space_projects` data source.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::gateway::Gateway;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

/// One entry of the project listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub key: String,
}

/// All projects visible to the configured token.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectsList {
    pub projects: Vec<ProjectSummary>,
}

pub struct ProjectsDataSource {
    gateway: Arc<dyn Gateway>,
}

impl ProjectsDataSource {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    pub fn schema() -> Schema {
        Schema::v0().with_attribute(
            "projects",
            Attribute::new(
                AttributeType::list(AttributeType::object([
                    ("id", AttributeType::String),
                    ("name", AttributeType::String),
                    ("key", AttributeType::String),
                ])),
                AttributeFlags::computed(),
            ),
        )
    }

    pub async fn read(&self) -> Result<ProjectsList, ProviderError> {
        let projects = self
            .gateway
            .list_projects()
            .await
            .map_err(|source| ProviderError::gateway("list projects", "all projects", source))?;
        Ok(ProjectsList {
            projects: projects
                .into_iter()
                .map(|p| ProjectSummary {
                    id: p.id,
                    name: p.name,
                    key: p.key.key,
                })
                .collect(),
        })
    }
}
