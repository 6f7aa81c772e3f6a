//! [`SpaceProvider`]: the [`ProviderService`] implementation.
//!
//! The gateway is built once by `configure` and handed to each resource as it
//! is used. Tests inject a fake through [`SpaceProvider::with_gateway`].

use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::gateway::http::SpaceClient;
use crate::gateway::Gateway;
use crate::model::{derive_project_key, rules_equivalent, ProjectState, ProtectedBranchRule};
use crate::resources::{
    ProjectResource, ProjectsDataSource, RepositoryResource, PROJECTS_DATA_SOURCE,
    PROJECT_RESOURCE, REPOSITORY_RESOURCE,
};
use crate::schema::{has_errors, Diagnostic, ProviderSchema, Schema};
use crate::service::ProviderService;
use crate::types::{diff_attributes, ImportedResource, PlanResult};
use crate::validation::validate;

/// Provider for JetBrains Space projects and repositories.
pub struct SpaceProvider {
    gateway: RwLock<Option<Arc<dyn Gateway>>>,
}

impl SpaceProvider {
    /// An unconfigured provider; `configure` must run before any lifecycle call.
    pub fn new() -> Self {
        Self {
            gateway: RwLock::new(None),
        }
    }

    /// A provider already wired to `gateway`.
    pub fn with_gateway(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway: RwLock::new(Some(gateway)),
        }
    }

    /// Whether a gateway is available.
    pub fn is_configured(&self) -> bool {
        self.gateway
            .read()
            .map(|g| g.is_some())
            .unwrap_or_else(|poisoned| poisoned.into_inner().is_some())
    }

    fn gateway(&self) -> Result<Arc<dyn Gateway>, ProviderError> {
        let guard = self
            .gateway
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone().ok_or(ProviderError::NotConfigured)
    }

    fn set_gateway(&self, gateway: Option<Arc<dyn Gateway>>) {
        let mut guard = self
            .gateway
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = gateway;
    }

    fn projects(&self) -> Result<ProjectResource, ProviderError> {
        Ok(ProjectResource::new(self.gateway()?))
    }

    fn repositories(&self) -> Result<RepositoryResource, ProviderError> {
        Ok(RepositoryResource::new(self.gateway()?))
    }
}

impl Default for SpaceProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn resource_schema(resource_type: &str) -> Result<Schema, ProviderError> {
    match resource_type {
        PROJECT_RESOURCE => Ok(ProjectResource::schema()),
        REPOSITORY_RESOURCE => Ok(RepositoryResource::schema()),
        other => Err(ProviderError::UnknownResource(other.to_string())),
    }
}

fn from_state<T: DeserializeOwned>(value: Value) -> Result<T, ProviderError> {
    Ok(serde_json::from_value(value)?)
}

fn to_state<T: Serialize>(state: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(state)?)
}

/// Fill planned values that only the provider knows.
///
/// Computed attributes come from prior state. A new project gets its derived
/// key. Recorded protected-branch rules are kept when the configuration
/// describes the same rules, so job ids resolved earlier are not planned away.
fn fill_planned(
    resource_type: &str,
    schema: &Schema,
    prior: Option<&Value>,
    planned: &mut Value,
) -> Result<(), ProviderError> {
    let Some(planned_obj) = planned.as_object_mut() else {
        return Err(ProviderError::Configuration(
            "planned state must be an object".to_string(),
        ));
    };

    if let Some(prior_obj) = prior.and_then(Value::as_object) {
        for name in schema.computed_only_attributes() {
            if let Some(value) = prior_obj.get(name) {
                planned_obj.insert(name.to_string(), value.clone());
            }
        }
    }

    if resource_type == PROJECT_RESOURCE && prior.is_none() {
        if let Some(name) = planned_obj.get("name").and_then(Value::as_str) {
            let key = derive_project_key(name);
            planned_obj.insert("key".to_string(), Value::String(key));
        }
    }

    if resource_type == REPOSITORY_RESOURCE {
        let unset = planned_obj
            .get("protected_branches")
            .map_or(true, Value::is_null);
        if unset {
            planned_obj.insert("protected_branches".to_string(), Value::Array(Vec::new()));
        }

        let recorded = prior.and_then(|p| p.get("protected_branches")).cloned();
        let desired = planned_obj.get("protected_branches").cloned();
        if let (Some(recorded), Some(desired)) = (recorded, desired) {
            let recorded: Vec<ProtectedBranchRule> = from_state(recorded)?;
            let desired: Vec<ProtectedBranchRule> = from_state(desired)?;
            if !recorded.is_empty() && rules_equivalent(&recorded, &desired) {
                planned_obj.insert("protected_branches".to_string(), to_state(&recorded)?);
            }
        }
    }

    Ok(())
}

#[async_trait::async_trait]
impl ProviderService for SpaceProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(ProviderConfig::schema())
            .with_resource(PROJECT_RESOURCE, ProjectResource::schema())
            .with_resource(REPOSITORY_RESOURCE, RepositoryResource::schema())
            .with_data_source(PROJECTS_DATA_SOURCE, ProjectsDataSource::schema())
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&ProviderConfig::schema(), &config))
    }

    #[instrument(skip(self, config))]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&ProviderConfig::schema(), &config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }

        let resolved = match ProviderConfig::resolve(&config) {
            Ok(resolved) => resolved,
            Err(mut errors) => {
                diagnostics.append(&mut errors);
                return Ok(diagnostics);
            }
        };

        match SpaceClient::new(&resolved) {
            Ok(client) => {
                info!(host = %resolved.host, timeout = ?resolved.timeout, "provider configured");
                self.set_gateway(Some(Arc::new(client)));
            }
            Err(err) => {
                warn!(error = %err, "could not build Space client");
                diagnostics.push(
                    Diagnostic::error("Could not build Space API client")
                        .with_detail(err.to_string())
                        .with_attribute("host"),
                );
            }
        }
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.set_gateway(None);
        debug!("provider stopped");
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = resource_schema(resource_type)?;
        let mut diagnostics = validate(&schema, &config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }
        match resource_type {
            PROJECT_RESOURCE => {
                let project: ProjectState = from_state(config)?;
                diagnostics.extend(ProjectResource::validate_roles(&project));
            }
            REPOSITORY_RESOURCE => {
                diagnostics.extend(RepositoryResource::validate_approvals(&config));
            }
            _ => {}
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, prior_state, proposed_state))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = resource_schema(resource_type)?;
        let computed: Vec<&str> = schema.computed_only_attributes().collect();

        if proposed_state.is_null() {
            let prior = prior_state.unwrap_or(Value::Null);
            let changes = diff_attributes(&prior, &Value::Null, &computed);
            return Ok(PlanResult::with_changes(Value::Null, changes, false));
        }

        let mut planned = proposed_state;
        schema.apply_defaults(&mut planned);
        fill_planned(resource_type, &schema, prior_state.as_ref(), &mut planned)?;

        let prior = prior_state.unwrap_or_else(|| Value::Object(Map::new()));
        let changes = diff_attributes(&prior, &planned, &computed);
        let requires_replace = !prior.as_object().map_or(true, Map::is_empty)
            && changes
                .iter()
                .any(|change| schema.force_new_attributes().any(|name| name == change.path));

        debug!(
            changes = changes.len(),
            requires_replace, "plan computed"
        );
        if changes.is_empty() {
            Ok(PlanResult::no_change(planned))
        } else {
            Ok(PlanResult::with_changes(planned, changes, requires_replace))
        }
    }

    #[instrument(skip(self, planned_state))]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        match resource_type {
            PROJECT_RESOURCE => {
                let desired = from_state(planned_state)?;
                to_state(&self.projects()?.reconcile_create(&desired).await?)
            }
            REPOSITORY_RESOURCE => {
                let desired = from_state(planned_state)?;
                to_state(&self.repositories()?.reconcile_create(&desired).await?)
            }
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    #[instrument(skip(self, current_state))]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        match resource_type {
            PROJECT_RESOURCE => {
                let current = from_state(current_state)?;
                to_state(&self.projects()?.reconcile_read(&current).await?)
            }
            REPOSITORY_RESOURCE => {
                let current = from_state(current_state)?;
                to_state(&self.repositories()?.reconcile_read(&current).await?)
            }
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    #[instrument(skip(self, prior_state, planned_state))]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        match resource_type {
            PROJECT_RESOURCE => {
                let previous = from_state(prior_state)?;
                let desired = from_state(planned_state)?;
                to_state(
                    &self
                        .projects()?
                        .reconcile_update(&previous, &desired)
                        .await?,
                )
            }
            REPOSITORY_RESOURCE => {
                let previous = from_state(prior_state)?;
                let desired = from_state(planned_state)?;
                to_state(
                    &self
                        .repositories()?
                        .reconcile_update(&previous, &desired)
                        .await?,
                )
            }
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    #[instrument(skip(self, current_state))]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        match resource_type {
            PROJECT_RESOURCE => {
                let current = from_state(current_state)?;
                self.projects()?.reconcile_delete(&current).await
            }
            REPOSITORY_RESOURCE => {
                let current = from_state(current_state)?;
                self.repositories()?.reconcile_delete(&current).await
            }
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let state = match resource_type {
            PROJECT_RESOURCE => {
                let mut stub = ProjectState::named("");
                stub.id = Some(ProjectResource::parse_import_id(id)?);
                to_state(&self.projects()?.reconcile_read(&stub).await?)?
            }
            REPOSITORY_RESOURCE => to_state(&self.repositories()?.reconcile_import(id).await?)?,
            other => return Err(ProviderError::UnknownResource(other.to_string())),
        };
        info!(resource_type, id, "resource imported");
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    #[instrument(skip(self, config))]
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let _ = config;
        match data_source_type {
            PROJECTS_DATA_SOURCE => {
                let list = ProjectsDataSource::new(self.gateway()?).read().await?;
                to_state(&list)
            }
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }
}
