//! Testing utilities for the Space provider.
//!
//! [`ProviderTester`] drives a [`ProviderService`] through the same calls the
//! host makes, without a host. [`RecordingGateway`] is an in-memory
//! [`Gateway`] that records every call in order and can be told to fail.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use space_provider::testing::{ProviderTester, RecordingGateway};
//! use space_provider::SpaceProvider;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_project() {
//!     let gateway = Arc::new(RecordingGateway::new());
//!     let tester = ProviderTester::new(SpaceProvider::with_gateway(gateway.clone()));
//!
//!     let state = tester
//!         .lifecycle_create("space_project", json!({"name": "Infra", "admins": ["alice"]}))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(state["admins"], json!(["alice"]));
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{GatewayError, ProviderError};
use crate::gateway::{
    AutomationJob, BranchRef, CreateRepositoryOptions, Gateway, GatewayResult, ProfileRef,
    ProjectFields, ProjectKey, ProtectedBranchSettings, ProtectedBranchSpec, RemoteProject,
    RemoteRepository, RoleAction, RoleAssignment, TeamRef,
};
use crate::model::{derive_project_key, RoleKind, SubjectKind};
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// A test harness around a provider.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Configure the provider, failing on error diagnostics.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Validate a resource configuration, failing on error diagnostics.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider.plan(resource_type, None, proposed_state).await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), proposed_state)
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null)
            .await
    }

    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Plan, create, then read. Returns the state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;
        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;
        self.read(resource_type, created_state).await
    }

    /// Plan, update, then read. Returns the state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;
        self.read(resource_type, updated_state).await
    }

    /// Plan the deletion, then delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let _ = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await
    }

    /// Create, update, then delete. Returns the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created_state = self.lifecycle_create(resource_type, initial_config).await?;
        let updated_state = self
            .lifecycle_update(resource_type, created_state, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated_state.clone())
            .await?;
        Ok(updated_state)
    }
}

/// A harness call that failed with diagnostics or an error.
#[derive(Debug)]
pub enum TestError {
    Diagnostics(Vec<Diagnostic>),
    Provider(ProviderError),
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics
        .into_iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// # Panics
///
/// Panics if the plan does not change `path`.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// # Panics
///
/// Panics if no error diagnostic contains `substring` in its summary.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error) && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

// =========================================================================
// Recording Gateway
// =========================================================================

/// One call received by a [`RecordingGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    ListProjects,
    CreateProject { name: String },
    GetProject { id: String },
    UpdateProject { id: String, name: String },
    DeleteProject { id: String },
    SetProjectRole { project_id: String, assignment: RoleAssignment },
    CreateRepository { project_id: String, name: String, options: CreateRepositoryOptions },
    GetRepository { project_id: String, name: String },
    UpdateRepositoryDescription { project_id: String, name: String, description: String },
    UpdateRepositoryDefaultBranch { project_id: String, name: String, branch: String },
    DeleteRepository { project_id: String, name: String },
    GetProtectedBranchSettings { project_id: String, name: String },
    PutProtectedBranchSettings { project_id: String, name: String, settings: ProtectedBranchSettings },
    ResolveAutomationJobId { project_id: String, repository: String, branch: String, job_name: String },
    GetAutomationJobName { project_id: String, job_id: String },
}

impl GatewayCall {
    /// Name of the [`Gateway`] method, used to target failures.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::ListProjects => "list_projects",
            Self::CreateProject { .. } => "create_project",
            Self::GetProject { .. } => "get_project",
            Self::UpdateProject { .. } => "update_project",
            Self::DeleteProject { .. } => "delete_project",
            Self::SetProjectRole { .. } => "set_project_role",
            Self::CreateRepository { .. } => "create_repository",
            Self::GetRepository { .. } => "get_repository",
            Self::UpdateRepositoryDescription { .. } => "update_repository_description",
            Self::UpdateRepositoryDefaultBranch { .. } => "update_repository_default_branch",
            Self::DeleteRepository { .. } => "delete_repository",
            Self::GetProtectedBranchSettings { .. } => "get_protected_branch_settings",
            Self::PutProtectedBranchSettings { .. } => "put_protected_branch_settings",
            Self::ResolveAutomationJobId { .. } => "resolve_automation_job_id",
            Self::GetAutomationJobName { .. } => "get_automation_job_name",
        }
    }

    /// The identity a call is about: role subject, job, repository or project.
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::ListProjects => None,
            Self::CreateProject { name } => Some(name),
            Self::GetProject { id } | Self::UpdateProject { id, .. } | Self::DeleteProject { id } => {
                Some(id)
            }
            Self::SetProjectRole { assignment, .. } => Some(&assignment.subject_id),
            Self::CreateRepository { name, .. }
            | Self::GetRepository { name, .. }
            | Self::UpdateRepositoryDescription { name, .. }
            | Self::UpdateRepositoryDefaultBranch { name, .. }
            | Self::DeleteRepository { name, .. }
            | Self::GetProtectedBranchSettings { name, .. }
            | Self::PutProtectedBranchSettings { name, .. } => Some(name),
            Self::ResolveAutomationJobId { job_name, .. } => Some(job_name),
            Self::GetAutomationJobName { job_id, .. } => Some(job_id),
        }
    }
}

type SettingsRewrite = Box<dyn Fn(&mut Vec<ProtectedBranchSpec>) + Send + Sync>;
type RepoKey = (String, String);

#[derive(Default)]
struct Store {
    projects: BTreeMap<String, RemoteProject>,
    repositories: BTreeMap<RepoKey, RemoteRepository>,
    settings: BTreeMap<RepoKey, Vec<ProtectedBranchSpec>>,
    jobs: BTreeMap<String, Vec<AutomationJob>>,
    calls: Vec<GatewayCall>,
    failures: Vec<(&'static str, Option<String>)>,
    rewrite: Option<SettingsRewrite>,
    next_id: u64,
}

impl Store {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// In-memory [`Gateway`] that records calls.
///
/// Role changes, renames, repository edits and settings writes are applied
/// to the stored records, so a read after a write sees the write. Role
/// changes against a project that was never stored are only recorded.
#[derive(Default)]
pub struct RecordingGateway {
    store: Mutex<Store>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `call` and fail it if a matching failure was registered.
    fn record(&self, call: GatewayCall) -> GatewayResult<MutexGuard<'_, Store>> {
        let mut store = self.lock();
        let operation = call.operation();
        let injected = store.failures.iter().any(|(op, identity)| {
            *op == operation
                && identity
                    .as_deref()
                    .map_or(true, |id| call.identity() == Some(id))
        });
        let identity = call.identity().map(str::to_string);
        store.calls.push(call);
        if injected {
            return Err(GatewayError::status(
                500,
                operation,
                format!("injected failure for {}", identity.unwrap_or_default()),
            ));
        }
        Ok(store)
    }

    /// Store a project as if it existed remotely.
    pub fn seed_project(&self, project: RemoteProject) {
        self.lock().projects.insert(project.id.clone(), project);
    }

    /// Add a job to a project's automation catalogue.
    pub fn seed_job(&self, project_id: &str, id: &str, name: &str) {
        self.lock()
            .jobs
            .entry(project_id.to_string())
            .or_default()
            .push(AutomationJob {
                id: id.to_string(),
                name: name.to_string(),
            });
    }

    /// Fail every call to `operation`.
    pub fn fail_on(&self, operation: &'static str) {
        self.lock().failures.push((operation, None));
    }

    /// Fail calls to `operation` about `identity` only.
    pub fn fail_on_identity(&self, operation: &'static str, identity: &str) {
        self.lock()
            .failures
            .push((operation, Some(identity.to_string())));
    }

    /// Mutate submitted settings before they are stored, like a service that
    /// silently adjusts what it accepts.
    pub fn rewrite_settings_on_write<F>(&self, rewrite: F)
    where
        F: Fn(&mut Vec<ProtectedBranchSpec>) + Send + Sync + 'static,
    {
        self.lock().rewrite = Some(Box::new(rewrite));
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// The stored project, if any.
    pub fn project(&self, id: &str) -> Option<RemoteProject> {
        self.lock().projects.get(id).cloned()
    }

    /// The stored rules of a repository.
    pub fn settings(&self, project_id: &str, name: &str) -> Vec<ProtectedBranchSpec> {
        self.lock()
            .settings
            .get(&repo_key(project_id, name))
            .cloned()
            .unwrap_or_default()
    }
}

/// A bare remote project with a derived key.
pub fn remote_project(id: &str, name: &str) -> RemoteProject {
    RemoteProject {
        id: id.to_string(),
        name: name.to_string(),
        key: ProjectKey {
            key: derive_project_key(name),
        },
        archived: false,
        created_at: None,
        member_teams: Vec::new(),
        member_profiles: Vec::new(),
        admin_teams: Vec::new(),
        admin_profiles: Vec::new(),
    }
}

fn repo_key(project_id: &str, name: &str) -> RepoKey {
    (project_id.to_string(), name.to_string())
}

fn not_found(what: impl Into<String>) -> GatewayError {
    GatewayError::NotFound(what.into())
}

fn toggle<T: PartialEq>(list: &mut Vec<T>, item: T, action: RoleAction) {
    match action {
        RoleAction::Add if !list.contains(&item) => list.push(item),
        RoleAction::Remove => list.retain(|existing| *existing != item),
        _ => {}
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn list_projects(&self) -> GatewayResult<Vec<RemoteProject>> {
        let store = self.record(GatewayCall::ListProjects)?;
        Ok(store.projects.values().cloned().collect())
    }

    async fn create_project(&self, name: &str) -> GatewayResult<RemoteProject> {
        let mut store = self.record(GatewayCall::CreateProject {
            name: name.to_string(),
        })?;
        let id = store.next_id("project");
        let project = remote_project(&id, name);
        store.projects.insert(id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: &str, fields: ProjectFields) -> GatewayResult<RemoteProject> {
        let store = self.record(GatewayCall::GetProject { id: id.to_string() })?;
        let mut project = store
            .projects
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(format!("project {}", id)))?;
        if fields == ProjectFields::Basic {
            project.member_teams.clear();
            project.member_profiles.clear();
            project.admin_teams.clear();
            project.admin_profiles.clear();
        }
        Ok(project)
    }

    async fn update_project(&self, id: &str, name: &str) -> GatewayResult<RemoteProject> {
        let mut store = self.record(GatewayCall::UpdateProject {
            id: id.to_string(),
            name: name.to_string(),
        })?;
        let project = store
            .projects
            .get_mut(id)
            .ok_or_else(|| not_found(format!("project {}", id)))?;
        project.name = name.to_string();
        Ok(project.clone())
    }

    async fn delete_project(&self, id: &str) -> GatewayResult<()> {
        let mut store = self.record(GatewayCall::DeleteProject { id: id.to_string() })?;
        store
            .projects
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(format!("project {}", id)))
    }

    async fn set_project_role(
        &self,
        project_id: &str,
        assignment: &RoleAssignment,
    ) -> GatewayResult<()> {
        let mut store = self.record(GatewayCall::SetProjectRole {
            project_id: project_id.to_string(),
            assignment: assignment.clone(),
        })?;
        let Some(project) = store.projects.get_mut(project_id) else {
            return Ok(());
        };
        let id = assignment.subject_id.clone();
        match (assignment.role, assignment.subject) {
            (RoleKind::Member, SubjectKind::Team) => {
                toggle(&mut project.member_teams, TeamRef { name: id }, assignment.action)
            }
            (RoleKind::Member, SubjectKind::User) => toggle(
                &mut project.member_profiles,
                ProfileRef { username: id },
                assignment.action,
            ),
            (RoleKind::Admin, SubjectKind::Team) => {
                toggle(&mut project.admin_teams, TeamRef { name: id }, assignment.action)
            }
            (RoleKind::Admin, SubjectKind::User) => toggle(
                &mut project.admin_profiles,
                ProfileRef { username: id },
                assignment.action,
            ),
        }
        Ok(())
    }

    async fn create_repository(
        &self,
        project_id: &str,
        name: &str,
        options: &CreateRepositoryOptions,
    ) -> GatewayResult<RemoteRepository> {
        let mut store = self.record(GatewayCall::CreateRepository {
            project_id: project_id.to_string(),
            name: name.to_string(),
            options: options.clone(),
        })?;
        let key = repo_key(project_id, name);
        if store.repositories.contains_key(&key) {
            return Err(GatewayError::status(
                409,
                "create_repository",
                format!("repository {} already exists", name),
            ));
        }
        let repository = RemoteRepository {
            id: store.next_id("repo"),
            name: name.to_string(),
            description: Some(options.description.clone()),
            default_branch: Some(BranchRef {
                head: Some(format!("refs/heads/{}", options.default_branch)),
                reference: Some(options.default_branch.clone()),
            }),
        };
        store.repositories.insert(key, repository.clone());
        Ok(repository)
    }

    async fn get_repository(&self, project_id: &str, name: &str) -> GatewayResult<RemoteRepository> {
        let store = self.record(GatewayCall::GetRepository {
            project_id: project_id.to_string(),
            name: name.to_string(),
        })?;
        store
            .repositories
            .get(&repo_key(project_id, name))
            .cloned()
            .ok_or_else(|| not_found(format!("repository {}/{}", project_id, name)))
    }

    async fn update_repository_description(
        &self,
        project_id: &str,
        name: &str,
        description: &str,
    ) -> GatewayResult<()> {
        let mut store = self.record(GatewayCall::UpdateRepositoryDescription {
            project_id: project_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        })?;
        let repository = store
            .repositories
            .get_mut(&repo_key(project_id, name))
            .ok_or_else(|| not_found(format!("repository {}/{}", project_id, name)))?;
        repository.description = Some(description.to_string());
        Ok(())
    }

    async fn update_repository_default_branch(
        &self,
        project_id: &str,
        name: &str,
        branch: &str,
    ) -> GatewayResult<()> {
        let mut store = self.record(GatewayCall::UpdateRepositoryDefaultBranch {
            project_id: project_id.to_string(),
            name: name.to_string(),
            branch: branch.to_string(),
        })?;
        let repository = store
            .repositories
            .get_mut(&repo_key(project_id, name))
            .ok_or_else(|| not_found(format!("repository {}/{}", project_id, name)))?;
        repository.default_branch = Some(BranchRef {
            head: Some(format!("refs/heads/{}", branch)),
            reference: Some(branch.to_string()),
        });
        Ok(())
    }

    async fn delete_repository(&self, project_id: &str, name: &str) -> GatewayResult<()> {
        let mut store = self.record(GatewayCall::DeleteRepository {
            project_id: project_id.to_string(),
            name: name.to_string(),
        })?;
        let key = repo_key(project_id, name);
        store.settings.remove(&key);
        store
            .repositories
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| not_found(format!("repository {}/{}", project_id, name)))
    }

    async fn get_protected_branch_settings(
        &self,
        project_id: &str,
        name: &str,
    ) -> GatewayResult<Vec<ProtectedBranchSpec>> {
        let store = self.record(GatewayCall::GetProtectedBranchSettings {
            project_id: project_id.to_string(),
            name: name.to_string(),
        })?;
        Ok(store
            .settings
            .get(&repo_key(project_id, name))
            .cloned()
            .unwrap_or_default())
    }

    async fn put_protected_branch_settings(
        &self,
        project_id: &str,
        name: &str,
        settings: &ProtectedBranchSettings,
    ) -> GatewayResult<()> {
        let mut store = self.record(GatewayCall::PutProtectedBranchSettings {
            project_id: project_id.to_string(),
            name: name.to_string(),
            settings: settings.clone(),
        })?;
        let mut rules = settings.protected_branches.clone();
        if let Some(rewrite) = &store.rewrite {
            rewrite(&mut rules);
        }
        store.settings.insert(repo_key(project_id, name), rules);
        Ok(())
    }

    async fn resolve_automation_job_id(
        &self,
        project_id: &str,
        repository: &str,
        branch: &str,
        job_name: &str,
    ) -> GatewayResult<String> {
        let store = self.record(GatewayCall::ResolveAutomationJobId {
            project_id: project_id.to_string(),
            repository: repository.to_string(),
            branch: branch.to_string(),
            job_name: job_name.to_string(),
        })?;
        store
            .jobs
            .get(project_id)
            .and_then(|jobs| jobs.iter().find(|job| job.name == job_name))
            .map(|job| job.id.clone())
            .ok_or_else(|| not_found(format!("automation job '{}'", job_name)))
    }

    async fn get_automation_job_name(
        &self,
        project_id: &str,
        job_id: &str,
    ) -> GatewayResult<String> {
        let store = self.record(GatewayCall::GetAutomationJobName {
            project_id: project_id.to_string(),
            job_id: job_id.to_string(),
        })?;
        store
            .jobs
            .get(project_id)
            .and_then(|jobs| jobs.iter().find(|job| job.id == job_id))
            .map(|job| job.name.clone())
            .ok_or_else(|| not_found(format!("automation job {}", job_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SpaceProvider;
    use crate::resources::{PROJECTS_DATA_SOURCE, PROJECT_RESOURCE, REPOSITORY_RESOURCE};
    use serde_json::json;
    use std::sync::Arc;

    fn tester() -> (Arc<RecordingGateway>, ProviderTester<SpaceProvider>) {
        let gateway = Arc::new(RecordingGateway::new());
        let tester = ProviderTester::new(SpaceProvider::with_gateway(gateway.clone()));
        (gateway, tester)
    }

    fn role_calls(gateway: &RecordingGateway) -> Vec<(RoleAction, String)> {
        gateway
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::SetProjectRole { assignment, .. } => {
                    Some((assignment.action, assignment.subject_id))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_tester_metadata() {
        let (_, tester) = tester();
        let resources = tester.resource_types();
        assert!(resources.contains(&PROJECT_RESOURCE.to_string()));
        assert!(resources.contains(&REPOSITORY_RESOURCE.to_string()));
        assert_eq!(tester.data_source_types(), vec![PROJECTS_DATA_SOURCE.to_string()]);
        assert!(tester.schema().provider.block.attributes.contains_key("token"));
    }

    #[tokio::test]
    async fn test_project_crud() {
        let (gateway, tester) = tester();
        let final_state = tester
            .lifecycle_crud(
                PROJECT_RESOURCE,
                json!({"name": "Infra", "admins": ["alice", "bob"], "member_teams": ["Core"]}),
                json!({"name": "Infra", "admins": ["alice"], "member_teams": ["Core"]}),
            )
            .await
            .unwrap();

        assert_eq!(final_state["admins"], json!(["alice"]));
        assert_eq!(final_state["key"], "INFRA");

        let calls = gateway.calls();
        let update_roles: Vec<_> = role_calls(&gateway).into_iter().skip(3).collect();
        assert_eq!(
            update_roles,
            vec![
                (RoleAction::Remove, "bob".to_string()),
                (RoleAction::Add, "alice".to_string()),
            ]
        );
        assert!(matches!(calls.last(), Some(GatewayCall::DeleteProject { .. })));
    }

    #[tokio::test]
    async fn test_converged_project_plans_nothing() {
        let (gateway, tester) = tester();
        let config = json!({"name": "Infra", "members": ["carol"]});
        let state = tester
            .lifecycle_create(PROJECT_RESOURCE, config.clone())
            .await
            .unwrap();

        let plan = tester
            .plan_update(PROJECT_RESOURCE, state.clone(), config)
            .await
            .unwrap();
        assert_plan_no_changes(&plan);

        gateway.clear_calls();
        tester
            .update(PROJECT_RESOURCE, state.clone(), plan.planned_state.clone())
            .await
            .unwrap();
        tester
            .update(PROJECT_RESOURCE, state, plan.planned_state)
            .await
            .unwrap();
        assert!(role_calls(&gateway).is_empty());
    }

    #[tokio::test]
    async fn test_repository_create_with_lint_rule() {
        let (gateway, tester) = tester();
        gateway.seed_project(remote_project("p1", "Infra"));
        gateway.seed_job("p1", "j-lint", "lint");

        let state = tester
            .lifecycle_create(
                REPOSITORY_RESOURCE,
                json!({
                    "name": "infra",
                    "project_id": "p1",
                    "protected_branches": [{
                        "pattern": ["main"],
                        "quality_gate": {
                            "approvals": [{"min_approvals": 1, "approved_by": ["alice"]}],
                            "automation_jobs": ["lint"]
                        }
                    }]
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            state["protected_branches"][0]["quality_gate"]["automation_jobs"][0],
            json!({"id": "j-lint", "name": "lint"})
        );
        let stored = gateway.settings("p1", "infra");
        assert_eq!(stored[0].allow_force_push, vec!["@Admins"]);
        assert_eq!(stored[0].quality_gate.automation_jobs, vec!["j-lint"]);

        let submitted = gateway.calls().into_iter().find_map(|c| match c {
            GatewayCall::PutProtectedBranchSettings { settings, .. } => Some(settings),
            _ => None,
        });
        assert_eq!(submitted.map(|s| s.version), Some("1.0".to_string()));
    }

    #[tokio::test]
    async fn test_repository_move_plans_replacement() {
        let (gateway, tester) = tester();
        gateway.seed_project(remote_project("p1", "Infra"));
        let state = tester
            .lifecycle_create(REPOSITORY_RESOURCE, json!({"name": "infra", "project_id": "p1"}))
            .await
            .unwrap();

        let plan = tester
            .plan_update(
                REPOSITORY_RESOURCE,
                state,
                json!({"name": "infra", "project_id": "p2"}),
            )
            .await
            .unwrap();
        assert_plan_replaces(&plan);
        assert_plan_changes_attribute(&plan, "project_id");
    }

    #[tokio::test]
    async fn test_protected_repository_survives_delete() {
        let (gateway, tester) = tester();
        gateway.seed_project(remote_project("p1", "Infra"));
        let state = tester
            .lifecycle_create(
                REPOSITORY_RESOURCE,
                json!({"name": "infra", "project_id": "p1", "protected": true}),
            )
            .await
            .unwrap();
        gateway.clear_calls();

        let err = tester.delete(REPOSITORY_RESOURCE, state).await.unwrap_err();
        assert!(err.is_protected());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_import_repository() {
        let (gateway, tester) = tester();
        gateway.seed_project(remote_project("p1", "Infra"));
        tester
            .lifecycle_create(REPOSITORY_RESOURCE, json!({"name": "infra", "project_id": "p1"}))
            .await
            .unwrap();

        let imported = tester
            .import_resource(REPOSITORY_RESOURCE, "infra,p1")
            .await
            .unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].state["project_id"], "p1");

        let err = tester
            .import_resource(REPOSITORY_RESOURCE, "infra")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_import_project_by_id() {
        let (gateway, tester) = tester();
        gateway.seed_project(remote_project("p1", "Infra"));
        let imported = tester.import_resource(PROJECT_RESOURCE, "p1").await.unwrap();
        assert_eq!(imported[0].state["name"], "Infra");
        assert_eq!(imported[0].state["protected"], false);
    }

    #[tokio::test]
    async fn test_projects_data_source() {
        let (gateway, tester) = tester();
        gateway.seed_project(remote_project("p1", "Infra"));
        let value = tester
            .read_data_source(PROJECTS_DATA_SOURCE, json!({}))
            .await
            .unwrap();
        assert_eq!(value["projects"][0]["key"], "INFRA");
    }

    #[tokio::test]
    async fn test_validate_resource_config_reports_duplicates() {
        let (_, tester) = tester();
        let err = tester
            .validate_resource_config(
                PROJECT_RESOURCE,
                json!({"name": "Infra", "member_teams": ["Core", "Core"]}),
            )
            .await
            .unwrap_err();
        match err {
            TestError::Diagnostics(diagnostics) => {
                assert_error_contains(&diagnostics, "Duplicate team");
            }
            other => panic!("expected diagnostics, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let gateway = RecordingGateway::new();
        gateway.fail_on("delete_project");
        let err = gateway.delete_project("p1").await.unwrap_err();
        assert!(err.to_string().contains("injected failure for p1"));
        assert_eq!(gateway.calls(), vec![GatewayCall::DeleteProject { id: "p1".into() }]);
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("Missing Space API host").with_attribute("host"),
            Diagnostic::error("Missing Space API token").with_detail("Set SPACE_TOKEN"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("Missing Space API host"));
        assert!(display.contains("(at host)"));
        assert!(display.contains("Set SPACE_TOKEN"));
    }
}
