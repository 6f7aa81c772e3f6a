//! The `space_project` resource.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ProviderError;
use crate::gateway::{Gateway, ProjectFields};
use crate::model::{ProjectState, RoleKind, SubjectKind, ROLE_LISTS};
use crate::projector;
use crate::reconcile::{apply_role_changes, guard_delete, plan_role_changes};
use crate::resources::timestamp_now;
use crate::schema::{Attribute, Diagnostic, Schema};

/// Projects and their role memberships.
pub struct ProjectResource {
    gateway: Arc<dyn Gateway>,
}

impl ProjectResource {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    pub fn schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Project name."),
            )
            .with_attribute(
                "key",
                Attribute::computed_string()
                    .with_description("Project key, derived from the name on creation."),
            )
            .with_attribute("last_updated", Attribute::computed_string())
            .with_attribute(
                "protected",
                Attribute::defaulted_bool(false)
                    .with_description("Refuse to delete the project while set."),
            )
            .with_attribute("archived", Attribute::computed_bool())
            .with_attribute("created_at", Attribute::computed_string())
            .with_attribute("member_teams", role_list("Teams with the member role."))
            .with_attribute("members", role_list("Users with the member role."))
            .with_attribute("admin_teams", role_list("Teams with the admin role."))
            .with_attribute("admins", role_list("Users with the admin role."))
    }

    /// Checks on the role lists beyond what the schema expresses.
    ///
    /// A repeated identity within one list is an error. An identity in both
    /// the member and admin list of the same kind is a warning: the roles are
    /// applied member first, so the admin role wins.
    pub fn validate_roles(config: &ProjectState) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for (role, subject) in ROLE_LISTS {
            let attribute = ProjectState::role_attribute(role, subject);
            let list = config.role_list(role, subject);
            for (i, identity) in list.iter().enumerate() {
                if list[..i].contains(identity) {
                    diagnostics.push(
                        Diagnostic::error(format!("Duplicate {} '{}'", subject, identity))
                            .with_detail(format!("'{}' appears more than once in {}", identity, attribute))
                            .with_attribute(attribute),
                    );
                }
            }
        }

        for subject in [SubjectKind::Team, SubjectKind::User] {
            let members = config.role_list(RoleKind::Member, subject);
            let admins = config.role_list(RoleKind::Admin, subject);
            for identity in members.iter().filter(|m| admins.contains(m)) {
                diagnostics.push(
                    Diagnostic::warning(format!("{} '{}' holds both roles", subject, identity))
                        .with_detail("The admin role is applied last and takes effect.")
                        .with_attribute(ProjectState::role_attribute(RoleKind::Member, subject)),
                );
            }
        }

        diagnostics
    }

    /// Check a project import id.
    pub fn parse_import_id(raw: &str) -> Result<String, ProviderError> {
        let id = raw.trim();
        if id.is_empty() || id.contains(',') {
            return Err(ProviderError::Configuration(format!(
                "expected a project id, got '{}'",
                raw
            )));
        }
        Ok(id.to_string())
    }

    pub async fn reconcile_create(&self, desired: &ProjectState) -> Result<ProjectState, ProviderError> {
        let remote = self
            .gateway
            .create_project(&desired.name)
            .await
            .map_err(|source| ProviderError::gateway("create project", desired.label(), source))?;
        info!(project_id = %remote.id, name = %remote.name, "project created");

        let empty = ProjectState::named(desired.name.clone());
        let deltas = plan_role_changes(&empty, desired);
        apply_role_changes(self.gateway.as_ref(), &remote.id, &deltas).await?;

        self.fetch(&remote.id, desired.protected, Some(timestamp_now()))
            .await
    }

    /// Refresh from the service, keeping the local-only fields of `current`.
    pub async fn reconcile_read(&self, current: &ProjectState) -> Result<ProjectState, ProviderError> {
        let id = require_id(current)?;
        self.fetch(id, current.protected, current.last_updated.clone())
            .await
    }

    pub async fn reconcile_update(
        &self,
        previous: &ProjectState,
        desired: &ProjectState,
    ) -> Result<ProjectState, ProviderError> {
        let id = require_id(previous)?;

        if previous.name != desired.name {
            self.gateway
                .update_project(id, &desired.name)
                .await
                .map_err(|source| {
                    ProviderError::gateway("rename project", format!("project {}", id), source)
                })?;
            info!(project_id = id, name = %desired.name, "project renamed");
        }

        let deltas = plan_role_changes(previous, desired);
        debug!(project_id = id, changed_lists = deltas.len(), "planned role changes");
        apply_role_changes(self.gateway.as_ref(), id, &deltas).await?;

        self.fetch(id, desired.protected, Some(timestamp_now()))
            .await
    }

    pub async fn reconcile_delete(&self, current: &ProjectState) -> Result<(), ProviderError> {
        let id = require_id(current)?;
        guard_delete("project", id, current.protected)?;
        self.gateway
            .delete_project(id)
            .await
            .map_err(|source| ProviderError::gateway("delete project", format!("project {}", id), source))?;
        info!(project_id = id, "project deleted");
        Ok(())
    }

    async fn fetch(
        &self,
        id: &str,
        protected: bool,
        last_updated: Option<String>,
    ) -> Result<ProjectState, ProviderError> {
        let remote = self
            .gateway
            .get_project(id, ProjectFields::WithRoles)
            .await
            .map_err(|source| ProviderError::gateway("read project", format!("project {}", id), source))?;
        Ok(projector::project_state(&remote, protected, last_updated))
    }
}

fn require_id(state: &ProjectState) -> Result<&str, ProviderError> {
    state
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::Configuration(format!("{} has no id in state", state.label())))
}

/// An unset role list means nobody holds the role.
fn role_list(description: &str) -> Attribute {
    Attribute::optional_string_list()
        .with_default(serde_json::Value::Array(Vec::new()))
        .with_description(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::RoleAction;
    use crate::schema::DiagnosticSeverity;
    use crate::testing::{remote_project, GatewayCall, RecordingGateway};

    fn s(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn role_calls(gateway: &RecordingGateway) -> Vec<(RoleAction, RoleKind, String)> {
        gateway
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::SetProjectRole { assignment, .. } => {
                    Some((assignment.action, assignment.role, assignment.subject_id))
                }
                _ => None,
            })
            .collect()
    }

    fn setup() -> (Arc<RecordingGateway>, ProjectResource) {
        let gateway = Arc::new(RecordingGateway::new());
        let resource = ProjectResource::new(gateway.clone());
        (gateway, resource)
    }

    #[tokio::test]
    async fn test_create_assigns_roles_and_reads_back() {
        let (gateway, resource) = setup();
        let mut desired = ProjectState::named("Platform Tools");
        desired.admins = s(&["alice"]);
        desired.member_teams = s(&["Core"]);
        desired.protected = true;

        let state = resource.reconcile_create(&desired).await.unwrap();
        assert!(state.id.is_some());
        assert_eq!(state.key.as_deref(), Some("PLATFORM-TOOLS"));
        assert_eq!(state.admins, s(&["alice"]));
        assert_eq!(state.member_teams, s(&["Core"]));
        assert!(state.protected);
        assert!(state.last_updated.is_some());

        assert!(role_calls(&gateway)
            .iter()
            .all(|(action, _, _)| *action == RoleAction::Add));
        assert!(matches!(gateway.calls().last(), Some(GatewayCall::GetProject { .. })));
    }

    #[tokio::test]
    async fn test_update_removes_stale_admin_then_adds() {
        let (gateway, resource) = setup();
        gateway.seed_project(remote_project("p1", "Infra"));

        let mut previous = ProjectState::named("Infra");
        previous.id = Some("p1".into());
        previous.admins = s(&["alice", "bob"]);
        let mut desired = previous.clone();
        desired.admins = s(&["alice"]);

        resource.reconcile_update(&previous, &desired).await.unwrap();
        assert_eq!(
            role_calls(&gateway),
            vec![
                (RoleAction::Remove, RoleKind::Admin, "bob".to_string()),
                (RoleAction::Add, RoleKind::Admin, "alice".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_update_converged_state_is_noop() {
        let (gateway, resource) = setup();
        gateway.seed_project(remote_project("p1", "Infra"));

        let mut state = ProjectState::named("Infra");
        state.id = Some("p1".into());
        state.admins = s(&["alice"]);
        state.members = s(&["carol"]);

        resource.reconcile_update(&state, &state).await.unwrap();
        resource.reconcile_update(&state, &state).await.unwrap();
        assert!(role_calls(&gateway).is_empty());
        assert!(!gateway
            .calls()
            .iter()
            .any(|c| matches!(c, GatewayCall::UpdateProject { .. })));
    }

    #[tokio::test]
    async fn test_rename_only_when_name_differs() {
        let (gateway, resource) = setup();
        gateway.seed_project(remote_project("p1", "Infra"));

        let mut previous = ProjectState::named("Infra");
        previous.id = Some("p1".into());
        let mut desired = previous.clone();
        desired.name = "Infrastructure".into();

        let state = resource.reconcile_update(&previous, &desired).await.unwrap();
        assert_eq!(state.name, "Infrastructure");
        assert_eq!(
            gateway.calls()[0],
            GatewayCall::UpdateProject {
                id: "p1".into(),
                name: "Infrastructure".into()
            }
        );
    }

    #[tokio::test]
    async fn test_delete_protected_never_calls_gateway() {
        let (gateway, resource) = setup();
        let mut state = ProjectState::named("Infra");
        state.id = Some("p1".into());
        state.protected = true;

        let err = resource.reconcile_delete(&state).await.unwrap_err();
        assert!(err.is_protected());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unprotected() {
        let (gateway, resource) = setup();
        gateway.seed_project(remote_project("p1", "Infra"));
        let mut state = ProjectState::named("Infra");
        state.id = Some("p1".into());

        resource.reconcile_delete(&state).await.unwrap();
        assert_eq!(gateway.calls(), vec![GatewayCall::DeleteProject { id: "p1".into() }]);
        assert!(gateway.project("p1").is_none());
    }

    #[tokio::test]
    async fn test_read_keeps_local_fields() {
        let (gateway, resource) = setup();
        gateway.seed_project(remote_project("p1", "Infra"));
        let mut current = ProjectState::named("Infra");
        current.id = Some("p1".into());
        current.protected = true;
        current.last_updated = Some("2024-01-01T00:00:00Z".into());

        let state = resource.reconcile_read(&current).await.unwrap();
        assert!(state.protected);
        assert_eq!(state.last_updated, current.last_updated);
    }

    #[tokio::test]
    async fn test_read_without_id_is_configuration_error() {
        let (_, resource) = setup();
        let err = resource
            .reconcile_read(&ProjectState::named("Infra"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_validate_roles() {
        let mut config = ProjectState::named("Infra");
        config.admins = s(&["alice", "alice"]);
        config.members = s(&["alice"]);

        let diagnostics = ProjectResource::validate_roles(&config);
        let errors: Vec<_> = diagnostics
            .iter()
            .filter(|d| d.severity == DiagnosticSeverity::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].attribute.as_deref(), Some("admins"));
        assert!(diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Warning
                && d.attribute.as_deref() == Some("members")));
    }

    #[test]
    fn test_parse_project_import_id() {
        assert_eq!(ProjectResource::parse_import_id("p1").unwrap(), "p1");
        assert!(ProjectResource::parse_import_id("").is_err());
        assert!(ProjectResource::parse_import_id("infra,p1").is_err());
    }
}
