//! The `space_repository` resource.

use std::sync::Arc;

use serde_json::Value;

use tracing::{debug, info};

use crate::compare::changed_value;
use crate::error::ProviderError;
use crate::gateway::{CreateRepositoryOptions, Gateway};
use crate::model::{rules_equivalent, RepositoryState, DEFAULT_BRANCH};
use crate::projector;
use crate::reconcile::{apply_protected_branches, guard_delete, read_protected_branches, BranchScope};
use crate::resources::{parse_import_id, timestamp_now};
use crate::schema::{
    Attribute, AttributeFlags, AttributeType, Block, Diagnostic, NestedBlock, Schema,
};

/// Repositories and their protected-branch rules.
pub struct RepositoryResource {
    gateway: Arc<dyn Gateway>,
}

impl RepositoryResource {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    pub fn schema() -> Schema {
        let approvals = Block::new()
            .with_attribute(
                "min_approvals",
                Attribute::new(AttributeType::Int64, AttributeFlags::required()),
            )
            .with_attribute("approved_by", Attribute::optional_string_list());

        let automation_job = Block::new()
            .with_attribute("id", Attribute::optional_string())
            .with_attribute("name", Attribute::optional_string());

        let quality_gate = Block::new()
            .with_block("approvals", NestedBlock::list(approvals))
            .with_block("automation_jobs", NestedBlock::list(automation_job));

        let rule = Block::new()
            .with_attribute(
                "pattern",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::required(),
                )
                .with_description("Branch name globs the rule applies to."),
            )
            .with_block("quality_gate", NestedBlock::single(quality_gate));

        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Repository name, unique within the project."),
            )
            .with_attribute(
                "project_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Owning project."),
            )
            .with_attribute("last_updated", Attribute::computed_string())
            .with_attribute("description", Attribute::defaulted_string(""))
            .with_attribute("default_branch", Attribute::defaulted_string(DEFAULT_BRANCH))
            .with_attribute(
                "protected",
                Attribute::defaulted_bool(false)
                    .with_description("Refuse to delete the repository while set."),
            )
            .with_block("protected_branches", NestedBlock::list(rule))
    }

    /// Checks on approval counts beyond what the schema expresses.
    ///
    /// `min_approvals` is an Int64 in the schema but must not be negative.
    pub fn validate_approvals(config: &Value) -> Vec<Diagnostic> {
        let rules = config
            .get("protected_branches")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut diagnostics = Vec::new();
        for (i, rule) in rules.iter().enumerate() {
            let approvals = rule
                .pointer("/quality_gate/approvals")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for (j, approval) in approvals.iter().enumerate() {
                let min = approval.get("min_approvals").and_then(Value::as_i64);
                if let Some(min) = min.filter(|min| *min < 0) {
                    diagnostics.push(
                        Diagnostic::error("Negative approval count")
                            .with_detail(format!("min_approvals must be zero or more, got {}", min))
                            .with_attribute(format!(
                                "protected_branches.{}.quality_gate.approvals.{}.min_approvals",
                                i, j
                            )),
                    );
                }
            }
        }
        diagnostics
    }

    pub async fn reconcile_create(
        &self,
        desired: &RepositoryState,
    ) -> Result<RepositoryState, ProviderError> {
        let options = CreateRepositoryOptions {
            description: desired.description.clone(),
            default_branch: desired.default_branch.clone(),
            initialize: true,
            default_setup: true,
        };
        let remote = self
            .gateway
            .create_repository(&desired.project_id, &desired.name, &options)
            .await
            .map_err(|source| ProviderError::gateway("create repository", desired.label(), source))?;
        info!(project_id = %desired.project_id, repository = %remote.name, "repository created");

        let rules = if desired.protected_branches.is_empty() {
            Vec::new()
        } else {
            apply_protected_branches(
                self.gateway.as_ref(),
                scope(desired),
                &desired.protected_branches,
            )
            .await?
        };

        Ok(projector::repository_state(
            &remote,
            &desired.project_id,
            desired.protected,
            rules,
            Some(timestamp_now()),
        ))
    }

    /// Refresh from the service, keeping the local-only fields of `current`.
    pub async fn reconcile_read(
        &self,
        current: &RepositoryState,
    ) -> Result<RepositoryState, ProviderError> {
        self.fetch(current, current.protected, current.last_updated.clone())
            .await
    }

    pub async fn reconcile_update(
        &self,
        previous: &RepositoryState,
        desired: &RepositoryState,
    ) -> Result<RepositoryState, ProviderError> {
        if previous.name != desired.name || previous.project_id != desired.project_id {
            return Err(ProviderError::Configuration(format!(
                "{} cannot be moved or renamed in place; it must be replaced",
                previous.label()
            )));
        }
        let (project_id, name) = (desired.project_id.as_str(), desired.name.as_str());

        if let Some(description) = changed_value(&previous.description, &desired.description) {
            self.gateway
                .update_repository_description(project_id, name, description)
                .await
                .map_err(|source| {
                    ProviderError::gateway("update description", desired.label(), source)
                })?;
            debug!(project_id, repository = name, "description updated");
        }

        if let Some(branch) = changed_value(&previous.default_branch, &desired.default_branch) {
            self.gateway
                .update_repository_default_branch(project_id, name, branch)
                .await
                .map_err(|source| {
                    ProviderError::gateway("update default branch", desired.label(), source)
                })?;
            debug!(project_id, repository = name, branch = %branch, "default branch updated");
        }

        let rules = if rules_equivalent(&previous.protected_branches, &desired.protected_branches) {
            read_protected_branches(self.gateway.as_ref(), project_id, name).await?
        } else {
            apply_protected_branches(
                self.gateway.as_ref(),
                scope(desired),
                &desired.protected_branches,
            )
            .await?
        };

        let remote = self
            .gateway
            .get_repository(project_id, name)
            .await
            .map_err(|source| ProviderError::gateway("read repository", desired.label(), source))?;
        info!(project_id, repository = name, "repository updated");

        Ok(projector::repository_state(
            &remote,
            project_id,
            desired.protected,
            rules,
            Some(timestamp_now()),
        ))
    }

    pub async fn reconcile_delete(&self, current: &RepositoryState) -> Result<(), ProviderError> {
        guard_delete(
            "repository",
            &format!("{}/{}", current.project_id, current.name),
            current.protected,
        )?;
        self.gateway
            .delete_repository(&current.project_id, &current.name)
            .await
            .map_err(|source| ProviderError::gateway("delete repository", current.label(), source))?;
        info!(project_id = %current.project_id, repository = %current.name, "repository deleted");
        Ok(())
    }

    /// Read an existing repository named by an import id `name,projectId`.
    pub async fn reconcile_import(&self, raw: &str) -> Result<RepositoryState, ProviderError> {
        let (name, project_id) = parse_import_id(raw)?;
        let stub = RepositoryState::new(name, project_id);
        self.fetch(&stub, false, None).await
    }

    async fn fetch(
        &self,
        current: &RepositoryState,
        protected: bool,
        last_updated: Option<String>,
    ) -> Result<RepositoryState, ProviderError> {
        let remote = self
            .gateway
            .get_repository(&current.project_id, &current.name)
            .await
            .map_err(|source| ProviderError::gateway("read repository", current.label(), source))?;
        let rules =
            read_protected_branches(self.gateway.as_ref(), &current.project_id, &current.name)
                .await?;
        Ok(projector::repository_state(
            &remote,
            &current.project_id,
            protected,
            rules,
            last_updated,
        ))
    }
}

fn scope(desired: &RepositoryState) -> BranchScope<'_> {
    BranchScope {
        project_id: &desired.project_id,
        repository: &desired.name,
        branch: &desired.default_branch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ApprovalSpec;
    use crate::model::{ApprovalPolicy, AutomationJobRef, ProtectedBranchRule, QualityGate};
    use crate::testing::{remote_project, GatewayCall, RecordingGateway};
    use serde_json::json;

    fn setup() -> (Arc<RecordingGateway>, RepositoryResource) {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.seed_project(remote_project("p1", "Infra"));
        let resource = RepositoryResource::new(gateway.clone());
        (gateway, resource)
    }

    fn lint_rule() -> ProtectedBranchRule {
        ProtectedBranchRule {
            pattern: vec!["main".into()],
            quality_gate: QualityGate {
                approvals: vec![ApprovalPolicy {
                    min_approvals: 1,
                    approved_by: vec!["alice".into()],
                }],
                automation_jobs: vec![AutomationJobRef::named("lint")],
            },
        }
    }

    #[tokio::test]
    async fn test_create_resolves_lint_and_submits_version() {
        let (gateway, resource) = setup();
        gateway.seed_job("p1", "j-lint", "lint");

        let mut desired = RepositoryState::new("infra", "p1");
        desired.protected_branches = vec![lint_rule()];

        let state = resource.reconcile_create(&desired).await.unwrap();
        assert_eq!(state.id.as_deref().map(str::is_empty), Some(false));
        assert_eq!(
            state.protected_branches[0].quality_gate.automation_jobs,
            vec![AutomationJobRef::resolved("j-lint", "lint")]
        );

        let calls = gateway.calls();
        let resolve = calls
            .iter()
            .position(|c| {
                matches!(c, GatewayCall::ResolveAutomationJobId { job_name, branch, .. }
                    if job_name == "lint" && branch == "main")
            })
            .expect("lint resolved");
        let (put, settings) = calls
            .iter()
            .enumerate()
            .find_map(|(i, c)| match c {
                GatewayCall::PutProtectedBranchSettings { settings, .. } => Some((i, settings)),
                _ => None,
            })
            .expect("settings submitted");
        assert!(resolve < put);
        assert_eq!(settings.version, "1.0");
        assert_eq!(
            settings.protected_branches[0].quality_gate.approvals,
            vec![ApprovalSpec {
                approved_by: vec!["alice".into()],
                min_approvals: 1
            }]
        );
        assert_eq!(settings.protected_branches[0].quality_gate.automation_jobs, vec!["j-lint"]);
    }

    #[tokio::test]
    async fn test_create_without_rules_skips_settings() {
        let (gateway, resource) = setup();
        let state = resource
            .reconcile_create(&RepositoryState::new("infra", "p1"))
            .await
            .unwrap();
        assert!(state.protected_branches.is_empty());
        assert_eq!(state.default_branch, "main");
        assert_eq!(gateway.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_update_only_changed_fields() {
        let (gateway, resource) = setup();
        let previous = resource
            .reconcile_create(&RepositoryState::new("infra", "p1"))
            .await
            .unwrap();
        gateway.clear_calls();

        let mut desired = previous.clone();
        desired.description = "Terraform modules".into();

        let state = resource.reconcile_update(&previous, &desired).await.unwrap();
        assert_eq!(state.description, "Terraform modules");

        let calls = gateway.calls();
        assert!(calls
            .iter()
            .any(|c| matches!(c, GatewayCall::UpdateRepositoryDescription { .. })));
        assert!(!calls
            .iter()
            .any(|c| matches!(c, GatewayCall::UpdateRepositoryDefaultBranch { .. })));
        assert!(!calls
            .iter()
            .any(|c| matches!(c, GatewayCall::PutProtectedBranchSettings { .. })));
    }

    #[tokio::test]
    async fn test_update_rewrites_changed_rules() {
        let (gateway, resource) = setup();
        gateway.seed_job("p1", "j-lint", "lint");
        let previous = resource
            .reconcile_create(&RepositoryState::new("infra", "p1"))
            .await
            .unwrap();

        let mut desired = previous.clone();
        desired.protected_branches = vec![lint_rule()];
        let state = resource.reconcile_update(&previous, &desired).await.unwrap();
        assert_eq!(state.protected_branches.len(), 1);

        // Recorded rules carry resolved ids; the named desired rule still matches them.
        gateway.clear_calls();
        resource.reconcile_update(&state, &desired).await.unwrap();
        assert!(!gateway
            .calls()
            .iter()
            .any(|c| matches!(c, GatewayCall::PutProtectedBranchSettings { .. })));
    }

    #[tokio::test]
    async fn test_update_rejects_rename() {
        let (_, resource) = setup();
        let previous = RepositoryState::new("infra", "p1");
        let desired = RepositoryState::new("infra-2", "p1");
        let err = resource.reconcile_update(&previous, &desired).await.unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_delete_protected_never_calls_gateway() {
        let (gateway, resource) = setup();
        let mut state = RepositoryState::new("infra", "p1");
        state.protected = true;

        let err = resource.reconcile_delete(&state).await.unwrap_err();
        assert!(err.is_protected());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_import_reads_existing_repository() {
        let (gateway, resource) = setup();
        resource
            .reconcile_create(&RepositoryState::new("infra", "p1"))
            .await
            .unwrap();

        let state = resource.reconcile_import("infra,p1").await.unwrap();
        assert_eq!(state.name, "infra");
        assert_eq!(state.project_id, "p1");
        assert!(!state.protected);
        assert!(gateway
            .calls()
            .contains(&GatewayCall::GetRepository {
                project_id: "p1".into(),
                name: "infra".into()
            }));
    }

    #[tokio::test]
    async fn test_import_rejects_malformed_id() {
        let (gateway, resource) = setup();
        for raw in ["infra", "infra,"] {
            let err = resource.reconcile_import(raw).await.unwrap_err();
            assert!(matches!(err, ProviderError::Configuration(_)));
        }
        assert!(gateway.calls().is_empty());
    }

    #[test]
    fn test_validate_rejects_negative_approvals() {
        let config = json!({
            "name": "infra",
            "project_id": "p1",
            "protected_branches": [
                {"pattern": ["main"], "quality_gate": {"approvals": [{"min_approvals": 1}]}},
                {"pattern": ["release/*"], "quality_gate": {"approvals": [{"min_approvals": -1}]}}
            ]
        });
        let diagnostics = RepositoryResource::validate_approvals(&config);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error());
        assert_eq!(
            diagnostics[0].attribute.as_deref(),
            Some("protected_branches.1.quality_gate.approvals.0.min_approvals")
        );
        assert!(RepositoryResource::validate_approvals(&json!({"name": "infra"})).is_empty());
    }

    #[test]
    fn test_schema_forces_replacement_on_identity() {
        let schema = RepositoryResource::schema();
        let mut force_new: Vec<_> = schema.force_new_attributes().collect();
        force_new.sort();
        assert_eq!(force_new, vec!["name", "project_id"]);

        let diagnostics = crate::validation::validate(
            &schema,
            &json!({
                "name": "infra",
                "project_id": "p1",
                "protected_branches": [{
                    "pattern": ["main"],
                    "quality_gate": {
                        "approvals": [{"min_approvals": 1, "approved_by": ["alice"]}],
                        "automation_jobs": [{"name": "lint"}]
                    }
                }]
            }),
        );
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }
}
