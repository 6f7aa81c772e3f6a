//! The remote Space service, as seen by reconciliation.
//!
//! [`Gateway`] is the operation set reconciliation depends on. The records
//! below are the wire shapes it returns; [`crate::projector`] turns them into
//! the canonical model. [`http::SpaceClient`] is the production
//! implementation; tests use [`crate::testing::RecordingGateway`].

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::model::{RoleKind, SubjectKind};

/// Result alias for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Which fields of a project to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectFields {
    /// Identity, key, archived flag and creation time.
    Basic,
    /// Everything in `Basic` plus the four role lists.
    WithRoles,
}

impl ProjectFields {
    /// `$fields` selector sent with the request.
    pub fn selector(&self) -> &'static str {
        match self {
            Self::Basic => "id,name,key,archived,createdAt",
            Self::WithRoles => {
                "id,name,key,archived,createdAt,memberTeams(name),memberProfiles(username),adminTeams(name),adminProfiles(username)"
            }
        }
    }
}

/// Whether a role is being granted or revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleAction {
    /// Grant the role.
    Add,
    /// Revoke the role.
    Remove,
}

impl RoleAction {
    /// Verb used in operation names.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

/// One role change for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    /// Team or user.
    pub subject: SubjectKind,
    /// Team name or username.
    pub subject_id: String,
    /// Role being changed.
    pub role: RoleKind,
    /// Grant or revoke.
    pub action: RoleAction,
}

impl RoleAssignment {
    /// Operation name for errors and logs, e.g. `remove admin role`.
    pub fn operation(&self) -> String {
        format!("{} {} role", self.action.verb(), self.role)
    }
}

/// Key of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectKey {
    /// The key itself, e.g. `PLATFORM-TOOLS`.
    pub key: String,
}

/// A timestamp as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteTimestamp {
    /// ISO 8601 rendering.
    #[serde(default)]
    pub iso: Option<String>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRef {
    pub username: String,
}

/// A project as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProject {
    pub id: String,
    pub name: String,
    pub key: ProjectKey,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub created_at: Option<RemoteTimestamp>,
    #[serde(default)]
    pub member_teams: Vec<TeamRef>,
    #[serde(default)]
    pub member_profiles: Vec<ProfileRef>,
    #[serde(default)]
    pub admin_teams: Vec<TeamRef>,
    #[serde(default)]
    pub admin_profiles: Vec<ProfileRef>,
}

/// Branch reference of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BranchRef {
    /// Full ref, e.g. `refs/heads/main`.
    #[serde(default)]
    pub head: Option<String>,
    /// Short name as the service reports it.
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
}

impl BranchRef {
    /// Plain branch name, without the `refs/heads/` prefix.
    pub fn branch_name(&self) -> Option<&str> {
        self.head
            .as_deref()
            .map(|head| head.strip_prefix("refs/heads/").unwrap_or(head))
            .or(self.reference.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// A repository as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRepository {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_branch: Option<BranchRef>,
}

/// Options for repository creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepositoryOptions {
    pub description: String,
    pub default_branch: String,
    /// Create an initial commit.
    pub initialize: bool,
    /// Apply the service's default repository setup.
    pub default_setup: bool,
}

/// Approval requirement on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalSpec {
    #[serde(default)]
    pub approved_by: Vec<String>,
    #[serde(default)]
    pub min_approvals: u32,
}

/// Quality gate on the wire; jobs are ids only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityGateSpec {
    #[serde(default)]
    pub approvals: Vec<ApprovalSpec>,
    #[serde(default)]
    pub automation_jobs: Vec<String>,
}

/// One protected-branch rule on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedBranchSpec {
    #[serde(default)]
    pub pattern: Vec<String>,
    #[serde(default)]
    pub allow_create: Vec<String>,
    #[serde(default)]
    pub allow_push: Vec<String>,
    #[serde(default)]
    pub allow_delete: Vec<String>,
    #[serde(default)]
    pub allow_force_push: Vec<String>,
    #[serde(default)]
    pub quality_gate: QualityGateSpec,
}

/// The settings document replaced wholesale on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedBranchSettings {
    pub version: String,
    pub protected_branches: Vec<ProtectedBranchSpec>,
}

/// An automation job in a project's catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationJob {
    pub id: String,
    pub name: String,
}

/// Operations against the Space API.
///
/// Every call is awaited before the next one is issued. Implementations do
/// not retry.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// List all projects visible to the token.
    async fn list_projects(&self) -> GatewayResult<Vec<RemoteProject>>;

    /// Create a project; the key is derived from the name.
    async fn create_project(&self, name: &str) -> GatewayResult<RemoteProject>;

    /// Fetch a project by id.
    async fn get_project(&self, id: &str, fields: ProjectFields) -> GatewayResult<RemoteProject>;

    /// Rename a project.
    async fn update_project(&self, id: &str, name: &str) -> GatewayResult<RemoteProject>;

    /// Delete a project.
    async fn delete_project(&self, id: &str) -> GatewayResult<()>;

    /// Grant or revoke one role for one team or user.
    async fn set_project_role(
        &self,
        project_id: &str,
        assignment: &RoleAssignment,
    ) -> GatewayResult<()>;

    /// Create a repository inside a project.
    async fn create_repository(
        &self,
        project_id: &str,
        name: &str,
        options: &CreateRepositoryOptions,
    ) -> GatewayResult<RemoteRepository>;

    /// Fetch a repository by name.
    async fn get_repository(&self, project_id: &str, name: &str) -> GatewayResult<RemoteRepository>;

    /// Replace a repository's description.
    async fn update_repository_description(
        &self,
        project_id: &str,
        name: &str,
        description: &str,
    ) -> GatewayResult<()>;

    /// Switch a repository's default branch.
    async fn update_repository_default_branch(
        &self,
        project_id: &str,
        name: &str,
        branch: &str,
    ) -> GatewayResult<()>;

    /// Delete a repository.
    async fn delete_repository(&self, project_id: &str, name: &str) -> GatewayResult<()>;

    /// Read the protected-branch rules of a repository.
    async fn get_protected_branch_settings(
        &self,
        project_id: &str,
        name: &str,
    ) -> GatewayResult<Vec<ProtectedBranchSpec>>;

    /// Replace all protected-branch rules of a repository.
    async fn put_protected_branch_settings(
        &self,
        project_id: &str,
        name: &str,
        settings: &ProtectedBranchSettings,
    ) -> GatewayResult<()>;

    /// Find the id of a job by name within a repository branch.
    async fn resolve_automation_job_id(
        &self,
        project_id: &str,
        repository: &str,
        branch: &str,
        job_name: &str,
    ) -> GatewayResult<String>;

    /// Look up the name of a job by id.
    async fn get_automation_job_name(&self, project_id: &str, job_id: &str)
        -> GatewayResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_project_decodes_roles() {
        let project: RemoteProject = serde_json::from_value(json!({
            "id": "p1",
            "name": "Platform Tools",
            "key": {"key": "PLATFORM-TOOLS"},
            "createdAt": {"iso": "2024-03-01T10:00:00Z", "timestamp": 1709287200000i64},
            "adminProfiles": [{"username": "alice"}],
            "memberTeams": [{"name": "Core"}]
        }))
        .unwrap();
        assert_eq!(project.key.key, "PLATFORM-TOOLS");
        assert_eq!(project.admin_profiles[0].username, "alice");
        assert_eq!(project.member_teams[0].name, "Core");
        assert!(project.member_profiles.is_empty());
        assert!(!project.archived);
    }

    #[test]
    fn test_branch_name() {
        let head = BranchRef {
            head: Some("refs/heads/develop".into()),
            reference: None,
        };
        assert_eq!(head.branch_name(), Some("develop"));

        let short = BranchRef {
            head: None,
            reference: Some("main".into()),
        };
        assert_eq!(short.branch_name(), Some("main"));
        assert_eq!(BranchRef::default().branch_name(), None);
    }

    #[test]
    fn test_settings_serialize_camel_case() {
        let settings = ProtectedBranchSettings {
            version: "1.0".into(),
            protected_branches: vec![ProtectedBranchSpec {
                pattern: vec!["main".into()],
                allow_force_push: vec!["@Admins".into()],
                quality_gate: QualityGateSpec {
                    approvals: vec![ApprovalSpec {
                        approved_by: vec!["alice".into()],
                        min_approvals: 1,
                    }],
                    automation_jobs: vec!["j-1".into()],
                },
                ..Default::default()
            }],
        };
        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["version"], "1.0");
        let rule = &value["protectedBranches"][0];
        assert_eq!(rule["allowForcePush"], json!(["@Admins"]));
        assert_eq!(rule["qualityGate"]["approvals"][0]["minApprovals"], 1);
        assert_eq!(rule["qualityGate"]["automationJobs"], json!(["j-1"]));
    }

    #[test]
    fn test_role_assignment_operation() {
        let assignment = RoleAssignment {
            subject: SubjectKind::User,
            subject_id: "bob".into(),
            role: RoleKind::Admin,
            action: RoleAction::Remove,
        };
        assert_eq!(assignment.operation(), "remove admin role");
    }

    #[test]
    fn test_fields_selector() {
        assert!(!ProjectFields::Basic.selector().contains("adminProfiles"));
        assert!(ProjectFields::WithRoles.selector().contains("adminProfiles(username)"));
    }
}
