//! Canonical entities shared by the reconciler, the projector and the host state.
//!
//! These are the shapes persisted as resource state. Wire records returned by
//! the gateway live in [`crate::gateway`] and are mapped onto these by
//! [`crate::projector`].

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Schema version tag sent with every protected-branch settings payload.
pub const SETTINGS_VERSION: &str = "1.0";

/// Group granted push, delete and force-push on protected branches.
pub const ADMINS_GROUP: &str = "@Admins";

/// Group granted branch creation on protected branches.
pub const MEMBERS_GROUP: &str = "@Members";

/// Default branch used when the configuration leaves it unset.
pub const DEFAULT_BRANCH: &str = "main";

/// A project role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    /// Regular project member.
    Member,
    /// Project administrator.
    Admin,
}

impl RoleKind {
    /// Role name as understood by the remote service.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of identity holds a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    /// A team, addressed by name.
    Team,
    /// A user profile, addressed by username.
    User,
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Team => "team",
            Self::User => "user",
        })
    }
}

/// The four role lists of a project, in the order they are reconciled.
pub const ROLE_LISTS: [(RoleKind, SubjectKind); 4] = [
    (RoleKind::Member, SubjectKind::Team),
    (RoleKind::Member, SubjectKind::User),
    (RoleKind::Admin, SubjectKind::Team),
    (RoleKind::Admin, SubjectKind::User),
];

/// State of a `space_project` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    /// Remote identifier, set once created.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Project key, derived from the name on creation.
    #[serde(default)]
    pub key: Option<String>,
    /// Time of the last successful create or update.
    #[serde(default)]
    pub last_updated: Option<String>,
    /// Guards the project against deletion.
    #[serde(default, deserialize_with = "null_as_default")]
    pub protected: bool,
    /// Archived flag as reported by the service.
    #[serde(default, deserialize_with = "null_as_default")]
    pub archived: bool,
    /// Creation timestamp as reported by the service.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Teams holding the member role.
    #[serde(default, deserialize_with = "null_as_default")]
    pub member_teams: Vec<String>,
    /// Users holding the member role.
    #[serde(default, deserialize_with = "null_as_default")]
    pub members: Vec<String>,
    /// Teams holding the admin role.
    #[serde(default, deserialize_with = "null_as_default")]
    pub admin_teams: Vec<String>,
    /// Users holding the admin role.
    #[serde(default, deserialize_with = "null_as_default")]
    pub admins: Vec<String>,
}

impl ProjectState {
    /// A desired project with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            key: None,
            last_updated: None,
            protected: false,
            archived: false,
            created_at: None,
            member_teams: Vec::new(),
            members: Vec::new(),
            admin_teams: Vec::new(),
            admins: Vec::new(),
        }
    }

    /// The identities holding `role` for the given subject kind.
    pub fn role_list(&self, role: RoleKind, subject: SubjectKind) -> &[String] {
        match (role, subject) {
            (RoleKind::Member, SubjectKind::Team) => &self.member_teams,
            (RoleKind::Member, SubjectKind::User) => &self.members,
            (RoleKind::Admin, SubjectKind::Team) => &self.admin_teams,
            (RoleKind::Admin, SubjectKind::User) => &self.admins,
        }
    }

    /// Attribute name of a role list.
    pub fn role_attribute(role: RoleKind, subject: SubjectKind) -> &'static str {
        match (role, subject) {
            (RoleKind::Member, SubjectKind::Team) => "member_teams",
            (RoleKind::Member, SubjectKind::User) => "members",
            (RoleKind::Admin, SubjectKind::Team) => "admin_teams",
            (RoleKind::Admin, SubjectKind::User) => "admins",
        }
    }

    /// Identifier or, before creation, the name.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => format!("project {}", id),
            None => format!("project '{}'", self.name),
        }
    }
}

/// Project key for a name: upper-cased, spaces replaced by dashes.
pub fn derive_project_key(name: &str) -> String {
    name.replace(' ', "-").to_uppercase()
}

/// State of a `space_repository` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryState {
    /// Remote identifier, set once created.
    #[serde(default)]
    pub id: Option<String>,
    /// Repository name, unique within its project.
    pub name: String,
    /// Owning project.
    pub project_id: String,
    /// Time of the last successful create or update.
    #[serde(default)]
    pub last_updated: Option<String>,
    /// Free-text description.
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Default branch name.
    #[serde(default = "default_branch", deserialize_with = "null_as_default_branch")]
    pub default_branch: String,
    /// Guards the repository against deletion.
    #[serde(default, deserialize_with = "null_as_default")]
    pub protected: bool,
    /// Branch protection rules, applied as one settings document.
    #[serde(default, deserialize_with = "null_as_default")]
    pub protected_branches: Vec<ProtectedBranchRule>,
}

impl RepositoryState {
    /// A desired repository with defaults for everything but name and project.
    pub fn new(name: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            project_id: project_id.into(),
            last_updated: None,
            description: String::new(),
            default_branch: default_branch(),
            protected: false,
            protected_branches: Vec::new(),
        }
    }

    /// `project/name`, used to annotate errors and logs.
    pub fn label(&self) -> String {
        format!("repository {}/{}", self.project_id, self.name)
    }
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

/// One protected-branch rule.
///
/// Actor grants are not part of the rule: they are the fixed
/// [`ADMINS_GROUP`]/[`MEMBERS_GROUP`] policy applied when the settings
/// payload is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedBranchRule {
    /// Branch name globs the rule applies to.
    #[serde(default, deserialize_with = "null_as_default")]
    pub pattern: Vec<String>,
    /// Merge requirements.
    #[serde(default, deserialize_with = "null_as_default")]
    pub quality_gate: QualityGate,
}

impl ProtectedBranchRule {
    /// Whether two rules describe the same protection.
    ///
    /// Approver order is ignored and job references match by id or name.
    pub fn equivalent(&self, other: &Self) -> bool {
        self.pattern == other.pattern
            && self.quality_gate.approvals == other.quality_gate.approvals
            && self.quality_gate.automation_jobs.len() == other.quality_gate.automation_jobs.len()
            && self
                .quality_gate
                .automation_jobs
                .iter()
                .zip(&other.quality_gate.automation_jobs)
                .all(|(a, b)| a.refers_to(b))
    }
}

/// Whether two rule lists describe the same protection, position by position.
pub fn rules_equivalent(a: &[ProtectedBranchRule], b: &[ProtectedBranchRule]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
}

/// Approval and automation requirements of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QualityGate {
    /// Approval policies, all of which must be satisfied.
    #[serde(default, deserialize_with = "null_as_default")]
    pub approvals: Vec<ApprovalPolicy>,
    /// Automation jobs that must pass.
    #[serde(default, deserialize_with = "null_as_default")]
    pub automation_jobs: Vec<AutomationJobRef>,
}

/// Minimum approval count from a set of approvers.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    /// Number of approvals required.
    #[serde(default, deserialize_with = "null_as_default")]
    pub min_approvals: u32,
    /// Identities whose approval counts, in display order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub approved_by: Vec<String>,
}

impl PartialEq for ApprovalPolicy {
    fn eq(&self, other: &Self) -> bool {
        let mut mine: Vec<&String> = self.approved_by.iter().collect();
        let mut theirs: Vec<&String> = other.approved_by.iter().collect();
        mine.sort();
        theirs.sort();
        self.min_approvals == other.min_approvals && mine == theirs
    }
}

/// Reference to an automation job.
///
/// The service only accepts ids; configuration may give just a name, which
/// is resolved before submission. In configuration a bare string is read as
/// a name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "JobRefRepr")]
pub struct AutomationJobRef {
    /// Job identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Human-readable job name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AutomationJobRef {
    /// A reference by name only.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    /// A fully resolved reference.
    pub fn resolved(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
        }
    }

    /// Whether both references point at the same job.
    pub fn refers_to(&self, other: &Self) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => matches!((&self.name, &other.name), (Some(a), Some(b)) if a == b),
        }
    }

    /// Name if known, else id.
    pub fn display(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("<unnamed>")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JobRefRepr {
    Name(String),
    Full {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
}

impl From<JobRefRepr> for AutomationJobRef {
    fn from(repr: JobRefRepr) -> Self {
        match repr {
            JobRefRepr::Name(name) => Self::named(name),
            JobRefRepr::Full { id, name } => Self { id, name },
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default_branch<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_branch))
}
