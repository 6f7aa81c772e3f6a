//! Mapping of fetched remote records onto the canonical model.
//!
//! Everything here is a pure mapping except job name lookup: the service
//! stores quality-gate jobs as ids only, so each id is looked up one at a
//! time and any failed lookup fails the whole projection.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::ProviderError;
use crate::gateway::{Gateway, ProtectedBranchSpec, RemoteProject, RemoteRepository, RemoteTimestamp};
use crate::model::{
    ApprovalPolicy, AutomationJobRef, ProjectState, ProtectedBranchRule, QualityGate,
    RepositoryState, DEFAULT_BRANCH,
};

/// Project state from a fetched project.
///
/// `protected` and `last_updated` are local-only and carried over by the caller.
pub fn project_state(
    remote: &RemoteProject,
    protected: bool,
    last_updated: Option<String>,
) -> ProjectState {
    ProjectState {
        id: Some(remote.id.clone()),
        name: remote.name.clone(),
        key: Some(remote.key.key.clone()),
        last_updated,
        protected,
        archived: remote.archived,
        created_at: remote.created_at.as_ref().and_then(timestamp_to_rfc3339),
        member_teams: remote.member_teams.iter().map(|t| t.name.clone()).collect(),
        members: remote
            .member_profiles
            .iter()
            .map(|p| p.username.clone())
            .collect(),
        admin_teams: remote.admin_teams.iter().map(|t| t.name.clone()).collect(),
        admins: remote
            .admin_profiles
            .iter()
            .map(|p| p.username.clone())
            .collect(),
    }
}

/// Repository state from a fetched repository and its projected rules.
pub fn repository_state(
    remote: &RemoteRepository,
    project_id: &str,
    protected: bool,
    protected_branches: Vec<ProtectedBranchRule>,
    last_updated: Option<String>,
) -> RepositoryState {
    RepositoryState {
        id: Some(remote.id.clone()),
        name: remote.name.clone(),
        project_id: project_id.to_string(),
        last_updated,
        description: remote.description.clone().unwrap_or_default(),
        default_branch: remote
            .default_branch
            .as_ref()
            .and_then(|b| b.branch_name())
            .unwrap_or(DEFAULT_BRANCH)
            .to_string(),
        protected,
        protected_branches,
    }
}

/// Flatten a wire rule without resolving job names.
pub fn flatten_rule(spec: &ProtectedBranchSpec) -> ProtectedBranchRule {
    ProtectedBranchRule {
        pattern: spec.pattern.clone(),
        quality_gate: QualityGate {
            approvals: spec
                .quality_gate
                .approvals
                .iter()
                .map(|a| ApprovalPolicy {
                    min_approvals: a.min_approvals,
                    approved_by: a.approved_by.clone(),
                })
                .collect(),
            automation_jobs: spec
                .quality_gate
                .automation_jobs
                .iter()
                .map(|id| AutomationJobRef {
                    id: Some(id.clone()),
                    name: None,
                })
                .collect(),
        },
    }
}

/// Project fetched wire rules, resolving every job id to its name.
pub async fn protected_branch_rules(
    gateway: &dyn Gateway,
    project_id: &str,
    specs: &[ProtectedBranchSpec],
) -> Result<Vec<ProtectedBranchRule>, ProviderError> {
    let mut rules = Vec::with_capacity(specs.len());
    for spec in specs {
        let mut rule = flatten_rule(spec);
        for job in &mut rule.quality_gate.automation_jobs {
            let Some(id) = job.id.as_deref() else {
                continue;
            };
            let name = gateway
                .get_automation_job_name(project_id, id)
                .await
                .map_err(|source| ProviderError::Resolution {
                    job: id.to_string(),
                    scope: format!("project {}", project_id),
                    source,
                })?;
            debug!(project_id, job_id = id, job_name = %name, "resolved automation job name");
            job.name = Some(name);
        }
        rules.push(rule);
    }
    Ok(rules)
}

fn timestamp_to_rfc3339(ts: &RemoteTimestamp) -> Option<String> {
    ts.iso.clone().or_else(|| {
        ts.timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.to_rfc3339())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ApprovalSpec, BranchRef, ProfileRef, QualityGateSpec, TeamRef};
    use crate::testing::{remote_project, RecordingGateway};

    fn spec_with_jobs(jobs: &[&str]) -> ProtectedBranchSpec {
        ProtectedBranchSpec {
            pattern: vec!["main".into()],
            quality_gate: QualityGateSpec {
                approvals: vec![ApprovalSpec {
                    approved_by: vec!["bob".into(), "alice".into()],
                    min_approvals: 2,
                }],
                automation_jobs: jobs.iter().map(|j| j.to_string()).collect(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_project_state_maps_roles() {
        let mut remote = remote_project("p1", "Infra");
        remote.member_teams = vec![TeamRef { name: "Core".into() }];
        remote.admin_profiles = vec![ProfileRef { username: "alice".into() }];
        remote.created_at = Some(RemoteTimestamp {
            iso: None,
            timestamp: Some(0),
        });

        let state = project_state(&remote, true, Some("now".into()));
        assert_eq!(state.id.as_deref(), Some("p1"));
        assert_eq!(state.key.as_deref(), Some("INFRA"));
        assert_eq!(state.member_teams, vec!["Core"]);
        assert_eq!(state.admins, vec!["alice"]);
        assert!(state.members.is_empty());
        assert!(state.protected);
        assert_eq!(state.created_at.as_deref(), Some("1970-01-01T00:00:00+00:00"));
    }

    #[test]
    fn test_repository_state_defaults() {
        let remote = RemoteRepository {
            id: "r1".into(),
            name: "infra".into(),
            description: None,
            default_branch: Some(BranchRef {
                head: Some("refs/heads/develop".into()),
                reference: None,
            }),
        };
        let state = repository_state(&remote, "p1", false, vec![], None);
        assert_eq!(state.default_branch, "develop");
        assert_eq!(state.description, "");

        let bare = RemoteRepository {
            default_branch: None,
            ..remote
        };
        assert_eq!(repository_state(&bare, "p1", false, vec![], None).default_branch, "main");
    }

    #[test]
    fn test_flatten_rule_keeps_approver_order() {
        let rule = flatten_rule(&spec_with_jobs(&["j-1"]));
        assert_eq!(rule.quality_gate.approvals[0].approved_by, vec!["bob", "alice"]);
        assert_eq!(rule.quality_gate.approvals[0].min_approvals, 2);
        assert_eq!(rule.quality_gate.automation_jobs[0].id.as_deref(), Some("j-1"));
        assert!(rule.quality_gate.automation_jobs[0].name.is_none());
    }

    #[tokio::test]
    async fn test_job_ids_resolved_to_names() {
        let gateway = RecordingGateway::new();
        gateway.seed_job("p1", "j-1", "lint");
        gateway.seed_job("p1", "j-2", "test");

        let rules = protected_branch_rules(&gateway, "p1", &[spec_with_jobs(&["j-1", "j-2"])])
            .await
            .unwrap();
        let jobs = &rules[0].quality_gate.automation_jobs;
        assert_eq!(jobs[0], AutomationJobRef::resolved("j-1", "lint"));
        assert_eq!(jobs[1], AutomationJobRef::resolved("j-2", "test"));
        assert_eq!(gateway.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_one_failed_lookup_fails_projection() {
        let gateway = RecordingGateway::new();
        gateway.seed_job("p1", "j-1", "lint");

        let err = protected_branch_rules(&gateway, "p1", &[spec_with_jobs(&["j-1", "j-missing"])])
            .await
            .unwrap_err();
        match err {
            ProviderError::Resolution { job, .. } => assert_eq!(job, "j-missing"),
            other => panic!("expected resolution error, got {other:?}"),
        }
    }
}
