//! Protected-branch rules.
//!
//! The service replaces the whole rule set on every write and does not
//! report validation problems in the write response. A write is therefore
//! always followed by a read, and the read is what becomes state.

use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::gateway::{
    ApprovalSpec, Gateway, ProtectedBranchSettings, ProtectedBranchSpec, QualityGateSpec,
};
use crate::model::{ProtectedBranchRule, ADMINS_GROUP, MEMBERS_GROUP, SETTINGS_VERSION};
use crate::projector;

/// Where job names are looked up: one branch of one repository.
#[derive(Debug, Clone, Copy)]
pub struct BranchScope<'a> {
    pub project_id: &'a str,
    pub repository: &'a str,
    pub branch: &'a str,
}

impl BranchScope<'_> {
    fn label(&self) -> String {
        format!("{}/{}@{}", self.project_id, self.repository, self.branch)
    }
}

/// Fill in the id of every job reference that only has a name.
///
/// Any failed lookup fails the whole call.
pub async fn resolve_job_ids(
    gateway: &dyn Gateway,
    scope: BranchScope<'_>,
    rules: &[ProtectedBranchRule],
) -> Result<Vec<ProtectedBranchRule>, ProviderError> {
    let mut resolved = rules.to_vec();
    for rule in &mut resolved {
        for job in &mut rule.quality_gate.automation_jobs {
            if job.id.is_some() {
                continue;
            }
            let Some(name) = job.name.as_deref() else {
                return Err(ProviderError::Configuration(
                    "automation job reference needs an id or a name".to_string(),
                ));
            };
            let id = gateway
                .resolve_automation_job_id(scope.project_id, scope.repository, scope.branch, name)
                .await
                .map_err(|source| ProviderError::Resolution {
                    job: name.to_string(),
                    scope: scope.label(),
                    source,
                })?;
            debug!(scope = %scope.label(), job_name = name, job_id = %id, "resolved automation job id");
            job.id = Some(id);
        }
    }
    Ok(resolved)
}

/// Build the settings document for fully resolved rules.
///
/// Actor grants are the fixed admin/member policy, never user input.
pub fn settings_payload(
    rules: &[ProtectedBranchRule],
) -> Result<ProtectedBranchSettings, ProviderError> {
    let protected_branches = rules
        .iter()
        .map(|rule| -> Result<ProtectedBranchSpec, ProviderError> {
            let automation_jobs = rule
                .quality_gate
                .automation_jobs
                .iter()
                .map(|job| {
                    job.id.clone().ok_or_else(|| {
                        ProviderError::Configuration(format!(
                            "automation job '{}' has no id",
                            job.display()
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ProtectedBranchSpec {
                pattern: rule.pattern.clone(),
                allow_create: vec![MEMBERS_GROUP.to_string()],
                allow_push: vec![ADMINS_GROUP.to_string()],
                allow_delete: vec![ADMINS_GROUP.to_string()],
                allow_force_push: vec![ADMINS_GROUP.to_string()],
                quality_gate: QualityGateSpec {
                    approvals: rule
                        .quality_gate
                        .approvals
                        .iter()
                        .map(|a| ApprovalSpec {
                            approved_by: a.approved_by.clone(),
                            min_approvals: a.min_approvals,
                        })
                        .collect(),
                    automation_jobs,
                },
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProtectedBranchSettings {
        version: SETTINGS_VERSION.to_string(),
        protected_branches,
    })
}

/// Read and project the current rules of a repository.
pub async fn read_protected_branches(
    gateway: &dyn Gateway,
    project_id: &str,
    repository: &str,
) -> Result<Vec<ProtectedBranchRule>, ProviderError> {
    let specs = gateway
        .get_protected_branch_settings(project_id, repository)
        .await
        .map_err(|source| {
            ProviderError::gateway(
                "read protected branches",
                format!("repository {}/{}", project_id, repository),
                source,
            )
        })?;
    projector::protected_branch_rules(gateway, project_id, &specs).await
}

/// Replace a repository's rules with `desired` and return what the service kept.
pub async fn apply_protected_branches(
    gateway: &dyn Gateway,
    scope: BranchScope<'_>,
    desired: &[ProtectedBranchRule],
) -> Result<Vec<ProtectedBranchRule>, ProviderError> {
    let entity = format!("repository {}/{}", scope.project_id, scope.repository);

    let resolved = resolve_job_ids(gateway, scope, desired).await?;
    let settings = settings_payload(&resolved)?;

    gateway
        .put_protected_branch_settings(scope.project_id, scope.repository, &settings)
        .await
        .map_err(|source| ProviderError::gateway("write protected branches", entity.clone(), source))?;
    info!(
        project_id = scope.project_id,
        repository = scope.repository,
        rules = settings.protected_branches.len(),
        "protected branches written"
    );

    let read_back = read_protected_branches(gateway, scope.project_id, scope.repository).await?;
    if let Some(detail) = acceptance_mismatch(&settings.protected_branches, &read_back) {
        warn!(
            project_id = scope.project_id,
            repository = scope.repository,
            %detail,
            "service did not keep the submitted protected branch rules"
        );
        return Err(ProviderError::Consistency { entity, detail });
    }
    Ok(read_back)
}

/// Describe how the read-back differs from the submission in rule count or
/// patterns. Values inside a kept rule may differ; the read-back wins there.
fn acceptance_mismatch(
    submitted: &[ProtectedBranchSpec],
    read_back: &[ProtectedBranchRule],
) -> Option<String> {
    if submitted.len() != read_back.len() {
        return Some(format!(
            "submitted {} protected branch rule(s), read back {}",
            submitted.len(),
            read_back.len()
        ));
    }
    submitted
        .iter()
        .zip(read_back)
        .position(|(sent, kept)| sent.pattern != kept.pattern)
        .map(|index| {
            format!(
                "rule {} was submitted for {:?} but read back for {:?}",
                index, submitted[index].pattern, read_back[index].pattern
            )
        })
}
