//! Role membership deltas for projects.
//!
//! For one role/subject combination the stale identities
//! (`previous - desired`) are revoked first, then every desired identity is
//! granted again. The service treats a redundant grant as a no-op.

use tracing::{debug, info};

use crate::compare::{compare_lists, dedup_preserving_order, set_difference};
use crate::error::ProviderError;
use crate::gateway::{Gateway, RoleAction, RoleAssignment};
use crate::model::{ProjectState, RoleKind, SubjectKind, ROLE_LISTS};

/// Calls needed to converge one role/subject combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDelta {
    pub role: RoleKind,
    pub subject: SubjectKind,
    /// Identities to revoke, in recorded order.
    pub to_remove: Vec<String>,
    /// Identities to grant, in desired order.
    pub to_add: Vec<String>,
}

impl RoleDelta {
    /// Delta between a desired and a previously recorded identity list.
    pub fn compute(
        desired: &[String],
        previous: &[String],
        role: RoleKind,
        subject: SubjectKind,
    ) -> Self {
        Self {
            role,
            subject,
            to_remove: set_difference(previous, desired),
            to_add: dedup_preserving_order(desired),
        }
    }

    /// Whether the delta issues no calls.
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }

    /// The gateway calls of this delta, removals first.
    pub fn assignments(&self) -> impl Iterator<Item = RoleAssignment> + '_ {
        let removals = self.to_remove.iter().map(move |id| RoleAssignment {
            subject: self.subject,
            subject_id: id.clone(),
            role: self.role,
            action: RoleAction::Remove,
        });
        let additions = self.to_add.iter().map(move |id| RoleAssignment {
            subject: self.subject,
            subject_id: id.clone(),
            role: self.role,
            action: RoleAction::Add,
        });
        removals.chain(additions)
    }
}

/// Deltas for every role list that changed between `previous` and `desired`.
///
/// Lists that compare equal produce no delta, so reapplying a converged
/// state issues no role calls at all.
pub fn plan_role_changes(previous: &ProjectState, desired: &ProjectState) -> Vec<RoleDelta> {
    ROLE_LISTS
        .iter()
        .filter_map(|&(role, subject)| {
            let before = previous.role_list(role, subject);
            let after = desired.role_list(role, subject);
            if !compare_lists(before, after).differs {
                return None;
            }
            let delta = RoleDelta::compute(after, before, role, subject);
            (!delta.is_empty()).then_some(delta)
        })
        .collect()
}

/// Issue the calls of one delta, one identity at a time.
///
/// The first failure stops the delta; calls already made are not undone.
pub async fn apply_role_delta(
    gateway: &dyn Gateway,
    project_id: &str,
    delta: &RoleDelta,
) -> Result<(), ProviderError> {
    debug!(
        project_id,
        role = %delta.role,
        subject = %delta.subject,
        removals = delta.to_remove.len(),
        additions = delta.to_add.len(),
        "applying role delta"
    );
    for assignment in delta.assignments() {
        gateway
            .set_project_role(project_id, &assignment)
            .await
            .map_err(|source| {
                ProviderError::gateway(
                    assignment.operation(),
                    format!(
                        "project {} / {} {}",
                        project_id, assignment.subject, assignment.subject_id
                    ),
                    source,
                )
            })?;
        info!(
            project_id,
            role = %assignment.role,
            subject = %assignment.subject,
            identity = %assignment.subject_id,
            action = assignment.action.verb(),
            "project role updated"
        );
    }
    Ok(())
}

/// Apply every delta in order, stopping at the first failure.
pub async fn apply_role_changes(
    gateway: &dyn Gateway,
    project_id: &str,
    deltas: &[RoleDelta],
) -> Result<(), ProviderError> {
    for delta in deltas {
        apply_role_delta(gateway, project_id, delta).await?;
    }
    Ok(())
}
