//! Reconciliation of desired state against the remote service.
//!
//! - [`roles`]: project role membership deltas
//! - [`branches`]: protected-branch rules, written wholesale and read back
//! - [`guard`]: the deletion guard for protected entities

pub mod branches;
pub mod guard;
pub mod roles;

pub use branches::{apply_protected_branches, read_protected_branches, BranchScope};
pub use guard::{guard_delete, Deletion};
pub use roles::{apply_role_changes, plan_role_changes, RoleDelta};
