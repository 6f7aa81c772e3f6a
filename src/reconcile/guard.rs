//! Deletion guard.
//!
//! An entity whose recorded `protected` flag is set is never deleted. The
//! recorded flag is trusted as is; nothing is fetched to re-check it.

use tracing::warn;

use crate::error::ProviderError;

/// Outcome of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// The delete call may be issued.
    Proceed,
    /// The entity is protected; nothing may be called.
    Blocked,
}

impl Deletion {
    /// Decide from the recorded flag.
    pub fn for_flag(protected: bool) -> Self {
        if protected {
            Self::Blocked
        } else {
            Self::Proceed
        }
    }
}

/// Reject the delete of a protected entity.
pub fn guard_delete(kind: &'static str, id: &str, protected: bool) -> Result<(), ProviderError> {
    match Deletion::for_flag(protected) {
        Deletion::Proceed => Ok(()),
        Deletion::Blocked => {
            warn!(kind, id, "refusing to delete protected entity");
            Err(ProviderError::ProtectedResource {
                kind,
                id: id.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unprotected_proceeds() {
        assert_eq!(Deletion::for_flag(false), Deletion::Proceed);
        assert!(guard_delete("project", "p1", false).is_ok());
    }

    #[test]
    fn test_protected_is_blocked() {
        let err = guard_delete("repository", "p1/infra", true).unwrap_err();
        assert!(err.is_protected());
        assert_eq!(err.to_string(), "repository p1/infra is protected, not deleting");
    }
}
