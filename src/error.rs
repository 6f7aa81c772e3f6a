//! Error types for the Space provider.
//!
//! [`GatewayError`] describes a failed call against the remote Space API.
//! [`ProviderError`] is what reconciliation returns: every gateway failure is
//! wrapped with the operation that was attempted and the entity it targeted.

use thiserror::Error;

use crate::schema::Diagnostic;

/// A failed call against the remote service.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The service answered with a non-success status.
    #[error("request to {endpoint} failed with status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Endpoint path that was called.
        endpoint: String,
        /// Response body or extracted error message.
        message: String,
    },

    /// The token was rejected.
    #[error("authentication rejected: {0}")]
    Unauthorized(String),

    /// The addressed object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body could not be decoded.
    #[error("could not decode response: {0}")]
    Decode(String),

    /// The client could not be built from its configuration.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl GatewayError {
    /// Build a status error.
    pub fn status(status: u16, endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by reconciliation and the provider lifecycle.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Missing or invalid desired input (bad import id, malformed state, bad provider config).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A gateway call failed.
    #[error("{operation} failed for {entity}: {source}")]
    Gateway {
        /// The operation that was attempted, e.g. `add admin role`.
        operation: String,
        /// The entity the operation targeted, e.g. `project 42 / user alice`.
        entity: String,
        /// The underlying gateway failure.
        #[source]
        source: GatewayError,
    },

    /// An automation job name could not be mapped to an id (or back).
    #[error("could not resolve automation job '{job}' in {scope}: {source}")]
    Resolution {
        /// The job name or id that failed to resolve.
        job: String,
        /// Project/repository/branch scope of the lookup.
        scope: String,
        /// The underlying gateway failure.
        #[source]
        source: GatewayError,
    },

    /// Delete attempted on an entity flagged as protected.
    #[error("{kind} {id} is protected, not deleting")]
    ProtectedResource {
        /// Entity kind (`project`, `repository`).
        kind: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// The read-back after a write does not match what was submitted.
    #[error("inconsistent result for {entity}: {detail}")]
    Consistency {
        /// Entity whose read-back was inconsistent.
        entity: String,
        /// What differed.
        detail: String,
    },

    /// A lifecycle call arrived before `configure`.
    #[error("Provider is not configured")]
    NotConfigured,

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A state or config value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Wrap a gateway failure with the attempted operation and target entity.
    pub fn gateway(
        operation: impl Into<String>,
        entity: impl Into<String>,
        source: GatewayError,
    ) -> Self {
        Self::Gateway {
            operation: operation.into(),
            entity: entity.into(),
            source,
        }
    }

    /// Whether this is the deletion guard's rejection.
    ///
    /// It is the only error raised before any gateway call is attempted.
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::ProtectedResource { .. })
    }

    /// Short summary used as the diagnostic headline.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Invalid configuration",
            Self::Gateway { .. } => "Space API call failed",
            Self::Resolution { .. } => "Automation job resolution failed",
            Self::ProtectedResource { .. } => "Resource is protected",
            Self::Consistency { .. } => "Inconsistent result after apply",
            Self::NotConfigured => "Provider not configured",
            Self::UnknownResource(_) => "Unknown resource type",
            Self::Serialization(_) => "Serialization error",
        }
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        Diagnostic::error(err.summary()).with_detail(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DiagnosticSeverity;

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::status(404, "/api/http/projects/id:1", "no such project");
        assert_eq!(
            err.to_string(),
            "request to /api/http/projects/id:1 failed with status 404: no such project"
        );
    }

    #[test]
    fn test_provider_error_names_operation_and_entity() {
        let err = ProviderError::gateway(
            "remove admin role",
            "project p1 / user bob",
            GatewayError::status(500, "/people/profiles/update", "boom"),
        );
        let display = err.to_string();
        assert!(display.contains("remove admin role"));
        assert!(display.contains("user bob"));
    }

    #[test]
    fn test_protected_error() {
        let err = ProviderError::ProtectedResource {
            kind: "repository",
            id: "infra".to_string(),
        };
        assert!(err.is_protected());
        assert_eq!(err.to_string(), "repository infra is protected, not deleting");

        let err = ProviderError::Configuration("bad id".to_string());
        assert!(!err.is_protected());
    }

    #[test]
    fn test_error_to_diagnostic() {
        let err = ProviderError::Consistency {
            entity: "repository infra".to_string(),
            detail: "no rules read back".to_string(),
        };
        let diagnostic: Diagnostic = err.into();
        assert_eq!(diagnostic.severity, DiagnosticSeverity::Error);
        assert_eq!(diagnostic.summary, "Inconsistent result after apply");
        assert!(diagnostic.detail.unwrap().contains("no rules read back"));
    }
}
