//! Provider configuration.
//!
//! The `provider` block may set `host`, `token` and `timeout_secs`. Unset
//! host and token fall back to `SPACE_HOST` and `SPACE_TOKEN`; a value in the
//! block always wins over the environment.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};

/// Environment variable consulted when `host` is unset.
pub const HOST_ENV: &str = "SPACE_HOST";

/// Environment variable consulted when `token` is unset.
pub const TOKEN_ENV: &str = "SPACE_TOKEN";

/// Request timeout used when `timeout_secs` is unset.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// The provider block as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

/// Resolved connection settings for the Space API.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Base URL of the Space organization, e.g. `https://acme.jetbrains.space`.
    pub host: String,
    /// Bearer token.
    pub token: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

// The token must never end up in logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "host",
                Attribute::optional_string()
                    .with_description(format!("Space organization URL. Falls back to {}.", HOST_ENV)),
            )
            .with_attribute(
                "token",
                Attribute::optional_string()
                    .sensitive()
                    .with_description(format!("API token. Falls back to {}.", TOKEN_ENV)),
            )
            .with_attribute(
                "timeout_secs",
                Attribute::new(AttributeType::Int64, AttributeFlags::optional())
                    .with_default(Value::from(DEFAULT_TIMEOUT_SECS))
                    .with_description("Per-request timeout in seconds."),
            )
    }

    /// Resolve the provider block against the process environment.
    pub fn resolve(config: &Value) -> Result<Self, Vec<Diagnostic>> {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    /// Resolve the provider block, looking up fallbacks through `env`.
    pub fn resolve_with<F>(config: &Value, env: F) -> Result<Self, Vec<Diagnostic>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = match config {
            Value::Null => RawConfig::default(),
            other => serde_json::from_value(other.clone()).map_err(|e| {
                vec![Diagnostic::error("Invalid provider configuration").with_detail(e.to_string())]
            })?,
        };

        let mut diagnostics = Vec::new();
        let host = pick(raw.host, HOST_ENV, &env);
        let token = pick(raw.token, TOKEN_ENV, &env);

        if host.is_none() {
            diagnostics.push(
                Diagnostic::error("Missing Space API host")
                    .with_detail(format!("Set `host` in the provider block or {}.", HOST_ENV))
                    .with_attribute("host"),
            );
        }
        if token.is_none() {
            diagnostics.push(
                Diagnostic::error("Missing Space API token")
                    .with_detail(format!("Set `token` in the provider block or {}.", TOKEN_ENV))
                    .with_attribute("token"),
            );
        }

        let timeout_secs = raw.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            diagnostics.push(
                Diagnostic::error("Invalid timeout")
                    .with_detail("timeout_secs must be greater than zero")
                    .with_attribute("timeout_secs"),
            );
        }

        match (host, token) {
            (Some(host), Some(token)) if diagnostics.is_empty() => Ok(Self {
                host: host.trim_end_matches('/').to_string(),
                token,
                timeout: Duration::from_secs(timeout_secs),
            }),
            _ => Err(diagnostics),
        }
    }
}

fn pick<F>(configured: Option<String>, env_name: &str, env: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    configured
        .filter(|v| !v.trim().is_empty())
        .or_else(|| env(env_name).filter(|v| !v.trim().is_empty()))
}
