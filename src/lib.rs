//! Space Provider
//!
//! An infrastructure provider that reconciles JetBrains Space projects and
//! repositories against declared configuration.
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **Resources**: `space_project` (name, key and the four role lists) and
//!   `space_repository` (description, default branch and protected-branch rules)
//! - **Data source**: `space_projects`, every project visible to the token
//! - **ProviderService trait**: the lifecycle a host drives (schema, configure,
//!   plan, create, read, update, delete, import, data source reads)
//! - **Gateway**: the [`Gateway`] seam over the Space HTTP API, with a
//!   `reqwest` implementation in [`gateway::http`]
//! - **Reconcilers**: role list diffs, protected-branch write-and-verify and
//!   the deletion guard, in [`reconcile`]
//! - **Testing**: [`testing::ProviderTester`] and an in-memory
//!   [`testing::RecordingGateway`]
//!
//! # Quick Start
//!
//! ```ignore
//! use space_provider::{ProviderService, SpaceProvider};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     space_provider::init_logging();
//!
//!     let provider = SpaceProvider::new();
//!     provider
//!         .configure(json!({"host": "https://acme.jetbrains.space", "token": "..."}))
//!         .await?;
//!
//!     let plan = provider
//!         .plan("space_project", None, json!({"name": "Infra", "admins": ["alice"]}))
//!         .await?;
//!     let state = provider.create("space_project", plan.planned_state).await?;
//!     println!("{}", state);
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! `host` and `token` fall back to the `SPACE_HOST` and `SPACE_TOKEN`
//! environment variables. `timeout_secs` defaults to 10.

#![warn(clippy::all)]

pub mod compare;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod projector;
pub mod provider;
pub mod reconcile;
pub mod resources;
pub mod schema;
pub mod service;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use config::ProviderConfig;
pub use error::{GatewayError, ProviderError};
pub use gateway::Gateway;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use model::{ProjectState, ProtectedBranchRule, RepositoryState};
pub use provider::SpaceProvider;
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::{validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
