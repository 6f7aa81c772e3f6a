//! Plan, import and metadata types exchanged with the host.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A change to a single top-level attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The attribute that changed.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<Value>,
    /// The value after the change (None if removed).
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// A change for a newly set attribute.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// A change for a modified attribute.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource must be destroyed and recreated.
    pub requires_replace: bool,
}

impl PlanResult {
    /// A plan with no changes.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// A plan with changes.
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }

    /// Whether the plan changes anything.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Resource and data source names served by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Resource type names.
    pub resources: Vec<String>,
    /// Data source type names.
    pub data_sources: Vec<String>,
}

/// Diff two state objects attribute by attribute.
///
/// Attributes listed in `ignore` (computed values such as `id` or
/// `last_updated`) are not compared. A null and a missing attribute are
/// treated as equal.
pub fn diff_attributes(prior: &Value, proposed: &Value, ignore: &[&str]) -> Vec<AttributeChange> {
    let empty = serde_json::Map::new();
    let prior_obj = prior.as_object().unwrap_or(&empty);
    let proposed_obj = proposed.as_object().unwrap_or(&empty);

    let mut keys: Vec<&String> = prior_obj.keys().chain(proposed_obj.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter(|key| !ignore.contains(&key.as_str()))
        .filter_map(|key| {
            let before = prior_obj.get(key).filter(|v| !v.is_null());
            let after = proposed_obj.get(key).filter(|v| !v.is_null());
            if before == after {
                return None;
            }
            Some(AttributeChange::new(key.clone(), before.cloned(), after.cloned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("name", json!("infra"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("infra")));

        let modified = AttributeChange::modified("admins", json!(["alice", "bob"]), json!(["alice"]));
        assert_eq!(modified.before, Some(json!(["alice", "bob"])));
    }

    #[test]
    fn test_diff_attributes_ignores_computed() {
        let prior = json!({"id": "p1", "name": "Infra", "last_updated": "yesterday", "admins": ["alice", "bob"]});
        let proposed = json!({"id": null, "name": "Infra", "last_updated": null, "admins": ["alice"]});

        let changes = diff_attributes(&prior, &proposed, &["id", "last_updated"]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "admins");
        assert_eq!(changes[0].after, Some(json!(["alice"])));
    }

    #[test]
    fn test_diff_attributes_null_equals_missing() {
        let changes = diff_attributes(&json!({"members": null}), &json!({}), &[]);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_plan_result() {
        let no_change = PlanResult::no_change(json!({"id": "p1"}));
        assert!(!no_change.has_changes());
        assert!(!no_change.requires_replace);

        let replace = PlanResult::with_changes(
            json!({"name": "other"}),
            vec![AttributeChange::modified("name", json!("infra"), json!("other"))],
            true,
        );
        assert!(replace.has_changes());
        assert!(replace.requires_replace);
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new("space_repository", json!({"name": "infra"}));
        assert_eq!(imported.resource_type, "space_repository");
        assert_eq!(imported.state["name"], "infra");
    }
}
