//! Validation of configuration values against a [`Schema`].
//!
//! Rules:
//!
//! - required attributes must be present and non-null
//! - computed-only attributes are skipped (the provider sets them)
//! - attribute types must match, recursively through lists and objects
//! - nested blocks honor their `min_items`/`max_items`

use serde_json::Value;

use crate::schema::{AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema};

/// Validate a JSON value against a schema.
///
/// An empty list means the value is valid.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Like [`validate`], but returns `Err` with the diagnostics when any are found.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        other => {
            let mut diagnostic = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(other)));
            if !path.is_empty() {
                diagnostic = diagnostic.with_attribute(path);
            }
            diagnostics.push(diagnostic);
            return;
        }
    };

    for (name, attr) in &block.attributes {
        if attr.is_computed_only() {
            continue;
        }
        let attr_path = join_path(path, name);
        match obj.get(name) {
            None | Some(Value::Null) => {
                if attr.flags.required {
                    diagnostics.push(
                        Diagnostic::error(format!("Missing required attribute '{}'", attr_path))
                            .with_attribute(attr_path),
                    );
                }
            }
            Some(v) => validate_type(&attr.attr_type, v, &attr_path, diagnostics),
        }
    }

    for (name, nested) in &block.blocks {
        let block_path = join_path(path, name);
        validate_nested_block(nested, obj.get(name), &block_path, diagnostics);
    }
}

fn validate_type(ty: &AttributeType, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    match ty {
        AttributeType::String if !value.is_string() => {
            diagnostics.push(type_error(path, "string", value));
        }
        AttributeType::Int64 if value.as_i64().is_none() => {
            diagnostics.push(type_error(path, "int64", value));
        }
        AttributeType::Bool if !value.is_boolean() => {
            diagnostics.push(type_error(path, "bool", value));
        }
        AttributeType::List(element) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_type(element, item, &format!("{}.{}", path, i), diagnostics);
                }
            }
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Object(attrs) => match value.as_object() {
            Some(obj) => {
                // Object members carry no required/optional flags; absent members pass.
                for (name, member_ty) in attrs {
                    if let Some(member) = obj.get(name).filter(|v| !v.is_null()) {
                        validate_type(member_ty, member, &join_path(path, name), diagnostics);
                    }
                }
            }
            None => diagnostics.push(type_error(path, "object", value)),
        },
        _ => {}
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let items: Vec<&Value> = match (nested.nesting_mode, value) {
        (_, None | Some(Value::Null)) => Vec::new(),
        (BlockNestingMode::Single, Some(v)) => vec![v],
        (BlockNestingMode::List, Some(Value::Array(arr))) => arr.iter().collect(),
        (BlockNestingMode::List, Some(v)) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
            return;
        }
    };

    let len = items.len() as u32;
    if len < nested.min_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, len
            ))
            .with_attribute(path),
        );
    }
    if nested.max_items > 0 && len > nested.max_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, nested.max_items, len
            ))
            .with_attribute(path),
        );
    }

    for (i, item) in items.into_iter().enumerate() {
        let item_path = match nested.nesting_mode {
            BlockNestingMode::Single => path.to_string(),
            BlockNestingMode::List => format!("{}.{}", path, i),
        };
        validate_block(&nested.block, item, &item_path, diagnostics);
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    fn repository_like() -> Schema {
        Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("protected", Attribute::defaulted_bool(false))
            .with_block(
                "protected_branches",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("pattern", Attribute::optional_string_list())
                        .with_block(
                            "approvals",
                            NestedBlock::list(
                                Block::new()
                                    .with_attribute("min_approvals", Attribute::optional_int64()),
                            ),
                        ),
                ),
            )
    }

    #[test]
    fn test_valid_config() {
        let config = json!({
            "name": "infra",
            "protected": true,
            "protected_branches": [
                {"pattern": ["main"], "approvals": [{"min_approvals": 1}]}
            ]
        });
        assert!(validate(&repository_like(), &config).is_empty());
        assert!(validate_result(&repository_like(), &config).is_ok());
    }

    #[test]
    fn test_missing_required_attribute() {
        let diagnostics = validate(&repository_like(), &json!({"protected": false}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));
    }

    #[test]
    fn test_computed_attribute_is_skipped() {
        let diagnostics = validate(&repository_like(), &json!({"name": "infra", "id": 12}));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_nested_type_error_path() {
        let config = json!({
            "name": "infra",
            "protected_branches": [
                {"pattern": ["main", 7], "approvals": [{"min_approvals": "one"}]}
            ]
        });
        let diagnostics = validate(&repository_like(), &config);
        let paths: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert!(paths.contains(&"protected_branches.0.pattern.1"));
        assert!(paths.contains(&"protected_branches.0.approvals.0.min_approvals"));
    }

    #[test]
    fn test_block_must_be_list() {
        let config = json!({"name": "infra", "protected_branches": {"pattern": ["main"]}});
        let diagnostics = validate(&repository_like(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected list"));
    }

    #[test]
    fn test_min_items() {
        let schema = Schema::v0().with_block(
            "approvals",
            NestedBlock::list(Block::new()).with_min_items(1),
        );
        let diagnostics = validate(&schema, &json!({"approvals": []}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));
    }

    #[test]
    fn test_root_not_object() {
        let diagnostics = validate(&repository_like(), &json!("infra"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].attribute.is_none());
    }
}
