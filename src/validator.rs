//! Argument Validator (C5) — coerces and validates a JSON object against a
//! declared schema, producing either a pass-through value or a validation
//! error naming the first offending field.
//!
//! Tool arguments are otherwise only validated implicitly, one field at a
//! time, via `serde_json::from_value` inside each tool module (e.g.
//! `GrepParams`, `EditParams`). This module runs a schema-driven pre-check
//! before deserialization, so every tool gets the same "missing required
//! field" / "wrong type" diagnostic shape, independent of how its params
//! struct is written.

use crate::error::ServerError;

/// Supported JSON-Schema keywords: `type`, `properties`, `required`,
/// `items`, `enum`, `default`, `description`. Anything else in
/// the schema is ignored, and unknown *argument* properties are tolerated
/// but not specially handled (they simply aren't checked).
///
/// # Errors
///
/// Returns [`ServerError::Validation`] naming the first offending field.
pub fn validate(schema: &serde_json::Value, arguments: &serde_json::Value) -> Result<(), ServerError> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };

    let args_obj = arguments.as_object().cloned().unwrap_or_default();

    if let Some(required) = schema_obj.get("required").and_then(|r| r.as_array()) {
        for field in required {
            let Some(name) = field.as_str() else { continue };
            if !args_obj.contains_key(name) {
                return Err(ServerError::Validation {
                    field: name.to_owned(),
                    reason: "missing required field".to_owned(),
                });
            }
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(|p| p.as_object()) {
        for (name, prop_schema) in properties {
            let Some(value) = args_obj.get(name) else { continue };
            check_type(name, value, prop_schema)?;
            check_enum(name, value, prop_schema)?;
        }
    }

    Ok(())
}

fn check_type(field: &str, value: &serde_json::Value, prop_schema: &serde_json::Value) -> Result<(), ServerError> {
    let Some(expected) = prop_schema.get("type").and_then(|t| t.as_str()) else {
        return Ok(());
    };

    let matches = match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    };

    if matches {
        Ok(())
    } else {
        Err(ServerError::Validation {
            field: field.to_owned(),
            reason: format!("expected type `{expected}`, got `{}`", json_type_name(value)),
        })
    }
}

fn check_enum(field: &str, value: &serde_json::Value, prop_schema: &serde_json::Value) -> Result<(), ServerError> {
    let Some(allowed) = prop_schema.get("enum").and_then(|e| e.as_array()) else {
        return Ok(());
    };
    if allowed.contains(value) {
        Ok(())
    } else {
        Err(ServerError::Validation {
            field: field.to_owned(),
            reason: format!("value is not one of the allowed enum values: {allowed:?}"),
        })
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reports_missing_required_field() {
        let schema = json!({
            "type": "object",
            "properties": {"pattern": {"type": "string"}},
            "required": ["pattern"]
        });
        let err = validate(&schema, &json!({})).expect_err("should fail");
        assert!(matches!(err, ServerError::Validation { field, .. } if field == "pattern"));
    }

    #[test]
    fn reports_wrong_type() {
        let schema = json!({
            "type": "object",
            "properties": {"limit": {"type": "integer"}},
            "required": []
        });
        let err = validate(&schema, &json!({"limit": "not-a-number"})).expect_err("should fail");
        assert!(matches!(err, ServerError::Validation { field, .. } if field == "limit"));
    }

    #[test]
    fn tolerates_unknown_properties() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "required": ["a"]
        });
        assert!(validate(&schema, &json!({"a": "x", "extra": 1})).is_ok());
    }

    #[test]
    fn enforces_enum() {
        let schema = json!({
            "type": "object",
            "properties": {"kind": {"type": "string", "enum": ["file", "dir"]}},
            "required": []
        });
        assert!(validate(&schema, &json!({"kind": "file"})).is_ok());
        assert!(validate(&schema, &json!({"kind": "bogus"})).is_err());
    }
}
