//! Argument checking against a tool's JSON schema
//!
//! Covers the subset of JSON Schema that tool definitions in this crate use:
//! `required`, primitive `type`s, `enum`, `minLength` and
//! `additionalProperties: false`.

use serde_json::{Map, Value};

use crate::error::ToolError;

/// Check `args` against `schema`, reporting every violation at once
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let violations = collect_violations(schema, args);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments(violations.join("; ")))
    }
}

fn collect_violations(schema: &Value, args: &Value) -> Vec<String> {
    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let Some(object) = args.as_object() else {
        return vec![format!("expected an object, got {}", type_name(args))];
    };

    let mut violations = Vec::new();

    for field in schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
    {
        match object.get(field) {
            None | Some(Value::Null) => violations.push(format!("missing required field '{field}'")),
            _ => {}
        }
    }

    for (name, value) in object {
        match properties.get(name) {
            Some(property) => {
                if value.is_null() {
                    continue;
                }
                if let Some(problem) = check_property(property, value) {
                    violations.push(format!("field '{name}' {problem}"));
                }
            }
            None if schema.get("additionalProperties") == Some(&Value::Bool(false)) => {
                violations.push(format!("unexpected field '{name}'"));
            }
            None => {}
        }
    }

    violations
}

fn check_property(property: &Value, value: &Value) -> Option<String> {
    if let Some(expected) = property.get("type").and_then(Value::as_str) {
        if !matches_type(expected, value) {
            return Some(format!("must be {expected}, got {}", type_name(value)));
        }
    }

    if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let listed: Vec<String> = allowed.iter().map(Value::to_string).collect();
            return Some(format!("must be one of [{}]", listed.join(", ")));
        }
    }

    if let (Some(min), Some(text)) = (
        property.get("minLength").and_then(Value::as_u64),
        value.as_str(),
    ) {
        if (text.chars().count() as u64) < min {
            return Some(format!("must be at least {min} characters"));
        }
    }

    None
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn email_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "to_email": {"type": "string", "minLength": 3},
                "subject": {"type": "string"},
                "priority": {"type": "string", "enum": ["low", "high"]},
                "retries": {"type": "integer"}
            },
            "required": ["to_email", "subject"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_arguments_pass() {
        let args = json!({"to_email": "ana@example.com", "subject": "Hi", "priority": "low"});
        assert!(validate_arguments(&email_schema(), &args).is_ok());
    }

    #[test]
    fn test_missing_and_null_required_fields() {
        let args = json!({"to_email": null});
        let err = validate_arguments(&email_schema(), &args).unwrap_err().to_string();

        assert!(err.contains("missing required field 'to_email'"));
        assert!(err.contains("missing required field 'subject'"));
    }

    #[test]
    fn test_type_enum_and_length_violations() {
        let args = json!({"to_email": "a", "subject": 5, "priority": "urgent", "retries": 1.5});
        let err = validate_arguments(&email_schema(), &args).unwrap_err().to_string();

        assert!(err.contains("'to_email' must be at least 3 characters"));
        assert!(err.contains("'subject' must be string, got integer"));
        assert!(err.contains("'priority' must be one of"));
        assert!(err.contains("'retries' must be integer, got number"));
    }

    #[test]
    fn test_unexpected_field_rejected_only_when_closed() {
        let args = json!({"to_email": "ana@example.com", "subject": "Hi", "cc": "x"});
        assert!(validate_arguments(&email_schema(), &args).is_err());

        let open = json!({"type": "object", "properties": {}});
        assert!(validate_arguments(&open, &args).is_ok());
    }

    #[test]
    fn test_non_object_arguments() {
        let err = validate_arguments(&email_schema(), &json!("hello")).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
