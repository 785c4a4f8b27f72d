//! # Normalized Failure Records
//!
//! Whatever rejected a value — an override validator or the schema
//! engine — the pipeline reports one uniform record. Error handlers
//! receive the full record, including the raw engine violations when the
//! rejection came from a schema; the default (no handler) path discards
//! it and surfaces only a generic client error.

use std::fmt;

use conform_core::DeclaredType;
use conform_schema::Violation;
use serde::Serialize;

/// A normalized description of one failed validation.
///
/// Created per failed `transform` call and handed to the error handler
/// (or dropped); never retained by the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationFailure {
    /// Readable name of the declared type that rejected the value.
    pub type_name: String,
    /// Human-readable summary. For schema rejections, the violations'
    /// `"<path> <message>"` pairs joined with `", "`; for override
    /// rejections, the validator's message verbatim.
    pub message: String,
    /// The raw engine violations behind a schema rejection. `None` for
    /// override-validator rejections.
    pub violations: Option<Vec<Violation>>,
}

impl ValidationFailure {
    /// Normalize a schema rejection.
    pub fn from_violations(declared: &DeclaredType, violations: Vec<Violation>) -> Self {
        let message = violations
            .iter()
            .map(|v| format!("{} {}", v.instance_path, v.message))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            type_name: declared.type_name().to_string(),
            message,
            violations: Some(violations),
        }
    }

    /// Wrap an override validator's message.
    pub fn from_message(declared: &DeclaredType, message: impl Into<String>) -> Self {
        Self {
            type_name: declared.type_name().to_string(),
            message: message.into(),
            violations: None,
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn violation(instance_path: &str, message: &str) -> Violation {
        Violation {
            instance_path: instance_path.to_string(),
            schema_path: "/properties/x/type".to_string(),
            keyword: "type".to_string(),
            message: message.to_string(),
            params: json!({"type": "number"}),
        }
    }

    #[test]
    fn test_joins_path_message_pairs() {
        let failure = ValidationFailure::from_violations(
            &DeclaredType::named("Invoice"),
            vec![
                violation("/amount", "\"ten\" is not of type \"number\""),
                violation("/count", "\"two\" is not of type \"number\""),
            ],
        );
        assert_eq!(failure.type_name, "Invoice");
        assert_eq!(
            failure.message,
            "/amount \"ten\" is not of type \"number\", /count \"two\" is not of type \"number\""
        );
        assert_eq!(failure.violations.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_override_message_verbatim() {
        let failure =
            ValidationFailure::from_message(&DeclaredType::Bool, "Data should be boolean");
        assert_eq!(failure.type_name, "Boolean");
        assert_eq!(failure.message, "Data should be boolean");
        assert!(failure.violations.is_none());
    }

    #[test]
    fn test_serializes_for_handlers() {
        let failure = ValidationFailure::from_violations(
            &DeclaredType::named("Invoice"),
            vec![violation("/amount", "nope")],
        );
        let as_json: Value = serde_json::to_value(&failure).unwrap();
        assert_eq!(as_json["type_name"], json!("Invoice"));
        assert_eq!(as_json["violations"][0]["keyword"], json!("type"));
    }
}
