//! # The Validation Engine
//!
//! [`ValidationEngine`] is the contract the pipeline needs from a schema
//! validator: register a document under a stable key, and check values
//! against a registered key, reporting structured violations. The engine
//! is pluggable; [`JsonSchemaEngine`] is the default, backed by the
//! `jsonschema` crate.
//!
//! ## Schema Resolution
//!
//! Cross-schema `$ref` URIs are resolved by a retriever over the engine's
//! own schema table. An unresolved URI is an error — every reference a
//! compiled document can contain points at a registry schema, so a miss
//! means a dependency was never registered, and failing loudly beats
//! validating against a permissive stand-in.
//!
//! ## Compiled-Validator Cache
//!
//! Validators compile lazily on first use of a key and are cached. No
//! invalidation is needed: callers register a model's transitive
//! dependencies before its first validation, and schemas are never
//! replaced once registered, so a compiled validator can never be missing
//! a reference that a later registration would satisfy.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use jsonschema::{Draft, Retrieve, Uri, Validator};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::compile::{model_for_uri, NullableStyle};

/// A single schema violation with structured context.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    /// JSON Pointer path to the violating spot in the value.
    pub instance_path: String,
    /// JSON Pointer path within the schema that triggered the error.
    pub schema_path: String,
    /// The schema keyword that failed (e.g. `type`, `required`, `format`).
    pub keyword: String,
    /// Human-readable description of the violation.
    pub message: String,
    /// The failing keyword's operand from the schema document, keyed by
    /// the keyword name; `null` when it cannot be resolved.
    pub params: Value,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.instance_path, self.message)
        }
    }
}

/// Engine behavior toggles. Mirrors what the pipeline promises callers:
/// nullable fields, stripped unknown properties, and exhaustive error
/// collection are all on by default.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The nullable-representation convention documents are compiled with.
    pub nullable: NullableStyle,
    /// Remove undeclared object properties before validation instead of
    /// letting `additionalProperties: false` reject them.
    pub strip_unknown: bool,
    /// Collect every violation rather than stopping at the first.
    pub all_errors: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nullable: NullableStyle::default(),
            strip_unknown: true,
            all_errors: true,
        }
    }
}

impl EngineConfig {
    /// Set the nullable-representation convention.
    pub fn nullable(mut self, style: NullableStyle) -> Self {
        self.nullable = style;
        self
    }

    /// Toggle stripping of undeclared properties.
    pub fn strip_unknown(mut self, strip: bool) -> Self {
        self.strip_unknown = strip;
        self
    }

    /// Toggle exhaustive violation collection.
    pub fn all_errors(mut self, all: bool) -> Self {
        self.all_errors = all;
        self
    }
}

/// Error from the validation engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The key was never registered.
    #[error("no schema registered under key '{0}'")]
    UnknownSchema(String),

    /// The registered document could not be compiled into a validator.
    #[error("schema '{key}' failed to compile: {reason}")]
    InvalidSchema {
        /// The registration key.
        key: String,
        /// Why compilation failed.
        reason: String,
    },

    /// The value was rejected by the schema.
    #[error("value rejected by schema '{key}' ({} violation(s))", violations.len())]
    Rejected {
        /// The registration key.
        key: String,
        /// Every violation found (or the first, per [`EngineConfig`]).
        violations: Vec<Violation>,
    },
}

/// The narrow engine contract the rest of the workspace programs against.
///
/// `add_schema` is idempotent per key: registering a key that is already
/// present is a no-op success, so a racing duplicate registration is
/// indistinguishable from "already registered".
pub trait ValidationEngine: Send + Sync {
    /// Register a schema document under a stable key.
    fn add_schema(&self, key: &str, document: Value) -> Result<(), EngineError>;

    /// Whether a document is registered under the key.
    fn has_schema(&self, key: &str) -> bool;

    /// Validate a value against the schema registered under `key`.
    ///
    /// May rewrite the value (stripping undeclared properties) when the
    /// engine is configured to do so.
    ///
    /// # Errors
    ///
    /// [`EngineError::Rejected`] with structured violations when the value
    /// fails the schema; [`EngineError::UnknownSchema`] when the key was
    /// never registered.
    fn validate(&self, key: &str, value: &mut Value) -> Result<(), EngineError>;
}

struct EngineState {
    documents: HashMap<String, Value>,
    compiled: HashMap<String, Arc<Validator>>,
}

/// Default engine: an in-memory schema table plus lazily compiled
/// `jsonschema` validators.
///
/// Send + Sync — one engine is shared by every in-flight request of a
/// pipeline. The table is append-only; see the module docs for why the
/// compiled-validator cache never needs invalidation.
pub struct JsonSchemaEngine {
    config: EngineConfig,
    state: RwLock<EngineState>,
}

impl JsonSchemaEngine {
    /// An empty engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: RwLock::new(EngineState {
                documents: HashMap::new(),
                compiled: HashMap::new(),
            }),
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn validator_for(&self, key: &str) -> Result<Arc<Validator>, EngineError> {
        let (document, documents) = {
            // A poisoned lock only means another request panicked; the
            // table itself is append-only and stays coherent.
            let state = self.state.read().unwrap_or_else(|p| p.into_inner());
            if let Some(validator) = state.compiled.get(key) {
                return Ok(Arc::clone(validator));
            }
            let document = state
                .documents
                .get(key)
                .cloned()
                .ok_or_else(|| EngineError::UnknownSchema(key.to_string()))?;
            (document, state.documents.clone())
        };

        let mut options = jsonschema::options();
        options.with_draft(Draft::Draft202012);
        options.should_validate_formats(true);
        options.with_retriever(TableRetriever { documents });

        let validator = options
            .build(&document)
            .map_err(|e| EngineError::InvalidSchema {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        let validator = Arc::new(validator);

        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        // Two requests may race to compile the same key; both products are
        // equivalent, so last-write-wins is harmless.
        state
            .compiled
            .insert(key.to_string(), Arc::clone(&validator));
        Ok(validator)
    }
}

impl Default for JsonSchemaEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for JsonSchemaEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        f.debug_struct("JsonSchemaEngine")
            .field("config", &self.config)
            .field("schemas", &state.documents.len())
            .field("compiled", &state.compiled.len())
            .finish()
    }
}

impl ValidationEngine for JsonSchemaEngine {
    fn add_schema(&self, key: &str, document: Value) -> Result<(), EngineError> {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        if state.documents.contains_key(key) {
            tracing::debug!(key, "duplicate schema registration ignored");
            return Ok(());
        }
        state.documents.insert(key.to_string(), document);
        Ok(())
    }

    fn has_schema(&self, key: &str) -> bool {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        state.documents.contains_key(key)
    }

    fn validate(&self, key: &str, value: &mut Value) -> Result<(), EngineError> {
        let validator = self.validator_for(key)?;
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        let document = state
            .documents
            .get(key)
            .ok_or_else(|| EngineError::UnknownSchema(key.to_string()))?;

        if self.config.strip_unknown {
            strip_unknown(value, document, &state.documents);
        }

        let violations: Vec<Violation> = if self.config.all_errors {
            validator
                .iter_errors(value)
                .map(|e| {
                    violation_from(
                        &e.instance_path.to_string(),
                        &e.schema_path.to_string(),
                        e.to_string(),
                        document,
                        &state.documents,
                    )
                })
                .collect()
        } else {
            match validator.validate(value) {
                Ok(()) => Vec::new(),
                Err(e) => vec![violation_from(
                    &e.instance_path.to_string(),
                    &e.schema_path.to_string(),
                    e.to_string(),
                    document,
                    &state.documents,
                )],
            }
        };

        if violations.is_empty() {
            Ok(())
        } else {
            tracing::debug!(key, count = violations.len(), "schema rejected value");
            Err(EngineError::Rejected {
                key: key.to_string(),
                violations,
            })
        }
    }
}

fn violation_from(
    instance_path: &str,
    schema_path: &str,
    message: String,
    document: &Value,
    documents: &HashMap<String, Value>,
) -> Violation {
    let keyword = keyword_of(schema_path);
    let params = keyword_operand(schema_path, &keyword, document, documents);
    Violation {
        instance_path: instance_path.to_string(),
        schema_path: schema_path.to_string(),
        keyword,
        message,
        params,
    }
}

/// The last non-index segment of a schema path names the failing keyword.
fn keyword_of(schema_path: &str) -> String {
    schema_path
        .rsplit('/')
        .find(|seg| !seg.is_empty() && !seg.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or("schema")
        .to_string()
}

/// Resolve the failing keyword's operand in the registered documents,
/// following at most the `$ref` hops the schema path itself records.
fn keyword_operand(
    schema_path: &str,
    keyword: &str,
    document: &Value,
    documents: &HashMap<String, Value>,
) -> Value {
    // Schema paths for referenced subschemas traverse "$ref" segments;
    // split on them and chase each hop through the table.
    let mut current = document;
    let mut pointer = String::new();
    for segment in schema_path.split('/').filter(|s| !s.is_empty()) {
        if segment == "$ref" {
            let target = current
                .pointer(&pointer)
                .and_then(|v| v.get("$ref"))
                .and_then(Value::as_str)
                .and_then(model_for_uri)
                .and_then(|name| documents.get(name));
            match target {
                Some(doc) => {
                    current = doc;
                    pointer.clear();
                }
                None => return Value::Null,
            }
        } else {
            pointer.push('/');
            pointer.push_str(segment);
        }
    }
    match current.pointer(&pointer) {
        Some(operand) => json!({ keyword: operand.clone() }),
        None => Value::Null,
    }
}

/// Recursively drop object properties the schema does not declare,
/// following refs, nullable wrappers, and array items.
fn strip_unknown(value: &mut Value, schema: &Value, documents: &HashMap<String, Value>) {
    if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
        if let Some(name) = model_for_uri(reference) {
            if let Some(target) = documents.get(name) {
                strip_unknown(value, target, documents);
            }
        }
        return;
    }

    if let Some(branches) = schema.get("anyOf").and_then(Value::as_array) {
        for branch in branches {
            strip_unknown(value, branch, documents);
        }
        return;
    }

    match value {
        Value::Object(map) => {
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                    map.retain(|k, _| properties.contains_key(k));
                }
                for (name, field_value) in map.iter_mut() {
                    if let Some(subschema) = properties.get(name) {
                        strip_unknown(field_value, subschema, documents);
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for item in items.iter_mut() {
                    strip_unknown(item, item_schema, documents);
                }
            }
        }
        _ => {}
    }
}

/// Resolves `$ref` URIs against the engine's schema table. Unknown URIs
/// are an error — see the module docs.
struct TableRetriever {
    documents: HashMap<String, Value>,
}

impl Retrieve for TableRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let uri_str = uri.as_str();
        if let Some(document) = model_for_uri(uri_str).and_then(|name| self.documents.get(name)) {
            return Ok(document.clone());
        }
        Err(format!("unknown schema reference '{uri_str}'").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::schema_uri;
    use serde_json::json;

    fn engine_with(config: EngineConfig, schemas: &[(&str, Value)]) -> JsonSchemaEngine {
        let engine = JsonSchemaEngine::new(config);
        for (key, document) in schemas {
            engine.add_schema(key, document.clone()).unwrap();
        }
        engine
    }

    fn invoice_schema() -> Value {
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "$id": schema_uri("Invoice"),
            "type": "object",
            "properties": {
                "amount": {"type": "number"},
                "note": {"type": "string"}
            },
            "required": ["amount"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_accepts_valid_value() {
        let engine = engine_with(EngineConfig::default(), &[("Invoice", invoice_schema())]);
        let mut value = json!({"amount": 10, "note": "ok"});
        engine.validate("Invoice", &mut value).unwrap();
    }

    #[test]
    fn test_rejects_with_structured_violation() {
        let engine = engine_with(EngineConfig::default(), &[("Invoice", invoice_schema())]);
        let mut value = json!({"amount": "ten"});
        let err = engine.validate("Invoice", &mut value).unwrap_err();
        let EngineError::Rejected { key, violations } = err else {
            panic!("expected rejection");
        };
        assert_eq!(key, "Invoice");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].instance_path, "/amount");
        assert_eq!(violations[0].keyword, "type");
        assert_eq!(violations[0].params, json!({"type": "number"}));
    }

    #[test]
    fn test_all_errors_collects_every_violation() {
        let engine = engine_with(EngineConfig::default(), &[("Invoice", invoice_schema())]);
        let mut value = json!({"amount": "ten", "note": 5});
        let EngineError::Rejected { violations, .. } =
            engine.validate("Invoice", &mut value).unwrap_err()
        else {
            panic!("expected rejection");
        };
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn test_first_error_only() {
        let engine = engine_with(
            EngineConfig::default().all_errors(false),
            &[("Invoice", invoice_schema())],
        );
        let mut value = json!({"amount": "ten", "note": 5});
        let EngineError::Rejected { violations, .. } =
            engine.validate("Invoice", &mut value).unwrap_err()
        else {
            panic!("expected rejection");
        };
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_strip_unknown_removes_undeclared_properties() {
        let engine = engine_with(EngineConfig::default(), &[("Invoice", invoice_schema())]);
        let mut value = json!({"amount": 10, "rogue": true});
        engine.validate("Invoice", &mut value).unwrap();
        assert_eq!(value, json!({"amount": 10}));
    }

    #[test]
    fn test_unknown_properties_reject_when_strip_disabled() {
        let engine = engine_with(
            EngineConfig::default().strip_unknown(false),
            &[("Invoice", invoice_schema())],
        );
        let mut value = json!({"amount": 10, "rogue": true});
        let err = engine.validate("Invoice", &mut value).unwrap_err();
        assert!(matches!(err, EngineError::Rejected { .. }));
        assert_eq!(value["rogue"], json!(true));
    }

    #[test]
    fn test_cross_schema_ref_resolution() {
        let outer = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "$id": schema_uri("Order"),
            "type": "object",
            "properties": {
                "invoice": {"$ref": schema_uri("Invoice")}
            },
            "required": ["invoice"],
            "additionalProperties": false
        });
        let engine = engine_with(
            EngineConfig::default(),
            &[("Invoice", invoice_schema()), ("Order", outer)],
        );
        let mut ok = json!({"invoice": {"amount": 5}});
        engine.validate("Order", &mut ok).unwrap();

        let mut bad = json!({"invoice": {"amount": "five"}});
        let EngineError::Rejected { violations, .. } =
            engine.validate("Order", &mut bad).unwrap_err()
        else {
            panic!("expected rejection");
        };
        assert_eq!(violations[0].instance_path, "/invoice/amount");
    }

    #[test]
    fn test_strip_unknown_recurses_through_refs() {
        let outer = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "$id": schema_uri("Order"),
            "type": "object",
            "properties": {
                "invoice": {"$ref": schema_uri("Invoice")}
            },
            "additionalProperties": false
        });
        let engine = engine_with(
            EngineConfig::default(),
            &[("Invoice", invoice_schema()), ("Order", outer)],
        );
        let mut value = json!({"invoice": {"amount": 5, "rogue": 1}, "extra": []});
        engine.validate("Order", &mut value).unwrap();
        assert_eq!(value, json!({"invoice": {"amount": 5}}));
    }

    #[test]
    fn test_unknown_schema_key() {
        let engine = JsonSchemaEngine::default();
        let mut value = json!({});
        let err = engine.validate("Nowhere", &mut value).unwrap_err();
        assert!(matches!(err, EngineError::UnknownSchema(_)));
    }

    #[test]
    fn test_duplicate_registration_is_noop() {
        let engine = JsonSchemaEngine::default();
        engine.add_schema("Invoice", invoice_schema()).unwrap();
        engine
            .add_schema("Invoice", json!({"type": "string"}))
            .unwrap();
        // First registration wins.
        let mut value = json!({"amount": 1});
        engine.validate("Invoice", &mut value).unwrap();
    }

    #[test]
    fn test_nullable_union_accepts_null_member() {
        let schema = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "$id": schema_uri("N"),
            "type": "object",
            "properties": {
                "when": {"type": ["string", "null"], "format": "date-time"}
            },
            "additionalProperties": false
        });
        let engine = engine_with(EngineConfig::default(), &[("N", schema)]);
        let mut value = json!({"when": null});
        engine.validate("N", &mut value).unwrap();
        assert_eq!(value, json!({"when": null}));
    }

    #[test]
    fn test_format_assertion_enforced() {
        let schema = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "$id": schema_uri("T"),
            "type": "object",
            "properties": {
                "when": {"type": "string", "format": "date-time"}
            },
            "additionalProperties": false
        });
        let engine = engine_with(EngineConfig::default(), &[("T", schema)]);
        let mut bad = json!({"when": "not a timestamp"});
        let EngineError::Rejected { violations, .. } =
            engine.validate("T", &mut bad).unwrap_err()
        else {
            panic!("expected rejection");
        };
        assert_eq!(violations[0].keyword, "format");
    }
}
