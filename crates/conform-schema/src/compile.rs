//! # Descriptor → Schema Document Compilation
//!
//! One model descriptor compiles to one draft 2020-12 schema document
//! plus the list of model names it references. Compilation is pure and
//! infallible — every shape the descriptor vocabulary can express has a
//! schema rendering.
//!
//! ## Schema Resolution
//!
//! Documents carry `$id` URIs of the form:
//!   `https://schemas.conform.dev/models/<Name>.schema.json`
//!
//! Model-typed fields emit `$ref` URIs in the same form. The engine
//! resolves these against its in-memory table; nothing is ever fetched.

use conform_core::{FieldShape, ModelDescriptor};
use serde_json::{json, Map, Value};

/// URI prefix for all registry schema documents.
pub const SCHEMA_URI_PREFIX: &str = "https://schemas.conform.dev/models/";

/// The `$id` / `$ref` URI for a model name.
pub fn schema_uri(name: &str) -> String {
    format!("{SCHEMA_URI_PREFIX}{name}.schema.json")
}

pub(crate) fn model_for_uri(uri: &str) -> Option<&str> {
    uri.strip_prefix(SCHEMA_URI_PREFIX)?.strip_suffix(".schema.json")
}

/// How "this field may be explicitly null" is rendered in a document.
///
/// A cache compiles every model with one fixed style; mixing styles across
/// registration passes would drift the stored representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullableStyle {
    /// Scalar types grow a `"null"` member in their `type` keyword;
    /// fragments without a plain `type` (refs, raw fragments) fall back
    /// to an `anyOf` wrapper.
    #[default]
    TypeUnion,
    /// Every nullable field is wrapped in `anyOf: [{"type": "null"}, …]`.
    AnyOf,
}

/// Compilation options. Held by the cache so every model in one registry
/// is compiled the same way.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// The nullable-representation convention.
    pub nullable: NullableStyle,
}

/// A compiled document and the models it references directly.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    /// The draft 2020-12 schema document.
    pub document: Value,
    /// Names of directly referenced models, in field order.
    pub dependencies: Vec<String>,
}

/// Compile a model descriptor into a schema document.
pub fn compile(model: &ModelDescriptor, options: &CompileOptions) -> CompiledSchema {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in model.fields() {
        let mut fragment = shape_fragment(field.shape());
        if field.is_nullable() {
            fragment = nullable_fragment(fragment, options.nullable);
        }
        properties.insert(field.name().to_string(), fragment);
        if field.is_required() {
            required.push(Value::String(field.name().to_string()));
        }
    }

    let mut document = json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": schema_uri(model.name()),
        "title": model.name(),
        "type": "object",
        "properties": Value::Object(properties),
        "additionalProperties": false,
    });
    if !required.is_empty() {
        document["required"] = Value::Array(required);
    }

    CompiledSchema {
        document,
        dependencies: model.dependencies().iter().map(|s| s.to_string()).collect(),
    }
}

fn shape_fragment(shape: &FieldShape) -> Value {
    match shape {
        FieldShape::Text => json!({"type": "string"}),
        FieldShape::Number => json!({"type": "number"}),
        FieldShape::Bool => json!({"type": "boolean"}),
        FieldShape::Timestamp => json!({"type": "string", "format": "date-time"}),
        FieldShape::Model(name) => json!({"$ref": schema_uri(name)}),
        FieldShape::Array(inner) => json!({"type": "array", "items": shape_fragment(inner)}),
        FieldShape::Raw(fragment) => fragment.clone(),
    }
}

fn nullable_fragment(mut base: Value, style: NullableStyle) -> Value {
    if style == NullableStyle::TypeUnion {
        let scalar = base.get("type").and_then(Value::as_str).map(str::to_string);
        if let Some(t) = scalar {
            if let Some(obj) = base.as_object_mut() {
                obj.insert("type".to_string(), json!([t, "null"]));
                return base;
            }
        }
    }
    json!({"anyOf": [{"type": "null"}, base]})
}
