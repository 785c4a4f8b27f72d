//! # Model Descriptors & the Model Registry
//!
//! A [`ModelDescriptor`] is the declared shape of a structured request
//! payload: a unique name plus an ordered list of fields, each carrying a
//! [`FieldShape`]. Descriptors are built with an explicit builder — there
//! is no reflection and no annotation scanning; whatever the builder was
//! told is the complete truth about the model.
//!
//! The [`ModelRegistry`] is the structural-marker check for the pipeline:
//! a declared type names a model iff the registry knows the name. The
//! registry is owned by whoever constructs it (typically shared into a
//! pipeline via `Arc`), never process-global.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// The shape of a single model field, from which the schema compiler
/// derives one property fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldShape {
    /// UTF-8 text.
    Text,
    /// A JSON number.
    Number,
    /// A boolean.
    Bool,
    /// RFC 3339 date-time text.
    Timestamp,
    /// A reference to another model, by name. Becomes a `$ref` in the
    /// compiled schema and a dependency edge during registration.
    Model(String),
    /// A homogeneous array of the inner shape.
    Array(Box<FieldShape>),
    /// A verbatim JSON-schema fragment. Escape hatch for constraints the
    /// shape vocabulary does not cover; contributes no dependency edges.
    Raw(Value),
}

impl FieldShape {
    /// A reference to another model, by name.
    pub fn model(name: impl Into<String>) -> Self {
        Self::Model(name.into())
    }

    /// An array of the given inner shape.
    pub fn array(inner: FieldShape) -> Self {
        Self::Array(Box::new(inner))
    }

    fn collect_dependencies<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Model(name) => out.push(name),
            Self::Array(inner) => inner.collect_dependencies(out),
            _ => {}
        }
    }
}

/// One declared field of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    name: String,
    shape: FieldShape,
    required: bool,
    nullable: bool,
}

impl FieldDescriptor {
    /// A required, non-nullable field of the given shape.
    pub fn new(name: impl Into<String>, shape: FieldShape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: true,
            nullable: false,
        }
    }

    /// Mark the field optional: it may be absent from the payload.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Mark the field nullable: literal `null` is accepted and passes
    /// through coercion unchanged.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field shape.
    pub fn shape(&self) -> &FieldShape {
        &self.shape
    }

    /// Whether the field must be present.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether literal `null` is a legal value for the field.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// The declared shape of a structured payload type.
///
/// Produced once at application startup (the Rust analogue of a model
/// definition), registered into a [`ModelRegistry`], and treated as
/// immutable from then on.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    /// Start building a descriptor with the given unique name.
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// The model's unique name — also its schema registration key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of the models this descriptor references directly, in field
    /// order, deduplicated. Array element shapes are traversed;
    /// [`FieldShape::Raw`] fragments are not.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps = Vec::new();
        for field in &self.fields {
            field.shape.collect_dependencies(&mut deps);
        }
        let mut seen = Vec::with_capacity(deps.len());
        for dep in deps {
            if !seen.contains(&dep) {
                seen.push(dep);
            }
        }
        seen
    }
}

/// Builder for [`ModelDescriptor`].
#[derive(Debug)]
pub struct ModelBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl ModelBuilder {
    /// Append a field.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> ModelDescriptor {
        ModelDescriptor {
            name: self.name,
            fields: self.fields,
        }
    }
}

/// Name → descriptor table; the structural-marker registry.
///
/// Registration uses map-overwrite semantics: registering a name twice
/// keeps the later descriptor.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<ModelDescriptor>>,
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model under its own name, returning the shared handle.
    pub fn register(&mut self, model: ModelDescriptor) -> Arc<ModelDescriptor> {
        let model = Arc::new(model);
        self.models.insert(model.name().to_string(), Arc::clone(&model));
        model
    }

    /// The pure structural-marker check: is this name a known model?
    pub fn is_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<Arc<ModelDescriptor>> {
        self.models.get(name).cloned()
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice() -> ModelDescriptor {
        ModelDescriptor::builder("Invoice")
            .field(FieldDescriptor::new("amount", FieldShape::Number))
            .field(FieldDescriptor::new("customer", FieldShape::model("Customer")))
            .field(FieldDescriptor::new(
                "lines",
                FieldShape::array(FieldShape::model("Line")),
            ))
            .field(FieldDescriptor::new("note", FieldShape::Text).optional())
            .build()
    }

    #[test]
    fn test_field_lookup() {
        let model = invoice();
        assert_eq!(model.name(), "Invoice");
        assert!(model.field("amount").is_some());
        assert!(model.field("missing").is_none());
        assert!(!model.field("note").unwrap().is_required());
    }

    #[test]
    fn test_dependencies_traverse_arrays_and_dedupe() {
        let model = ModelDescriptor::builder("Wrapper")
            .field(FieldDescriptor::new("a", FieldShape::model("Inner")))
            .field(FieldDescriptor::new(
                "b",
                FieldShape::array(FieldShape::model("Inner")),
            ))
            .field(FieldDescriptor::new("c", FieldShape::model("Other")))
            .build();
        assert_eq!(model.dependencies(), vec!["Inner", "Other"]);
    }

    #[test]
    fn test_raw_fragments_contribute_no_dependencies() {
        let model = ModelDescriptor::builder("Loose")
            .field(FieldDescriptor::new(
                "blob",
                FieldShape::Raw(serde_json::json!({"$ref": "SomethingElse"})),
            ))
            .build();
        assert!(model.dependencies().is_empty());
    }

    #[test]
    fn test_registry_marker_check() {
        let mut registry = ModelRegistry::new();
        assert!(!registry.is_model("Invoice"));
        registry.register(invoice());
        assert!(registry.is_model("Invoice"));
        assert!(registry.get("Invoice").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_overwrite_keeps_latest() {
        let mut registry = ModelRegistry::new();
        registry.register(ModelDescriptor::builder("M").build());
        registry.register(
            ModelDescriptor::builder("M")
                .field(FieldDescriptor::new("v", FieldShape::Number))
                .build(),
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("M").unwrap().fields().len(), 1);
    }
}
