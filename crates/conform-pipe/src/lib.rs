//! # conform-pipe — The Request Validation/Coercion Pipeline
//!
//! The entry point an HTTP framework calls once per request parameter:
//! [`Pipeline::transform`] takes a raw JSON value and the parameter's
//! declared type, decides between override coercion, schema validation,
//! and pass-through, and hands back either a coerced value or an error.
//!
//! ## Decision Tree
//!
//! 1. An exact coercion-registry match wins over everything, including
//!    schema validation for a name that is also a registered model.
//! 2. `Any` (and primitive identities with no registry entry) pass
//!    through untouched.
//! 3. A `Named` type known to the model registry is schema-validated —
//!    registering its schema and transitive dependencies on first use —
//!    then optionally re-parsed into richer typed values.
//! 4. A `Named` type known to neither registry is a configuration error,
//!    deliberately distinct from a validation failure: the API declared a
//!    parameter this layer cannot handle.
//!
//! ## Failure Surface
//!
//! Rejections become a [`ValidationFailure`] record. With a configured
//! error handler the record is handed over and the handler's result is
//! the transform result; without one the caller sees only the generic
//! [`PipeError::InvalidPayload`] — no engine internals leak by default.
//!
//! Each pipeline owns its registration state. Two pipelines never share
//! schemas; a model used by both is compiled by both.

pub mod parse;
pub mod pipeline;
pub mod report;

pub use parse::{DescriptorParser, ModelParser, ParseError, ParseOptions};
pub use pipeline::{Pipeline, PipelineBuilder, PipeError};
pub use report::ValidationFailure;

// The pipeline is the crate consumers depend on; re-export the types its
// API surface is built from.
pub use conform_core::{
    Coerced, CoercionEntry, CoercionRegistry, DeclaredType, FieldDescriptor, FieldShape,
    ModelDescriptor, ModelRegistry, ParamMetadata, ParamSource,
};
pub use conform_schema::{
    EngineConfig, EngineError, JsonSchemaEngine, NullableStyle, SchemaError, ValidationEngine,
    Violation,
};
