//! # conform-schema — Schema Compilation, Registration & Validation
//!
//! Turns model descriptors into JSON Schema documents and validates
//! payloads against them through a pluggable engine.
//!
//! ## Compilation (`compile`)
//!
//! [`compile`] builds one draft 2020-12 document per model. Model-typed
//! fields become `$ref`s under the registry URI prefix, so a document is
//! only evaluable once its dependencies are registered — which is exactly
//! what [`SchemaCache`] guarantees.
//!
//! ## The Engine (`engine`)
//!
//! [`ValidationEngine`] is the narrow contract this layer needs from a
//! schema validator: register a document under a key, ask whether a key is
//! known, validate a value against a key. [`JsonSchemaEngine`] is the
//! default implementation, backed by the `jsonschema` crate with an
//! in-memory schema table and a retriever that resolves cross-schema
//! `$ref`s from that table — no network, ever.
//!
//! ## Registration (`cache`)
//!
//! [`SchemaCache::ensure_registered`] memoizes registration per model
//! name, walks dependencies depth-first, and survives cyclic model graphs
//! by marking a name on entry. One cache per pipeline instance; two
//! pipelines never share registration state.

pub mod cache;
pub mod compile;
pub mod engine;

pub use cache::{SchemaCache, SchemaError};
pub use compile::{compile, schema_uri, CompileOptions, CompiledSchema, NullableStyle};
pub use engine::{EngineConfig, EngineError, JsonSchemaEngine, ValidationEngine, Violation};
