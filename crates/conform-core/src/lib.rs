//! # conform-core — Foundational Types for the Conform Validation Layer
//!
//! This crate is the leaf of the conform workspace. It defines the
//! type-system primitives the validation pipeline is built from:
//!
//! 1. **Closed declared-type identities.** [`DeclaredType`] is a single
//!    enum over everything a caller can declare for a request parameter —
//!    the four well-known primitives, a named model, or nothing at all.
//!    Every consumer matches it exhaustively; there is no open-ended
//!    "is this a model?" introspection anywhere in the workspace.
//!
//! 2. **Explicit model descriptors.** [`ModelDescriptor`] enumerates a
//!    model's fields as (name, shape) pairs through a builder. The
//!    [`ModelRegistry`] is the structural-marker check: a name is a model
//!    iff it was registered, queryable as the pure function
//!    [`ModelRegistry::is_model`].
//!
//! 3. **Ad-hoc coercion entries.** [`CoercionRegistry`] maps declared-type
//!    identities to validator/parser pairs, seeded with the built-in
//!    string/number/boolean/timestamp entries. A parser only ever runs on
//!    a value its validator accepted.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `conform-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.
//! - Registries are plain owned state — construction wires them into a
//!   pipeline explicitly; nothing in this crate is process-global.

pub mod coerce;
pub mod declared;
pub mod model;

// Re-export primary types for ergonomic imports.
pub use coerce::{
    boolean_literal, numeric_value, timestamp_value, Coerced, CoercionEntry, CoercionRegistry,
};
pub use declared::{DeclaredType, ParamMetadata, ParamSource};
pub use model::{FieldDescriptor, FieldShape, ModelBuilder, ModelDescriptor, ModelRegistry};
