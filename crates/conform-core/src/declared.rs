//! # Declared Types & Parameter Metadata
//!
//! Defines [`DeclaredType`], the closed identity of a request parameter's
//! declared type, and [`ParamMetadata`], the record the HTTP framework
//! supplies with every pipeline invocation.
//!
//! ## Design
//!
//! A declared type is one of exactly six things. There is no runtime
//! introspection of arbitrary values — the pipeline classifies a parameter
//! by matching this enum against its registries, and every `match` is
//! exhaustive. Adding a variant forces every consumer to handle it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The declared type of an incoming request parameter.
///
/// This is the lookup key for the coercion registry (exact-identity match)
/// and, for [`DeclaredType::Named`], the model-registry key. Immutable for
/// the lifetime of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredType {
    /// UTF-8 text.
    Text,
    /// A JSON number (integral or floating point).
    Number,
    /// A boolean flag.
    Bool,
    /// A point in time — RFC 3339 text or epoch milliseconds on the wire.
    Timestamp,
    /// A named structured model (or a custom identity with a registered
    /// coercion entry).
    Named(String),
    /// No declared type. The value passes through untouched.
    Any,
}

impl DeclaredType {
    /// Construct a [`DeclaredType::Named`] identity.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// The readable name used in failure records and error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Text => "String",
            Self::Number => "Number",
            Self::Bool => "Boolean",
            Self::Timestamp => "Timestamp",
            Self::Named(name) => name,
            Self::Any => "Any",
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Where in the request a parameter came from.
///
/// Opaque to the pipeline core — it only appears in error messages and is
/// passed through to error handlers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamSource {
    /// The request body.
    Body,
    /// A query-string parameter.
    Query,
    /// A path segment parameter.
    Path,
    /// A request header.
    Header,
    /// A caller-defined role tag.
    Custom(String),
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Body => f.write_str("body"),
            Self::Query => f.write_str("query"),
            Self::Path => f.write_str("path"),
            Self::Header => f.write_str("header"),
            Self::Custom(tag) => f.write_str(tag),
        }
    }
}

/// Per-invocation metadata the caller supplies alongside the raw value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamMetadata {
    /// The parameter's declared type.
    pub declared: DeclaredType,
    /// The parameter's role within the request.
    pub source: ParamSource,
    /// Opaque caller-supplied context, passed through unchanged to error
    /// handlers. The pipeline never inspects it.
    pub context: Option<Value>,
}

impl ParamMetadata {
    /// Metadata with no caller context.
    pub fn new(declared: DeclaredType, source: ParamSource) -> Self {
        Self {
            declared,
            source,
            context: None,
        }
    }

    /// Attach an opaque context value.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}
