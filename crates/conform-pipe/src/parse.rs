//! # Model Re-Typing
//!
//! After a payload passes schema validation, the pipeline can rebuild it
//! as a properly typed value. The [`ModelParser`] trait is that
//! collaborator; [`DescriptorParser`] is the default implementation,
//! which walks the model descriptor and canonicalizes what the wire
//! format leaves ambiguous — most importantly timestamps, which arrive
//! as text in any RFC 3339 offset and leave as UTC `Z` text.
//!
//! Null field values short-circuit: a nullable field that validated as
//! `null` stays `null`, whatever its declared shape.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use conform_core::{timestamp_value, FieldShape, ModelDescriptor, ModelRegistry};
use serde_json::Value;
use thiserror::Error;

/// Options for the re-typing pass.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Accept timestamps with any UTC offset and convert them to `Z`.
    /// When false, only the `Z` suffix is accepted — the strict policy
    /// for payloads that feed canonical byte representations.
    pub lenient_timestamps: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            lenient_timestamps: true,
        }
    }
}

/// Error during re-typing. These occur after successful validation, so
/// they indicate a configuration gap (a nested model missing from the
/// registry, or a strict-mode policy violation), not a bad payload.
#[derive(Error, Debug)]
pub enum ParseError {
    /// A timestamp field could not be rebuilt.
    #[error("field '{field}': invalid timestamp {value}: {reason}")]
    InvalidTimestamp {
        /// The field being parsed.
        field: String,
        /// The offending value, as text.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A nested model name is not in the registry.
    #[error("nested model '{0}' is not a registered model")]
    UnknownModel(String),
}

/// Rebuilds a schema-valid value as its declared native types.
/// Invoked only after validation succeeds (or when validation is
/// disabled wholesale).
pub trait ModelParser: Send + Sync {
    /// Re-type `value` according to `model`.
    fn parse(
        &self,
        model: &ModelDescriptor,
        value: Value,
        options: &ParseOptions,
    ) -> Result<Value, ParseError>;
}

/// Default re-typing collaborator: a recursive walk over the descriptor.
#[derive(Debug)]
pub struct DescriptorParser {
    models: Arc<ModelRegistry>,
}

impl DescriptorParser {
    /// A parser resolving nested models through the given registry.
    pub fn new(models: Arc<ModelRegistry>) -> Self {
        Self { models }
    }

    fn parse_shape(
        &self,
        shape: &FieldShape,
        value: Value,
        options: &ParseOptions,
        field: &str,
    ) -> Result<Value, ParseError> {
        match shape {
            FieldShape::Timestamp => normalize_timestamp(value, options, field),
            FieldShape::Model(name) => {
                let model = self
                    .models
                    .get(name)
                    .ok_or_else(|| ParseError::UnknownModel(name.clone()))?;
                self.parse(&model, value, options)
            }
            FieldShape::Array(inner) => match value {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| self.parse_shape(inner, item, options, field))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                other => Ok(other),
            },
            _ => Ok(value),
        }
    }
}

impl ModelParser for DescriptorParser {
    fn parse(
        &self,
        model: &ModelDescriptor,
        value: Value,
        options: &ParseOptions,
    ) -> Result<Value, ParseError> {
        let mut map = match value {
            Value::Object(map) => map,
            // Schema validation guarantees an object for model values;
            // anything else means validation was bypassed — leave it be.
            other => return Ok(other),
        };
        for field in model.fields() {
            if let Some(slot) = map.get_mut(field.name()) {
                if slot.is_null() {
                    continue;
                }
                let current = std::mem::take(slot);
                *slot = self.parse_shape(field.shape(), current, options, field.name())?;
            }
        }
        Ok(Value::Object(map))
    }
}

fn normalize_timestamp(
    value: Value,
    options: &ParseOptions,
    field: &str,
) -> Result<Value, ParseError> {
    let instant = match &value {
        Value::String(s) => {
            if !options.lenient_timestamps && !s.ends_with('Z') {
                return Err(ParseError::InvalidTimestamp {
                    field: field.to_string(),
                    value: s.clone(),
                    reason: "timestamp must use the Z suffix (UTC only)".to_string(),
                });
            }
            DateTime::parse_from_rfc3339(s)
                .map_err(|e| ParseError::InvalidTimestamp {
                    field: field.to_string(),
                    value: s.clone(),
                    reason: e.to_string(),
                })?
                .with_timezone(&Utc)
        }
        Value::Number(_) => {
            timestamp_value(&value).ok_or_else(|| ParseError::InvalidTimestamp {
                field: field.to_string(),
                value: value.to_string(),
                reason: "epoch milliseconds out of range".to_string(),
            })?
        }
        _ => return Ok(value),
    };
    Ok(Value::String(
        instant.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    ))
}
