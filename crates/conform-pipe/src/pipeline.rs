//! # The Per-Request Pipeline
//!
//! [`Pipeline::transform`] is invoked once per request parameter. The
//! declared type is classified exactly once into a closed variant —
//! overridden, structured, pass-through, or unrecognized — and matched
//! exhaustively; there is no truthiness chain to fall through.
//!
//! Construction wires in everything the pipeline will ever consult: the
//! model registry, the coercion registry (built-ins plus caller entries),
//! the validation engine and its schema cache, the re-typing parser, and
//! the optional error handler. Nothing is looked up globally.

use std::fmt;
use std::sync::Arc;

use conform_core::{
    Coerced, CoercionEntry, CoercionRegistry, DeclaredType, ModelDescriptor, ModelRegistry,
    ParamMetadata, ParamSource,
};
use conform_schema::{
    CompileOptions, EngineConfig, EngineError, JsonSchemaEngine, SchemaCache, SchemaError,
    ValidationEngine,
};
use serde_json::Value;
use thiserror::Error;

use crate::parse::{DescriptorParser, ModelParser, ParseError, ParseOptions};
use crate::report::ValidationFailure;

/// Caller-supplied rejection handler. Receives the normalized failure
/// record and produces the transform result — a substitute value or an
/// error of its choosing.
pub type ErrorHandler = dyn Fn(ValidationFailure) -> Result<Coerced, PipeError> + Send + Sync;

/// Error surface of [`Pipeline::transform`].
#[derive(Error, Debug)]
pub enum PipeError {
    /// The payload failed validation and no error handler is configured.
    /// Deliberately detail-free: validation internals are not exposed
    /// unless the caller opts in with a handler.
    #[error("validation failed")]
    InvalidPayload,

    /// The payload failed validation; carries the full normalized record.
    /// Never produced by the pipeline itself — available for error
    /// handlers that want to surface details.
    #[error("validation failed for {}: {}", failure.type_name, failure.message)]
    Rejected {
        /// The normalized failure record.
        failure: ValidationFailure,
    },

    /// The parameter declares a named type known to neither the coercion
    /// registry nor the model registry. A programming error in the API
    /// declaration, not a bad payload.
    #[error("{role} parameter declares unusable type '{name}'")]
    UnusableType {
        /// The parameter's role within the request.
        role: ParamSource,
        /// The unusable declared type's name.
        name: String,
    },

    /// Schema compilation/registration failed.
    #[error("schema registration failed: {0}")]
    Schema(#[from] SchemaError),

    /// The validated value could not be re-typed.
    #[error("validated value could not be parsed: {0}")]
    Parse(#[from] ParseError),
}

struct ValidationStage {
    cache: SchemaCache,
    engine: Arc<dyn ValidationEngine>,
}

struct ParsingStage {
    parser: Arc<dyn ModelParser>,
    options: ParseOptions,
}

/// The classification of one declared type, computed once per call.
enum TypeClass<'a> {
    Overridden(&'a CoercionEntry),
    Structured(Arc<ModelDescriptor>),
    Passthrough,
    Unrecognized(&'a str),
}

/// The request validation/coercion pipeline.
///
/// One instance serves every in-flight request of an application
/// (`Send + Sync`); its registration state is private to it.
pub struct Pipeline {
    models: Arc<ModelRegistry>,
    coercions: CoercionRegistry,
    validation: Option<ValidationStage>,
    parsing: Option<ParsingStage>,
    error_handler: Option<Box<ErrorHandler>>,
}

impl Pipeline {
    /// Start configuring a pipeline over the given model registry.
    pub fn builder(models: impl Into<Arc<ModelRegistry>>) -> PipelineBuilder {
        PipelineBuilder::new(models.into())
    }

    /// Validate and coerce one parameter value.
    ///
    /// # Errors
    ///
    /// [`PipeError::InvalidPayload`] (or the error handler's result) when
    /// the value fails validation; [`PipeError::UnusableType`] when the
    /// declared type cannot be handled at all; [`PipeError::Schema`] and
    /// [`PipeError::Parse`] for configuration-level failures.
    pub fn transform(
        &self,
        value: Value,
        metadata: &ParamMetadata,
    ) -> Result<Coerced, PipeError> {
        tracing::trace!(
            declared = %metadata.declared,
            source = %metadata.source,
            "transform"
        );
        match self.classify(&metadata.declared) {
            TypeClass::Overridden(entry) => {
                if let Some(message) = entry.validate(&value) {
                    return self.reject(ValidationFailure::from_message(
                        &metadata.declared,
                        message,
                    ));
                }
                Ok(entry.parse(&value))
            }
            TypeClass::Passthrough => Ok(Coerced::Json(value)),
            TypeClass::Structured(model) => self.transform_structured(value, &model, metadata),
            TypeClass::Unrecognized(name) => Err(PipeError::UnusableType {
                role: metadata.source.clone(),
                name: name.to_string(),
            }),
        }
    }

    fn transform_structured(
        &self,
        mut value: Value,
        model: &ModelDescriptor,
        metadata: &ParamMetadata,
    ) -> Result<Coerced, PipeError> {
        if let Some(validation) = &self.validation {
            validation.cache.ensure_registered(model)?;
            if let Err(err) = validation.engine.validate(model.name(), &mut value) {
                return match err {
                    EngineError::Rejected { violations, .. } => self.reject(
                        ValidationFailure::from_violations(&metadata.declared, violations),
                    ),
                    other => Err(PipeError::Schema(other.into())),
                };
            }
        }
        match &self.parsing {
            Some(stage) => Ok(Coerced::Json(stage.parser.parse(
                model,
                value,
                &stage.options,
            )?)),
            None => Ok(Coerced::Json(value)),
        }
    }

    fn reject(&self, failure: ValidationFailure) -> Result<Coerced, PipeError> {
        tracing::debug!(declared = failure.type_name.as_str(), "payload rejected");
        match &self.error_handler {
            Some(handler) => handler(failure),
            None => Err(PipeError::InvalidPayload),
        }
    }

    fn classify<'a>(&'a self, declared: &'a DeclaredType) -> TypeClass<'a> {
        if let Some(entry) = self.coercions.lookup(declared) {
            if let DeclaredType::Named(name) = declared {
                if self.models.is_model(name) {
                    tracing::debug!(
                        model = name.as_str(),
                        "coercion override shadows a registered model"
                    );
                }
            }
            return TypeClass::Overridden(entry);
        }
        match declared {
            DeclaredType::Named(name) => match self.models.get(name) {
                Some(model) => TypeClass::Structured(model),
                None => TypeClass::Unrecognized(name),
            },
            // Primitive identities only land here when the caller
            // replaced the registry wholesale; without an entry they are
            // plain values with nothing to check.
            DeclaredType::Any
            | DeclaredType::Text
            | DeclaredType::Number
            | DeclaredType::Bool
            | DeclaredType::Timestamp => TypeClass::Passthrough,
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("models", &self.models.len())
            .field("validation", &self.validation.is_some())
            .field("parsing", &self.parsing.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

/// Construction-time configuration for [`Pipeline`].
pub struct PipelineBuilder {
    models: Arc<ModelRegistry>,
    coercions: CoercionRegistry,
    engine: Option<Arc<dyn ValidationEngine>>,
    engine_config: EngineConfig,
    validate: bool,
    parser: Option<Arc<dyn ModelParser>>,
    parse_options: ParseOptions,
    parse: bool,
    error_handler: Option<Box<ErrorHandler>>,
}

impl PipelineBuilder {
    fn new(models: Arc<ModelRegistry>) -> Self {
        Self {
            models,
            coercions: CoercionRegistry::builtin(),
            engine: None,
            engine_config: EngineConfig::default(),
            validate: true,
            parser: None,
            parse_options: ParseOptions::default(),
            parse: true,
            error_handler: None,
        }
    }

    /// Register a coercion entry. Later registrations win on identity
    /// collision, including over the built-ins.
    pub fn coercion(mut self, identity: DeclaredType, entry: CoercionEntry) -> Self {
        self.coercions.insert(identity, entry);
        self
    }

    /// Replace the coercion registry wholesale (built-ins included).
    pub fn coercion_registry(mut self, registry: CoercionRegistry) -> Self {
        self.coercions = registry;
        self
    }

    /// Install a rejection handler. It receives every normalized failure
    /// record and its result becomes the transform result.
    pub fn error_handler(
        mut self,
        handler: impl Fn(ValidationFailure) -> Result<Coerced, PipeError> + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Some(Box::new(handler));
        self
    }

    /// Configure the default engine (nullable convention, unknown-property
    /// stripping, exhaustive error collection).
    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// Substitute a validation engine. The nullable convention from
    /// [`Self::engine_config`] still governs schema compilation.
    pub fn engine(mut self, engine: Arc<dyn ValidationEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Disable schema validation entirely: structured values pass through
    /// after the override check (re-typing still applies).
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Substitute the re-typing collaborator.
    pub fn parser(mut self, parser: Arc<dyn ModelParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Configure the default re-typing pass.
    pub fn parse_options(mut self, options: ParseOptions) -> Self {
        self.parse_options = options;
        self
    }

    /// Disable re-typing: schema-valid values are returned as-is.
    pub fn without_parsing(mut self) -> Self {
        self.parse = false;
        self
    }

    /// Finish the pipeline.
    pub fn build(self) -> Pipeline {
        let validation = self.validate.then(|| {
            let engine = self
                .engine
                .unwrap_or_else(|| Arc::new(JsonSchemaEngine::new(self.engine_config.clone())));
            let options = CompileOptions {
                nullable: self.engine_config.nullable,
            };
            ValidationStage {
                cache: SchemaCache::new(Arc::clone(&self.models), Arc::clone(&engine), options),
                engine,
            }
        });
        let parsing = self.parse.then(|| ParsingStage {
            parser: self
                .parser
                .unwrap_or_else(|| Arc::new(DescriptorParser::new(Arc::clone(&self.models)))),
            options: self.parse_options,
        });
        Pipeline {
            models: self.models,
            coercions: self.coercions,
            validation,
            parsing,
            error_handler: self.error_handler,
        }
    }
}
