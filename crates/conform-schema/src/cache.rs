//! # Memoized Schema Registration
//!
//! [`SchemaCache`] compiles and registers a model's schema document — and
//! those of every model it transitively references — into the validation
//! engine, exactly once per model name.
//!
//! ## Registration Invariant
//!
//! A dependency's document is submitted to the engine before or within the
//! same registration pass as its dependents, so no reference is ever
//! evaluated before its schema exists. A name is added to the
//! registered set immediately on entry: a cyclic model graph re-enters,
//! finds the name present, and unwinds without recompiling. The set's
//! mutex is held for the entire pass — overlapping first-time
//! registrations of the same model from concurrent requests serialize
//! instead of double-registering.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use conform_core::{ModelDescriptor, ModelRegistry};
use thiserror::Error;

use crate::compile::{compile, CompileOptions};
use crate::engine::{EngineError, ValidationEngine};

/// Error during schema registration.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A model references a name the model registry does not know.
    /// A configuration error: the referencing descriptor was built against
    /// a model that was never registered.
    #[error("model '{name}' referenced by '{referenced_by}' is not a registered model")]
    UnknownDependency {
        /// The unresolvable model name.
        name: String,
        /// The model whose field referenced it.
        referenced_by: String,
    },

    /// The engine refused the schema.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Per-pipeline registration state. Owns the registered-name set; shares
/// the model registry and engine with its pipeline.
pub struct SchemaCache {
    models: Arc<ModelRegistry>,
    engine: Arc<dyn ValidationEngine>,
    options: CompileOptions,
    registered: Mutex<HashSet<String>>,
}

impl SchemaCache {
    /// A cache over the given registry and engine. `options` applies to
    /// every compilation this cache performs — one convention per cache.
    pub fn new(
        models: Arc<ModelRegistry>,
        engine: Arc<dyn ValidationEngine>,
        options: CompileOptions,
    ) -> Self {
        Self {
            models,
            engine,
            options,
            registered: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a model name has completed registration.
    pub fn is_registered(&self, name: &str) -> bool {
        let registered = self.registered.lock().unwrap_or_else(|p| p.into_inner());
        registered.contains(name)
    }

    /// Compile and register `model` and its transitive dependencies,
    /// once per name. Idempotent; cycle-safe.
    ///
    /// # Errors
    ///
    /// [`SchemaError::UnknownDependency`] when a referenced model is not
    /// in the registry; engine errors pass through. On failure the
    /// entering name is unmarked so a later call can retry.
    pub fn ensure_registered(&self, model: &ModelDescriptor) -> Result<(), SchemaError> {
        let mut registered = self.registered.lock().unwrap_or_else(|p| p.into_inner());
        self.register_locked(model, &mut registered)
    }

    fn register_locked(
        &self,
        model: &ModelDescriptor,
        registered: &mut HashSet<String>,
    ) -> Result<(), SchemaError> {
        // Mark on entry: a cyclic re-visit must find the name present.
        if !registered.insert(model.name().to_string()) {
            return Ok(());
        }
        match self.register_dependencies_then_self(model, registered) {
            Ok(()) => Ok(()),
            Err(err) => {
                registered.remove(model.name());
                Err(err)
            }
        }
    }

    fn register_dependencies_then_self(
        &self,
        model: &ModelDescriptor,
        registered: &mut HashSet<String>,
    ) -> Result<(), SchemaError> {
        let compiled = compile(model, &self.options);
        for dependency in &compiled.dependencies {
            let descriptor =
                self.models
                    .get(dependency)
                    .ok_or_else(|| SchemaError::UnknownDependency {
                        name: dependency.clone(),
                        referenced_by: model.name().to_string(),
                    })?;
            self.register_locked(&descriptor, registered)?;
        }
        self.engine.add_schema(model.name(), compiled.document)?;
        tracing::debug!(model = model.name(), "schema registered");
        Ok(())
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered = self.registered.lock().unwrap_or_else(|p| p.into_inner());
        f.debug_struct("SchemaCache")
            .field("options", &self.options)
            .field("registered", &*registered)
            .finish()
    }
}
