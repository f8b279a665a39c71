use super::adapter::Adapter;
use super::error::OrchestrationError;
use super::fallback::FallbackEngine;
use crate::adapters::fallback::FallbackAdapter;
use crate::adapters::file::FileAdapter;
use crate::core::models::request::Request;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Builds a fresh adapter for each invocation. Construction may fail, e.g. when an
/// in-process library is not present.
pub type AdapterConstructor =
    Box<dyn Fn() -> Result<Box<dyn Adapter>, OrchestrationError> + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum RegistryError {
    #[error("An adapter for program '{0}' is already registered")]
    Duplicate(String),
}

/// The immutable table of natively supported programs.
///
/// Built once, at startup, through [`AdapterRegistryBuilder`]. Lookups need no locking.
pub struct AdapterRegistry {
    constructors: HashMap<String, AdapterConstructor>,
    fallback: Option<Arc<dyn FallbackEngine>>,
}

impl AdapterRegistry {
    pub fn builder() -> AdapterRegistryBuilder {
        AdapterRegistryBuilder::default()
    }

    pub fn contains(&self, program: &str) -> bool {
        self.constructors.contains_key(program)
    }

    /// Registered program names, sorted.
    pub fn programs(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered programs that can actually run on this host.
    pub fn available_programs(&self) -> Vec<&str> {
        self.programs()
            .into_iter()
            .filter(|program| {
                self.constructors[*program]()
                    .map(|adapter| adapter.is_available())
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn fallback_engine(&self) -> Option<&Arc<dyn FallbackEngine>> {
        self.fallback.as_ref()
    }

    /// Picks the adapter that will run `request` under `program`.
    ///
    /// File requests always get a [`FileAdapter`]. Otherwise the name must match a
    /// registration exactly. With `allow_fallback`, an unregistered program is handed
    /// to the fallback engine, but only after the engine confirms it both knows the
    /// program and finds it installed.
    pub fn resolve(
        &self,
        program: &str,
        request: &Request,
        allow_fallback: bool,
    ) -> Result<Box<dyn Adapter>, OrchestrationError> {
        if request.is_file_request() {
            return Ok(Box::new(FileAdapter::new(program)));
        }
        if let Some(constructor) = self.constructors.get(program) {
            return constructor();
        }
        if !allow_fallback {
            return Err(OrchestrationError::adapter_not_found(program));
        }

        let Some(engine) = &self.fallback else {
            debug!(program, "Fallback requested but no fallback engine is configured");
            return Err(OrchestrationError::adapter_not_found(program));
        };
        if !engine.has_adapter(program) {
            debug!(program, engine = engine.name(), "Fallback engine has no adapter");
            return Err(OrchestrationError::adapter_not_found(program));
        }
        if !engine.is_installed(program) {
            debug!(program, engine = engine.name(), "Fallback engine reports program missing");
            return Err(OrchestrationError::program_not_found(program, None));
        }
        debug!(program, engine = engine.name(), "Resolved through fallback engine");
        Ok(Box::new(FallbackAdapter::new(program, Arc::clone(engine))))
    }
}

#[derive(Default)]
pub struct AdapterRegistryBuilder {
    constructors: HashMap<String, AdapterConstructor>,
    duplicates: Vec<String>,
    fallback: Option<Arc<dyn FallbackEngine>>,
}

impl AdapterRegistryBuilder {
    pub fn register<F>(mut self, program: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Adapter>, OrchestrationError> + Send + Sync + 'static,
    {
        let program = program.into();
        if self.constructors.contains_key(&program) {
            self.duplicates.push(program);
        } else {
            self.constructors.insert(program, Box::new(constructor));
        }
        self
    }

    pub fn fallback(mut self, engine: Arc<dyn FallbackEngine>) -> Self {
        self.fallback = Some(engine);
        self
    }

    pub fn build(self) -> Result<AdapterRegistry, RegistryError> {
        if let Some(program) = self.duplicates.into_iter().next() {
            return Err(RegistryError::Duplicate(program));
        }
        Ok(AdapterRegistry {
            constructors: self.constructors,
            fallback: self.fallback,
        })
    }
}
