//! Status-source factory registry.
//!
//! Maps backend names (as given on the command line) to factories. The
//! registry is an owned value handed to the composition root; there is no
//! global table.

use std::collections::HashMap;
use std::sync::Arc;

use kestrel_common::hal::source::{HalError, StatusSource};

use crate::config::RuntimeConfig;
use crate::drivers;

/// Constructor for one status-source backend.
pub type SourceFactory = fn(&RuntimeConfig) -> Result<Arc<dyn StatusSource>, HalError>;

/// Registry of status-source backends.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    factories: HashMap<&'static str, SourceFactory>,
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in backend.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        drivers::register_builtin(&mut registry);
        registry
    }

    /// Register a backend factory.
    ///
    /// # Panics
    /// Panics if a backend with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: SourceFactory) {
        if self.factories.contains_key(name) {
            panic!("Status source '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Factory registered under `name`.
    pub fn get_factory(&self, name: &str) -> Option<SourceFactory> {
        self.factories.get(name).copied()
    }

    /// Instantiate the backend registered under `name`.
    ///
    /// # Errors
    /// `HalError::SourceNotFound` if `name` is unknown, or whatever the
    /// factory returns.
    pub fn create(
        &self,
        name: &str,
        config: &RuntimeConfig,
    ) -> Result<Arc<dyn StatusSource>, HalError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| HalError::SourceNotFound(name.to_string()))?;
        factory(config)
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
