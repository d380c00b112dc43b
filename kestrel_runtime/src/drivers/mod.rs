//! Status-source backends.
//!
//! - [`simulation`] - Scripted driver station for development and testing
//!
//! # Adding New Backends
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `StatusSource` trait from `kestrel_common::hal::source`
//! 3. Register its factory in [`register_builtin`]

pub mod simulation;

use crate::source_registry::SourceRegistry;

/// Register every built-in backend.
pub fn register_builtin(registry: &mut SourceRegistry) {
    registry.register(simulation::NAME, simulation::create_source);
}
