//! # Adapters Module
//!
//! Concrete [`Adapter`](crate::engine::adapter::Adapter) implementations.
//!
//! - [`file`] runs any executable against a bag of files.
//! - [`program`] drives file-in/file-out programs described by a [`profile`]; TeraChem,
//!   CREST and ORCA profiles are built in and more can be loaded from TOML.
//! - [`binding`] wraps a library linked into this process and captures what it prints.
//! - [`fallback`] hands programs without a native adapter to a
//!   [`FallbackEngine`](crate::engine::fallback::FallbackEngine).
//! - [`optimization`] runs geometry optimizations over another program's gradients.

pub mod binding;
pub mod fallback;
pub mod file;
pub mod optimization;
pub mod profile;
pub mod program;

use crate::engine::adapter::Adapter;
use crate::engine::registry::AdapterRegistryBuilder;
use optimization::OptimizationAdapter;
use profile::ProgramProfile;
use program::ExternalProgramAdapter;

/// Registers one profile-driven adapter per profile.
pub fn register_profiles(
    mut builder: AdapterRegistryBuilder,
    profiles: impl IntoIterator<Item = ProgramProfile>,
) -> AdapterRegistryBuilder {
    for profile in profiles {
        let name = profile.program.clone();
        builder = builder.register(name, move || {
            Ok(Box::new(ExternalProgramAdapter::new(profile.clone())) as Box<dyn Adapter>)
        });
    }
    builder
}

/// A registry builder preloaded with every adapter that ships with this crate.
pub fn default_registry_builder() -> AdapterRegistryBuilder {
    let builder = crate::engine::registry::AdapterRegistry::builder().register("descent", || {
        Ok(Box::new(OptimizationAdapter::descent()) as Box<dyn Adapter>)
    });
    register_profiles(builder, ProgramProfile::builtin())
}
