//! # Workflows Module
//!
//! High-level entry points for running calculations.
//!
//! ## Overview
//!
//! Most callers never touch the orchestrator or adapters directly: they build an
//! [`AdapterRegistry`](crate::engine::registry::AdapterRegistry) once, usually from
//! [`default_registry_builder`](crate::adapters::default_registry_builder), and call
//! [`compute::compute`] for each request. The result is always one
//! [`Results`](crate::core::models::results::Results) envelope, returned directly or
//! attached to the error when `raise_exceptions` is set.
//!
//! - **Compute Workflow** ([`compute`]) - `compute`, `compute_args` and
//!   `available_programs`

pub mod compute;
