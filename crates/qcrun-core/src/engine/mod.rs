//! # Engine Module
//!
//! The logic core of qcrun: everything between "a program name and a request" and
//! "one `Results` envelope".
//!
//! ## Overview
//!
//! A computation resolves an [`Adapter`](adapter::Adapter) through the
//! [`AdapterRegistry`](registry::AdapterRegistry), then the
//! [`ComputeOrchestrator`](orchestrator::ComputeOrchestrator) drives it through
//! validation, staging, execution, version lookup and file collection inside a
//! fresh scratch directory. Failures at any stage are folded into the same envelope
//! a success produces.
//!
//! ## Architecture
//!
//! - **Adapter Contract** ([`adapter`]) - The trait every program integration implements
//! - **Options** ([`config`]) - Per-invocation `ComputeOptions`
//! - **Error Handling** ([`error`]) - The four-kind `OrchestrationError` taxonomy and the
//!   logs/data/results context it carries
//! - **Fallback Engines** ([`fallback`]) - Secondary adapter families consulted for
//!   programs with no native adapter
//! - **Registry** ([`registry`]) - Name to adapter resolution and the fallback policy
//! - **Orchestration** ([`orchestrator`]) - The compute lifecycle state machine
//! - **Optimization** ([`optimization`]) - The bridge that turns an optimizer's
//!   energy/gradient requests into orchestrated computations, plus a built-in optimizer

pub mod adapter;
pub mod config;
pub mod error;
pub mod fallback;
pub mod optimization;
pub mod orchestrator;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;
