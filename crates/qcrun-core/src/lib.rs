//! # qcrun Core Library
//!
//! A uniform execution harness for scientific compute programs. Given a structured
//! calculation request, qcrun locates the adapter for the requested program, stages
//! input files into an isolated scratch directory, runs the external process (or an
//! in-process binding) while streaming its output to an optional monitor, decodes the
//! native output into structured data, and returns a single [`Results`] envelope that
//! has the same shape whether the program succeeded, failed, or was never found.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Request`, `Results`,
//!   `Provenance`), host I/O primitives (the process runner, scratch spaces, stdout
//!   capture, file staging and collection) and the native codec interface.
//!
//! - **[`engine`]: The Logic Core.** The error taxonomy, the [`Adapter`] contract, the
//!   adapter registry with its fallback policy, the compute lifecycle state machine
//!   ([`ComputeOrchestrator`]) and the optimization bridge that re-invokes the
//!   orchestrator once per optimizer step.
//!
//! - **[`adapters`]** and **[`workflows`]: The Public API.** Concrete adapters and the
//!   high-level entry points most callers need.
//!
//! [`Results`]: core::models::results::Results
//! [`Adapter`]: engine::adapter::Adapter
//! [`ComputeOrchestrator`]: engine::orchestrator::ComputeOrchestrator

pub mod adapters;
pub mod core;
pub mod engine;
pub mod workflows;
