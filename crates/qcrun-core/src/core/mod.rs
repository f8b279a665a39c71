//! # Core Module
//!
//! The foundation layer of qcrun: data models that describe calculations and their
//! outcomes, and the host-level primitives every adapter builds on.
//!
//! ## Architecture
//!
//! - **Data Models** ([`models`]) - Requests, structures, file bags, result payloads,
//!   the unified `Results` envelope and its `Provenance`
//! - **Host I/O** ([`io`]) - Subprocess execution with streamed output, scratch
//!   directory lifecycle, stdout capture for in-process libraries, file staging and
//!   collection
//! - **Native Codecs** ([`codec`]) - The interface to the encoders and decoders that
//!   translate between structured requests and a program's native text files

pub mod codec;
pub mod io;
pub mod models;
