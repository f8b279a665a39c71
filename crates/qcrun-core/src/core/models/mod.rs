//! Data structures describing a calculation and its outcome.
//!
//! The orchestrator treats these as opaque records: it reads a request's calculation
//! type and file bag, hands the request to an adapter, and wraps whatever the adapter
//! returns into a [`results::Results`] envelope.

pub mod calc;
pub mod data;
pub mod files;
pub mod request;
pub mod results;
pub mod structure;
