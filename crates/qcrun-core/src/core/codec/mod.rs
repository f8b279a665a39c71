//! Translation between structured requests and a program's native files.
//!
//! Adapters treat a codec as a pair of pure functions: `encode` turns a [`CalcSpec`]
//! into the text files a program reads, `decode` turns what the program printed (and
//! left on disk) back into a [`Payload`].

pub mod keyword;
pub mod xyz;

use crate::core::models::calc::CalcType;
use crate::core::models::data::Payload;
use crate::core::models::request::CalcSpec;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use keyword::{CodecSettings, InputStyle, KeywordCodec};

/// The native input for one program run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeInput {
    pub input_file: String,
    pub geometry_filename: String,
    pub geometry_file: String,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{program} input cannot be encoded for '{calctype}' calculations")]
    UnsupportedCalcType { program: String, calctype: CalcType },

    #[error("Keyword '{key}' cannot be encoded: {reason}")]
    Keyword { key: String, reason: String },

    #[error("Could not find {what} in {program} output")]
    Missing { program: String, what: &'static str },

    #[error("Malformed {what} in {program} output: {detail}")]
    Malformed {
        program: String,
        what: &'static str,
        detail: String,
    },

    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub trait NativeCodec: Send + Sync {
    fn encode(&self, spec: &CalcSpec) -> Result<NativeInput, CodecError>;

    /// Decodes a finished run. `directory` is where the program left its output files.
    fn decode(&self, spec: &CalcSpec, stdout: &str, directory: &Path)
    -> Result<Payload, CodecError>;

    fn parse_version(&self, stdout: &str) -> Result<String, CodecError>;
}
