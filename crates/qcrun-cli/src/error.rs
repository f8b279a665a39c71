use qcrun::adapters::profile::ProfileLoadError;
use qcrun::engine::error::OrchestrationError;
use qcrun::engine::registry::RegistryError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Compute(#[from] OrchestrationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Profiles(#[from] ProfileLoadError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse file '{path}': {source}", path = path.display())]
    FileParsing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
