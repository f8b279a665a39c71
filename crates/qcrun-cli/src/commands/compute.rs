use super::{build_registry, execute, report};
use crate::cli::ComputeArgs;
use crate::config::PartialComputeConfig;
use crate::error::{CliError, Result};
use qcrun::core::models::request::Request;
use qcrun::core::models::results::Results;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, info};

/// Runs a JSON request and writes the results envelope, even when the run failed.
pub fn run(args: ComputeArgs) -> Result<ExitCode> {
    let resolved = PartialComputeConfig::resolve(&args.execution, (&args).into())?;
    debug!("Resolved compute options: {:?}", resolved.options);
    let registry = build_registry(resolved.profiles.as_deref())?;

    info!("Loading request from {:?}", &args.input);
    let request = read_request(&args.input)?;

    let results = execute(&registry, &args.program, request, &resolved.options)?;
    write_results(&results, args.output.as_deref())?;
    Ok(report(&results))
}

fn read_request(path: &Path) -> Result<Request> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

fn write_results(results: &Results, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(results).map_err(|e| CliError::Other(e.into()))?;
    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")?;
            info!("Results written to {:?}", path);
        }
        None => println!("{json}"),
    }
    Ok(())
}
