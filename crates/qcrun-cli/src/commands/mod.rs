pub mod compute;
pub mod programs;
pub mod run;

use crate::error::{CliError, Result};
use crate::progress::OutputSpinner;
use qcrun::adapters::{default_registry_builder, profile::load_profiles, register_profiles};
use qcrun::core::models::request::Request;
use qcrun::core::models::results::Results;
use qcrun::engine::config::ComputeOptions;
use qcrun::engine::registry::AdapterRegistry;
use qcrun::workflows;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// The built-in adapters plus any profiles loaded from `profiles`.
pub fn build_registry(profiles: Option<&Path>) -> Result<AdapterRegistry> {
    let mut builder = default_registry_builder();
    if let Some(path) = profiles {
        info!("Loading program profiles from {:?}", path);
        builder = register_profiles(builder, load_profiles(path)?);
    }
    Ok(builder.build()?)
}

/// Runs one request under a spinner and returns its envelope, successful or not.
fn execute(
    registry: &AdapterRegistry,
    program: &str,
    request: Request,
    options: &ComputeOptions,
) -> Result<Results> {
    if options.fallback && registry.fallback_engine().is_none() {
        warn!(program, "--fallback has no effect: no fallback engine is configured");
    }
    let spinner = OutputSpinner::new(format!("Running {program}..."), options.print_logs);
    let monitor = spinner.monitor();
    let outcome = workflows::compute::compute(registry, program, request, options, Some(&monitor));
    spinner.finish();

    match outcome {
        Ok(results) => Ok(results),
        Err(mut err) => match err.take_results() {
            Some(results) => Ok(results),
            None => Err(CliError::Compute(err)),
        },
    }
}

/// Prints a one-line outcome to stderr and maps it to the process exit code.
fn report(results: &Results) -> ExitCode {
    let program = &results.provenance.program;
    if results.success {
        info!(program = %program, wall_time = results.provenance.wall_time, "Computation succeeded");
        eprintln!(
            "✅ {} finished in {:.2}s.",
            program, results.provenance.wall_time
        );
        ExitCode::SUCCESS
    } else {
        let traceback = results.traceback.as_deref().unwrap_or("no traceback recorded");
        error!(program = %program, "Computation failed");
        eprintln!("❌ {} failed:\n{}", program, traceback);
        ExitCode::FAILURE
    }
}
