use super::build_registry;
use crate::cli::ProgramsArgs;
use crate::error::Result;
use qcrun::engine::registry::AdapterRegistry;
use qcrun::workflows::compute::available_programs;
use std::process::ExitCode;

pub fn run(args: ProgramsArgs) -> Result<ExitCode> {
    let registry = build_registry(args.profiles.as_deref())?;
    for line in program_table(&registry) {
        println!("{line}");
    }
    Ok(ExitCode::SUCCESS)
}

fn program_table(registry: &AdapterRegistry) -> Vec<String> {
    let installed = available_programs(registry);
    registry
        .programs()
        .into_iter()
        .map(|program| {
            let status = if installed.iter().any(|name| name == program) {
                "installed"
            } else {
                "not found"
            };
            format!("{program:<12} {status}")
        })
        .collect()
}
