use super::{build_registry, execute, report};
use crate::cli::RunArgs;
use crate::config::{CommandFlags, PartialComputeConfig};
use crate::error::{CliError, Result};
use qcrun::core::io::files::stage_files;
use qcrun::core::models::files::FileContent;
use qcrun::core::models::request::FileSpec;
use std::process::ExitCode;
use tracing::info;

/// Runs a program on local files and saves what it leaves behind in `output_dir`.
pub fn run(args: RunArgs) -> Result<ExitCode> {
    let resolved = PartialComputeConfig::resolve(&args.execution, CommandFlags::default())?;
    let registry = build_registry(resolved.profiles.as_deref())?;

    let mut spec = FileSpec {
        cmdline_args: args.args.clone(),
        ..FileSpec::default()
    };
    for path in &args.files {
        let name = path
            .file_name()
            .ok_or_else(|| CliError::Argument(format!("'{}' is not a file", path.display())))?
            .to_string_lossy()
            .into_owned();
        spec.files
            .insert(name, FileContent::from_bytes(std::fs::read(path)?));
    }

    let results = execute(&registry, &args.program, spec.into(), &resolved.options)?;

    std::fs::create_dir_all(&args.output_dir)?;
    stage_files(&args.output_dir, &results.data.files)?;
    info!(
        count = results.data.files.len(),
        "Output files written to {:?}", &args.output_dir
    );

    if !resolved.options.print_logs {
        if let Some(logs) = &results.logs {
            print!("{logs}");
        }
    }
    Ok(report(&results))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn run_args(argv: &[&str]) -> RunArgs {
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
            other => panic!("Expected 'run' subcommand, got {:?}", other),
        }
    }

    #[test]
    fn produced_files_land_in_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        std::fs::write(&input, "payload").unwrap();
        let out_dir = dir.path().join("out");

        let args = run_args(&[
            "qcrun",
            "run",
            "sh",
            "--file",
            input.to_str().unwrap(),
            "--output-dir",
            out_dir.to_str().unwrap(),
            "--",
            "-c",
            "mkdir -p sub && cp in.txt sub/copy.txt",
        ]);
        assert_eq!(run(args).unwrap(), ExitCode::SUCCESS);

        assert_eq!(
            std::fs::read_to_string(out_dir.join("sub/copy.txt")).unwrap(),
            "payload"
        );
        assert!(!out_dir.join("in.txt").exists());
    }

    #[test]
    fn missing_programs_exit_non_zero() {
        let dir = tempfile::tempdir().unwrap();
        let args = run_args(&[
            "qcrun",
            "run",
            "qcrun-test-no-such-program",
            "--output-dir",
            dir.path().to_str().unwrap(),
        ]);
        assert_eq!(run(args).unwrap(), ExitCode::FAILURE);
    }
}
