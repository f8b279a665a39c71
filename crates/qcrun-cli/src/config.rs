use crate::cli::{ComputeArgs, ExecutionArgs};
use crate::error::{CliError, Result};
use qcrun::engine::config::ComputeOptions;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialScratchConfig {
    dir: Option<PathBuf>,
    keep: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialCollectConfig {
    logs: Option<bool>,
    files: Option<bool>,
    wavefunction: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialExecutionConfig {
    #[serde(rename = "raise-exceptions")]
    raise_exceptions: Option<bool>,
    #[serde(rename = "propagate-wavefunction")]
    propagate_wavefunction: Option<bool>,
    fallback: Option<bool>,
    #[serde(rename = "print-logs")]
    print_logs: Option<bool>,
    profiles: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialComputeConfig {
    scratch: Option<PartialScratchConfig>,
    collect: Option<PartialCollectConfig>,
    execution: Option<PartialExecutionConfig>,
    #[serde(rename = "adapter-options")]
    adapter_options: Option<Map<String, Value>>,
}

/// Command-specific flags that only exist on some subcommands.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandFlags {
    pub collect_files: bool,
    pub collect_wavefunction: bool,
    pub propagate_wavefunction: bool,
    pub no_raise: bool,
}

impl From<&ComputeArgs> for CommandFlags {
    fn from(args: &ComputeArgs) -> Self {
        Self {
            collect_files: args.collect_files,
            collect_wavefunction: args.collect_wavefunction,
            propagate_wavefunction: args.propagate_wavefunction,
            no_raise: args.no_raise,
        }
    }
}

/// Everything a command needs after the file, `--set` values and flags are merged.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub options: ComputeOptions,
    pub profiles: Option<PathBuf>,
}

impl PartialComputeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Loads the file named by `--config`, if any, and merges the command line into it.
    pub fn resolve(args: &ExecutionArgs, flags: CommandFlags) -> Result<ResolvedConfig> {
        let partial = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        partial.merge_with_cli(args, flags)
    }

    pub fn merge_with_cli(
        mut self,
        args: &ExecutionArgs,
        flags: CommandFlags,
    ) -> Result<ResolvedConfig> {
        self.apply_set_values(&args.set_values)?;

        let scratch = self.scratch.take().unwrap_or_default();
        let collect = self.collect.take().unwrap_or_default();
        let execution = self.execution.take().unwrap_or_default();

        let defaults = ComputeOptions::default();
        let options = ComputeOptions {
            scratch_dir: args.scratch_dir.clone().or(scratch.dir),
            delete_scratch: !(args.keep_scratch || scratch.keep.unwrap_or(false)),
            collect_logs: collect.logs.unwrap_or(defaults.collect_logs),
            collect_files: flags.collect_files
                || collect.files.unwrap_or(defaults.collect_files),
            collect_wavefunction: flags.collect_wavefunction
                || collect
                    .wavefunction
                    .unwrap_or(defaults.collect_wavefunction),
            raise_exceptions: !flags.no_raise
                && execution
                    .raise_exceptions
                    .unwrap_or(defaults.raise_exceptions),
            propagate_wavefunction: flags.propagate_wavefunction
                || execution
                    .propagate_wavefunction
                    .unwrap_or(defaults.propagate_wavefunction),
            fallback: args.fallback || execution.fallback.unwrap_or(defaults.fallback),
            print_logs: args.print_logs || execution.print_logs.unwrap_or(defaults.print_logs),
            adapter_options: self.adapter_options.unwrap_or_default(),
        };

        Ok(ResolvedConfig {
            options,
            profiles: args.profiles.clone().or(execution.profiles),
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            if let Some(option) = key.strip_prefix("adapter-options.") {
                // Anything that is not valid JSON is taken as a plain string.
                let value = serde_json::from_str(value_str)
                    .unwrap_or_else(|_| Value::String(value_str.to_string()));
                self.adapter_options
                    .get_or_insert_with(Default::default)
                    .insert(option.to_string(), value);
                continue;
            }

            match key {
                "scratch.dir" => {
                    self.scratch.get_or_insert_with(Default::default).dir =
                        Some(PathBuf::from(value_str));
                }
                "scratch.keep" => {
                    self.scratch.get_or_insert_with(Default::default).keep =
                        Some(parse_bool(key, value_str)?);
                }
                "collect.logs" => {
                    self.collect.get_or_insert_with(Default::default).logs =
                        Some(parse_bool(key, value_str)?);
                }
                "collect.files" => {
                    self.collect.get_or_insert_with(Default::default).files =
                        Some(parse_bool(key, value_str)?);
                }
                "collect.wavefunction" => {
                    self.collect.get_or_insert_with(Default::default).wavefunction =
                        Some(parse_bool(key, value_str)?);
                }
                "execution.raise-exceptions" => {
                    self.execution
                        .get_or_insert_with(Default::default)
                        .raise_exceptions = Some(parse_bool(key, value_str)?);
                }
                "execution.propagate-wavefunction" => {
                    self.execution
                        .get_or_insert_with(Default::default)
                        .propagate_wavefunction = Some(parse_bool(key, value_str)?);
                }
                "execution.fallback" => {
                    self.execution.get_or_insert_with(Default::default).fallback =
                        Some(parse_bool(key, value_str)?);
                }
                "execution.print-logs" => {
                    self.execution.get_or_insert_with(Default::default).print_logs =
                        Some(parse_bool(key, value_str)?);
                }
                "execution.profiles" => {
                    self.execution.get_or_insert_with(Default::default).profiles =
                        Some(PathBuf::from(value_str));
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid boolean value for {}: {}", key, value)))
}
