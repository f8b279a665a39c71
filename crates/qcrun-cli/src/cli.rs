use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "qcrun - run quantum chemistry programs through one uniform interface and get one uniform result envelope back.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a structured calculation read from a JSON request file.
    Compute(ComputeArgs),
    /// Run a program on local files and save every file it produces.
    Run(RunArgs),
    /// List the programs qcrun knows and whether each is installed.
    Programs(ProgramsArgs),
}

/// Options shared by every command that runs a program.
#[derive(Args, Debug, Clone, Default)]
pub struct ExecutionArgs {
    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Additional program profiles in TOML format.
    #[arg(long, value_name = "PATH")]
    pub profiles: Option<PathBuf>,

    /// Run inside this directory instead of a fresh temporary one.
    #[arg(long, value_name = "PATH")]
    pub scratch_dir: Option<PathBuf>,

    /// Keep the scratch directory after the run.
    #[arg(long)]
    pub keep_scratch: bool,

    /// Stream the program's output to the terminal while it runs.
    #[arg(long)]
    pub print_logs: bool,

    /// Hand programs without a native adapter to a fallback engine.
    ///
    /// The command-line tool registers no fallback engine, so with this flag an
    /// unregistered program still fails with AdapterNotFound. The setting is
    /// forwarded for library embedders that configure one.
    #[arg(long)]
    pub fallback: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S collect.files=true
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `compute` subcommand.
#[derive(Args, Debug)]
pub struct ComputeArgs {
    /// Name of the program to run (e.g., terachem, crest, descent).
    #[arg(required = true)]
    pub program: String,

    /// Path to the request in JSON format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Where to write the results as JSON. Defaults to standard output.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub execution: ExecutionArgs,

    /// Return every file left in the scratch directory.
    #[arg(long)]
    pub collect_files: bool,

    /// Return the program's wavefunction files.
    #[arg(long = "collect-wfn")]
    pub collect_wavefunction: bool,

    /// Reuse each optimization step's wavefunction as the next step's guess.
    #[arg(long = "propagate-wfn")]
    pub propagate_wavefunction: bool,

    /// Report failures only through the results envelope.
    #[arg(long)]
    pub no_raise: bool,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Executable to run.
    #[arg(required = true)]
    pub program: String,

    /// Input file to place in the working directory. Can be used multiple times.
    #[arg(short, long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Directory that receives the files the program produces.
    #[arg(short, long, value_name = "PATH", default_value = ".")]
    pub output_dir: PathBuf,

    #[command(flatten)]
    pub execution: ExecutionArgs,

    /// Arguments passed to the program.
    #[arg(last = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

/// Arguments for the `programs` subcommand.
#[derive(Args, Debug)]
pub struct ProgramsArgs {
    /// Additional program profiles in TOML format.
    #[arg(long, value_name = "PATH")]
    pub profiles: Option<PathBuf>,
}
