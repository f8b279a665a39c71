use crate::core::io::monitor::OutputMonitor;
use crate::core::models::calc::CalcType;
use crate::core::models::files::{FileContent, Files};
use crate::core::models::request::{CalcSpec, Keywords, Model, Request};
use crate::core::models::results::Results;
use crate::core::models::structure::Structure;
use crate::engine::config::ComputeOptions;
use crate::engine::error::OrchestrationError;
use crate::engine::orchestrator::ComputeOrchestrator;
use crate::engine::registry::AdapterRegistry;
use serde_json::{Map, Value};
use tracing::{info, instrument};

/// Runs `request` with `program` and returns its result envelope.
///
/// # Errors
///
/// Only when `options.raise_exceptions` is set. The returned error then carries the
/// envelope; see [`OrchestrationError::results`].
#[instrument(skip_all, name = "compute_workflow", fields(program = %program))]
pub fn compute(
    registry: &AdapterRegistry,
    program: &str,
    request: Request,
    options: &ComputeOptions,
    monitor: Option<&OutputMonitor<'_>>,
) -> Result<Results, OrchestrationError> {
    info!(kind = request.kind(), calctype = ?request.calctype(), "Starting computation");
    ComputeOrchestrator::new(registry).compute(program, request, options, monitor)
}

/// The pieces of a single calculation, for callers that do not want to build a
/// [`CalcSpec`] themselves.
#[derive(Debug, Clone)]
pub struct CalcArgs {
    pub calctype: CalcType,
    pub structure: Structure,
    pub model: Model,
    pub keywords: Keywords,
    pub files: Files,
    pub extras: Map<String, Value>,
}

impl CalcArgs {
    pub fn new(calctype: CalcType, structure: Structure, model: Model) -> Self {
        Self {
            calctype,
            structure,
            model,
            keywords: Keywords::new(),
            files: Files::new(),
            extras: Map::new(),
        }
    }

    pub fn keyword(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.insert(key.into(), value.into());
        self
    }

    pub fn file(mut self, path: impl Into<String>, content: impl Into<FileContent>) -> Self {
        self.files.insert(path, content);
        self
    }

    fn into_spec(self) -> CalcSpec {
        CalcSpec {
            calctype: self.calctype,
            structure: self.structure,
            model: self.model,
            keywords: self.keywords,
            files: self.files,
            extras: self.extras,
        }
    }
}

/// [`compute`] for a calculation given as separate arguments.
pub fn compute_args(
    registry: &AdapterRegistry,
    program: &str,
    args: CalcArgs,
    options: &ComputeOptions,
    monitor: Option<&OutputMonitor<'_>>,
) -> Result<Results, OrchestrationError> {
    compute(registry, program, Request::Calc(args.into_spec()), options, monitor)
}

/// Registered programs whose executables are present on this host.
pub fn available_programs(registry: &AdapterRegistry) -> Vec<String> {
    registry
        .available_programs()
        .into_iter()
        .map(str::to_string)
        .collect()
}
