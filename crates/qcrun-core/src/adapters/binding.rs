use crate::core::io::capture::capture_stdout;
use crate::core::models::calc::CalcType;
use crate::core::models::data::{Data, SinglePointData};
use crate::core::models::request::{CalcSpec, Request};
use crate::engine::adapter::{Adapter, ComputeContext, validate_request};
use crate::engine::error::OrchestrationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BindingError {
    /// The library rejected the calculation before running it.
    #[error("Invalid input: {0}")]
    Input(String),
    #[error("Calculation failed: {0}")]
    Calculation(String),
}

/// A quantum chemistry library linked into this process.
///
/// Bindings print straight to the stdout descriptor; [`BindingAdapter`] captures that
/// text and reports it as the run's logs.
pub trait Binding: Send + Sync {
    fn name(&self) -> &str;

    fn supported_calc_types(&self) -> &[CalcType];

    /// Whether the library implements `method`. Checked before any work is done.
    fn supports_method(&self, method: &str) -> bool {
        let _ = method;
        true
    }

    fn version(&self) -> Option<String>;

    fn is_available(&self) -> bool {
        true
    }

    fn single_point(&self, spec: &CalcSpec) -> Result<SinglePointData, BindingError>;
}

pub struct BindingAdapter {
    binding: Box<dyn Binding>,
}

impl BindingAdapter {
    pub fn new(binding: Box<dyn Binding>) -> Self {
        Self { binding }
    }
}

impl Adapter for BindingAdapter {
    fn program(&self) -> &str {
        self.binding.name()
    }

    fn supported_calc_types(&self) -> &[CalcType] {
        self.binding.supported_calc_types()
    }

    fn uses_staged_files(&self) -> bool {
        false
    }

    fn validate(&self, request: &Request) -> Result<(), OrchestrationError> {
        validate_request(self, request)?;
        let Request::Calc(spec) = request else {
            return Err(OrchestrationError::adapter_input(
                self.program(),
                format!("{} only runs single calculations", self.program()),
            ));
        };
        if !self.binding.supports_method(&spec.model.method) {
            return Err(OrchestrationError::adapter_input(
                self.program(),
                format!("Unsupported method '{}'.", spec.model.method),
            ));
        }
        Ok(())
    }

    fn compute_data(
        &self,
        request: &Request,
        ctx: &ComputeContext<'_>,
    ) -> Result<(Data, String), OrchestrationError> {
        let program = self.program();
        let Request::Calc(spec) = request else {
            return Err(OrchestrationError::adapter_input(
                program,
                format!("{program} only runs single calculations"),
            ));
        };

        let (outcome, stdout) = capture_stdout(|| self.binding.single_point(spec)).map_err(|e| {
            OrchestrationError::external_failure(program, format!("Could not capture {program} output: {e}"))
                .with_source(e)
        })?;
        if let Some(monitor) = ctx.monitor {
            monitor.emit(&stdout, &stdout);
        }

        match outcome {
            Ok(data) => Ok((data.into(), stdout)),
            Err(e @ BindingError::Input(_)) => Err(OrchestrationError::adapter_input(
                program,
                e.to_string(),
            )
            .with_source(e)
            .with_logs(stdout)),
            Err(e) => Err(OrchestrationError::external_failure(program, e.to_string())
                .with_source(e)
                .with_logs(stdout)),
        }
    }

    fn program_version(&self, _logs: Option<&str>) -> Result<Option<String>, OrchestrationError> {
        Ok(self.binding.version())
    }

    fn is_available(&self) -> bool {
        self.binding.is_available()
    }
}
