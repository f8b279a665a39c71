use crate::core::models::calc::CalcType;
use crate::core::models::data::Data;
use crate::core::models::request::Request;
use crate::engine::adapter::{Adapter, ComputeContext};
use crate::engine::error::OrchestrationError;
use crate::engine::fallback::FallbackEngine;
use std::sync::Arc;
use tracing::debug;

const SUPPORTED: &[CalcType] = &[CalcType::Energy, CalcType::Gradient, CalcType::Hessian];

/// Runs a program this crate has no native adapter for through a [`FallbackEngine`].
pub struct FallbackAdapter {
    program: String,
    engine: Arc<dyn FallbackEngine>,
}

impl FallbackAdapter {
    pub fn new(program: impl Into<String>, engine: Arc<dyn FallbackEngine>) -> Self {
        Self {
            program: program.into(),
            engine,
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }
}

impl Adapter for FallbackAdapter {
    fn program(&self) -> &str {
        &self.program
    }

    fn supported_calc_types(&self) -> &[CalcType] {
        SUPPORTED
    }

    fn compute_data(
        &self,
        request: &Request,
        ctx: &ComputeContext<'_>,
    ) -> Result<(Data, String), OrchestrationError> {
        let Request::Calc(spec) = request else {
            return Err(OrchestrationError::adapter_input(
                &self.program,
                format!("{} requests cannot be run through a fallback engine", request.kind()),
            ));
        };
        debug!(program = %self.program, engine = self.engine.name(), "Delegating to fallback engine");
        let output = self
            .engine
            .run(&self.program, spec, ctx.workdir)
            .map_err(|e| {
                OrchestrationError::external_failure(
                    &self.program,
                    format!("{} failed to run {}: {e}", self.engine.name(), self.program),
                )
                .with_source(e)
            })?;
        if let Some(monitor) = ctx.monitor {
            monitor.emit(&output.stdout, &output.stdout);
        }
        Ok((output.data.into(), output.stdout))
    }

    fn program_version(&self, _logs: Option<&str>) -> Result<Option<String>, OrchestrationError> {
        self.engine
            .version(&self.program)
            .map(Some)
            .map_err(|e| {
                OrchestrationError::external_failure(&self.program, "Could not determine version")
                    .with_source(e)
            })
    }

    fn is_available(&self) -> bool {
        self.engine.is_installed(&self.program)
    }
}
