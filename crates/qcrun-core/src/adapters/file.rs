use crate::core::io::process::ProcessRunner;
use crate::core::models::calc::CalcType;
use crate::core::models::data::Data;
use crate::core::models::request::Request;
use crate::engine::adapter::{Adapter, ComputeContext};
use crate::engine::error::OrchestrationError;

/// Runs any program against a bag of files.
///
/// The request's files are staged by the orchestrator, the program is launched with
/// the request's command-line arguments inside the scratch directory, and whatever it
/// leaves behind is collected afterwards. There is no structured payload.
pub struct FileAdapter {
    program: String,
}

impl FileAdapter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Adapter for FileAdapter {
    fn program(&self) -> &str {
        &self.program
    }

    fn supported_calc_types(&self) -> &[CalcType] {
        &[]
    }

    fn validate(&self, request: &Request) -> Result<(), OrchestrationError> {
        match request {
            Request::File(_) => Ok(()),
            other => Err(OrchestrationError::adapter_input(
                &self.program,
                format!("File adapters only run file requests, not {} requests", other.kind()),
            )),
        }
    }

    fn compute_data(
        &self,
        request: &Request,
        ctx: &ComputeContext<'_>,
    ) -> Result<(Data, String), OrchestrationError> {
        let Request::File(spec) = request else {
            return Err(OrchestrationError::adapter_input(
                &self.program,
                "File adapters only run file requests",
            ));
        };
        let stdout = ProcessRunner::new(&self.program)
            .args(&spec.cmdline_args)
            .current_dir(ctx.workdir)
            .monitor(ctx.monitor)
            .run()?;
        Ok((Data::empty(), stdout))
    }
}
