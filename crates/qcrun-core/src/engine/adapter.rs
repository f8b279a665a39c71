use super::config::ComputeOptions;
use super::error::OrchestrationError;
use super::registry::AdapterRegistry;
use crate::core::io::monitor::OutputMonitor;
use crate::core::io::process::find_executable;
use crate::core::models::calc::CalcType;
use crate::core::models::data::Data;
use crate::core::models::files::Files;
use crate::core::models::request::{CalcSpec, Request};
use crate::core::models::results::Results;
use std::path::Path;

/// Everything an adapter may use while it computes, besides the request itself.
pub struct ComputeContext<'a> {
    /// Scratch directory of this invocation. Staged input files are already here.
    pub workdir: &'a Path,
    pub monitor: Option<&'a OutputMonitor<'a>>,
    pub options: &'a ComputeOptions,
    /// For adapters that drive other programs.
    pub registry: &'a AdapterRegistry,
}

/// The per-program extension point.
///
/// Implementations translate a [`Request`] into whatever the program needs, run it, and
/// translate its output back. The orchestrator owns everything around that: scratch
/// space, staging, timing, provenance and the result envelope.
pub trait Adapter: Send + Sync {
    fn program(&self) -> &str;

    fn supported_calc_types(&self) -> &[CalcType];

    /// Whether the request's files are written to the working directory before
    /// [`compute_data`](Self::compute_data) runs.
    fn uses_staged_files(&self) -> bool {
        true
    }

    /// Rejects requests this adapter cannot run. Called before anything touches disk.
    fn validate(&self, request: &Request) -> Result<(), OrchestrationError> {
        validate_request(self, request)
    }

    /// Runs the program and returns the decoded payload together with its output.
    fn compute_data(
        &self,
        request: &Request,
        ctx: &ComputeContext<'_>,
    ) -> Result<(Data, String), OrchestrationError>;

    /// Best effort. `logs` is the output of the run that just finished, when there was
    /// one, so most adapters never have to launch the program a second time.
    fn program_version(&self, logs: Option<&str>) -> Result<Option<String>, OrchestrationError> {
        let _ = logs;
        Ok(None)
    }

    fn is_available(&self) -> bool {
        find_executable(self.program()).is_some()
    }

    fn collect_wavefunction(&self, workdir: &Path) -> Result<Files, OrchestrationError> {
        let _ = workdir;
        Err(OrchestrationError::adapter_input(
            self.program(),
            format!(
                "Adapter for {} does not support wavefunction collection.",
                self.program()
            ),
        ))
    }

    fn supports_wavefunction_propagation(&self) -> bool {
        false
    }

    /// Moves the wavefunction of `previous` into `next` as its initial guess.
    fn propagate_wavefunction(
        &self,
        previous: &Results,
        next: &mut CalcSpec,
    ) -> Result<(), OrchestrationError> {
        let _ = (previous, next);
        Err(OrchestrationError::adapter_input(
            self.program(),
            format!(
                "Adapter for {} does not support wavefunction propagation.",
                self.program()
            ),
        ))
    }
}

/// The checks every structured adapter performs: a supported calculation type, and
/// no input files unless they can be staged.
pub fn validate_request<A: Adapter + ?Sized>(
    adapter: &A,
    request: &Request,
) -> Result<(), OrchestrationError> {
    let program = adapter.program();
    if let Some(calctype) = request.calctype() {
        let supported = adapter.supported_calc_types();
        if !supported.contains(&calctype) {
            let names: Vec<&str> = supported.iter().map(CalcType::as_str).collect();
            return Err(OrchestrationError::adapter_input(
                program,
                format!(
                    "The {program} adapter does not yet support '{calctype}' calculations. \
                     This adapter can compute: [{}]",
                    names.join(", ")
                ),
            ));
        }
    }
    if !request.files().is_empty() && !adapter.uses_staged_files() {
        return Err(OrchestrationError::adapter_input(
            program,
            format!(
                "The {program} adapter does not support files as additional inputs. \
                 Remove the files from your input."
            ),
        ));
    }
    Ok(())
}
