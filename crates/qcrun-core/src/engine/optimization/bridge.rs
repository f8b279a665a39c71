use super::descent::{EnergyGradient, GradientEngine};
use crate::core::io::monitor::OutputMonitor;
use crate::core::models::calc::CalcType;
use crate::core::models::data::OptimizationData;
use crate::core::models::request::{ProgramArgs, Request};
use crate::core::models::results::Results;
use crate::core::models::structure::Structure;
use crate::engine::adapter::Adapter;
use crate::engine::config::ComputeOptions;
use crate::engine::error::OrchestrationError;
use crate::engine::orchestrator::ComputeOrchestrator;
use tracing::{debug, instrument};

/// Answers an optimizer's energy/gradient requests with orchestrated gradient runs.
///
/// Each call builds a gradient request for the subprogram from the template
/// arguments and the trial geometry, runs it through the full lifecycle with
/// `raise_exceptions` forced on, and appends the step's [`Results`] to the
/// trajectory. When a step fails, its results are still appended and the error
/// handed back carries the whole trajectory so far as its data.
pub struct OptimizationBridge<'a> {
    orchestrator: ComputeOrchestrator<'a>,
    adapter: &'a dyn Adapter,
    template: &'a ProgramArgs,
    structure: &'a Structure,
    options: ComputeOptions,
    propagate: bool,
    monitor: Option<&'a OutputMonitor<'a>>,
    trajectory: Vec<Results>,
}

impl<'a> OptimizationBridge<'a> {
    pub fn new(
        orchestrator: ComputeOrchestrator<'a>,
        adapter: &'a dyn Adapter,
        template: &'a ProgramArgs,
        structure: &'a Structure,
        options: &ComputeOptions,
        monitor: Option<&'a OutputMonitor<'a>>,
    ) -> Self {
        Self {
            orchestrator,
            adapter,
            template,
            structure,
            propagate: options.propagate_wavefunction,
            options: options.for_step(),
            monitor,
            trajectory: Vec::new(),
        }
    }

    pub fn trajectory(&self) -> &[Results] {
        &self.trajectory
    }

    pub fn into_trajectory(self) -> Vec<Results> {
        self.trajectory
    }

    fn step_request(&self, coords: &[f64]) -> Result<Request, OrchestrationError> {
        let structure = self.structure.with_flat_geometry(coords).map_err(|e| {
            OrchestrationError::adapter_input(
                self.adapter.program(),
                format!("Optimizer produced an invalid geometry: {e}"),
            )
            .with_source(e)
        })?;
        let mut spec = self.template.to_calc_spec(CalcType::Gradient, structure);

        if self.propagate && self.adapter.supports_wavefunction_propagation() {
            if let Some(previous) = self.trajectory.last() {
                self.adapter.propagate_wavefunction(previous, &mut spec)?;
            }
        }
        Ok(Request::Calc(spec))
    }

    /// Records the failed step and hands the trajectory to the error.
    fn fail(&mut self, mut err: OrchestrationError) -> OrchestrationError {
        if let Some(results) = err.take_results() {
            self.trajectory.push(results);
        }
        err.replace_data(OptimizationData::new(self.trajectory.clone()).into());
        err
    }
}

impl GradientEngine for OptimizationBridge<'_> {
    #[instrument(skip_all, fields(step = self.trajectory.len() + 1))]
    fn calc_new(&mut self, coords: &[f64]) -> Result<EnergyGradient, OrchestrationError> {
        let request = match self.step_request(coords) {
            Ok(request) => request,
            Err(err) => return Err(self.fail(err)),
        };

        let results =
            match self
                .orchestrator
                .run_adapter(self.adapter, request, &self.options, self.monitor)
            {
                Ok(results) => results,
                Err(err) => return Err(self.fail(err)),
            };

        let values = results
            .data
            .single_point()
            .and_then(|sp| Some((sp.energy?, sp.flat_gradient()?)));
        self.trajectory.push(results);

        match values {
            Some((energy, gradient)) => {
                debug!(energy, "Gradient step finished");
                Ok(EnergyGradient { energy, gradient })
            }
            None => {
                let err = OrchestrationError::external_failure(
                    self.adapter.program(),
                    "Gradient calculation did not return both an energy and a gradient",
                );
                Err(self.fail(err))
            }
        }
    }
}
