use crate::core::models::calc::CalcType;
use crate::core::models::data::{Data, OptimizationData};
use crate::core::models::request::{Keywords, Request};
use crate::engine::adapter::{Adapter, ComputeContext};
use crate::engine::error::OrchestrationError;
use crate::engine::optimization::{
    OptimizationBridge, OptimizerError, OptimizerLog, SteepestDescent, StepwiseOptimizer,
};
use crate::engine::orchestrator::ComputeOrchestrator;
use serde_json::Value;
use tracing::{info, instrument};

/// Builds an optimizer from the request's keywords.
pub type OptimizerFactory =
    Box<dyn Fn(&Keywords) -> Result<Box<dyn StepwiseOptimizer>, OptimizerError> + Send + Sync>;

/// Runs geometry optimizations as composite calculations.
///
/// The subprogram named by the request computes one gradient per optimizer step
/// through an [`OptimizationBridge`]; the result payload is the full trajectory of
/// those steps.
pub struct OptimizationAdapter {
    program: String,
    calc_types: Vec<CalcType>,
    version: Option<String>,
    factory: OptimizerFactory,
}

impl OptimizationAdapter {
    pub fn new(
        program: impl Into<String>,
        calc_types: Vec<CalcType>,
        factory: OptimizerFactory,
    ) -> Self {
        Self {
            program: program.into(),
            calc_types,
            version: None,
            factory,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// The built-in steepest descent optimizer, registered as `descent`.
    pub fn descent() -> Self {
        Self::new(
            "descent",
            vec![CalcType::Optimization],
            Box::new(|keywords: &Keywords| {
                SteepestDescent::from_keywords(keywords)
                    .map(|optimizer| Box::new(optimizer) as Box<dyn StepwiseOptimizer>)
            }),
        )
        .with_version(env!("CARGO_PKG_VERSION"))
    }
}

impl Adapter for OptimizationAdapter {
    fn program(&self) -> &str {
        &self.program
    }

    fn supported_calc_types(&self) -> &[CalcType] {
        &self.calc_types
    }

    #[instrument(skip_all, name = "optimization", fields(program = %self.program))]
    fn compute_data(
        &self,
        request: &Request,
        ctx: &ComputeContext<'_>,
    ) -> Result<(Data, String), OrchestrationError> {
        let program = self.program.as_str();
        let Request::Composite(spec) = request else {
            return Err(OrchestrationError::adapter_input(
                program,
                format!("{program} only runs composite calculations, not {} requests", request.kind()),
            ));
        };

        let mut keywords = spec.keywords.clone();
        keywords.insert(
            "transition".into(),
            Value::Bool(spec.calctype == CalcType::TransitionState),
        );
        let optimizer = (self.factory)(&keywords).map_err(|e| {
            OrchestrationError::adapter_input(program, e.to_string()).with_source(e)
        })?;

        let probe = Request::Calc(
            spec.subprogram_spec
                .to_calc_spec(CalcType::Gradient, spec.structure.clone()),
        );
        let subadapter = ctx.registry.resolve(&spec.subprogram, &probe, true)?;
        if ctx.options.propagate_wavefunction && !subadapter.supports_wavefunction_propagation() {
            return Err(OrchestrationError::adapter_input(
                program,
                format!(
                    "Wavefunction propagation was requested but {} does not support it.",
                    spec.subprogram
                ),
            ));
        }

        let mut bridge = OptimizationBridge::new(
            ComputeOrchestrator::new(ctx.registry),
            subadapter.as_ref(),
            &spec.subprogram_spec,
            &spec.structure,
            ctx.options,
            ctx.monitor,
        );
        let mut log = OptimizerLog::new(ctx.monitor);
        let outcome = optimizer.optimize(&spec.structure.flat_geometry(), &mut bridge, &mut log);
        let logs = log.finish();
        let trajectory = bridge.into_trajectory();

        match outcome {
            Ok(optimized) => {
                info!(
                    subprogram = %spec.subprogram,
                    energy = optimized.energy,
                    evaluations = optimized.evaluations,
                    "Optimization converged"
                );
                Ok((OptimizationData::new(trajectory).into(), logs))
            }
            Err(OptimizerError::Engine(err)) => Err(err.with_logs(logs)),
            Err(e) => Err(OrchestrationError::external_failure(
                program,
                format!("{program} optimization failed: {e}"),
            )
            .with_source(e)
            .with_logs(logs)
            .with_data(OptimizationData::new(trajectory).into())),
        }
    }

    fn program_version(&self, _logs: Option<&str>) -> Result<Option<String>, OrchestrationError> {
        Ok(self.version.clone())
    }

    fn is_available(&self) -> bool {
        true
    }
}
