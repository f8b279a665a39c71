use crate::core::io::monitor::{OutputAccumulator, OutputMonitor};
use crate::core::models::request::Keywords;
use crate::engine::error::OrchestrationError;
use nalgebra::DVector;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct EnergyGradient {
    pub energy: f64,
    /// Flattened `[gx0, gy0, gz0, gx1, ...]`, same layout as the coordinates.
    pub gradient: Vec<f64>,
}

/// Supplies energies and gradients for trial geometries (flat, bohr).
pub trait GradientEngine {
    fn calc_new(&mut self, coords: &[f64]) -> Result<EnergyGradient, OrchestrationError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedGeometry {
    pub coords: Vec<f64>,
    pub energy: f64,
    pub evaluations: usize,
}

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("Energy and gradient evaluation failed: {0}")]
    Engine(Box<OrchestrationError>),

    #[error("Optimization did not converge after {evaluations} gradient evaluations")]
    NotConverged { evaluations: usize },

    #[error("Invalid optimizer keyword '{key}': {reason}")]
    InvalidKeyword { key: String, reason: String },

    #[error("Internal optimizer error: {0}")]
    Internal(String),
}

impl From<OrchestrationError> for OptimizerError {
    fn from(err: OrchestrationError) -> Self {
        OptimizerError::Engine(Box::new(err))
    }
}

/// Optimizer output, kept as text and forwarded line by line to an output monitor.
pub struct OptimizerLog<'m, 'a> {
    output: OutputAccumulator<'m, 'a>,
}

impl<'m, 'a> OptimizerLog<'m, 'a> {
    pub fn new(monitor: Option<&'m OutputMonitor<'a>>) -> Self {
        Self {
            output: OutputAccumulator::new(monitor),
        }
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        debug!(target: "qcrun::optimizer", "{text}");
        self.output.push(text);
        self.output.push("\n");
    }

    pub fn text(&self) -> &str {
        self.output.text()
    }

    pub fn finish(mut self) -> String {
        self.output.finish();
        self.output.into_text()
    }
}

pub trait StepwiseOptimizer {
    /// Minimizes starting from `initial`. Termination is entirely the optimizer's
    /// business; the engine evaluates whatever it is asked to.
    fn optimize(
        &self,
        initial: &[f64],
        engine: &mut dyn GradientEngine,
        log: &mut OptimizerLog<'_, '_>,
    ) -> Result<OptimizedGeometry, OptimizerError>;
}

/// Steepest descent with an adaptive step length.
///
/// A step that lowers the energy is accepted and the next step grows; one that raises
/// it is rejected and the step shrinks. Displacements are capped at `max_step` bohr.
#[derive(Debug, Clone, PartialEq)]
pub struct SteepestDescent {
    pub max_iterations: usize,
    pub convergence_grms: f64,
    pub step_size: f64,
    pub max_step: f64,
}

const GROW: f64 = 1.2;
const SHRINK: f64 = 0.5;

impl Default for SteepestDescent {
    fn default() -> Self {
        Self {
            max_iterations: 300,
            convergence_grms: 3.0e-4,
            step_size: 0.5,
            max_step: 0.3,
        }
    }
}

impl SteepestDescent {
    /// Reads `maxiter`, `convergence_grms`, `step_size` and `max_step`; other keys
    /// are ignored. A `transition = true` request is refused.
    pub fn from_keywords(keywords: &Keywords) -> Result<Self, OptimizerError> {
        if keywords.get("transition").and_then(Value::as_bool) == Some(true) {
            return Err(OptimizerError::InvalidKeyword {
                key: "transition".into(),
                reason: "steepest descent cannot locate transition states".into(),
            });
        }
        let defaults = Self::default();
        let optimizer = Self {
            max_iterations: match keywords.get("maxiter") {
                Some(value) => value
                    .as_u64()
                    .filter(|&n| n > 0)
                    .map(|n| n as usize)
                    .ok_or_else(|| invalid("maxiter", value, "a positive integer"))?,
                None => defaults.max_iterations,
            },
            convergence_grms: positive_float(keywords, "convergence_grms", defaults.convergence_grms)?,
            step_size: positive_float(keywords, "step_size", defaults.step_size)?,
            max_step: positive_float(keywords, "max_step", defaults.max_step)?,
        };
        Ok(optimizer)
    }
}

fn invalid(key: &str, value: &Value, expected: &str) -> OptimizerError {
    OptimizerError::InvalidKeyword {
        key: key.to_string(),
        reason: format!("expected {expected}, found {value}"),
    }
}

fn positive_float(keywords: &Keywords, key: &str, default: f64) -> Result<f64, OptimizerError> {
    match keywords.get(key) {
        Some(value) => value
            .as_f64()
            .filter(|v| *v > 0.0)
            .ok_or_else(|| invalid(key, value, "a positive number")),
        None => Ok(default),
    }
}

fn evaluate(
    engine: &mut dyn GradientEngine,
    coords: &DVector<f64>,
) -> Result<(f64, DVector<f64>), OptimizerError> {
    let result = engine.calc_new(coords.as_slice())?;
    if result.gradient.len() != coords.len() {
        return Err(OptimizerError::Internal(format!(
            "gradient has {} components for {} coordinates",
            result.gradient.len(),
            coords.len()
        )));
    }
    Ok((result.energy, DVector::from_vec(result.gradient)))
}

fn rms(v: &DVector<f64>) -> f64 {
    if v.is_empty() {
        0.0
    } else {
        v.norm() / (v.len() as f64).sqrt()
    }
}

impl StepwiseOptimizer for SteepestDescent {
    fn optimize(
        &self,
        initial: &[f64],
        engine: &mut dyn GradientEngine,
        log: &mut OptimizerLog<'_, '_>,
    ) -> Result<OptimizedGeometry, OptimizerError> {
        log.line(format!(
            "Steepest descent: maxiter = {}, convergence_grms = {:e}, step_size = {}, max_step = {}",
            self.max_iterations, self.convergence_grms, self.step_size, self.max_step
        ));

        let mut coords = DVector::from_column_slice(initial);
        let (mut energy, mut gradient) = evaluate(engine, &coords)?;
        let mut evaluations = 1;
        let mut step = self.step_size;

        loop {
            let grms = rms(&gradient);
            log.line(format!(
                "Step {evaluations:>4}  E = {energy:>18.10}  Grms = {grms:.3e}  step = {step:.3e}"
            ));
            if grms < self.convergence_grms {
                log.line(format!("Converged after {evaluations} gradient evaluations"));
                return Ok(OptimizedGeometry {
                    coords: coords.as_slice().to_vec(),
                    energy,
                    evaluations,
                });
            }
            if evaluations >= self.max_iterations {
                log.line("Maximum number of iterations reached");
                return Err(OptimizerError::NotConverged { evaluations });
            }

            let mut displacement = -&gradient * step;
            let length = displacement.norm();
            if length > self.max_step {
                displacement *= self.max_step / length;
            }
            let trial = &coords + displacement;
            let (trial_energy, trial_gradient) = evaluate(engine, &trial)?;
            evaluations += 1;

            if trial_energy < energy {
                coords = trial;
                energy = trial_energy;
                gradient = trial_gradient;
                step *= GROW;
            } else {
                log.line(format!(
                    "Rejected step: E = {trial_energy:.10} is not below {energy:.10}"
                ));
                step *= SHRINK;
            }
        }
    }
}
