//! Geometry optimization on top of single-point gradients.
//!
//! A [`StepwiseOptimizer`] proposes geometries and asks a [`GradientEngine`] for the
//! energy and gradient at each one. The [`OptimizationBridge`] is the engine that
//! answers by running a full orchestrated computation per step and keeping every
//! step's [`Results`](crate::core::models::results::Results) as the trajectory.

pub mod bridge;
pub mod descent;

pub use bridge::OptimizationBridge;
pub use descent::{
    EnergyGradient, GradientEngine, OptimizedGeometry, OptimizerError, OptimizerLog,
    SteepestDescent, StepwiseOptimizer,
};
