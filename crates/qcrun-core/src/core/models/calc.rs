use phf::{Map, phf_map};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalcType {
    Energy,
    Gradient,
    Hessian,
    Optimization,
    TransitionState,
    ConformerSearch,
}

static CALC_TYPE_NAMES: Map<&'static str, CalcType> = phf_map! {
    "energy" => CalcType::Energy,
    "gradient" => CalcType::Gradient,
    "hessian" => CalcType::Hessian,
    "optimization" => CalcType::Optimization,
    "transition_state" => CalcType::TransitionState,
    "conformer_search" => CalcType::ConformerSearch,
};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown calculation type: '{0}'")]
pub struct ParseCalcTypeError(pub String);

impl CalcType {
    pub const ALL: [CalcType; 6] = [
        CalcType::Energy,
        CalcType::Gradient,
        CalcType::Hessian,
        CalcType::Optimization,
        CalcType::TransitionState,
        CalcType::ConformerSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CalcType::Energy => "energy",
            CalcType::Gradient => "gradient",
            CalcType::Hessian => "hessian",
            CalcType::Optimization => "optimization",
            CalcType::TransitionState => "transition_state",
            CalcType::ConformerSearch => "conformer_search",
        }
    }

    /// Single-point calculations evaluate one geometry and produce energy-like data.
    pub fn is_single_point(&self) -> bool {
        matches!(
            self,
            CalcType::Energy | CalcType::Gradient | CalcType::Hessian
        )
    }
}

impl fmt::Display for CalcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalcType {
    type Err = ParseCalcTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        CALC_TYPE_NAMES
            .get(normalized.as_str())
            .copied()
            .ok_or_else(|| ParseCalcTypeError(s.to_string()))
    }
}
