use super::files::Files;
use super::results::Results;
use super::structure::Structure;
use nalgebra::{DMatrix, Vector3};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SinglePointData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    /// One row per atom, in hartree/bohr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient: Option<Vec<Vector3<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hessian: Option<DMatrix<f64>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

impl SinglePointData {
    /// Gradient flattened to `[gx0, gy0, gz0, gx1, ...]`.
    pub fn flat_gradient(&self) -> Option<Vec<f64>> {
        self.gradient
            .as_ref()
            .map(|rows| rows.iter().flat_map(|g| [g.x, g.y, g.z]).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationData {
    pub trajectory: Vec<Results>,
}

impl OptimizationData {
    pub fn new(trajectory: Vec<Results>) -> Self {
        Self { trajectory }
    }

    /// Energies of every step that produced one, in step order.
    pub fn energies(&self) -> Vec<f64> {
        self.trajectory
            .iter()
            .filter_map(|step| step.data.single_point().and_then(|sp| sp.energy))
            .collect()
    }

    pub fn final_structure(&self) -> Option<&Structure> {
        self.trajectory
            .last()
            .and_then(|step| step.input_data.structure())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConformerSearchData {
    pub conformers: Vec<Structure>,
    pub conformer_energies: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rotamers: Vec<Structure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rotamer_energies: Vec<f64>,
}

/// The program-specific part of a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    #[default]
    Empty,
    SinglePoint(SinglePointData),
    Optimization(OptimizationData),
    ConformerSearch(ConformerSearchData),
}

/// A payload plus the files that accompany it (collected outputs, wavefunctions).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Data {
    #[serde(flatten)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Files::is_empty")]
    pub files: Files,
}

impl Data {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single_point(&self) -> Option<&SinglePointData> {
        match &self.payload {
            Payload::SinglePoint(sp) => Some(sp),
            _ => None,
        }
    }

    pub fn optimization(&self) -> Option<&OptimizationData> {
        match &self.payload {
            Payload::Optimization(opt) => Some(opt),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.payload, Payload::Empty) && self.files.is_empty()
    }
}

impl From<Payload> for Data {
    fn from(payload: Payload) -> Self {
        Self {
            payload,
            files: Files::new(),
        }
    }
}

impl From<SinglePointData> for Data {
    fn from(sp: SinglePointData) -> Self {
        Payload::SinglePoint(sp).into()
    }
}

impl From<OptimizationData> for Data {
    fn from(opt: OptimizationData) -> Self {
        Payload::Optimization(opt).into()
    }
}
