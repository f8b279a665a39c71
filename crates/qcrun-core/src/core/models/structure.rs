use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructureError {
    #[error("Flat coordinate vector has length {found}, expected {expected} (3 x {atoms} atoms)")]
    CoordinateLength {
        found: usize,
        expected: usize,
        atoms: usize,
    },
    #[error("Structure has {symbols} symbols but {points} geometry points")]
    Inconsistent { symbols: usize, points: usize },
}

/// A molecular structure. Coordinates are cartesian and in bohr.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub symbols: Vec<String>,
    pub geometry: Vec<Point3<f64>>,
    #[serde(default)]
    pub charge: i32,
    #[serde(default = "default_multiplicity")]
    pub multiplicity: u32,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

fn default_multiplicity() -> u32 {
    1
}

impl Structure {
    pub fn new(symbols: Vec<String>, geometry: Vec<Point3<f64>>) -> Result<Self, StructureError> {
        if symbols.len() != geometry.len() {
            return Err(StructureError::Inconsistent {
                symbols: symbols.len(),
                points: geometry.len(),
            });
        }
        Ok(Self {
            symbols,
            geometry,
            charge: 0,
            multiplicity: 1,
            extras: Map::new(),
        })
    }

    pub fn num_atoms(&self) -> usize {
        self.symbols.len()
    }

    /// Row-major `[x0, y0, z0, x1, ...]` view of the geometry.
    pub fn flat_geometry(&self) -> Vec<f64> {
        self.geometry
            .iter()
            .flat_map(|p| [p.x, p.y, p.z])
            .collect()
    }

    /// Returns a copy of this structure whose geometry is replaced by `coords`.
    ///
    /// Everything except the coordinates (symbols, charge, multiplicity, extras) is
    /// carried over unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::CoordinateLength`] if `coords` does not hold exactly
    /// three values per atom.
    pub fn with_flat_geometry(&self, coords: &[f64]) -> Result<Self, StructureError> {
        let expected = self.num_atoms() * 3;
        if coords.len() != expected {
            return Err(StructureError::CoordinateLength {
                found: coords.len(),
                expected,
                atoms: self.num_atoms(),
            });
        }
        let geometry = coords
            .chunks_exact(3)
            .map(|c| Point3::new(c[0], c[1], c[2]))
            .collect();
        Ok(Self {
            geometry,
            ..self.clone()
        })
    }
}
