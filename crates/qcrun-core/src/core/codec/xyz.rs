use super::CodecError;
use crate::core::models::structure::Structure;
use nalgebra::Point3;
use std::fmt::Write;

pub const BOHR_TO_ANGSTROM: f64 = 0.529_177_210_903;

/// Renders `structure` as a single-frame XYZ file in angstrom.
pub fn to_xyz(structure: &Structure, comment: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", structure.num_atoms());
    let _ = writeln!(out, "{comment}");
    for (symbol, point) in structure.symbols.iter().zip(&structure.geometry) {
        let p = point.coords * BOHR_TO_ANGSTROM;
        let _ = writeln!(out, "{symbol:<3} {:>18.12} {:>18.12} {:>18.12}", p.x, p.y, p.z);
    }
    out
}

/// One frame of a multi-structure XYZ file.
#[derive(Debug, Clone, PartialEq)]
pub struct XyzFrame {
    pub symbols: Vec<String>,
    /// Bohr.
    pub geometry: Vec<Point3<f64>>,
    pub comment: String,
}

impl XyzFrame {
    /// The first number on the comment line, which is where most programs put the
    /// frame's energy.
    pub fn comment_value(&self) -> Option<f64> {
        self.comment
            .split_whitespace()
            .find_map(|token| token.parse::<f64>().ok())
    }

    pub fn into_structure(self, template: &Structure) -> Structure {
        Structure {
            symbols: self.symbols,
            geometry: self.geometry,
            charge: template.charge,
            multiplicity: template.multiplicity,
            extras: Default::default(),
        }
    }
}

pub fn parse_frames(text: &str, program: &str) -> Result<Vec<XyzFrame>, CodecError> {
    let malformed = |detail: String| CodecError::Malformed {
        program: program.to_string(),
        what: "xyz file",
        detail,
    };

    let mut lines = text.lines();
    let mut frames = Vec::new();
    while let Some(header) = lines.next() {
        let header = header.trim();
        if header.is_empty() {
            continue;
        }
        let count: usize = header
            .parse()
            .map_err(|_| malformed(format!("expected an atom count, found '{header}'")))?;
        let comment = lines.next().unwrap_or_default().trim().to_string();

        let mut symbols = Vec::with_capacity(count);
        let mut geometry = Vec::with_capacity(count);
        for i in 0..count {
            let line = lines
                .next()
                .ok_or_else(|| malformed(format!("frame ended after {i} of {count} atoms")))?;
            let mut fields = line.split_whitespace();
            let symbol = fields
                .next()
                .ok_or_else(|| malformed("empty atom line".to_string()))?;
            let coords: Vec<f64> = fields
                .take(3)
                .map(str::parse)
                .collect::<Result<_, _>>()
                .map_err(|e| malformed(format!("bad coordinate on '{line}': {e}")))?;
            if coords.len() != 3 {
                return Err(malformed(format!("atom line '{line}' has fewer than 3 coordinates")));
            }
            symbols.push(symbol.to_string());
            geometry.push(Point3::new(
                coords[0] / BOHR_TO_ANGSTROM,
                coords[1] / BOHR_TO_ANGSTROM,
                coords[2] / BOHR_TO_ANGSTROM,
            ));
        }
        frames.push(XyzFrame {
            symbols,
            geometry,
            comment,
        });
    }
    Ok(frames)
}
