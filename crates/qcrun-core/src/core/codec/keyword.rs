use super::xyz::{self, XyzFrame};
use super::{CodecError, NativeCodec, NativeInput};
use crate::core::models::calc::CalcType;
use crate::core::models::data::{ConformerSearchData, Payload, SinglePointData};
use crate::core::models::request::CalcSpec;
use nalgebra::{DMatrix, Vector3};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

/// Layout of the native input file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputStyle {
    /// `key value` lines closed by `end` (TeraChem).
    #[default]
    KeyValue,
    /// A `!` simple-input line, `%` blocks and an `* xyzfile` geometry line (ORCA).
    Orca,
    /// A TOML document (CREST).
    Toml,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodecSettings {
    #[serde(default)]
    pub style: InputStyle,
    #[serde(default = "default_geometry_filename")]
    pub geometry_filename: String,
    /// Native run keyword per calculation type, keyed by the snake_case calctype name.
    #[serde(default)]
    pub run_names: BTreeMap<String, String>,
    #[serde(default)]
    pub energy_marker: Option<String>,
    #[serde(default)]
    pub gradient_marker: Option<String>,
    /// Header line of a column-blocked hessian matrix printed to the log.
    #[serde(default)]
    pub hessian_marker: Option<String>,
    #[serde(default)]
    pub version_marker: Option<String>,
    /// Multi-structure XYZ file holding conformers, relative to the output directory.
    #[serde(default)]
    pub conformer_file: Option<String>,
}

fn default_geometry_filename() -> String {
    "geometry.xyz".to_string()
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            style: InputStyle::default(),
            geometry_filename: default_geometry_filename(),
            run_names: BTreeMap::new(),
            energy_marker: None,
            gradient_marker: None,
            hessian_marker: None,
            version_marker: None,
            conformer_file: None,
        }
    }
}

impl CodecSettings {
    pub fn run_name(&self, calctype: CalcType) -> Option<&str> {
        self.run_names.get(calctype.as_str()).map(String::as_str)
    }
}

/// A marker-driven codec: input is generated from the model and keyword bag, output is
/// read by locating marker lines in the program's log.
#[derive(Debug, Clone)]
pub struct KeywordCodec {
    program: String,
    settings: CodecSettings,
}

impl KeywordCodec {
    pub fn new(program: impl Into<String>, settings: CodecSettings) -> Self {
        Self {
            program: program.into(),
            settings,
        }
    }

    pub fn settings(&self) -> &CodecSettings {
        &self.settings
    }

    fn missing(&self, what: &'static str) -> CodecError {
        CodecError::Missing {
            program: self.program.clone(),
            what,
        }
    }

    fn malformed(&self, what: &'static str, detail: impl Into<String>) -> CodecError {
        CodecError::Malformed {
            program: self.program.clone(),
            what,
            detail: detail.into(),
        }
    }

    fn encode_key_value(&self, spec: &CalcSpec, run: &str) -> Result<String, CodecError> {
        let mut out = String::new();
        let _ = writeln!(out, "run {run}");
        let _ = writeln!(out, "method {}", spec.model.method);
        if let Some(basis) = &spec.model.basis {
            let _ = writeln!(out, "basis {basis}");
        }
        let _ = writeln!(out, "charge {}", spec.structure.charge);
        let _ = writeln!(out, "spinmult {}", spec.structure.multiplicity);
        let _ = writeln!(out, "coordinates {}", self.settings.geometry_filename);
        for (key, value) in &spec.keywords {
            let _ = writeln!(out, "{key} {}", scalar_text(key, value)?);
        }
        out.push_str("end\n");
        Ok(out)
    }

    fn encode_orca(&self, spec: &CalcSpec, run: &str) -> Result<String, CodecError> {
        let mut simple: Vec<&str> = vec![spec.model.method.as_str()];
        simple.extend(spec.model.basis.as_deref());
        if !run.is_empty() {
            simple.push(run);
        }

        let mut blocks = String::new();
        for (key, value) in &spec.keywords {
            match value {
                Value::Bool(true) => simple.push(key),
                Value::Bool(false) => {}
                Value::Object(entries) => {
                    let _ = writeln!(blocks, "%{key}");
                    for (sub, sub_value) in entries {
                        let _ = writeln!(blocks, "    {sub} {}", scalar_text(sub, sub_value)?);
                    }
                    blocks.push_str("end\n");
                }
                other => {
                    let _ = writeln!(blocks, "%{key} {}", scalar_text(key, other)?);
                }
            }
        }

        let mut out = format!("! {}\n", simple.join(" "));
        out.push_str(&blocks);
        let _ = writeln!(
            out,
            "* xyzfile {} {} {}",
            spec.structure.charge, spec.structure.multiplicity, self.settings.geometry_filename
        );
        Ok(out)
    }

    fn encode_toml(&self, spec: &CalcSpec, run: &str) -> Result<String, CodecError> {
        let mut doc = toml::Table::new();
        doc.insert(
            "input".into(),
            toml::Value::String(self.settings.geometry_filename.clone()),
        );
        doc.insert("runtype".into(), toml::Value::String(run.to_string()));
        for (key, value) in &spec.keywords {
            let converted = toml::Value::try_from(value).map_err(|e| CodecError::Keyword {
                key: key.clone(),
                reason: e.to_string(),
            })?;
            doc.insert(key.clone(), converted);
        }
        if !doc.contains_key("calculation") {
            let mut level = toml::Table::new();
            level.insert("method".into(), toml::Value::String(spec.model.method.clone()));
            level.insert("charge".into(), toml::Value::Integer(spec.structure.charge.into()));
            level.insert(
                "uhf".into(),
                toml::Value::Integer(i64::from(spec.structure.multiplicity.saturating_sub(1))),
            );
            let mut calculation = toml::Table::new();
            calculation.insert(
                "level".into(),
                toml::Value::Array(vec![toml::Value::Table(level)]),
            );
            doc.insert("calculation".into(), toml::Value::Table(calculation));
        }
        toml::to_string(&doc).map_err(|e| CodecError::Keyword {
            key: "<document>".into(),
            reason: e.to_string(),
        })
    }

    fn energy(&self, stdout: &str) -> Result<f64, CodecError> {
        let marker = self
            .settings
            .energy_marker
            .as_deref()
            .ok_or_else(|| self.missing("energy"))?;
        let line = stdout
            .lines()
            .rev()
            .find(|line| line.contains(marker))
            .ok_or_else(|| self.missing("energy"))?;
        let (_, rest) = line.split_once(marker).unwrap_or(("", line));
        rest.split_whitespace()
            .find_map(|token| token.parse::<f64>().ok())
            .ok_or_else(|| self.malformed("energy", line.trim()))
    }

    fn gradient(&self, stdout: &str, atoms: usize) -> Result<Vec<Vector3<f64>>, CodecError> {
        let marker = self
            .settings
            .gradient_marker
            .as_deref()
            .ok_or_else(|| self.missing("gradient"))?;
        let lines: Vec<&str> = stdout.lines().collect();
        let start = lines
            .iter()
            .rposition(|line| line.contains(marker))
            .ok_or_else(|| self.missing("gradient"))?;

        let mut rows = Vec::with_capacity(atoms);
        for line in &lines[start + 1..] {
            if rows.len() == atoms {
                break;
            }
            match trailing_triple(line) {
                Some(row) => rows.push(row),
                None if rows.is_empty() => continue,
                None => break,
            }
        }
        if rows.len() != atoms {
            return Err(self.malformed(
                "gradient",
                format!("found {} rows for {atoms} atoms", rows.len()),
            ));
        }
        Ok(rows)
    }

    /// Reads a `3N x 3N` matrix printed in column blocks: a line of column indices
    /// followed by rows of `row_index value...`. Indices are 1-based unless the first
    /// column printed is 0.
    fn hessian(&self, stdout: &str, atoms: usize) -> Result<DMatrix<f64>, CodecError> {
        let marker = self
            .settings
            .hessian_marker
            .as_deref()
            .ok_or_else(|| self.missing("hessian"))?;
        let lines: Vec<&str> = stdout.lines().collect();
        let start = lines
            .iter()
            .rposition(|line| line.contains(marker))
            .ok_or_else(|| self.missing("hessian"))?;

        let n = 3 * atoms;
        let mut matrix = DMatrix::<f64>::zeros(n, n);
        let mut filled = 0usize;
        let mut base = None;
        let mut columns: Vec<usize> = Vec::new();
        for line in &lines[start + 1..] {
            if filled == n * n {
                break;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            if let Some(indices) = column_indices(&tokens) {
                let offset = *base.get_or_insert(if indices[0] == 0 { 0 } else { 1 });
                columns = indices
                    .into_iter()
                    .map(|i| i.checked_sub(offset).filter(|c| *c < n))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| self.malformed("hessian", line.trim()))?;
                continue;
            }
            if columns.is_empty() {
                continue;
            }
            let Some((row, values)) = matrix_row(&tokens) else {
                break;
            };
            let row = row
                .checked_sub(base.unwrap_or(1))
                .filter(|r| *r < n)
                .ok_or_else(|| self.malformed("hessian", line.trim()))?;
            if values.len() != columns.len() {
                return Err(self.malformed("hessian", line.trim()));
            }
            for (&col, value) in columns.iter().zip(values) {
                matrix[(row, col)] = value;
                filled += 1;
            }
        }
        if filled != n * n {
            return Err(self.malformed(
                "hessian",
                format!("found {filled} of {} elements", n * n),
            ));
        }
        Ok(matrix)
    }

    fn conformers(&self, spec: &CalcSpec, directory: &Path) -> Result<Payload, CodecError> {
        let file = self
            .settings
            .conformer_file
            .as_deref()
            .ok_or_else(|| self.missing("conformer file"))?;
        let path = directory.join(file);
        let text = std::fs::read_to_string(&path).map_err(|source| CodecError::Io {
            path: path.clone(),
            source,
        })?;
        let frames = xyz::parse_frames(&text, &self.program)?;
        let conformer_energies = frames
            .iter()
            .map(|frame| {
                frame
                    .comment_value()
                    .ok_or_else(|| self.malformed("conformer energy", frame.comment.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let conformers = frames
            .into_iter()
            .map(|frame: XyzFrame| frame.into_structure(&spec.structure))
            .collect();
        Ok(Payload::ConformerSearch(ConformerSearchData {
            conformers,
            conformer_energies,
            ..Default::default()
        }))
    }
}

impl NativeCodec for KeywordCodec {
    fn encode(&self, spec: &CalcSpec) -> Result<NativeInput, CodecError> {
        let run = self
            .settings
            .run_name(spec.calctype)
            .ok_or_else(|| CodecError::UnsupportedCalcType {
                program: self.program.clone(),
                calctype: spec.calctype,
            })?;
        let input_file = match self.settings.style {
            InputStyle::KeyValue => self.encode_key_value(spec, run)?,
            InputStyle::Orca => self.encode_orca(spec, run)?,
            InputStyle::Toml => self.encode_toml(spec, run)?,
        };
        Ok(NativeInput {
            input_file,
            geometry_filename: self.settings.geometry_filename.clone(),
            geometry_file: xyz::to_xyz(&spec.structure, &self.program),
        })
    }

    fn decode(
        &self,
        spec: &CalcSpec,
        stdout: &str,
        directory: &Path,
    ) -> Result<Payload, CodecError> {
        match spec.calctype {
            CalcType::Energy => Ok(Payload::SinglePoint(SinglePointData {
                energy: Some(self.energy(stdout)?),
                ..Default::default()
            })),
            CalcType::Gradient => Ok(Payload::SinglePoint(SinglePointData {
                energy: Some(self.energy(stdout)?),
                gradient: Some(self.gradient(stdout, spec.structure.num_atoms())?),
                ..Default::default()
            })),
            CalcType::Hessian => Ok(Payload::SinglePoint(SinglePointData {
                energy: Some(self.energy(stdout)?),
                hessian: Some(self.hessian(stdout, spec.structure.num_atoms())?),
                ..Default::default()
            })),
            CalcType::ConformerSearch => self.conformers(spec, directory),
            calctype => Err(CodecError::UnsupportedCalcType {
                program: self.program.clone(),
                calctype,
            }),
        }
    }

    fn parse_version(&self, stdout: &str) -> Result<String, CodecError> {
        let marker = self
            .settings
            .version_marker
            .as_deref()
            .ok_or_else(|| self.missing("version"))?;
        let line = stdout
            .lines()
            .find(|line| line.contains(marker))
            .ok_or_else(|| self.missing("version"))?;
        let (_, rest) = line.split_once(marker).unwrap_or(("", line));
        rest.split_whitespace()
            .next()
            .map(|token| token.trim_matches(|c| c == ',' || c == ':'))
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or_else(|| self.malformed("version", line.trim()))
    }
}

fn scalar_text(key: &str, value: &Value) -> Result<String, CodecError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Bool(flag) => Ok(if *flag { "yes" } else { "no" }.to_string()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Array(items) => items
            .iter()
            .map(|item| scalar_text(key, item))
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join(" ")),
        Value::Null | Value::Object(_) => Err(CodecError::Keyword {
            key: key.to_string(),
            reason: "only scalars and lists of scalars are supported".to_string(),
        }),
    }
}

fn column_indices(tokens: &[&str]) -> Option<Vec<usize>> {
    tokens.iter().map(|token| token.parse().ok()).collect()
}

fn matrix_row(tokens: &[&str]) -> Option<(usize, Vec<f64>)> {
    let (first, rest) = tokens.split_first()?;
    if rest.is_empty() {
        return None;
    }
    let row = first.parse().ok()?;
    let values = rest
        .iter()
        .map(|token| token.parse().ok())
        .collect::<Option<Vec<f64>>>()?;
    Some((row, values))
}

fn trailing_triple(line: &str) -> Option<Vector3<f64>> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }
    let tail = &tokens[tokens.len() - 3..];
    let x = tail[0].parse().ok()?;
    let y = tail[1].parse().ok()?;
    let z = tail[2].parse().ok()?;
    Some(Vector3::new(x, y, z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::request::Model;
    use crate::core::models::structure::Structure;
    use nalgebra::Point3;

    fn settings(style: InputStyle) -> CodecSettings {
        CodecSettings {
            style,
            run_names: [("energy", "energy"), ("gradient", "gradient")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            energy_marker: Some("FINAL ENERGY:".into()),
            gradient_marker: Some("dE/dX".into()),
            version_marker: Some("TeraChem v".into()),
            ..Default::default()
        }
    }

    fn spec(calctype: CalcType) -> CalcSpec {
        let structure = Structure::new(
            vec!["H".into(), "H".into()],
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 1.4)],
        )
        .unwrap();
        CalcSpec::new(calctype, structure, Model::new("hf").with_basis("sto-3g"))
    }

    #[test]
    fn key_value_input_names_the_run_and_geometry() {
        let codec = KeywordCodec::new("terachem", settings(InputStyle::KeyValue));
        let mut spec = spec(CalcType::Gradient);
        spec.keywords.insert("purify".into(), Value::Bool(false));
        let native = codec.encode(&spec).unwrap();
        assert!(native.input_file.starts_with("run gradient\n"));
        assert!(native.input_file.contains("basis sto-3g\n"));
        assert!(native.input_file.contains("coordinates geometry.xyz\n"));
        assert!(native.input_file.contains("purify no\n"));
        assert!(native.input_file.ends_with("end\n"));
        assert_eq!(native.geometry_filename, "geometry.xyz");
        assert!(native.geometry_file.starts_with("2\n"));
    }

    #[test]
    fn orca_input_puts_flags_on_the_simple_line() {
        let codec = KeywordCodec::new("orca", settings(InputStyle::Orca));
        let mut spec = spec(CalcType::Energy);
        spec.keywords.insert("tightscf".into(), Value::Bool(true));
        spec.keywords
            .insert("scf".into(), serde_json::json!({ "maxiter": 200 }));
        let input = codec.encode(&spec).unwrap().input_file;
        assert!(input.starts_with("! hf sto-3g energy tightscf\n"));
        assert!(input.contains("%scf\n    maxiter 200\nend\n"));
        assert!(input.contains("* xyzfile 0 1 geometry.xyz\n"));
    }

    #[test]
    fn toml_input_is_a_valid_document() {
        let codec = KeywordCodec::new("crest", settings(InputStyle::Toml));
        let mut spec = spec(CalcType::Energy);
        spec.keywords.insert("threads".into(), Value::from(4));
        let input = codec.encode(&spec).unwrap().input_file;
        let doc: toml::Table = toml::from_str(&input).unwrap();
        assert_eq!(doc["runtype"].as_str(), Some("energy"));
        assert_eq!(doc["threads"].as_integer(), Some(4));
        assert_eq!(doc["calculation"]["level"][0]["method"].as_str(), Some("hf"));
    }

    #[test]
    fn calctype_without_a_run_name_cannot_be_encoded() {
        let codec = KeywordCodec::new("terachem", settings(InputStyle::KeyValue));
        let err = codec.encode(&spec(CalcType::Hessian)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnsupportedCalcType {
                calctype: CalcType::Hessian,
                ..
            }
        ));
    }

    #[test]
    fn gradient_output_decodes_energy_and_rows() {
        let codec = KeywordCodec::new("terachem", settings(InputStyle::KeyValue));
        let stdout = "\
            TeraChem v1.9-2022.03-dev\n\
            FINAL ENERGY: -1.1167 a.u.\n\
            dE/dX            dE/dY            dE/dZ\n\
            0.0000000   0.0000000   -0.0100000\n\
            0.0000000   0.0000000    0.0100000\n\
            -----\n";
        let payload = codec
            .decode(&spec(CalcType::Gradient), stdout, Path::new("."))
            .unwrap();
        let Payload::SinglePoint(sp) = payload else {
            panic!("expected a single-point payload");
        };
        assert_eq!(sp.energy, Some(-1.1167));
        assert_eq!(sp.flat_gradient().unwrap()[5], 0.01);
        assert_eq!(codec.parse_version(stdout).unwrap(), "1.9-2022.03-dev");
    }

    #[test]
    fn hessian_is_assembled_from_column_blocks() {
        let codec = KeywordCodec::new(
            "terachem",
            CodecSettings {
                hessian_marker: Some("*** Hessian Matrix".into()),
                ..settings(InputStyle::KeyValue)
            },
        );
        let mut stdout = String::from("FINAL ENERGY: -1.1167 a.u.\n*** Hessian Matrix (Hartree/Bohr^2) ***\n");
        for block in [1..=4, 5..=6] {
            let header: Vec<String> = block.clone().map(|c| c.to_string()).collect();
            stdout.push_str(&format!("      {}\n", header.join("      ")));
            for row in 1..=6 {
                let values: Vec<String> = block
                    .clone()
                    .map(|col| format!("{:.4}", (row * 10 + col) as f64 / 100.0))
                    .collect();
                stdout.push_str(&format!("  {row}  {}\n", values.join("  ")));
            }
            stdout.push('\n');
        }
        stdout.push_str("Wall time: 1.0 s\n");

        let payload = codec
            .decode(&spec(CalcType::Hessian), &stdout, Path::new("."))
            .unwrap();
        let Payload::SinglePoint(sp) = payload else {
            panic!("expected a single-point payload");
        };
        let hessian = sp.hessian.unwrap();
        assert_eq!(hessian.shape(), (6, 6));
        assert_eq!(hessian[(0, 0)], 0.11);
        assert_eq!(hessian[(2, 4)], 0.35);
        assert_eq!(hessian[(5, 5)], 0.66);
        assert_eq!(sp.energy, Some(-1.1167));
    }

    #[test]
    fn truncated_hessian_is_malformed() {
        let codec = KeywordCodec::new(
            "terachem",
            CodecSettings {
                hessian_marker: Some("*** Hessian Matrix".into()),
                ..settings(InputStyle::KeyValue)
            },
        );
        let stdout = "FINAL ENERGY: -1.0\n*** Hessian Matrix ***\n 1 2\n 1 0.1 0.2\ndone\n";
        let err = codec
            .decode(&spec(CalcType::Hessian), stdout, Path::new("."))
            .unwrap_err();
        assert!(matches!(err, CodecError::Malformed { what: "hessian", .. }));
    }

    #[test]
    fn missing_energy_marker_is_reported() {
        let codec = KeywordCodec::new("terachem", settings(InputStyle::KeyValue));
        let err = codec
            .decode(&spec(CalcType::Energy), "nothing here\n", Path::new("."))
            .unwrap_err();
        assert!(matches!(err, CodecError::Missing { what: "energy", .. }));
        assert!(codec.parse_version("no banner").is_err());
    }

    #[test]
    fn conformers_are_read_from_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("crest_conformers.xyz"),
            "2\n  -1.50\nH 0 0 0\nH 0 0 0.74\n2\n  -1.40\nH 0 0 0\nH 0 0 0.80\n",
        )
        .unwrap();
        let codec = KeywordCodec::new(
            "crest",
            CodecSettings {
                conformer_file: Some("crest_conformers.xyz".into()),
                ..settings(InputStyle::Toml)
            },
        );
        let payload = codec
            .decode(&spec(CalcType::ConformerSearch), "", dir.path())
            .unwrap();
        let Payload::ConformerSearch(search) = payload else {
            panic!("expected a conformer search payload");
        };
        assert_eq!(search.conformer_energies, vec![-1.5, -1.4]);
        assert_eq!(search.conformers.len(), 2);
    }
}
