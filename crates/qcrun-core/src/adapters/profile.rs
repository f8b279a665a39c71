use crate::core::codec::{CodecSettings, InputStyle};
use crate::core::models::calc::CalcType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Where a program leaves the files its output decoder reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLocation {
    #[default]
    WorkingDir,
    /// The first `scr.*` directory the program creates in the working directory.
    ScratchSubdir,
}

/// Names of the wavefunction files a program writes into its output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WavefunctionLayout {
    /// Relative to the working directory. Defaults to `scr.<geometry file stem>`.
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default = "default_restricted")]
    pub restricted: String,
    #[serde(default = "default_alpha")]
    pub alpha: String,
    #[serde(default = "default_beta")]
    pub beta: String,
    /// Keyword that tells the program which files to read its initial guess from.
    #[serde(default = "default_guess_keyword")]
    pub guess_keyword: String,
}

fn default_restricted() -> String {
    "c0".to_string()
}

fn default_alpha() -> String {
    "ca0".to_string()
}

fn default_beta() -> String {
    "cb0".to_string()
}

fn default_guess_keyword() -> String {
    "guess".to_string()
}

impl Default for WavefunctionLayout {
    fn default() -> Self {
        Self {
            directory: None,
            restricted: default_restricted(),
            alpha: default_alpha(),
            beta: default_beta(),
            guess_keyword: default_guess_keyword(),
        }
    }
}

/// Everything needed to drive a file-in/file-out program through the keyword codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramProfile {
    /// Filled from the table name when loaded from a profiles file.
    #[serde(default)]
    pub program: String,
    /// Executable to launch when it differs from the program name.
    #[serde(default)]
    pub executable: Option<String>,
    /// Arguments placed before the input file name.
    #[serde(default)]
    pub launch_args: Vec<String>,
    pub supported_calc_types: Vec<CalcType>,
    pub input_filename: String,
    #[serde(default)]
    pub output_location: OutputLocation,
    /// Text the program prints when it fails but still exits with status zero.
    #[serde(default)]
    pub failure_marker: Option<String>,
    #[serde(default = "default_version_arg")]
    pub version_arg: String,
    /// Stripped from the output of `<program> <version_arg>`.
    #[serde(default)]
    pub version_prefix: Option<String>,
    #[serde(default)]
    pub install_hint: Option<String>,
    #[serde(default)]
    pub wavefunction: Option<WavefunctionLayout>,
    #[serde(default)]
    pub codec: CodecSettings,
}

fn default_version_arg() -> String {
    "--version".to_string()
}

impl ProgramProfile {
    pub fn executable(&self) -> &str {
        self.executable.as_deref().unwrap_or(&self.program)
    }

    /// Directory holding wavefunction files, relative to the working directory.
    pub fn wavefunction_dir(&self) -> Option<String> {
        let layout = self.wavefunction.as_ref()?;
        Some(match &layout.directory {
            Some(directory) => directory.clone(),
            None => {
                let stem = Path::new(&self.codec.geometry_filename)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("scr.{stem}")
            }
        })
    }

    pub fn terachem() -> Self {
        Self {
            program: "terachem".into(),
            executable: None,
            launch_args: Vec::new(),
            supported_calc_types: vec![CalcType::Energy, CalcType::Gradient, CalcType::Hessian],
            input_filename: "tc.in".into(),
            output_location: OutputLocation::ScratchSubdir,
            failure_marker: None,
            version_arg: default_version_arg(),
            version_prefix: Some("TeraChem version ".into()),
            install_hint: Some(
                "Install TeraChem from https://www.petachem.com and make sure 'terachem' is on your PATH."
                    .into(),
            ),
            wavefunction: Some(WavefunctionLayout::default()),
            codec: CodecSettings {
                style: InputStyle::KeyValue,
                run_names: run_names(&[
                    ("energy", "energy"),
                    ("gradient", "gradient"),
                    ("hessian", "frequencies"),
                ]),
                energy_marker: Some("FINAL ENERGY:".into()),
                gradient_marker: Some("dE/dX".into()),
                hessian_marker: Some("*** Hessian Matrix".into()),
                version_marker: Some("TeraChem v".into()),
                ..Default::default()
            },
        }
    }

    pub fn crest() -> Self {
        Self {
            program: "crest".into(),
            executable: None,
            launch_args: Vec::new(),
            supported_calc_types: vec![CalcType::ConformerSearch],
            input_filename: "input.toml".into(),
            output_location: OutputLocation::WorkingDir,
            failure_marker: Some("FAILED".into()),
            version_arg: default_version_arg(),
            version_prefix: None,
            install_hint: Some(
                "Install CREST with 'conda install -c conda-forge crest' or from https://github.com/crest-lab/crest."
                    .into(),
            ),
            wavefunction: None,
            codec: CodecSettings {
                style: InputStyle::Toml,
                geometry_filename: "structure.xyz".into(),
                run_names: run_names(&[("conformer_search", "imtd-gc")]),
                version_marker: Some("Version".into()),
                conformer_file: Some("crest_conformers.xyz".into()),
                ..Default::default()
            },
        }
    }

    pub fn orca() -> Self {
        Self {
            program: "orca".into(),
            executable: None,
            launch_args: Vec::new(),
            supported_calc_types: vec![CalcType::Energy, CalcType::Gradient],
            input_filename: "orca.inp".into(),
            output_location: OutputLocation::WorkingDir,
            failure_marker: Some("ORCA finished by error termination".into()),
            version_arg: default_version_arg(),
            version_prefix: None,
            install_hint: Some(
                "Download ORCA from https://orcaforum.kofo.mpg.de and add its directory to your PATH."
                    .into(),
            ),
            wavefunction: None,
            codec: CodecSettings {
                style: InputStyle::Orca,
                run_names: run_names(&[("energy", "SP"), ("gradient", "EnGrad")]),
                energy_marker: Some("FINAL SINGLE POINT ENERGY".into()),
                gradient_marker: Some("CARTESIAN GRADIENT".into()),
                version_marker: Some("Program Version".into()),
                ..Default::default()
            },
        }
    }

    pub fn builtin() -> Vec<Self> {
        vec![Self::terachem(), Self::crest(), Self::orca()]
    }
}

fn run_names(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(calctype, run)| (calctype.to_string(), run.to_string()))
        .collect()
}

#[derive(Debug, Error)]
pub enum ProfileLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
}

/// Loads program profiles from a TOML file with one table per program, e.g.
///
/// ```toml
/// [mopac]
/// supported_calc_types = ["energy"]
/// input_filename = "job.mop"
///
/// [mopac.codec]
/// run_names = { energy = "1SCF" }
/// energy_marker = "TOTAL ENERGY"
/// ```
pub fn load_profiles(path: &Path) -> Result<Vec<ProgramProfile>, ProfileLoadError> {
    let content = std::fs::read_to_string(path).map_err(|e| ProfileLoadError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    let table: BTreeMap<String, ProgramProfile> =
        toml::from_str(&content).map_err(|e| ProfileLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
    Ok(table
        .into_iter()
        .map(|(name, mut profile)| {
            if profile.program.is_empty() {
                profile.program = name;
            }
            profile
        })
        .collect())
}
