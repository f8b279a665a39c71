use super::calc::CalcType;
use super::files::Files;
use super::structure::Structure;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form keyword bag passed through to the program's native input.
pub type Keywords = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basis: Option<String>,
}

impl Model {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            basis: None,
        }
    }

    pub fn with_basis(mut self, basis: impl Into<String>) -> Self {
        self.basis = Some(basis.into());
        self
    }
}

/// A structured calculation for a single program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcSpec {
    pub calctype: CalcType,
    pub structure: Structure,
    pub model: Model,
    #[serde(default)]
    pub keywords: Keywords,
    #[serde(default)]
    pub files: Files,
    #[serde(default)]
    pub extras: Map<String, Value>,
}

impl CalcSpec {
    pub fn new(calctype: CalcType, structure: Structure, model: Model) -> Self {
        Self {
            calctype,
            structure,
            model,
            keywords: Keywords::new(),
            files: Files::new(),
            extras: Map::new(),
        }
    }
}

/// The program-level arguments of a calculation, without a structure or calctype.
///
/// Composite calculations carry one of these as the template for every
/// subprogram invocation they make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramArgs {
    pub model: Model,
    #[serde(default)]
    pub keywords: Keywords,
    #[serde(default)]
    pub files: Files,
    #[serde(default)]
    pub extras: Map<String, Value>,
}

impl ProgramArgs {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            keywords: Keywords::new(),
            files: Files::new(),
            extras: Map::new(),
        }
    }

    pub fn to_calc_spec(&self, calctype: CalcType, structure: Structure) -> CalcSpec {
        CalcSpec {
            calctype,
            structure,
            model: self.model.clone(),
            keywords: self.keywords.clone(),
            files: self.files.clone(),
            extras: self.extras.clone(),
        }
    }
}

/// A calculation driven by one program that repeatedly calls another (the
/// subprogram), e.g. a geometry optimization over single-point gradients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeCalcSpec {
    pub calctype: CalcType,
    pub structure: Structure,
    pub subprogram: String,
    pub subprogram_spec: ProgramArgs,
    #[serde(default)]
    pub keywords: Keywords,
    #[serde(default)]
    pub files: Files,
    #[serde(default)]
    pub extras: Map<String, Value>,
}

/// A raw "run this command against these files" request. It has no calctype and no
/// structured output; the result is whatever files the program leaves behind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSpec {
    #[serde(default)]
    pub files: Files,
    #[serde(default)]
    pub cmdline_args: Vec<String>,
    #[serde(default)]
    pub extras: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    Calc(CalcSpec),
    Composite(CompositeCalcSpec),
    File(FileSpec),
}

impl Request {
    pub fn calctype(&self) -> Option<CalcType> {
        match self {
            Request::Calc(spec) => Some(spec.calctype),
            Request::Composite(spec) => Some(spec.calctype),
            Request::File(_) => None,
        }
    }

    pub fn files(&self) -> &Files {
        match self {
            Request::Calc(spec) => &spec.files,
            Request::Composite(spec) => &spec.files,
            Request::File(spec) => &spec.files,
        }
    }

    pub fn files_mut(&mut self) -> &mut Files {
        match self {
            Request::Calc(spec) => &mut spec.files,
            Request::Composite(spec) => &mut spec.files,
            Request::File(spec) => &mut spec.files,
        }
    }

    /// The keyword bag, if this kind of request has one.
    pub fn keywords_mut(&mut self) -> Option<&mut Keywords> {
        match self {
            Request::Calc(spec) => Some(&mut spec.keywords),
            Request::Composite(spec) => Some(&mut spec.keywords),
            Request::File(_) => None,
        }
    }

    pub fn structure(&self) -> Option<&Structure> {
        match self {
            Request::Calc(spec) => Some(&spec.structure),
            Request::Composite(spec) => Some(&spec.structure),
            Request::File(_) => None,
        }
    }

    pub fn is_file_request(&self) -> bool {
        matches!(self, Request::File(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Request::Calc(_) => "calc",
            Request::Composite(_) => "composite",
            Request::File(_) => "file",
        }
    }
}

impl From<CalcSpec> for Request {
    fn from(spec: CalcSpec) -> Self {
        Request::Calc(spec)
    }
}

impl From<CompositeCalcSpec> for Request {
    fn from(spec: CompositeCalcSpec) -> Self {
        Request::Composite(spec)
    }
}

impl From<FileSpec> for Request {
    fn from(spec: FileSpec) -> Self {
        Request::File(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn h2() -> Structure {
        Structure::new(
            vec!["H".into(), "H".into()],
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 1.4)],
        )
        .unwrap()
    }

    #[test]
    fn calctype_is_absent_for_file_requests() {
        let request = Request::from(FileSpec::default());
        assert_eq!(request.calctype(), None);
        assert!(request.is_file_request());
        assert!(request.structure().is_none());
    }

    #[test]
    fn files_mut_reaches_the_inner_bag() {
        let mut request = Request::from(CalcSpec::new(CalcType::Energy, h2(), Model::new("hf")));
        request.files_mut().insert("guess.dat", "123");
        assert!(request.files().contains("guess.dat"));
    }

    #[test]
    fn program_args_expand_into_a_calc_spec() {
        let mut args = ProgramArgs::new(Model::new("b3lyp").with_basis("6-31g"));
        args.keywords.insert("maxit".into(), Value::from(50));
        let spec = args.to_calc_spec(CalcType::Gradient, h2());
        assert_eq!(spec.calctype, CalcType::Gradient);
        assert_eq!(spec.model.basis.as_deref(), Some("6-31g"));
        assert_eq!(spec.keywords["maxit"], Value::from(50));
    }

    #[test]
    fn request_json_is_tagged_by_kind() {
        let json = serde_json::json!({
            "kind": "file",
            "files": { "in.txt": "data" },
            "cmdline_args": ["in.txt"]
        });
        let request: Request = serde_json::from_value(json).unwrap();
        match request {
            Request::File(spec) => {
                assert_eq!(spec.cmdline_args, vec!["in.txt".to_string()]);
                assert!(spec.files.contains("in.txt"));
            }
            other => panic!("expected a file request, got {}", other.kind()),
        }
    }
}
