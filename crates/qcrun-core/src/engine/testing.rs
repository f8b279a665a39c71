//! Test doubles shared by the engine and adapter tests.

use super::adapter::{Adapter, ComputeContext};
use super::error::{BoxError, OrchestrationError};
use super::fallback::{FallbackEngine, FallbackOutput};
use crate::core::models::calc::CalcType;
use crate::core::models::data::{Data, SinglePointData};
use crate::core::models::files::{FileContent, Files};
use crate::core::models::request::{CalcSpec, Model, Request};
use crate::core::models::results::Results;
use crate::core::models::structure::Structure;
use nalgebra::{Point3, Vector3};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) const WAVEFUNCTION_FILE: &str = "wfn.dat";

pub(crate) fn h2() -> Structure {
    Structure::new(
        vec!["H".into(), "H".into()],
        vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 1.4)],
    )
    .unwrap()
}

pub(crate) fn calc_request(calctype: CalcType) -> Request {
    Request::Calc(CalcSpec::new(calctype, h2(), Model::new("hf")))
}

pub(crate) fn energy_request() -> Request {
    calc_request(CalcType::Energy)
}

#[derive(Clone)]
pub(crate) enum MockBehavior {
    Energy(f64),
    /// `E = k/2 |x - x0|^2`, failing on every call after the first `fail_after`.
    Harmonic {
        minimum: Vec<f64>,
        k: f64,
        fail_after: Option<usize>,
    },
    Fail {
        message: String,
        logs: Option<String>,
        data: Option<Data>,
    },
}

#[derive(Clone)]
pub(crate) struct MockAdapter {
    program: String,
    calc_types: Vec<CalcType>,
    staged: bool,
    behavior: MockBehavior,
    outputs: Vec<(String, String)>,
    wavefunction: bool,
    version: Option<String>,
    version_fails: bool,
    pub calls: Arc<AtomicUsize>,
}

impl MockAdapter {
    pub fn new(program: &str, calc_types: &[CalcType]) -> Self {
        Self {
            program: program.to_string(),
            calc_types: calc_types.to_vec(),
            staged: true,
            behavior: MockBehavior::Energy(-1.0),
            outputs: Vec::new(),
            wavefunction: false,
            version: Some("1.0.0".to_string()),
            version_fails: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn failing(self, message: &str) -> Self {
        self.behavior(MockBehavior::Fail {
            message: message.to_string(),
            logs: Some(format!("{message}\n")),
            data: None,
        })
    }

    pub fn unstaged(mut self) -> Self {
        self.staged = false;
        self
    }

    pub fn writing(mut self, path: &str, content: &str) -> Self {
        self.outputs.push((path.to_string(), content.to_string()));
        self
    }

    pub fn with_wavefunction(mut self) -> Self {
        self.wavefunction = true;
        self
    }

    pub fn failing_version(mut self) -> Self {
        self.version_fails = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn boxed(self) -> Box<dyn Adapter> {
        Box::new(self)
    }
}

impl Adapter for MockAdapter {
    fn program(&self) -> &str {
        &self.program
    }

    fn supported_calc_types(&self) -> &[CalcType] {
        &self.calc_types
    }

    fn uses_staged_files(&self) -> bool {
        self.staged
    }

    fn compute_data(
        &self,
        request: &Request,
        ctx: &ComputeContext<'_>,
    ) -> Result<(Data, String), OrchestrationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        for (path, content) in &self.outputs {
            std::fs::write(ctx.workdir.join(path), content).unwrap();
        }
        if self.wavefunction {
            std::fs::write(ctx.workdir.join(WAVEFUNCTION_FILE), format!("step {call}")).unwrap();
        }
        let logs = format!("{} call {call}\n", self.program);
        if let Some(monitor) = ctx.monitor {
            monitor.emit(&logs, &logs);
        }

        match &self.behavior {
            MockBehavior::Energy(energy) => Ok((
                SinglePointData {
                    energy: Some(*energy),
                    ..Default::default()
                }
                .into(),
                logs,
            )),
            MockBehavior::Harmonic {
                minimum,
                k,
                fail_after,
            } => {
                if fail_after.is_some_and(|limit| call >= limit) {
                    return Err(OrchestrationError::external_failure(
                        &self.program,
                        "SCF did not converge",
                    )
                    .with_logs(logs));
                }
                let coords = request.structure().unwrap().flat_geometry();
                let displacement: Vec<f64> =
                    coords.iter().zip(minimum).map(|(x, x0)| x - x0).collect();
                let energy = 0.5 * k * displacement.iter().map(|d| d * d).sum::<f64>();
                let gradient = displacement
                    .chunks_exact(3)
                    .map(|d| Vector3::new(k * d[0], k * d[1], k * d[2]))
                    .collect();
                Ok((
                    SinglePointData {
                        energy: Some(energy),
                        gradient: Some(gradient),
                        ..Default::default()
                    }
                    .into(),
                    logs,
                ))
            }
            MockBehavior::Fail {
                message,
                logs: failure_logs,
                data,
            } => {
                let mut err = OrchestrationError::external_failure(&self.program, message.clone());
                if let Some(failure_logs) = failure_logs {
                    err = err.with_logs(failure_logs.clone());
                }
                if let Some(data) = data {
                    err = err.with_data(data.clone());
                }
                Err(err)
            }
        }
    }

    fn program_version(&self, _logs: Option<&str>) -> Result<Option<String>, OrchestrationError> {
        if self.version_fails {
            return Err(OrchestrationError::program_not_found(&self.program, None));
        }
        Ok(self.version.clone())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn collect_wavefunction(&self, workdir: &Path) -> Result<Files, OrchestrationError> {
        if !self.wavefunction {
            return Err(OrchestrationError::adapter_input(
                &self.program,
                "no wavefunction support",
            ));
        }
        let bytes = std::fs::read(workdir.join(WAVEFUNCTION_FILE)).unwrap();
        Ok([(WAVEFUNCTION_FILE, FileContent::from_bytes(bytes))]
            .into_iter()
            .collect())
    }

    fn supports_wavefunction_propagation(&self) -> bool {
        self.wavefunction
    }

    fn propagate_wavefunction(
        &self,
        previous: &Results,
        next: &mut CalcSpec,
    ) -> Result<(), OrchestrationError> {
        let wfn = previous.data.files.get(WAVEFUNCTION_FILE).ok_or_else(|| {
            OrchestrationError::adapter_input(&self.program, "previous step has no wavefunction")
        })?;
        next.files.insert(WAVEFUNCTION_FILE, wfn.clone());
        next.keywords
            .insert("guess".into(), WAVEFUNCTION_FILE.into());
        Ok(())
    }
}

pub(crate) struct MockEngine {
    known: Vec<String>,
    installed: Vec<String>,
    failure: Option<String>,
}

impl MockEngine {
    pub fn knowing(known: &[&str], installed: &[&str]) -> Self {
        Self {
            known: known.iter().map(|s| s.to_string()).collect(),
            installed: installed.iter().map(|s| s.to_string()).collect(),
            failure: None,
        }
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }
}

impl FallbackEngine for MockEngine {
    fn name(&self) -> &str {
        "mock-engine"
    }

    fn has_adapter(&self, program: &str) -> bool {
        self.known.iter().any(|p| p == program)
    }

    fn is_installed(&self, program: &str) -> bool {
        self.installed.iter().any(|p| p == program)
    }

    fn run(
        &self,
        program: &str,
        spec: &CalcSpec,
        workdir: &Path,
    ) -> Result<FallbackOutput, BoxError> {
        if let Some(message) = &self.failure {
            return Err(message.clone().into());
        }
        std::fs::write(workdir.join("engine.log"), program)?;
        Ok(FallbackOutput {
            data: SinglePointData {
                energy: Some(-2.0),
                gradient: (spec.calctype == CalcType::Gradient)
                    .then(|| vec![Vector3::zeros(); spec.structure.num_atoms()]),
                ..Default::default()
            },
            stdout: format!("{program} via mock engine\n"),
        })
    }

    fn version(&self, _program: &str) -> Result<String, BoxError> {
        Ok("9.9".to_string())
    }
}
