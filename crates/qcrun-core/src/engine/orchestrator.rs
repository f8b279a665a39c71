use super::adapter::{Adapter, ComputeContext};
use super::config::ComputeOptions;
use super::error::OrchestrationError;
use super::registry::AdapterRegistry;
use crate::core::io::files::{collect_files, stage_files};
use crate::core::io::monitor::OutputMonitor;
use crate::core::io::scratch::ScratchSpace;
use crate::core::models::data::Data;
use crate::core::models::request::Request;
use crate::core::models::results::{Provenance, Results};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Runs requests through adapters and turns every outcome into one [`Results`].
///
/// The lifecycle of a single invocation is
/// `resolve -> validate -> stage -> execute -> version/provenance -> collect files`.
/// Whatever step fails, the caller receives exactly one envelope: directly when
/// `raise_exceptions` is off, or attached to the returned error when it is on.
pub struct ComputeOrchestrator<'r> {
    registry: &'r AdapterRegistry,
}

impl<'r> ComputeOrchestrator<'r> {
    pub fn new(registry: &'r AdapterRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r AdapterRegistry {
        self.registry
    }

    #[instrument(skip_all, name = "compute", fields(program = %program, kind = request.kind()))]
    pub fn compute(
        &self,
        program: &str,
        request: Request,
        options: &ComputeOptions,
        monitor: Option<&OutputMonitor<'_>>,
    ) -> Result<Results, OrchestrationError> {
        let adapter = match self.registry.resolve(program, &request, options.fallback) {
            Ok(adapter) => adapter,
            Err(err) => {
                warn!(error = %err, "Could not resolve an adapter");
                let results = failure_envelope(request, Provenance::for_program(program), &err);
                return conclude(err, results, options);
            }
        };
        self.run_adapter(adapter.as_ref(), request, options, monitor)
    }

    /// Runs the lifecycle with an adapter the caller already holds.
    pub fn run_adapter(
        &self,
        adapter: &dyn Adapter,
        request: Request,
        options: &ComputeOptions,
        monitor: Option<&OutputMonitor<'_>>,
    ) -> Result<Results, OrchestrationError> {
        let program = adapter.program().to_string();

        let printing;
        let monitor: Option<&OutputMonitor<'_>> = match monitor {
            Some(monitor) if monitor.is_active() => Some(monitor),
            _ if options.print_logs => {
                printing = OutputMonitor::printing();
                Some(&printing)
            }
            other => other,
        };

        let scratch =
            match ScratchSpace::acquire(options.scratch_dir.as_deref(), options.delete_scratch) {
                Ok(scratch) => scratch,
                Err(e) => {
                    let err = OrchestrationError::adapter_input(
                        &program,
                        format!("Could not prepare the scratch directory: {e}"),
                    )
                    .with_source(e);
                    let results = failure_envelope(request, Provenance::for_program(&program), &err);
                    return conclude(err, results, options);
                }
            };
        let workdir = scratch.path().to_path_buf();

        let start = Instant::now();
        let outcome = self.execute(adapter, &request, &workdir, options, monitor);
        let wall_time = start.elapsed();

        let (mut data, logs, mut error) = match outcome {
            Ok((data, logs)) => (data, Some(logs), None),
            Err(mut err) => {
                let data = err.take_data().unwrap_or_default();
                let logs = err.logs().map(str::to_string);
                (data, logs, Some(err))
            }
        };

        let program_version = match adapter.program_version(logs.as_deref()) {
            Ok(version) => version,
            Err(e) => {
                debug!(error = %e, "Program version unavailable");
                None
            }
        };
        let provenance =
            Provenance::new(&program, program_version, Some(workdir.clone()), wall_time);

        if adapter.uses_staged_files() && (options.collect_files || request.is_file_request()) {
            match collect_files(&workdir, request.files()) {
                Ok(files) => data.files.extend(files),
                Err(e) if error.is_none() => {
                    error = Some(
                        OrchestrationError::external_failure(
                            &program,
                            format!("Failed to collect output files: {e}"),
                        )
                        .with_source(e),
                    );
                }
                Err(e) => warn!(error = %e, "Failed to collect output files"),
            }
        }

        let logs = if error.is_some() || options.collect_logs {
            logs
        } else {
            None
        };

        let results = Results {
            input_data: request,
            success: error.is_none(),
            logs,
            data,
            provenance,
            traceback: error.as_ref().map(OrchestrationError::traceback),
        };
        drop(scratch);

        match error {
            None => {
                info!(
                    program = %program,
                    wall_time = results.provenance.wall_time,
                    "Computation finished"
                );
                Ok(results)
            }
            Some(err) => {
                warn!(program = %program, kind = err.kind(), error = %err, "Computation failed");
                conclude(err, results, options)
            }
        }
    }

    fn execute(
        &self,
        adapter: &dyn Adapter,
        request: &Request,
        workdir: &Path,
        options: &ComputeOptions,
        monitor: Option<&OutputMonitor<'_>>,
    ) -> Result<(Data, String), OrchestrationError> {
        adapter.validate(request)?;

        if adapter.uses_staged_files() {
            stage_files(workdir, request.files()).map_err(|e| {
                OrchestrationError::adapter_input(
                    adapter.program(),
                    format!("Failed to write input files: {e}"),
                )
                .with_source(e)
            })?;
        }

        let ctx = ComputeContext {
            workdir,
            monitor,
            options,
            registry: self.registry,
        };
        debug!(workdir = %workdir.display(), "Executing adapter");
        let (mut data, logs) = adapter.compute_data(request, &ctx)?;

        if options.collect_wavefunction && !options.collect_files {
            match adapter.collect_wavefunction(workdir) {
                Ok(files) => data.files.extend(files),
                Err(err) => return Err(err.with_logs(logs).with_data(data)),
            }
        }
        Ok((data, logs))
    }
}

fn failure_envelope(request: Request, provenance: Provenance, err: &OrchestrationError) -> Results {
    Results {
        input_data: request,
        success: false,
        logs: err.logs().map(str::to_string),
        data: Data::empty(),
        provenance,
        traceback: Some(err.traceback()),
    }
}

fn conclude(
    mut err: OrchestrationError,
    results: Results,
    options: &ComputeOptions,
) -> Result<Results, OrchestrationError> {
    if options.raise_exceptions {
        err.attach_results(results);
        Err(err)
    } else {
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::calc::CalcType;
    use crate::core::models::data::SinglePointData;
    use crate::core::models::files::Files;
    use crate::core::models::request::{CalcSpec, FileSpec, Model};
    use crate::engine::testing::{MockAdapter, MockBehavior, calc_request, energy_request, h2};
    use std::sync::Mutex;

    fn registry_with(adapter: MockAdapter) -> AdapterRegistry {
        let program = adapter.program().to_string();
        AdapterRegistry::builder()
            .register(program, move || Ok(adapter.clone().boxed()))
            .build()
            .unwrap()
    }

    fn no_raise() -> ComputeOptions {
        ComputeOptions::builder().raise_exceptions(false).build()
    }

    #[test]
    fn successful_run_builds_a_complete_envelope() {
        let registry = registry_with(MockAdapter::new("test", &[CalcType::Energy]));
        let results = ComputeOrchestrator::new(&registry)
            .compute("test", energy_request(), &ComputeOptions::default(), None)
            .unwrap();
        assert!(results.success);
        assert_eq!(results.data.single_point().unwrap().energy, Some(-1.0));
        assert_eq!(results.logs.as_deref(), Some("test call 0\n"));
        assert_eq!(results.provenance.program, "test");
        assert_eq!(results.provenance.program_version.as_deref(), Some("1.0.0"));
        assert!(results.traceback.is_none());
        assert_eq!(results.input_data, energy_request());
    }

    #[test]
    fn unsupported_calctype_is_rejected_before_compute_runs() {
        let adapter = MockAdapter::new("test", &[CalcType::Energy]);
        let spy = adapter.clone();
        let registry = registry_with(adapter);
        let err = ComputeOrchestrator::new(&registry)
            .compute(
                "test",
                calc_request(CalcType::Gradient),
                &ComputeOptions::default(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::AdapterInput { .. }));
        assert_eq!(spy.call_count(), 0);
        let results = err.results().unwrap();
        assert!(!results.success);
        assert!(results.traceback.as_deref().unwrap().contains("gradient"));
    }

    #[test]
    fn files_are_rejected_by_adapters_that_cannot_stage_them() {
        let registry = registry_with(MockAdapter::new("test", &[CalcType::Energy]).unstaged());
        let mut request = energy_request();
        request.files_mut().insert("extra.txt", "x");
        let results = ComputeOrchestrator::new(&registry)
            .compute("test", request, &no_raise(), None)
            .unwrap();
        assert!(!results.success);
        assert!(results.traceback.unwrap().starts_with("AdapterInput"));
    }

    #[test]
    fn every_failure_point_yields_one_failed_envelope() {
        let registry = registry_with(
            MockAdapter::new("test", &[CalcType::Energy]).failing("segmentation fault"),
        );
        let orchestrator = ComputeOrchestrator::new(&registry);
        let cases = [
            ("missing", energy_request()),
            ("test", calc_request(CalcType::Hessian)),
            ("test", energy_request()),
        ];
        for (program, request) in cases {
            let results = orchestrator
                .compute(program, request.clone(), &no_raise(), None)
                .unwrap();
            assert!(!results.success, "{program}");
            assert_eq!(results.input_data, request);
            assert!(results.traceback.is_some());
        }
    }

    #[test]
    fn raised_errors_carry_the_envelope_and_the_logs() {
        let registry = registry_with(
            MockAdapter::new("test", &[CalcType::Energy]).failing("segmentation fault"),
        );
        let err = ComputeOrchestrator::new(&registry)
            .compute("test", energy_request(), &ComputeOptions::default(), None)
            .unwrap_err();
        assert_eq!(err.kind(), "ExternalProgramFailure");
        let results = err.results().unwrap();
        assert_eq!(results.logs.as_deref(), Some("segmentation fault\n"));
        assert_eq!(results.provenance.program_version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn partial_data_survives_into_the_failed_envelope() {
        let partial = Data::from(SinglePointData {
            energy: Some(-3.0),
            ..Default::default()
        });
        let registry = registry_with(MockAdapter::new("test", &[CalcType::Energy]).behavior(
            MockBehavior::Fail {
                message: "died in post-processing".into(),
                logs: None,
                data: Some(partial.clone()),
            },
        ));
        let results = ComputeOrchestrator::new(&registry)
            .compute("test", energy_request(), &no_raise(), None)
            .unwrap();
        assert!(!results.success);
        assert_eq!(results.data, partial);
    }

    #[test]
    fn unknown_program_fails_without_a_scratch_directory() {
        let registry = registry_with(MockAdapter::new("test", &[CalcType::Energy]));
        let err = ComputeOrchestrator::new(&registry)
            .compute("nope", energy_request(), &ComputeOptions::default(), None)
            .unwrap_err();
        assert_eq!(err.kind(), "AdapterNotFound");
        let results = err.results().unwrap();
        assert_eq!(results.provenance.program, "nope");
        assert_eq!(results.provenance.scratch_dir, None);
    }

    #[test]
    fn logs_are_dropped_on_success_unless_requested() {
        let registry = registry_with(MockAdapter::new("test", &[CalcType::Energy]));
        let options = ComputeOptions::builder().collect_logs(false).build();
        let results = ComputeOrchestrator::new(&registry)
            .compute("test", energy_request(), &options, None)
            .unwrap();
        assert!(results.success);
        assert!(results.logs.is_none());
    }

    #[test]
    fn failing_version_lookup_never_fails_the_computation() {
        let registry =
            registry_with(MockAdapter::new("test", &[CalcType::Energy]).failing_version());
        let results = ComputeOrchestrator::new(&registry)
            .compute("test", energy_request(), &ComputeOptions::default(), None)
            .unwrap();
        assert!(results.success);
        assert_eq!(results.provenance.program_version, None);
    }

    #[test]
    fn collected_files_exclude_inputs() {
        let registry = registry_with(
            MockAdapter::new("test", &[CalcType::Energy]).writing("b.out", "computed"),
        );
        let mut request = energy_request();
        request.files_mut().insert("a.txt", "input");
        let options = ComputeOptions::builder().collect_files(true).build();
        let results = ComputeOrchestrator::new(&registry)
            .compute("test", request, &options, None)
            .unwrap();
        assert!(results.data.files.contains("b.out"));
        assert!(!results.data.files.contains("a.txt"));
    }

    #[test]
    fn inputs_keyed_with_a_leading_dot_are_not_collected_back() {
        let registry = registry_with(
            MockAdapter::new("test", &[CalcType::Energy]).writing("b.out", "computed"),
        );
        let mut request = energy_request();
        request.files_mut().insert("./a.txt", "input");
        let options = ComputeOptions::builder().collect_files(true).build();
        let results = ComputeOrchestrator::new(&registry)
            .compute("test", request, &options, None)
            .unwrap();
        assert!(results.data.files.contains("b.out"));
        assert!(!results.data.files.contains("a.txt"));
    }

    #[test]
    fn sequential_runs_use_distinct_scratch_directories_that_are_removed() {
        let registry = registry_with(MockAdapter::new("test", &[CalcType::Energy]));
        let orchestrator = ComputeOrchestrator::new(&registry);
        let cwd = std::env::current_dir().unwrap();
        let first = orchestrator
            .compute("test", energy_request(), &ComputeOptions::default(), None)
            .unwrap();
        let second = orchestrator
            .compute("test", energy_request(), &ComputeOptions::default(), None)
            .unwrap();
        let a = first.provenance.scratch_dir.unwrap();
        let b = second.provenance.scratch_dir.unwrap();
        assert_ne!(a, b);
        assert!(!a.exists());
        assert!(!b.exists());
        assert_eq!(std::env::current_dir().unwrap(), cwd);
    }

    #[test]
    fn explicit_scratch_directory_is_kept_when_asked() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("run");
        let registry = registry_with(
            MockAdapter::new("test", &[CalcType::Energy]).writing("out.log", "done"),
        );
        let options = ComputeOptions::builder()
            .scratch_dir(&target)
            .delete_scratch(false)
            .build();
        let results = ComputeOrchestrator::new(&registry)
            .compute("test", energy_request(), &options, None)
            .unwrap();
        assert_eq!(results.provenance.scratch_dir.as_deref(), Some(target.as_path()));
        assert!(target.join("out.log").is_file());
    }

    #[test]
    fn wavefunction_files_are_collected_on_request() {
        let registry =
            registry_with(MockAdapter::new("test", &[CalcType::Energy]).with_wavefunction());
        let options = ComputeOptions::builder().collect_wavefunction(true).build();
        let results = ComputeOrchestrator::new(&registry)
            .compute("test", energy_request(), &options, None)
            .unwrap();
        assert_eq!(
            results.data.files.get("wfn.dat").and_then(|f| f.as_text()),
            Some("step 0")
        );
    }

    #[test]
    fn unsupported_wavefunction_collection_fails_but_keeps_the_payload() {
        let registry = registry_with(MockAdapter::new("test", &[CalcType::Energy]));
        let options = ComputeOptions::builder()
            .collect_wavefunction(true)
            .raise_exceptions(false)
            .build();
        let results = ComputeOrchestrator::new(&registry)
            .compute("test", energy_request(), &options, None)
            .unwrap();
        assert!(!results.success);
        assert_eq!(results.data.single_point().unwrap().energy, Some(-1.0));
        assert!(results.logs.is_some());
    }

    #[test]
    fn monitor_receives_adapter_output() {
        let seen = Mutex::new(String::new());
        let monitor = OutputMonitor::with_callback(Box::new(|_: &str, delta: &str| {
            seen.lock().unwrap().push_str(delta);
        }));
        let registry = registry_with(MockAdapter::new("test", &[CalcType::Energy]));
        ComputeOrchestrator::new(&registry)
            .compute(
                "test",
                energy_request(),
                &ComputeOptions::default(),
                Some(&monitor),
            )
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), "test call 0\n");
    }

    #[cfg(unix)]
    #[test]
    fn file_requests_collect_everything_but_their_inputs() {
        let registry = AdapterRegistry::builder().build().unwrap();
        let request = Request::File(FileSpec {
            files: [("in.txt", "hello")].into_iter().collect::<Files>(),
            cmdline_args: vec!["-c".into(), "cp in.txt out.txt".into()],
            ..Default::default()
        });
        let results = ComputeOrchestrator::new(&registry)
            .compute("sh", request, &ComputeOptions::default(), None)
            .unwrap();
        assert!(results.success);
        assert!(results.data.files.contains("out.txt"));
        assert!(!results.data.files.contains("in.txt"));
    }

    #[test]
    fn run_adapter_skips_resolution() {
        let registry = AdapterRegistry::builder().build().unwrap();
        let adapter = MockAdapter::new("direct", &[CalcType::Gradient]);
        let request = Request::Calc(CalcSpec::new(CalcType::Gradient, h2(), Model::new("hf")));
        let results = ComputeOrchestrator::new(&registry)
            .run_adapter(&adapter, request, &ComputeOptions::default(), None)
            .unwrap();
        assert_eq!(results.provenance.program, "direct");
    }
}
