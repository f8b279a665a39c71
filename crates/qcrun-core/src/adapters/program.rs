use super::profile::{OutputLocation, ProgramProfile};
use crate::core::codec::{KeywordCodec, NativeCodec};
use crate::core::io::process::{ProcessError, ProcessRunner, find_executable};
use crate::core::models::calc::CalcType;
use crate::core::models::data::Data;
use crate::core::models::files::{FileContent, Files};
use crate::core::models::request::{CalcSpec, Request};
use crate::core::models::results::Results;
use crate::engine::adapter::{Adapter, ComputeContext};
use crate::engine::error::OrchestrationError;
use std::path::{Path, PathBuf};
use tracing::debug;

const UNPARSABLE_VERSION: &str = "Could not parse version";
const UNKNOWN_VERSION: &str = "Could not determine version";

/// Drives a program that reads an input file and prints its results.
///
/// The [`ProgramProfile`] says how to launch it and where to look for its output;
/// the codec turns requests into native input and output back into payloads.
pub struct ExternalProgramAdapter {
    profile: ProgramProfile,
    codec: Box<dyn NativeCodec>,
}

impl ExternalProgramAdapter {
    pub fn new(profile: ProgramProfile) -> Self {
        let codec = KeywordCodec::new(&profile.program, profile.codec.clone());
        Self::with_codec(profile, Box::new(codec))
    }

    pub fn with_codec(profile: ProgramProfile, codec: Box<dyn NativeCodec>) -> Self {
        Self { profile, codec }
    }

    pub fn profile(&self) -> &ProgramProfile {
        &self.profile
    }

    fn runner<'m>(&self) -> ProcessRunner<'m> {
        ProcessRunner::new(self.profile.executable()).args(&self.profile.launch_args)
    }

    fn process_error(&self, err: ProcessError) -> OrchestrationError {
        match err {
            ProcessError::NotFound { .. } => OrchestrationError::program_not_found(
                &self.profile.program,
                self.profile.install_hint.clone(),
            ),
            other => other.into(),
        }
    }

    fn write_input(&self, workdir: &Path, name: &str, text: &str) -> Result<(), OrchestrationError> {
        std::fs::write(workdir.join(name), text).map_err(|e| {
            OrchestrationError::adapter_input(
                &self.profile.program,
                format!("Failed to write '{name}': {e}"),
            )
            .with_source(e)
        })
    }

    fn output_directory(&self, workdir: &Path, stdout: &str) -> Result<PathBuf, OrchestrationError> {
        match self.profile.output_location {
            OutputLocation::WorkingDir => Ok(workdir.to_path_buf()),
            OutputLocation::ScratchSubdir => {
                let mut candidates: Vec<PathBuf> = std::fs::read_dir(workdir)
                    .map(|entries| {
                        entries
                            .filter_map(Result::ok)
                            .filter(|entry| entry.file_name().to_string_lossy().starts_with("scr."))
                            .map(|entry| entry.path())
                            .filter(|path| path.is_dir())
                            .collect()
                    })
                    .unwrap_or_default();
                candidates.sort();
                candidates.into_iter().next().ok_or_else(|| {
                    OrchestrationError::external_failure(
                        &self.profile.program,
                        format!(
                            "{} did not create a 'scr.' directory in {}.",
                            self.profile.program,
                            workdir.display()
                        ),
                    )
                    .with_logs(stdout)
                })
            }
        }
    }

    fn version_from_command_output(&self, output: &str) -> String {
        let trimmed = output.trim();
        if let Some(prefix) = &self.profile.version_prefix {
            let line = trimmed.lines().next().unwrap_or_default();
            return line.strip_prefix(prefix.as_str()).unwrap_or(line).trim().to_string();
        }
        self.codec
            .parse_version(output)
            .unwrap_or_else(|_| trimmed.lines().next().unwrap_or_default().to_string())
    }
}

impl Adapter for ExternalProgramAdapter {
    fn program(&self) -> &str {
        &self.profile.program
    }

    fn supported_calc_types(&self) -> &[CalcType] {
        &self.profile.supported_calc_types
    }

    fn compute_data(
        &self,
        request: &Request,
        ctx: &ComputeContext<'_>,
    ) -> Result<(Data, String), OrchestrationError> {
        let program = &self.profile.program;
        let Request::Calc(spec) = request else {
            return Err(OrchestrationError::adapter_input(
                program,
                format!("The {program} adapter only runs single calculations, not {} requests", request.kind()),
            ));
        };

        let native = self.codec.encode(spec).map_err(|e| {
            OrchestrationError::adapter_input(program, format!("Could not build {program} input: {e}"))
                .with_source(e)
        })?;
        self.write_input(ctx.workdir, &self.profile.input_filename, &native.input_file)?;
        self.write_input(ctx.workdir, &native.geometry_filename, &native.geometry_file)?;

        let stdout = self
            .runner()
            .arg(&self.profile.input_filename)
            .current_dir(ctx.workdir)
            .monitor(ctx.monitor)
            .run()
            .map_err(|e| self.process_error(e))?;

        if let Some(marker) = &self.profile.failure_marker {
            if stdout.contains(marker.as_str()) {
                return Err(OrchestrationError::external_failure(
                    program,
                    format!("{program} calculation failed. See the logs for more information."),
                )
                .with_logs(stdout));
            }
        }

        let directory = self.output_directory(ctx.workdir, &stdout)?;
        debug!(directory = %directory.display(), "Decoding program output");
        let payload = match self.codec.decode(spec, &stdout, &directory) {
            Ok(payload) => payload,
            Err(e) => {
                return Err(OrchestrationError::external_failure(
                    program,
                    format!("Failed to parse {program} output."),
                )
                .with_source(e)
                .with_logs(stdout));
            }
        };
        Ok((payload.into(), stdout))
    }

    fn program_version(&self, logs: Option<&str>) -> Result<Option<String>, OrchestrationError> {
        if let Some(logs) = logs.filter(|logs| !logs.is_empty()) {
            return Ok(Some(
                self.codec
                    .parse_version(logs)
                    .unwrap_or_else(|_| UNPARSABLE_VERSION.to_string()),
            ));
        }
        match self.runner().arg(&self.profile.version_arg).run() {
            Ok(output) => Ok(Some(self.version_from_command_output(&output))),
            Err(e) => {
                debug!(error = %e, "Version command failed");
                Ok(Some(UNKNOWN_VERSION.to_string()))
            }
        }
    }

    fn is_available(&self) -> bool {
        find_executable(self.profile.executable()).is_some()
    }

    fn collect_wavefunction(&self, workdir: &Path) -> Result<Files, OrchestrationError> {
        let program = &self.profile.program;
        let (Some(layout), Some(directory)) =
            (&self.profile.wavefunction, self.profile.wavefunction_dir())
        else {
            return Err(OrchestrationError::adapter_input(
                program,
                format!("Adapter for {program} does not support wavefunction collection."),
            ));
        };

        let mut files = Files::new();
        for name in [&layout.restricted, &layout.alpha, &layout.beta] {
            let key = format!("{directory}/{name}");
            let path = workdir.join(&directory).join(name);
            if path.is_file() {
                let bytes = std::fs::read(&path).map_err(|e| {
                    OrchestrationError::external_failure(
                        program,
                        format!("Failed to read wavefunction file '{key}': {e}"),
                    )
                    .with_source(e)
                })?;
                files.insert(key, FileContent::from_bytes(bytes));
            }
        }
        if files.is_empty() {
            return Err(OrchestrationError::adapter_input(
                program,
                format!("No wavefunction files found in {}", workdir.join(&directory).display()),
            ));
        }
        Ok(files)
    }

    fn supports_wavefunction_propagation(&self) -> bool {
        self.profile.wavefunction.is_some()
    }

    fn propagate_wavefunction(
        &self,
        previous: &Results,
        next: &mut CalcSpec,
    ) -> Result<(), OrchestrationError> {
        let program = &self.profile.program;
        let (Some(layout), Some(directory)) =
            (&self.profile.wavefunction, self.profile.wavefunction_dir())
        else {
            return Err(OrchestrationError::adapter_input(
                program,
                format!("Adapter for {program} does not support wavefunction propagation."),
            ));
        };
        let lookup = |name: &str| previous.data.files.get(&format!("{directory}/{name}"));

        if let Some(c0) = lookup(&layout.restricted) {
            next.files.insert(layout.restricted.clone(), c0.clone());
            next.keywords
                .insert(layout.guess_keyword.clone(), layout.restricted.clone().into());
            return Ok(());
        }
        match (lookup(&layout.alpha), lookup(&layout.beta)) {
            (Some(alpha), Some(beta)) => {
                next.files.insert(layout.alpha.clone(), alpha.clone());
                next.files.insert(layout.beta.clone(), beta.clone());
                next.keywords.insert(
                    layout.guess_keyword.clone(),
                    format!("{} {}", layout.alpha, layout.beta).into(),
                );
                Ok(())
            }
            _ => Err(OrchestrationError::adapter_input(
                program,
                format!(
                    "Could not find {} or {}/{} files in output.",
                    layout.restricted, layout.alpha, layout.beta
                ),
            )),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::models::results::Provenance;
    use crate::engine::config::ComputeOptions;
    use crate::engine::orchestrator::ComputeOrchestrator;
    use crate::engine::registry::AdapterRegistry;
    use crate::engine::testing::{calc_request, energy_request};
    use serde_json::Value;
    use tempfile::TempDir;

    const FAKE_TERACHEM: &str = r#"
if [ "$1" = "--version" ]; then
    echo "TeraChem version 1.9-2022.03-dev"
    exit 0
fi
test -f tc.in || exit 7
test -f geometry.xyz || exit 8
echo "TeraChem v1.9-2022.03-dev"
mkdir -p scr.geometry
printf 'orbitals' > scr.geometry/c0
echo "FINAL ENERGY: -1.1167 a.u."
echo "dE/dX            dE/dY            dE/dZ"
echo "0.0000000   0.0000000   -0.0100000"
echo "0.0000000   0.0000000    0.0100000"
"#;

    /// Profiles run their program as `sh <script>` so tests never exec a freshly
    /// written file.
    fn fake(profile: ProgramProfile, body: &str) -> (ExternalProgramAdapter, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("program.sh");
        std::fs::write(&script, body).unwrap();
        let profile = ProgramProfile {
            executable: Some("sh".into()),
            launch_args: vec![script.to_string_lossy().into_owned()],
            ..profile
        };
        (ExternalProgramAdapter::new(profile), dir)
    }

    fn run(
        adapter: &ExternalProgramAdapter,
        request: Request,
        options: &ComputeOptions,
    ) -> Result<Results, OrchestrationError> {
        let registry = AdapterRegistry::builder().build().unwrap();
        ComputeOrchestrator::new(&registry).run_adapter(adapter, request, options, None)
    }

    #[test]
    fn gradient_run_is_decoded_from_the_scratch_subdirectory() {
        let (adapter, _dir) = fake(ProgramProfile::terachem(), FAKE_TERACHEM);
        let options = ComputeOptions::builder().collect_wavefunction(true).build();
        let results = run(&adapter, calc_request(CalcType::Gradient), &options).unwrap();

        let sp = results.data.single_point().unwrap();
        assert_eq!(sp.energy, Some(-1.1167));
        assert_eq!(sp.flat_gradient().unwrap()[5], 0.01);
        assert_eq!(
            results.provenance.program_version.as_deref(),
            Some("1.9-2022.03-dev")
        );
        let c0 = results.data.files.get("scr.geometry/c0").unwrap();
        assert_eq!(c0.as_text(), Some("orbitals"));
    }

    #[test]
    fn hessian_run_requests_frequencies_and_reads_the_matrix() {
        let script = r#"
grep -q "run frequencies" tc.in || exit 9
mkdir -p scr.geometry
echo "FINAL ENERGY: -1.1167 a.u."
echo "*** Hessian Matrix (Hartree/Bohr^2) ***"
echo "      1        2        3        4        5        6"
for r in 1 2 3 4 5 6; do
    echo "  $r   0.5000   0.0000   0.0000   0.0000   0.0000  -0.5000"
done
"#;
        let (adapter, _dir) = fake(ProgramProfile::terachem(), script);
        let results = run(
            &adapter,
            calc_request(CalcType::Hessian),
            &ComputeOptions::default(),
        )
        .unwrap();

        let hessian = results.data.single_point().unwrap().hessian.clone().unwrap();
        assert_eq!(hessian.shape(), (6, 6));
        assert_eq!(hessian[(3, 0)], 0.5);
        assert_eq!(hessian[(3, 5)], -0.5);
    }

    #[test]
    fn version_falls_back_to_the_version_command() {
        let (adapter, _dir) = fake(ProgramProfile::terachem(), FAKE_TERACHEM);
        assert_eq!(
            adapter.program_version(None).unwrap().as_deref(),
            Some("1.9-2022.03-dev")
        );
        assert_eq!(
            adapter.program_version(Some("garbage")).unwrap().as_deref(),
            Some(UNPARSABLE_VERSION)
        );
    }

    #[test]
    fn unlaunchable_version_command_gives_the_sentinel() {
        let profile = ProgramProfile {
            executable: Some("qcrun-no-such-program-xyz".into()),
            ..ProgramProfile::terachem()
        };
        let adapter = ExternalProgramAdapter::new(profile);
        assert_eq!(
            adapter.program_version(None).unwrap().as_deref(),
            Some(UNKNOWN_VERSION)
        );
    }

    #[test]
    fn missing_scratch_subdirectory_is_a_program_failure() {
        let (adapter, _dir) = fake(ProgramProfile::terachem(), "echo 'FINAL ENERGY: -1.0'\n");
        let err = run(&adapter, energy_request(), &ComputeOptions::default()).unwrap_err();
        assert_eq!(err.kind(), "ExternalProgramFailure");
        assert!(err.to_string().contains("scr."));
        assert!(err.results().unwrap().logs.as_deref().unwrap().contains("FINAL ENERGY"));
    }

    #[test]
    fn failure_marker_fails_a_zero_exit() {
        let (adapter, _dir) = fake(
            ProgramProfile::crest(),
            "echo 'CREST terminated abnormally: FAILED'\nexit 0\n",
        );
        let err = run(
            &adapter,
            calc_request(CalcType::ConformerSearch),
            &ComputeOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "ExternalProgramFailure");
        assert!(err.logs().unwrap().contains("FAILED"));
    }

    #[test]
    fn conformers_are_decoded_from_the_working_directory() {
        let body = r#"
test -f input.toml || exit 7
echo " Version 3.0.2, Mon Jan 1"
printf '2\n -1.5\nH 0 0 0\nH 0 0 0.74\n' > crest_conformers.xyz
"#;
        let (adapter, _dir) = fake(ProgramProfile::crest(), body);
        let results = run(
            &adapter,
            calc_request(CalcType::ConformerSearch),
            &ComputeOptions::default(),
        )
        .unwrap();
        assert_eq!(results.provenance.program_version.as_deref(), Some("3.0.2"));
        let crate::core::models::data::Payload::ConformerSearch(search) = &results.data.payload
        else {
            panic!("expected a conformer search payload");
        };
        assert_eq!(search.conformer_energies, vec![-1.5]);
    }

    #[test]
    fn nonzero_exit_is_an_external_failure_with_exit_code() {
        let (adapter, _dir) = fake(ProgramProfile::orca(), "echo 'something broke'\nexit 2\n");
        let err = run(&adapter, energy_request(), &ComputeOptions::default()).unwrap_err();
        let OrchestrationError::ExternalProgramFailure { exit_code, .. } = &err else {
            panic!("expected an external program failure, got {}", err.kind());
        };
        assert_eq!(*exit_code, Some(2));
        assert!(err.logs().unwrap().contains("something broke"));
    }

    #[test]
    fn missing_executable_reports_the_install_hint() {
        let profile = ProgramProfile {
            executable: Some("qcrun-no-such-program-xyz".into()),
            ..ProgramProfile::orca()
        };
        let err = run(
            &ExternalProgramAdapter::new(profile),
            energy_request(),
            &ComputeOptions::default(),
        )
        .unwrap_err();
        let OrchestrationError::ProgramNotFound { install_hint, program, .. } = &err else {
            panic!("expected ProgramNotFound, got {}", err.kind());
        };
        assert_eq!(program, "orca");
        assert!(install_hint.as_deref().unwrap().contains("ORCA"));
    }

    fn previous_with(files: &[(&str, &str)]) -> Results {
        let mut data = Data::empty();
        for (path, content) in files {
            data.files.insert(*path, *content);
        }
        Results {
            input_data: energy_request(),
            success: true,
            logs: None,
            data,
            provenance: Provenance::for_program("terachem"),
            traceback: None,
        }
    }

    fn next_spec() -> CalcSpec {
        let Request::Calc(spec) = calc_request(CalcType::Gradient) else {
            unreachable!()
        };
        spec
    }

    #[test]
    fn restricted_wavefunction_is_propagated_as_c0() {
        let adapter = ExternalProgramAdapter::new(ProgramProfile::terachem());
        let mut next = next_spec();
        adapter
            .propagate_wavefunction(&previous_with(&[("scr.geometry/c0", "x")]), &mut next)
            .unwrap();
        assert!(next.files.contains("c0"));
        assert_eq!(next.keywords["guess"], Value::from("c0"));
    }

    #[test]
    fn unrestricted_wavefunction_needs_both_spins() {
        let adapter = ExternalProgramAdapter::new(ProgramProfile::terachem());
        let mut next = next_spec();
        adapter
            .propagate_wavefunction(
                &previous_with(&[("scr.geometry/ca0", "a"), ("scr.geometry/cb0", "b")]),
                &mut next,
            )
            .unwrap();
        assert_eq!(next.keywords["guess"], Value::from("ca0 cb0"));

        let err = adapter
            .propagate_wavefunction(&previous_with(&[("scr.geometry/ca0", "a")]), &mut next_spec())
            .unwrap_err();
        assert_eq!(err.kind(), "AdapterInput");
    }

    #[test]
    fn programs_without_a_layout_cannot_collect_wavefunctions() {
        let adapter = ExternalProgramAdapter::new(ProgramProfile::orca());
        assert!(!adapter.supports_wavefunction_propagation());
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            adapter.collect_wavefunction(dir.path()).unwrap_err().kind(),
            "AdapterInput"
        );
    }
}
