use serde_json::{Map, Value};
use std::path::PathBuf;

/// Per-call policy for one orchestrated computation.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeOptions {
    /// Working directory to use instead of a fresh temporary one.
    pub scratch_dir: Option<PathBuf>,
    pub delete_scratch: bool,
    /// Keep the program's output on successful results. Failures always keep it.
    pub collect_logs: bool,
    pub collect_files: bool,
    pub collect_wavefunction: bool,
    /// Return failures as errors rather than as `success = false` results.
    pub raise_exceptions: bool,
    pub propagate_wavefunction: bool,
    /// Consult the fallback engine for programs without a native adapter.
    pub fallback: bool,
    /// Echo program output to stdout when the caller supplies no monitor.
    pub print_logs: bool,
    /// Passed through untouched to adapters that understand them.
    pub adapter_options: Map<String, Value>,
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            delete_scratch: true,
            collect_logs: true,
            collect_files: false,
            collect_wavefunction: false,
            raise_exceptions: true,
            propagate_wavefunction: false,
            fallback: false,
            print_logs: false,
            adapter_options: Map::new(),
        }
    }
}

impl ComputeOptions {
    pub fn builder() -> ComputeOptionsBuilder {
        ComputeOptionsBuilder::new()
    }

    /// Options for one single-point step of a multi-step calculation: failures must
    /// surface immediately, each step gets its own scratch directory, and the
    /// wavefunction is collected whenever it will be propagated.
    pub fn for_step(&self) -> Self {
        Self {
            scratch_dir: None,
            collect_files: false,
            collect_wavefunction: self.propagate_wavefunction,
            raise_exceptions: true,
            propagate_wavefunction: false,
            ..self.clone()
        }
    }
}

#[derive(Default)]
pub struct ComputeOptionsBuilder {
    scratch_dir: Option<PathBuf>,
    delete_scratch: Option<bool>,
    collect_logs: Option<bool>,
    collect_files: Option<bool>,
    collect_wavefunction: Option<bool>,
    raise_exceptions: Option<bool>,
    propagate_wavefunction: Option<bool>,
    fallback: Option<bool>,
    print_logs: Option<bool>,
    adapter_options: Map<String, Value>,
}

impl ComputeOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scratch_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(path.into());
        self
    }
    pub fn delete_scratch(mut self, delete: bool) -> Self {
        self.delete_scratch = Some(delete);
        self
    }
    pub fn collect_logs(mut self, collect: bool) -> Self {
        self.collect_logs = Some(collect);
        self
    }
    pub fn collect_files(mut self, collect: bool) -> Self {
        self.collect_files = Some(collect);
        self
    }
    pub fn collect_wavefunction(mut self, collect: bool) -> Self {
        self.collect_wavefunction = Some(collect);
        self
    }
    pub fn raise_exceptions(mut self, raise: bool) -> Self {
        self.raise_exceptions = Some(raise);
        self
    }
    pub fn propagate_wavefunction(mut self, propagate: bool) -> Self {
        self.propagate_wavefunction = Some(propagate);
        self
    }
    pub fn fallback(mut self, fallback: bool) -> Self {
        self.fallback = Some(fallback);
        self
    }
    pub fn print_logs(mut self, print: bool) -> Self {
        self.print_logs = Some(print);
        self
    }
    pub fn adapter_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.adapter_options.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ComputeOptions {
        let defaults = ComputeOptions::default();
        ComputeOptions {
            scratch_dir: self.scratch_dir,
            delete_scratch: self.delete_scratch.unwrap_or(defaults.delete_scratch),
            collect_logs: self.collect_logs.unwrap_or(defaults.collect_logs),
            collect_files: self.collect_files.unwrap_or(defaults.collect_files),
            collect_wavefunction: self
                .collect_wavefunction
                .unwrap_or(defaults.collect_wavefunction),
            raise_exceptions: self.raise_exceptions.unwrap_or(defaults.raise_exceptions),
            propagate_wavefunction: self
                .propagate_wavefunction
                .unwrap_or(defaults.propagate_wavefunction),
            fallback: self.fallback.unwrap_or(defaults.fallback),
            print_logs: self.print_logs.unwrap_or(defaults.print_logs),
            adapter_options: self.adapter_options,
        }
    }
}
