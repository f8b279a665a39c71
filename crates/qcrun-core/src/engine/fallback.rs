use super::error::BoxError;
use crate::core::models::data::SinglePointData;
use crate::core::models::request::CalcSpec;
use std::path::Path;

/// What a fallback engine hands back for one calculation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FallbackOutput {
    pub data: SinglePointData,
    pub stdout: String,
}

/// A third-party execution engine that knows programs this crate has no native
/// adapter for. Consulted only when a caller opts into fallback.
pub trait FallbackEngine: Send + Sync {
    /// Name reported as the executing program in provenance.
    fn name(&self) -> &str;

    /// Whether the engine knows how to drive `program` at all.
    fn has_adapter(&self, program: &str) -> bool;

    /// Whether `program`'s executable is present on this host.
    fn is_installed(&self, program: &str) -> bool;

    /// Runs one single-point calculation. `workdir` is the invocation's scratch
    /// directory; engines should leave their files there so they can be collected.
    fn run(&self, program: &str, spec: &CalcSpec, workdir: &Path)
    -> Result<FallbackOutput, BoxError>;

    fn version(&self, program: &str) -> Result<String, BoxError>;
}
