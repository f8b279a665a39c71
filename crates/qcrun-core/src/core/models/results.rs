use super::data::Data;
use super::request::Request;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub program: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
    /// Seconds, rounded to the microsecond.
    pub wall_time: f64,
    pub hostname: String,
    pub host_cpu_count: usize,
}

impl Provenance {
    pub fn new(
        program: impl Into<String>,
        program_version: Option<String>,
        scratch_dir: Option<PathBuf>,
        wall_time: Duration,
    ) -> Self {
        let host = host_info();
        Self {
            program: program.into(),
            program_version,
            scratch_dir,
            wall_time: (wall_time.as_secs_f64() * 1e6).round() / 1e6,
            hostname: host.hostname.clone(),
            host_cpu_count: host.cpu_count,
        }
    }

    /// Provenance for an invocation that failed before any adapter ran.
    pub fn for_program(program: impl Into<String>) -> Self {
        Self::new(program, None, None, Duration::ZERO)
    }
}

/// The unified result envelope. Exactly one is produced per orchestrated invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    pub input_data: Request,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
    #[serde(default)]
    pub data: Data,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl Results {
    pub fn is_failure(&self) -> bool {
        !self.success
    }
}

struct HostInfo {
    hostname: String,
    cpu_count: usize,
}

// Host facts do not change during a process lifetime; quick calculations should not
// pay for the lookups on every invocation.
fn host_info() -> &'static HostInfo {
    static HOST: OnceLock<HostInfo> = OnceLock::new();
    HOST.get_or_init(|| HostInfo {
        hostname: hostname(),
        cpu_count: num_cpus::get(),
    })
}

fn hostname() -> String {
    #[cfg(unix)]
    {
        let mut buf = [0u8; 256];
        // SAFETY: the buffer is valid for `buf.len()` bytes for the duration of the call.
        let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
        if rc == 0 {
            let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            let name = String::from_utf8_lossy(&buf[..end]).into_owned();
            if !name.is_empty() {
                return name;
            }
        }
    }
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
