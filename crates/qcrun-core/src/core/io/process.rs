use super::monitor::{OutputAccumulator, OutputMonitor};
use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Program '{program}' not found. Is it installed and on your PATH?")]
    NotFound { program: String },

    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error(
        "External program failed with exit code {}. Command: '{command}'",
        describe_exit_code(.exit_code)
    )]
    Failed {
        program: String,
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("I/O error while reading output of '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    pub fn program(&self) -> &str {
        match self {
            ProcessError::NotFound { program }
            | ProcessError::Launch { program, .. }
            | ProcessError::Failed { program, .. }
            | ProcessError::Io { program, .. } => program,
        }
    }

    /// Output captured before the failure, if the process got far enough to produce any.
    pub fn output(&self) -> Option<&str> {
        match self {
            ProcessError::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

fn describe_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

/// Launches an external program and streams its merged stdout/stderr.
///
/// Both streams are drained on their own threads, so a child that floods either pipe
/// cannot block on a full buffer while the other is being read.
pub struct ProcessRunner<'a> {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    monitor: Option<&'a OutputMonitor<'a>>,
}

impl<'a> ProcessRunner<'a> {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            monitor: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn monitor(mut self, monitor: Option<&'a OutputMonitor<'a>>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the program to completion and returns everything it printed.
    pub fn run(&self) -> Result<String, ProcessError> {
        let command_line = self.command_line();
        debug!(command = %command_line, dir = ?self.current_dir, "Launching external program");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ProcessError::NotFound {
                program: self.program.clone(),
            },
            _ => ProcessError::Launch {
                program: self.program.clone(),
                source,
            },
        })?;

        let (tx, rx) = mpsc::channel::<String>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, tx.clone()));
        }
        drop(tx);

        let mut output = OutputAccumulator::new(self.monitor);
        for line in rx {
            output.push(&line);
        }

        let io_error = |source: io::Error| ProcessError::Io {
            program: self.program.clone(),
            source,
        };
        for reader in readers {
            reader
                .join()
                .map_err(|_| io_error(io::Error::other("output reader thread panicked")))?
                .map_err(io_error)?;
        }
        let status = child.wait().map_err(io_error)?;
        output.finish();
        let output = output.into_text();

        trace!(bytes = output.len(), status = %status, "External program exited");
        if status.success() {
            Ok(output)
        } else {
            Err(ProcessError::Failed {
                program: self.program.clone(),
                command: command_line,
                exit_code: status.code(),
                output,
            })
        }
    }
}

fn spawn_line_reader<R>(stream: R, tx: Sender<String>) -> JoinHandle<io::Result<()>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                return Ok(());
            }
        }
    })
}

/// Looks `name` up on `PATH`. Names containing a path separator are checked as given.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(OsStr::new(name)))
        .find(|full| is_executable(full))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
