use crate::core::io::process::ProcessError;
use crate::core::models::data::Data;
use crate::core::models::results::Results;
use std::error::Error as StdError;
use std::fmt::Write;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Partial state gathered while an error travels up through the layers.
#[derive(Debug, Default)]
pub struct ErrorContext {
    /// Whatever the program printed before it failed.
    pub logs: Option<String>,
    /// A partially computed payload, if anything was recoverable.
    pub data: Option<Data>,
    /// The failure envelope. Always present once the error leaves the orchestrator.
    pub results: Option<Box<Results>>,
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("{message}")]
    AdapterNotFound {
        program: String,
        message: String,
        context: ErrorContext,
    },

    #[error("{message}")]
    AdapterInput {
        program: String,
        message: String,
        context: ErrorContext,
        #[source]
        source: Option<BoxError>,
    },

    #[error("{message}")]
    ProgramNotFound {
        program: String,
        message: String,
        install_hint: Option<String>,
        context: ErrorContext,
    },

    #[error("{message}")]
    ExternalProgramFailure {
        program: String,
        message: String,
        exit_code: Option<i32>,
        context: ErrorContext,
        #[source]
        source: Option<BoxError>,
    },
}

impl OrchestrationError {
    pub fn adapter_not_found(program: impl Into<String>) -> Self {
        let program = program.into();
        Self::AdapterNotFound {
            message: format!("No adapter found for program '{program}'."),
            program,
            context: ErrorContext::default(),
        }
    }

    pub fn adapter_input(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AdapterInput {
            program: program.into(),
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    pub fn program_not_found(program: impl Into<String>, install_hint: Option<String>) -> Self {
        let program = program.into();
        let message = install_hint.clone().unwrap_or_else(|| {
            format!("Program not found: '{program}'. Please install it and ensure it is on your PATH.")
        });
        Self::ProgramNotFound {
            program,
            message,
            install_hint,
            context: ErrorContext::default(),
        }
    }

    pub fn external_failure(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalProgramFailure {
            program: program.into(),
            message: message.into(),
            exit_code: None,
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Sets the underlying cause. Ignored by variants that do not carry one.
    pub fn with_source(mut self, cause: impl Into<BoxError>) -> Self {
        match &mut self {
            Self::AdapterInput { source, .. } | Self::ExternalProgramFailure { source, .. } => {
                *source = Some(cause.into());
            }
            Self::AdapterNotFound { .. } | Self::ProgramNotFound { .. } => {}
        }
        self
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        if let Self::ExternalProgramFailure { exit_code, .. } = &mut self {
            *exit_code = code;
        }
        self
    }

    /// Records the program's output unless a lower layer already did.
    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        let context = self.context_mut();
        if context.logs.is_none() {
            context.logs = Some(logs.into());
        }
        self
    }

    /// Records a partial payload unless a lower layer already did.
    pub fn with_data(mut self, data: Data) -> Self {
        let context = self.context_mut();
        if context.data.is_none() {
            context.data = Some(data);
        }
        self
    }

    /// Replaces the payload, returning the previous one so the caller can re-embed it.
    pub fn replace_data(&mut self, data: Data) -> Option<Data> {
        self.context_mut().data.replace(data)
    }

    pub fn attach_results(&mut self, results: Results) {
        self.context_mut().results = Some(Box::new(results));
    }

    pub fn take_results(&mut self) -> Option<Results> {
        self.context_mut().results.take().map(|results| *results)
    }

    pub fn take_data(&mut self) -> Option<Data> {
        self.context_mut().data.take()
    }

    pub fn program(&self) -> &str {
        match self {
            Self::AdapterNotFound { program, .. }
            | Self::AdapterInput { program, .. }
            | Self::ProgramNotFound { program, .. }
            | Self::ExternalProgramFailure { program, .. } => program,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::AdapterNotFound { context, .. }
            | Self::AdapterInput { context, .. }
            | Self::ProgramNotFound { context, .. }
            | Self::ExternalProgramFailure { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::AdapterNotFound { context, .. }
            | Self::AdapterInput { context, .. }
            | Self::ProgramNotFound { context, .. }
            | Self::ExternalProgramFailure { context, .. } => context,
        }
    }

    pub fn logs(&self) -> Option<&str> {
        self.context().logs.as_deref()
    }

    pub fn data(&self) -> Option<&Data> {
        self.context().data.as_ref()
    }

    pub fn results(&self) -> Option<&Results> {
        self.context().results.as_deref()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AdapterNotFound { .. } => "AdapterNotFound",
            Self::AdapterInput { .. } => "AdapterInput",
            Self::ProgramNotFound { .. } => "ProgramNotFound",
            Self::ExternalProgramFailure { .. } => "ExternalProgramFailure",
        }
    }

    /// Human-readable report: the error and every cause in its source chain.
    pub fn traceback(&self) -> String {
        let mut out = format!("{} ({}): {}", self.kind(), self.program(), self);
        let mut cause = self.source();
        while let Some(err) = cause {
            let _ = write!(out, "\n  caused by: {err}");
            cause = err.source();
        }
        out
    }
}

impl From<ProcessError> for OrchestrationError {
    fn from(err: ProcessError) -> Self {
        let message = err.to_string();
        match err {
            ProcessError::NotFound { program } => Self::program_not_found(program, None),
            ProcessError::Failed {
                program,
                exit_code,
                output,
                ..
            } => Self::external_failure(program, message)
                .with_exit_code(exit_code)
                .with_logs(output),
            other => {
                let program = other.program().to_string();
                Self::external_failure(program, message).with_source(other)
            }
        }
    }
}
