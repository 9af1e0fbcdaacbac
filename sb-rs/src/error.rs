//! Error types for building and running script units.

use std::fmt;

use thiserror::Error;

/// Script text that the host interpreter refused to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct CompileError {
    /// 1-based physical line where the offending statement starts.
    pub line: usize,
    pub message: String,
}

impl CompileError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self { line, message: message.into() }
    }
}

/// The inherited error-preference variable holds something that is not an
/// error action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{variable} {value:?} is not a valid error action")]
pub struct InvalidPolicyError {
    pub variable: String,
    pub value: String,
}

/// How a runtime error was raised inside a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// `/error`: the unit may carry on.
    NonTerminating,
    /// An evaluation failure; the failing statement is abandoned.
    Statement,
    /// `/throw`: the unit cannot carry on.
    Thrown,
}

/// A runtime error raised while a unit was executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Whether the unit may resume after this error is reported.
    pub fn is_resumable(&self) -> bool {
        self.kind != ErrorKind::Thrown
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Failures surfaced to the caller of Build / Run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error(transparent)]
    InvalidPolicy(#[from] InvalidPolicyError),

    /// A runtime error under the Stop policy; the whole pipeline step aborts.
    #[error("execution stopped: {0}")]
    Stopped(ErrorRecord),

    #[error("invocation cancelled")]
    Cancelled,

    #[error("script worker panicked: {0}")]
    WorkerPanicked(String),
}

/// A non-fatal error encountered while loading an rc file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}
