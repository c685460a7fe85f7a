//! Error types shared by the compiler, the expression engine and the VM
//!
//! User-authored mistakes surface as [`Diagnostic`]s (compile time) or [`RuntimeError`]s (run
//! time). [`EngineFault`] is reserved for internal consistency violations: it means the
//! compiler or interpreter itself is broken, not the script.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/* ===================== Compile Time ===================== */

/// A single line-tagged compile error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

/// Raised by an expression engine when a statement cannot be compiled.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ExpressionError {
    pub message: String,
}

impl ExpressionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Internal consistency violation inside the compiler or interpreter.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("engine fault: {0}")]
pub struct EngineFault(pub String);

impl EngineFault {
    pub fn new(message: impl Into<String>) -> Self {
        EngineFault(message.into())
    }
}

/* ===================== Run Time ===================== */

/// Recoverable script error, tagged with the line of the statement that raised it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {message}")]
pub struct RuntimeError {
    pub line: u32,
    pub message: String,
}

impl RuntimeError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Command table registration failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("command '{0}' is already registered")]
    Duplicate(String),
    #[error("command '{0}' is not registered")]
    NotRegistered(String),
}

/// Failure of a top-level VM operation
#[derive(Debug, Error)]
pub enum VmError {
    #[error("couldn't read script at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("script '{name}' failed to compile with {} error(s)", diagnostics.len())]
    Compile {
        name: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("program '{0}' is not valid and cannot be executed")]
    InvalidProgram(String),

    #[error("program '{name}' expects {expected} parameter(s), {supplied} supplied")]
    ParameterMismatch {
        name: String,
        expected: usize,
        supplied: usize,
    },

    #[error("maximum call depth of {0} exceeded")]
    CallDepthExceeded(usize),

    #[error("program '{0}' is currently executing")]
    ProgramExecuting(String),

    #[error("runtime error in '{program}' at {error}")]
    Runtime {
        program: String,
        #[source]
        error: RuntimeError,
    },

    #[error("global exception raised while running '{0}'")]
    GlobalException(String),

    #[error(transparent)]
    Fault(#[from] EngineFault),
}
