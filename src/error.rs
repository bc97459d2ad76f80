//! Error taxonomy for compilation and execution.
//!
//! Syntax errors are collected rather than thrown: the parser keeps going
//! after a mistake so a single typo doesn't hide every other diagnostic in
//! the source. Runtime errors abort the trial that raised them but carry
//! enough context (`simulation`, `year`, `application`, `substance`) for the
//! driver to attach them to a partial [`crate::driver::SimulationResult`].

use thiserror::Error;

/// A single parser or lexer diagnostic.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{line}:{column}: {message}")]
pub struct CompileError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl CompileError {
    pub fn new(line: u32, column: u32, message: impl Into<String>) -> Self {
        CompileError {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Failure modes raised while a compiled program runs against an [`crate::engine::Engine`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unknown stream `{0}`")]
    UnknownStream(String),

    #[error("unknown stanza `{0}`")]
    UnknownStanza(String),

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("cannot convert `{from}` to `{to}`")]
    UnitMismatch { from: String, to: String },

    #[error("non-recoverable NaN converting `{from}` to `{to}`: denominator total is zero")]
    NonRecoverableNaN { from: String, to: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("stream `{0}` would go negative and clamping is disallowed")]
    NegativeStock(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// An [`EngineError`] with the scope it occurred in, as returned to callers.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("simulation `{simulation}`, year {year}, {application}/{substance}: {source}")]
pub struct RuntimeError {
    pub simulation: String,
    pub year: i32,
    pub application: String,
    pub substance: String,
    #[source]
    pub source: EngineError,
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
