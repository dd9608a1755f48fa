//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use std::path::PathBuf;
use thiserror::Error;

/// Why a single trace line could not be turned into an event.
///
/// These never abort a run: the line is skipped and counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("line too short to carry an event")]
    ShortLine,

    #[error("bad or missing field `{key}`: {reason}")]
    FieldError { key: &'static str, reason: String },
}

impl ParseFailure {
    pub(crate) fn field(key: &'static str, reason: impl Into<String>) -> Self {
        Self::FieldError {
            key,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while loading a trace log
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Failed to read trace file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the symbol table and the binary inspection tools
#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("`{tool}` failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("Invalid object file: {0}")]
    Object(#[from] object::Error),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}
