//! Per-task conversion errors
//!
//! Everything here is scoped to a single task. The engine turns each error
//! into a `TaskStatus::Failure` for that task; none of these abort a run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::task::FailureKind;

#[derive(Debug, Error)]
pub enum ConversionError {
    /// Neither wkhtmltopdf nor a headless browser is installed.
    #[error("no HTML-to-PDF engine found (install wkhtmltopdf or Chrome/Chromium)")]
    NoEngineAvailable,

    #[error("{tool} not found on PATH")]
    ToolNotFound { tool: String },

    #[error("{tool} failed ({}): {stderr}", exit_label(.exit_code))]
    ToolError {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("filesystem error at '{}': {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The tool exited cleanly but the expected file never appeared.
    #[error("{tool} exited successfully but produced no file at '{}'", .path.display())]
    NoOutput { tool: String, path: PathBuf },

    #[error("worker process crashed: {detail}")]
    WorkerCrashed { detail: String },

    /// A failure relayed from an isolated worker process.
    #[error("{message}")]
    Reported { kind: FailureKind, message: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}

impl ConversionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ConversionError::NoEngineAvailable => FailureKind::NoEngineAvailable,
            ConversionError::ToolNotFound { .. } => FailureKind::ToolNotFound,
            ConversionError::ToolError { .. } => FailureKind::ToolError,
            ConversionError::Timeout { .. } => FailureKind::Timeout,
            ConversionError::Filesystem { .. } => FailureKind::Filesystem,
            ConversionError::NoOutput { .. } => FailureKind::NoOutput,
            ConversionError::WorkerCrashed { .. } => FailureKind::WorkerCrashed,
            ConversionError::Reported { kind, .. } => *kind,
        }
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ConversionError::Filesystem {
            path: path.into(),
            source,
        }
    }
}
