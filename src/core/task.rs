//! Value types flowing through the conversion pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One source-to-destination conversion unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionTask {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl ConversionTask {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Coarse classification of a failed task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    NoEngineAvailable,
    ToolNotFound,
    ToolError,
    Timeout,
    Filesystem,
    NoOutput,
    WorkerCrashed,
    Panicked,
    Unverified,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::NoEngineAvailable => "no engine",
            FailureKind::ToolNotFound => "tool not found",
            FailureKind::ToolError => "tool error",
            FailureKind::Timeout => "timeout",
            FailureKind::Filesystem => "filesystem",
            FailureKind::NoOutput => "no output",
            FailureKind::WorkerCrashed => "worker crashed",
            FailureKind::Panicked => "panicked",
            FailureKind::Unverified => "unverified output",
        };
        f.write_str(name)
    }
}

/// Final state of a single task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Success,
    Failure { kind: FailureKind, message: String },
    Skipped(String),
}

impl TaskStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            TaskStatus::Failure { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result of executing one task, produced exactly once per scheduled task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task: ConversionTask,
    pub status: TaskStatus,
}

/// A discovered source that the planner decided not to schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSource {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_accessor() {
        let status = TaskStatus::Failure {
            kind: FailureKind::Timeout,
            message: "soffice timed out after 5s".to_string(),
        };
        assert_eq!(status.failure_kind(), Some(FailureKind::Timeout));
        assert!(!status.is_success());
        assert_eq!(TaskStatus::Success.failure_kind(), None);
    }

    #[test]
    fn test_status_survives_json() {
        let outcome = TaskOutcome {
            task: ConversionTask::new("/in/a.md", "/in/a.pdf"),
            status: TaskStatus::Failure {
                kind: FailureKind::ToolError,
                message: "exit 1".to_string(),
            },
        };
        let json = serde_json::to_string(&outcome).unwrap();
        let back: TaskOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }
}
