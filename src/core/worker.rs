//! Isolated worker processes
//!
//! Each task runs inside a fresh child process (the same binary started with
//! [`WORKER_FLAG`]). The parent writes one JSON [`WorkerRequest`] to the
//! child's stdin and reads one JSON [`WorkerReply`] from its stdout. A child
//! that crashes, hangs or prints garbage only fails its own task.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

use super::engine::{run_guarded, TaskRunner};
use super::error::ConversionError;
use super::gateway::{Gateway, GatewayOptions};
use super::process::run_with_timeout;
use super::task::{ConversionTask, TaskStatus};
use super::tools::Toolchain;

/// Hidden command-line flag that puts the binary into worker mode
pub const WORKER_FLAG: &str = "--worker";

/// Extra time granted to a worker beyond the per-tool timeout before the
/// orchestrator kills it outright
pub const WORKER_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub task: ConversionTask,
    pub options: GatewayOptions,
    pub toolchain: Toolchain,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerReply {
    pub status: TaskStatus,
}

/// Runs tasks in child processes of `program`
pub struct WorkerProcess {
    program: PathBuf,
    toolchain: Toolchain,
    options: GatewayOptions,
    grace: Duration,
}

impl WorkerProcess {
    pub fn new(program: impl Into<PathBuf>, toolchain: Toolchain, options: GatewayOptions) -> Self {
        Self {
            program: program.into(),
            toolchain,
            options,
            grace: WORKER_GRACE,
        }
    }

    /// Override the slack granted on top of the per-tool timeout
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Workers that re-execute the running binary
    pub fn current_exe(toolchain: Toolchain, options: GatewayOptions) -> Result<Self> {
        let program = std::env::current_exe().context("Cannot locate the running executable")?;
        Ok(Self::new(program, toolchain, options))
    }

    fn deadline(&self) -> Duration {
        self.options.timeout + self.grace
    }
}

impl TaskRunner for WorkerProcess {
    fn run(&self, task: &ConversionTask) -> Result<(), ConversionError> {
        let request = WorkerRequest {
            task: task.clone(),
            options: self.options.clone(),
            toolchain: self.toolchain.clone(),
        };
        let payload = serde_json::to_vec(&request).map_err(|e| ConversionError::WorkerCrashed {
            detail: format!("cannot encode request: {e}"),
        })?;

        let mut cmd = Command::new(&self.program);
        cmd.arg(WORKER_FLAG);
        // The worker gets its own process group, which keeps terminal Ctrl-C
        // away from it and lets an expired deadline kill it as a unit.
        let output = run_with_timeout("worker", cmd, Some(&payload), self.deadline())?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reply = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| serde_json::from_str::<WorkerReply>(line).ok());

        match reply {
            Some(WorkerReply {
                status: TaskStatus::Success,
            }) => Ok(()),
            Some(WorkerReply {
                status: TaskStatus::Failure { kind, message },
            }) => Err(ConversionError::Reported { kind, message }),
            Some(WorkerReply {
                status: TaskStatus::Skipped(reason),
            }) => Err(ConversionError::WorkerCrashed {
                detail: format!("worker skipped the task: {reason}"),
            }),
            None => {
                debug!(status = %output.status, "Worker produced no reply");
                let stderr = output.stderr_tail();
                Err(ConversionError::WorkerCrashed {
                    detail: if stderr.is_empty() {
                        format!("exited with {} and no reply", output.status)
                    } else {
                        format!("exited with {}: {stderr}", output.status)
                    },
                })
            }
        }
    }
}

/// Worker-mode entry point: read one request, convert, write one reply
pub fn serve<R: Read, W: Write>(mut input: R, mut output: W) -> Result<()> {
    let mut raw = String::new();
    input
        .read_to_string(&mut raw)
        .context("Failed to read worker request")?;
    let request: WorkerRequest =
        serde_json::from_str(&raw).context("Malformed worker request")?;

    let gateway = Gateway::new(request.toolchain, request.options);
    let status = run_guarded(&gateway, &request.task);

    serde_json::to_writer(&mut output, &WorkerReply { status })
        .context("Failed to write worker reply")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}
