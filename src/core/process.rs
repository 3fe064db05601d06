//! Subprocess invocation with a hard wall-clock timeout

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::error::ConversionError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Keep only the tail of stderr in error messages
const STDERR_TAIL: usize = 2000;

#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn stderr_tail(&self) -> String {
        tail(&String::from_utf8_lossy(&self.stderr), STDERR_TAIL)
    }
}

fn tail(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

/// Spawn `cmd`, optionally feed `input` on stdin, and wait at most `timeout`
///
/// stdout and stderr are drained on helper threads so a chatty tool cannot
/// block on a full pipe. On unix the child leads a fresh process group, and
/// that whole group is killed on expiry, so helpers the tool forked (office
/// suite and browser render processes) go down with it.
///
/// # Arguments
/// * `tool` - Name used in errors and logs
/// * `cmd` - Fully configured command; its stdio is overridden
/// * `input` - Bytes written to the child's stdin, if any
/// * `timeout` - Wall-clock limit for the whole process group
///
/// # Returns
/// Exit status and captured output, or `Timeout` / `ToolNotFound` / `ToolError`
pub fn run_with_timeout(
    tool: &str,
    mut cmd: Command,
    input: Option<&[u8]>,
    timeout: Duration,
) -> Result<ToolOutput, ConversionError> {
    cmd.stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!(tool, ?cmd, "Spawning");
    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConversionError::ToolNotFound {
            tool: tool.to_string(),
        },
        _ => ConversionError::ToolError {
            tool: tool.to_string(),
            exit_code: None,
            stderr: format!("failed to spawn: {e}"),
        },
    })?;

    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);

    if let (Some(bytes), Some(mut stdin)) = (input, child.stdin.take()) {
        // A child that exits without reading stdin closes the pipe; its exit
        // status tells the real story.
        if let Err(e) = stdin.write_all(bytes) {
            debug!(tool, "stdin write failed: {e}");
        }
    }

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                // Stragglers left in the group would hold the pipes open.
                kill_group(&child);
                break Some(status);
            }
            Ok(None) if start.elapsed() >= timeout => {
                warn!(tool, "Timed out after {:?}, killing process group", timeout);
                kill_tree(&mut child);
                break None;
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                kill_tree(&mut child);
                return Err(ConversionError::ToolError {
                    tool: tool.to_string(),
                    exit_code: None,
                    stderr: format!("failed to wait: {e}"),
                });
            }
        }
    };

    let Some(status) = status else {
        // Anything that escaped the group may still hold the pipes open, so
        // the readers are left to finish on their own.
        return Err(ConversionError::Timeout {
            tool: tool.to_string(),
            secs: timeout.as_secs(),
        });
    };

    let stdout = stdout_reader.and_then(|h| h.join().ok()).unwrap_or_default();
    let stderr = stderr_reader.and_then(|h| h.join().ok()).unwrap_or_default();

    Ok(ToolOutput {
        status,
        stdout,
        stderr,
    })
}

/// Like [`run_with_timeout`] but a nonzero exit becomes `ToolError`
pub fn run_tool(tool: &str, cmd: Command, timeout: Duration) -> Result<ToolOutput, ConversionError> {
    let output = run_with_timeout(tool, cmd, None, timeout)?;
    if !output.status.success() {
        return Err(ConversionError::ToolError {
            tool: tool.to_string(),
            exit_code: output.status.code(),
            stderr: output.stderr_tail(),
        });
    }
    Ok(output)
}

/// Kill the child's process group, then the child itself, and reap it
fn kill_tree(child: &mut Child) {
    kill_group(child);
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: plain syscall; a negative pid addresses the process group the
    // child was placed in at spawn.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::task::FailureKind;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn test_captures_output() {
        let out = run_tool("sh", sh("echo hello; echo oops >&2"), Duration::from_secs(5)).unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
        assert_eq!(out.stderr_tail(), "oops");
    }

    #[test]
    fn test_nonzero_exit_is_tool_error() {
        let err = run_tool("sh", sh("echo broken >&2; exit 3"), Duration::from_secs(5)).unwrap_err();
        match err {
            ConversionError::ToolError {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_hung_tool_is_killed() {
        let start = Instant::now();
        let err = run_tool("sh", sh("sleep 30"), Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_timeout_kills_forked_helpers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let marker = temp_dir.path().join("late");
        let script = format!("(sleep 2; echo late > '{}') & wait", marker.display());

        let err = run_tool("sh", sh(&script), Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);

        thread::sleep(Duration::from_secs(3));
        assert!(!marker.exists(), "helper outlived the timed-out tool");
    }

    #[test]
    fn test_background_leftovers_do_not_block_return() {
        let start = Instant::now();
        let out = run_tool("sh", sh("sleep 30 & echo done"), Duration::from_secs(20)).unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "done");
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_missing_binary_is_tool_not_found() {
        let cmd = Command::new("definitely-not-a-real-tool-xyz123");
        let err = run_tool("fake", cmd, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ToolNotFound);
    }

    #[test]
    fn test_stdin_is_forwarded() {
        let out = run_with_timeout("sh", sh("cat"), Some(b"ping".as_slice()), Duration::from_secs(5)).unwrap();
        assert_eq!(out.stdout, b"ping");
    }

    #[test]
    fn test_large_stderr_does_not_deadlock() {
        let script = "i=0; while [ $i -lt 20000 ]; do echo 'line of noise' >&2; i=$((i+1)); done";
        let out = run_tool("sh", sh(script), Duration::from_secs(20)).unwrap();
        assert!(out.stderr.len() > 64 * 1024);
        assert!(out.stderr_tail().starts_with("..."));
    }
}
