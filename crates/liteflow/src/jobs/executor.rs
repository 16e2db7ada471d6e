//! Shell subprocess execution with output capture and timeout enforcement.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::process::Command;

/// Upper bound on captured stdout/stderr, per stream. Longer output is
/// truncated so a chatty job cannot grow the store without limit.
pub const MAX_CAPTURE_BYTES: usize = 64 * 1024;

const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Outcome of a single execution attempt.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub success: bool,
    /// `None` when the child was killed by the timeout (or died to a signal);
    /// `-1` when the spawn itself failed.
    pub exit_code: Option<i64>,
    pub stdout: String,
    pub stderr: String,
    pub runtime_sec: i64,
    pub killed_by_timeout: bool,
}

/// Run `command` through the host shell and wait for it to finish.
///
/// The command is trusted user input; it is neither escaped nor validated.
/// With `timeout_sec > 0` a wall-clock timer is armed and on expiry the child
/// is forcibly killed (no grace period). `timeout_sec = 0` means unbounded.
pub async fn execute(command: &str, timeout_sec: i64) -> ExecResult {
    let start = Instant::now();

    let mut cmd = shell_command(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let outcome = if timeout_sec > 0 {
        match tokio::time::timeout(Duration::from_secs(timeout_sec as u64), cmd.output()).await {
            Ok(io) => Some(io),
            // Timer fired: dropping the in-flight future kills the child.
            Err(_) => None,
        }
    } else {
        Some(cmd.output().await)
    };

    let runtime_sec = start.elapsed().as_secs() as i64;

    match outcome {
        None => {
            tracing::warn!(timeout_sec, "command killed by timeout");
            ExecResult {
                success: false,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                runtime_sec,
                killed_by_timeout: true,
            }
        }
        Some(Ok(output)) => ExecResult {
            success: output.status.success(),
            exit_code: output.status.code().map(i64::from),
            stdout: truncate_capture(String::from_utf8_lossy(&output.stdout).into_owned()),
            stderr: truncate_capture(String::from_utf8_lossy(&output.stderr).into_owned()),
            runtime_sec,
            killed_by_timeout: false,
        },
        Some(Err(e)) => {
            tracing::error!(error = %e, "failed to spawn command");
            ExecResult {
                success: false,
                exit_code: Some(-1),
                stdout: String::new(),
                stderr: e.to_string(),
                runtime_sec: 0,
                killed_by_timeout: false,
            }
        }
    }
}

/// Re-run a command with the caller's stdio, outside the engine. Used by
/// confirmed replay; the run is not a queued job.
pub async fn run_inherited(command: &str) -> anyhow::Result<ExitStatus> {
    let status = shell_command(command).status().await?;
    Ok(status)
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

fn truncate_capture(mut captured: String) -> String {
    if captured.len() <= MAX_CAPTURE_BYTES {
        return captured;
    }
    let mut cut = MAX_CAPTURE_BYTES;
    while !captured.is_char_boundary(cut) {
        cut -= 1;
    }
    captured.truncate(cut);
    captured.push_str(TRUNCATION_MARKER);
    captured
}
