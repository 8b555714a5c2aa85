//! Subprocess-based tool runner.
//!
//! Spawns the tool directly (no shell), captures stdout and stderr, and
//! enforces the invocation timeout. The child is spawned with
//! `kill_on_drop`, so abandoning the wait on timeout terminates it.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ToolInvocation;
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ExecutionResult, ToolRunner};

/// Runs tools as local child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn build_command(invocation: &ToolInvocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &invocation.workdir {
            cmd.current_dir(dir);
        }
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }
        cmd
    }

    fn spawn_error(invocation: &ToolInvocation, e: std::io::Error) -> RunnerError {
        match e.kind() {
            ErrorKind::NotFound => RunnerError::NotFound(invocation.program.clone()),
            ErrorKind::PermissionDenied => RunnerError::NotExecutable(invocation.program.clone()),
            _ => RunnerError::SpawnFailed(format!("{}: {}", invocation.program, e)),
        }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> RunnerResult<ExecutionResult> {
        debug!("Executing: {}", invocation.command_line());

        let started_at = Utc::now();
        let start = Instant::now();

        let child = Self::build_command(invocation)
            .spawn()
            .map_err(|e| Self::spawn_error(invocation, e))?;

        let output = if invocation.timeout_seconds > 0 {
            let limit = Duration::from_secs(invocation.timeout_seconds);
            match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output.map_err(|e| {
                    RunnerError::ExecutionFailed(format!("Failed to wait for process: {}", e))
                })?,
                Err(_) => {
                    // Dropping the wait future drops the child, which kills it.
                    warn!(
                        "{} exceeded {}s timeout and was terminated",
                        invocation.command_line(),
                        invocation.timeout_seconds
                    );
                    return Err(RunnerError::Timeout(invocation.timeout_seconds));
                }
            }
        } else {
            child.wait_with_output().await.map_err(|e| {
                RunnerError::ExecutionFailed(format!("Failed to wait for process: {}", e))
            })?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1) as i64;
        debug!(
            "{} exited with {} in {}ms",
            invocation.program, exit_code, duration_ms
        );

        Ok(ExecutionResult {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            started_at,
            finished_at: Utc::now(),
            duration_ms,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_exit_code_and_streams() {
        let runner = ProcessRunner::new();
        let inv = ToolInvocation::new("sh")
            .arg("-c")
            .arg("echo out; echo err 1>&2; exit 3")
            .timeout(10);

        let result = runner.run(&inv).await.unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_found() {
        let runner = ProcessRunner::new();
        let inv = ToolInvocation::new("ksi-definitely-not-installed-binary");

        let err = runner.run(&inv).await.unwrap_err();
        assert!(matches!(err, RunnerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_timeout_terminates_process() {
        let runner = ProcessRunner::new();
        let inv = ToolInvocation::new("sh").arg("-c").arg("sleep 30").timeout(1);

        let start = Instant::now();
        let err = runner.run(&inv).await.unwrap_err();
        assert!(matches!(err, RunnerError::Timeout(1)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_workdir_and_env_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new();
        let inv = ToolInvocation::new("sh")
            .arg("-c")
            .arg("pwd; echo $KSI_MARKER")
            .workdir(dir.path())
            .env("KSI_MARKER", "marker-value")
            .timeout(10);

        let result = runner.run(&inv).await.unwrap();
        assert!(result.success());
        assert!(result.stdout.contains("marker-value"));
        let reported = std::fs::canonicalize(result.stdout.lines().next().unwrap()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }
}
