//! Subprocess execution abstraction for the container runtime
//!
//! Every interaction with the container runtime goes through [`CommandRunner`],
//! which turns an [`Invocation`] into a [`CommandOutput`]: exit code plus the
//! captured standard streams. The exit code and captured streams are the only
//! observable result of a runtime call; callers classify failures by matching
//! known substrings against the captured stderr rather than grepping ad hoc.
//!
//! The production implementation is [`SystemRunner`] (spawns the real binary
//! via `tokio::process`); tests script a [`MockRunner`](super::mock::MockRunner)
//! against the same trait.

use crate::runtime::error::RuntimeError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};

/// A single external command to execute: program, arguments, and any
/// extra environment variables layered over the inherited environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            envs: Vec::new(),
        }
    }

    pub fn with_envs(mut self, envs: Vec<(String, String)>) -> Self {
        self.envs = envs;
        self
    }

    /// Rendered form for logs and error messages, e.g. `docker volume ls`.
    pub fn display(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

/// Captured result of one external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Process exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The last `lines` lines of stderr, falling back to stdout when stderr
    /// is empty. Used to surface build/launch diagnostics verbatim.
    pub fn diagnostic_tail(&self, lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let all: Vec<&str> = source.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Executes external commands and captures their structured result.
///
/// Implementations must be cheap to share (`Arc<dyn CommandRunner>`); the
/// runner itself holds no per-command state.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion and captures exit code and streams.
    ///
    /// Returns `Err` only when the process could not be spawned or awaited;
    /// a non-zero exit is an `Ok` result carrying the failure in the output.
    async fn run(&self, invocation: Invocation) -> Result<CommandOutput, RuntimeError>;
}

/// [`CommandRunner`] backed by real subprocesses.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: Invocation) -> Result<CommandOutput, RuntimeError> {
        debug!(command = %invocation.display(), "executing runtime command");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &invocation.envs {
            command.env(key, value);
        }

        let output = command
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        trace!(
            command = %invocation.display(),
            code = ?result.code,
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            "runtime command finished"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_invocation_display() {
        let inv = Invocation::new("docker", vec!["volume".to_string(), "ls".to_string()]);
        assert_eq!(inv.display(), "docker volume ls");
    }

    #[test]
    fn test_success_requires_zero_exit() {
        assert!(output(0, "", "").success());
        assert!(!output(1, "", "").success());
        assert!(!CommandOutput::default().success());
    }

    #[test]
    fn test_diagnostic_tail_prefers_stderr() {
        let out = output(1, "stdout line", "err one\nerr two\nerr three");
        assert_eq!(out.diagnostic_tail(2), "err two\nerr three");
    }

    #[test]
    fn test_diagnostic_tail_falls_back_to_stdout() {
        let out = output(1, "only stdout", "   ");
        assert_eq!(out.diagnostic_tail(5), "only stdout");
    }

    #[test]
    fn test_diagnostic_tail_shorter_than_requested() {
        let out = output(1, "", "single line");
        assert_eq!(out.diagnostic_tail(50), "single line");
    }

    #[tokio::test]
    async fn test_system_runner_captures_stdout() {
        let runner = SystemRunner::new();
        let result = runner
            .run(Invocation::new("echo", vec!["hello".to_string()]))
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_system_runner_spawn_failure() {
        let runner = SystemRunner::new();
        let result = runner
            .run(Invocation::new("definitely-not-a-real-binary-xyz", vec![]))
            .await;
        assert!(matches!(result, Err(RuntimeError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_system_runner_passes_env() {
        let runner = SystemRunner::new();
        let inv = Invocation::new("sh", vec!["-c".to_string(), "echo $DOCKHAND_TEST_VAR".to_string()])
            .with_envs(vec![("DOCKHAND_TEST_VAR".to_string(), "42".to_string())]);
        let result = runner.run(inv).await.unwrap();
        assert_eq!(result.stdout.trim(), "42");
    }
}
