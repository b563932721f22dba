use crate::runtime::command::{CommandOutput, CommandRunner, Invocation};
use crate::runtime::error::RuntimeError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Scripted [`CommandRunner`] for tests.
///
/// Outputs are queued ahead of time and popped in order, one per `run` call,
/// while every invocation is recorded for later assertions. The queue
/// running dry is a test bug and surfaces as a spawn error naming the
/// unexpected invocation.
pub struct MockRunner {
    outputs: Mutex<VecDeque<Result<CommandOutput, RuntimeError>>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            outputs: Mutex::new(VecDeque::new()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Queues a zero-exit output with the given stdout.
    pub fn push_success(&self, stdout: &str) {
        self.push_output(CommandOutput {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        });
    }

    /// Queues a non-zero exit with the given stderr.
    pub fn push_failure(&self, code: i32, stderr: &str) {
        self.push_output(CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        });
    }

    pub fn push_output(&self, output: CommandOutput) {
        self.outputs.lock().unwrap().push_back(Ok(output));
    }

    /// Queues a spawn-level failure, as if the binary were missing.
    pub fn push_spawn_error(&self, program: &str) {
        self.outputs
            .lock()
            .unwrap()
            .push_back(Err(RuntimeError::Spawn {
                program: program.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn error"),
            }));
    }

    /// Every invocation seen so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Rendered invocation lines, convenient for sequence assertions.
    pub fn invocation_lines(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(Invocation::display)
            .collect()
    }

    pub fn remaining_outputs(&self) -> usize {
        self.outputs.lock().unwrap().len()
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, invocation: Invocation) -> Result<CommandOutput, RuntimeError> {
        let line = invocation.display();
        self.invocations.lock().unwrap().push(invocation);

        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(RuntimeError::Spawn {
                    program: line.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("no scripted output remaining for '{}'", line),
                    ),
                })
            })
    }
}

impl std::fmt::Debug for MockRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRunner")
            .field("remaining_outputs", &self.remaining_outputs())
            .field("invocations", &self.invocations.lock().unwrap().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pops_outputs_in_order() {
        let runner = MockRunner::new();
        runner.push_success("first");
        runner.push_failure(1, "second failed");

        let first = runner
            .run(Invocation::new("docker", vec!["ps".to_string()]))
            .await
            .unwrap();
        assert_eq!(first.stdout, "first");

        let second = runner
            .run(Invocation::new("docker", vec!["rm".to_string()]))
            .await
            .unwrap();
        assert_eq!(second.code, Some(1));
        assert_eq!(second.stderr, "second failed");
    }

    #[tokio::test]
    async fn test_records_invocations() {
        let runner = MockRunner::new();
        runner.push_success("");
        runner
            .run(Invocation::new(
                "docker",
                vec!["volume".to_string(), "create".to_string(), "data".to_string()],
            ))
            .await
            .unwrap();

        assert_eq!(runner.invocation_lines(), vec!["docker volume create data"]);
    }

    #[tokio::test]
    async fn test_exhausted_queue_is_an_error() {
        let runner = MockRunner::new();
        let result = runner
            .run(Invocation::new("docker", vec!["ps".to_string()]))
            .await;
        assert!(matches!(result, Err(RuntimeError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_scripted_spawn_error() {
        let runner = MockRunner::new();
        runner.push_spawn_error("docker");
        let result = runner.run(Invocation::new("docker", vec![])).await;
        assert!(matches!(result, Err(RuntimeError::Spawn { .. })));
    }
}
