//! Error types for the container runtime access layer

use crate::runtime::command::CommandOutput;
use thiserror::Error;

/// Errors surfaced by runtime command execution and output parsing.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime binary could not be started at all.
    #[error("failed to spawn '{program}': {source} (is it installed and on PATH?)")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The runtime ran the command and reported failure.
    #[error("'{command}' failed with {}: {}", exit_label(.output), .output.diagnostic_tail(1))]
    CommandFailed {
        /// Rendered invocation, e.g. `docker volume create pgvector_data`.
        command: String,
        output: CommandOutput,
    },

    /// Structured runtime output could not be deserialized.
    #[error("failed to parse {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RuntimeError {
    /// Captured stderr of a failed command, when one exists.
    pub fn captured_stderr(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { output, .. } => Some(output.stderr.as_str()),
            _ => None,
        }
    }

    /// Diagnostic tail suitable for printing verbatim before exiting.
    pub fn diagnostics(&self, lines: usize) -> Option<String> {
        match self {
            Self::CommandFailed { output, .. } => Some(output.diagnostic_tail(lines)),
            _ => None,
        }
    }
}

fn exit_label(output: &CommandOutput) -> String {
    match output.code {
        Some(code) => format!("exit code {}", code),
        None => "signal termination".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display_includes_stderr_tail() {
        let err = RuntimeError::CommandFailed {
            command: "docker rmi pgvector-local:latest".to_string(),
            output: CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "Error response from daemon: image is in use\n".to_string(),
            },
        };

        let rendered = err.to_string();
        assert!(rendered.contains("docker rmi pgvector-local:latest"));
        assert!(rendered.contains("exit code 1"));
        assert!(rendered.contains("image is in use"));
    }

    #[test]
    fn test_signal_termination_label() {
        let err = RuntimeError::CommandFailed {
            command: "docker build".to_string(),
            output: CommandOutput {
                code: None,
                stdout: String::new(),
                stderr: "killed".to_string(),
            },
        };
        assert!(err.to_string().contains("signal termination"));
    }

    #[test]
    fn test_captured_stderr() {
        let err = RuntimeError::CommandFailed {
            command: "docker build".to_string(),
            output: CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "error getting credentials".to_string(),
            },
        };
        assert_eq!(err.captured_stderr(), Some("error getting credentials"));

        let spawn = RuntimeError::Spawn {
            program: "docker".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(spawn.captured_stderr(), None);
    }
}
