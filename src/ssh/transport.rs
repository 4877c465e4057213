//! Transport seams between the pool/executor and the SSH implementation
//!
//! The pool leases and the executor drives [`Transport`] objects created by
//! a [`Connector`]; production code wires in the russh-backed
//! implementations from [`connection`](super::connection), tests substitute
//! scripted fakes.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

use super::host::HostSpec;

/// Output from a command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output from the command
    pub stdout: String,

    /// Standard error from the command
    pub stderr: String,

    /// Exit code of the command (if available)
    pub exit_code: Option<u32>,
}

impl CommandOutput {
    /// Create a new empty CommandOutput
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the command succeeded (exit code 0 or no exit code available)
    pub fn success(&self) -> bool {
        self.exit_code.is_none_or(|code| code == 0)
    }

    /// Get combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// An authenticated session to one host
#[async_trait]
pub trait Transport: Send {
    /// Run a command, collecting output until the channel closes or the
    /// deadline expires. A deadline expiry returns `CoreError::Timeout`;
    /// the caller is expected to discard the transport afterwards.
    async fn exec(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput>;

    /// Cheap liveness check used before reusing an idle connection
    async fn probe(&mut self) -> bool;

    /// Close the session gracefully
    async fn close(&mut self);
}

/// Creates authenticated transports on demand for the pool
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &HostSpec) -> Result<Box<dyn Transport>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_success() {
        let output = CommandOutput {
            stdout: "hello".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        };
        assert!(output.success());
    }

    #[test]
    fn test_command_output_failure() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "error".to_string(),
            exit_code: Some(1),
        };
        assert!(!output.success());
    }

    #[test]
    fn test_command_output_no_exit_code() {
        let output = CommandOutput {
            stdout: "hello".to_string(),
            stderr: String::new(),
            exit_code: None,
        };
        // No exit code should be treated as success
        assert!(output.success());
    }

    #[test]
    fn test_command_output_combined() {
        let output = CommandOutput {
            stdout: "stdout".to_string(),
            stderr: "stderr".to_string(),
            exit_code: Some(0),
        };
        assert_eq!(output.combined_output(), "stdout\nstderr");
    }

    #[test]
    fn test_command_output_combined_only_stdout() {
        let output = CommandOutput {
            stdout: "stdout".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        };
        assert_eq!(output.combined_output(), "stdout");
    }

    #[test]
    fn test_command_output_combined_only_stderr() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "stderr".to_string(),
            exit_code: Some(1),
        };
        assert_eq!(output.combined_output(), "stderr");
    }
}
