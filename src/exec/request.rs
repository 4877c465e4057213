//! Execution request and result types
//!
//! The orchestrator describes work with a [`CommandSpec`] aimed at a
//! [`HostSpec`](crate::ssh::HostSpec); the executor answers with an
//! [`ExecutionResult`] carrying the terminal state of the per-execution
//! state machine.

use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::ssh::HostSpec;

use super::sanitize::quote;

/// Per-execution state machine.
///
/// `Pending → Connecting → Running` then exactly one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Connecting,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Succeeded | ExecutionState::Failed | ExecutionState::TimedOut
        )
    }
}

/// One command to run on a remote host
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Command template; arguments are appended individually quoted
    pub command: String,
    pub args: Vec<String>,
    /// Run with elevated rights on the target
    pub escalate: bool,
    /// Override the configured connect deadline
    pub connect_timeout: Option<Duration>,
    /// Override the configured execute deadline
    pub execute_timeout: Option<Duration>,
    /// Override the configured retry budget
    pub max_retries: Option<u32>,
    /// Caller identity recorded in the audit trail
    pub actor: String,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            escalate: false,
            connect_timeout: None,
            execute_timeout: None,
            max_retries: None,
            actor: "orchestrator".to_string(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn escalated(mut self) -> Self {
        self.escalate = true;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_execute_timeout(mut self, timeout: Duration) -> Self {
        self.execute_timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Render the template plus arguments into one shell line. Each argument
    /// goes through the shared quoting helper; the template is trusted as
    /// written by the caller.
    pub fn render(&self) -> String {
        if self.args.is_empty() {
            return self.command.clone();
        }
        let mut rendered = self.command.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&quote(arg));
        }
        rendered
    }
}

/// A command aimed at a specific host
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub target: HostSpec,
    pub spec: CommandSpec,
}

impl ExecutionRequest {
    pub fn new(target: HostSpec, spec: CommandSpec) -> Self {
        Self { target, spec }
    }
}

/// Outcome of one execution, success or failure.
///
/// Failures are carried here rather than raised: `error_kind` classifies the
/// fault and `error` holds the human-readable message. A non-zero remote
/// exit sets `succeeded = false` with `ErrorKind::Command`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub id: Uuid,
    pub state: ExecutionState,
    pub exit_code: Option<u32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub succeeded: bool,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_args() {
        let spec = CommandSpec::new("uptime");
        assert_eq!(spec.render(), "uptime");
    }

    #[test]
    fn test_render_quotes_each_arg() {
        let spec = CommandSpec::new("systemctl restart").with_args(["smokeping", "grafana-server"]);
        assert_eq!(spec.render(), "systemctl restart 'smokeping' 'grafana-server'");
    }

    #[test]
    fn test_render_escapes_quotes_in_args() {
        let spec = CommandSpec::new("logger").with_args(["it's broken"]);
        assert_eq!(spec.render(), "logger 'it'\"'\"'s broken'");
    }

    #[test]
    fn test_state_terminality() {
        assert!(!ExecutionState::Pending.is_terminal());
        assert!(!ExecutionState::Connecting.is_terminal());
        assert!(!ExecutionState::Running.is_terminal());
        assert!(ExecutionState::Succeeded.is_terminal());
        assert!(ExecutionState::Failed.is_terminal());
        assert!(ExecutionState::TimedOut.is_terminal());
    }

    #[test]
    fn test_spec_builder_defaults() {
        let spec = CommandSpec::new("uptime");
        assert!(!spec.escalate);
        assert!(spec.max_retries.is_none());
        assert_eq!(spec.actor, "orchestrator");
    }

    #[test]
    fn test_result_serializes_for_orchestrator() {
        let result = ExecutionResult {
            id: Uuid::nil(),
            state: ExecutionState::Failed,
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "boom".to_string(),
            duration: Duration::from_secs(1),
            succeeded: false,
            error_kind: Some(ErrorKind::HostKeyMismatch),
            error: Some("refused".to_string()),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["error_kind"], "host_key_mismatch");
        assert_eq!(json["exit_code"], 1);
    }
}
