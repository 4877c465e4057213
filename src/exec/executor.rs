//! Command executor
//!
//! The facade the orchestration layer talks to. Owns the credential store,
//! trust registry, connection pool, and audit log, and drives the
//! per-execution state machine: PENDING → CONNECTING → RUNNING → terminal.
//!
//! Failures never escape [`RemoteExecutor::execute`] as errors; every
//! execution yields one `ExecutionResult` and exactly one audit record.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditLog, AuditOutcome, AuditRecord};
use crate::config::CoreConfig;
use crate::credentials::{CredentialKind, CredentialScope, CredentialStatus, CredentialStore};
use crate::db::Database;
use crate::error::{CoreError, ErrorKind, Result};
use crate::ssh::{
    CommandOutput, ConnectionPool, Connector, HostSpec, PoolStats, SshConnector,
};
use crate::trust::HostTrustRegistry;

use super::escalation::{is_valid_password, wrap_escalated};
use super::request::{CommandSpec, ExecutionRequest, ExecutionResult, ExecutionState};
use super::sanitize::sanitize_command;

/// Remote execution core
///
/// One instance per database; the pool is owned here rather than being
/// process-global, so independent executors can coexist.
pub struct RemoteExecutor {
    config: CoreConfig,
    credentials: Arc<CredentialStore>,
    trust: Arc<HostTrustRegistry>,
    audit: Arc<AuditLog>,
    pool: ConnectionPool,
}

impl RemoteExecutor {
    /// Open the core against the database in `config.db_path`, wiring the
    /// russh connector
    pub fn open(config: CoreConfig) -> Result<Self> {
        config.validate()?;
        let db = Arc::new(Database::open(&config.db_path)?);
        Self::build(config, db, None)
    }

    /// Build the core over an existing database with a custom connector.
    ///
    /// This is the seam for alternative transports and for tests.
    pub fn with_connector(
        config: CoreConfig,
        db: Arc<Database>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;
        Self::build(config, db, Some(connector))
    }

    fn build(
        config: CoreConfig,
        db: Arc<Database>,
        connector: Option<Arc<dyn Connector>>,
    ) -> Result<Self> {
        let credentials = Arc::new(CredentialStore::new(
            db.clone(),
            config.master_key.as_ref().map(|k| k.as_slice()),
        )?);
        let audit = Arc::new(AuditLog::new(db.clone()));
        let trust = Arc::new(HostTrustRegistry::new(db, audit.clone()));

        let connector = connector.unwrap_or_else(|| {
            Arc::new(SshConnector::new(
                credentials.clone(),
                trust.clone(),
                config.connect_timeout,
            ))
        });
        let pool = ConnectionPool::new(connector, config.pool.clone());

        Ok(Self {
            config,
            credentials,
            trust,
            audit,
            pool,
        })
    }

    /// Execute one command against one host.
    ///
    /// Infallible surface: channel faults, rejected trust, and non-zero
    /// exits all come back inside the result, classified by `error_kind`.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();
        let mut state = ExecutionState::Pending;

        // The audited command is the rendered template, captured before
        // escalation wrapping so the sudo secret can never reach the log.
        let rendered = request.spec.render();

        let outcome = match self.prepare(request) {
            Ok(dispatched) => self.drive(request, &dispatched, &mut state).await,
            Err(e) => Err(e),
        };

        let result = Self::finish(id, state, outcome, started.elapsed());
        self.record(id, request, &rendered, started_at, &result);
        result
    }

    /// Execute several commands against one host, independently.
    ///
    /// One item's failure never aborts the remainder; callers get one
    /// result per item, in submission order.
    pub async fn execute_batch(
        &self,
        target: &HostSpec,
        specs: Vec<CommandSpec>,
    ) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(specs.len());
        for spec in specs {
            let request = ExecutionRequest::new(target.clone(), spec);
            results.push(self.execute(&request).await);
        }
        results
    }

    /// Validate the command and apply escalation wrapping
    fn prepare(&self, request: &ExecutionRequest) -> Result<String> {
        let sanitized =
            sanitize_command(&request.spec.command, self.config.max_command_chars)?;
        let rendered = {
            let mut spec = request.spec.clone();
            spec.command = sanitized;
            spec.render()
        };

        if !request.spec.escalate {
            return Ok(rendered);
        }

        match self
            .credentials
            .resolve(CredentialKind::SudoPassword, &request.target.name)?
        {
            Some(password) if is_valid_password(&password) => {
                debug!(host = %request.target.name, "escalating with stored sudo password");
                Ok(wrap_escalated(&rendered, Some(&password)))
            }
            Some(_) => {
                warn!(
                    host = %request.target.name,
                    "stored sudo password is unusable; relying on passwordless escalation"
                );
                Ok(rendered)
            }
            None => {
                debug!(
                    host = %request.target.name,
                    "no sudo credential; relying on passwordless escalation"
                );
                Ok(rendered)
            }
        }
    }

    /// Run the attempt loop: checkout, dispatch, classify, maybe retry.
    async fn drive(
        &self,
        request: &ExecutionRequest,
        command: &str,
        state: &mut ExecutionState,
    ) -> Result<CommandOutput> {
        let spec = &request.spec;
        let connect_timeout = spec.connect_timeout.unwrap_or(self.config.connect_timeout);
        let execute_timeout = spec.execute_timeout.unwrap_or(self.config.execute_timeout);
        let max_retries = spec.max_retries.unwrap_or(self.config.retry.max_retries);

        let mut retry = 0u32;
        loop {
            *state = ExecutionState::Connecting;
            let mut lease = match self.pool.checkout(&request.target, connect_timeout).await {
                Ok(lease) => lease,
                Err(e) => {
                    if e.is_retryable() && retry < max_retries {
                        let delay = self.config.retry.delay_for(retry);
                        debug!(
                            host = %request.target.name,
                            retry = retry + 1,
                            delay_ms = delay.as_millis() as u64,
                            "connect failed, backing off: {}", e
                        );
                        tokio::time::sleep(delay).await;
                        retry += 1;
                        continue;
                    }
                    return Err(e);
                }
            };

            *state = ExecutionState::Running;
            match lease.exec(command, execute_timeout).await {
                Ok(output) => {
                    lease.release().await;
                    return Ok(output);
                }
                Err(e) => {
                    // The channel is in an unknown state; never hand it back
                    // to the pool's healthy set.
                    lease.discard().await;
                    if e.is_retryable() && retry < max_retries {
                        let delay = self.config.retry.delay_for(retry);
                        debug!(
                            host = %request.target.name,
                            retry = retry + 1,
                            delay_ms = delay.as_millis() as u64,
                            "execution failed, backing off: {}", e
                        );
                        tokio::time::sleep(delay).await;
                        retry += 1;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Fold the attempt outcome into the terminal result
    fn finish(
        id: Uuid,
        last_state: ExecutionState,
        outcome: Result<CommandOutput>,
        duration: Duration,
    ) -> ExecutionResult {
        match outcome {
            Ok(output) => {
                let succeeded = output.success();
                ExecutionResult {
                    id,
                    state: if succeeded {
                        ExecutionState::Succeeded
                    } else {
                        ExecutionState::Failed
                    },
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    duration,
                    succeeded,
                    error_kind: (!succeeded).then_some(ErrorKind::Command),
                    error: (!succeeded).then(|| {
                        format!(
                            "Remote command exited with code {}",
                            output.exit_code.unwrap_or(0)
                        )
                    }),
                }
            }
            Err(e) => {
                let state = if matches!(e, CoreError::Timeout(_)) {
                    ExecutionState::TimedOut
                } else {
                    ExecutionState::Failed
                };
                debug!(?last_state, "execution failed: {}", e);
                ExecutionResult {
                    id,
                    state,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration,
                    succeeded: false,
                    error_kind: Some(e.kind()),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Write the one audit record this execution produces
    fn record(
        &self,
        id: Uuid,
        request: &ExecutionRequest,
        command: &str,
        started_at: chrono::DateTime<Utc>,
        result: &ExecutionResult,
    ) {
        let outcome = match (result.state, result.error_kind) {
            (ExecutionState::Succeeded, _) => AuditOutcome::Succeeded,
            (ExecutionState::TimedOut, _) => AuditOutcome::TimedOut,
            (_, Some(ErrorKind::HostKeyMismatch)) => AuditOutcome::Rejected,
            _ => AuditOutcome::Failed,
        };

        let record = AuditRecord {
            id,
            host: request.target.name.clone(),
            command: command.to_string(),
            actor: request.spec.actor.clone(),
            started_at,
            finished_at: Utc::now(),
            outcome,
            error_kind: result.error_kind.map(|k| k.as_str().to_string()),
            exit_code: result.exit_code.map(i64::from),
        };

        if let Err(e) = self.audit.append(&record) {
            error!(host = %request.target.name, "failed to write audit record: {}", e);
        }
    }

    /// Store (or replace) a credential
    pub fn store_credential(
        &self,
        kind: CredentialKind,
        scope: &CredentialScope,
        value: &str,
    ) -> Result<Uuid> {
        self.credentials.store(kind, scope, value)
    }

    /// Delete a credential; reports not-found instead of raising
    pub fn delete_credential(&self, kind: CredentialKind, scope: &CredentialScope) -> Result<bool> {
        self.credentials.delete(kind, scope)
    }

    /// Per-kind credential configuration for `host`
    pub fn credential_status(&self, host: &str) -> Result<Vec<CredentialStatus>> {
        self.credentials.status(host)
    }

    /// Operator action: drop the pinned host key so the next contact
    /// re-establishes trust
    pub fn forget_host(&self, host: &str) -> Result<bool> {
        self.trust.forget(host)
    }

    /// The trust registry, for pinned-key inspection
    pub fn trust_registry(&self) -> &HostTrustRegistry {
        &self.trust
    }

    /// The audit log, for range queries
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Pool counters, for observability
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Drain and close the connection pool. Durable state needs no
    /// teardown; a restarted process rebuilds the pool from nothing.
    pub async fn shutdown(&self) {
        info!("shutting down remote execution core");
        self.pool.shutdown(self.config.shutdown_grace).await;
    }
}

impl std::fmt::Debug for RemoteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
