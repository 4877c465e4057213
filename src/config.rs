//! Core configuration
//!
//! Builder-style configuration for the execution core. The orchestrator
//! constructs one `CoreConfig` at startup and hands it to
//! [`RemoteExecutor::open`](crate::exec::RemoteExecutor::open).

use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::error::{CoreError, Result};
use crate::exec::RetryPolicy;
use crate::ssh::PoolConfig;

/// Default connect deadline in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default execute deadline for a single command in milliseconds
pub const DEFAULT_EXECUTE_TIMEOUT_MS: u64 = 60_000;

/// Default max characters for a command (None = unlimited)
pub const DEFAULT_MAX_CHARS: Option<usize> = Some(1000);

/// Default grace period for pool shutdown drain
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

/// Core configuration
///
/// All fields have working defaults except `db_path`. The master key is
/// optional at construction time: a core without one can execute against
/// hosts with agent-side auth but refuses to store new credentials.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database holding credentials, host keys, and audit records
    pub db_path: PathBuf,

    /// Operator-supplied master key for credential encryption
    pub(crate) master_key: Option<Zeroizing<Vec<u8>>>,

    /// Deadline covering pool checkout plus connection establishment
    pub connect_timeout: Duration,

    /// Deadline for a single remote command
    pub execute_timeout: Duration,

    /// Maximum command length (None = unlimited)
    pub max_command_chars: Option<usize>,

    /// Default retry policy for transient channel faults
    pub retry: RetryPolicy,

    /// How long shutdown waits for in-flight leases to drain
    pub shutdown_grace: Duration,

    /// Connection pool tuning
    pub pool: PoolConfig,
}

impl CoreConfig {
    /// Create a configuration with defaults, persisting to `db_path`
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            master_key: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            execute_timeout: Duration::from_millis(DEFAULT_EXECUTE_TIMEOUT_MS),
            max_command_chars: DEFAULT_MAX_CHARS,
            retry: RetryPolicy::default(),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            pool: PoolConfig::default(),
        }
    }

    /// Set the operator master key used to encrypt stored credentials
    pub fn with_master_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.master_key = Some(Zeroizing::new(key.into()));
        self
    }

    /// Set the connect deadline
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the execute deadline
    pub fn with_execute_timeout(mut self, timeout: Duration) -> Self {
        self.execute_timeout = timeout;
        self
    }

    /// Set the maximum command length (None disables the limit)
    pub fn with_max_command_chars(mut self, max: Option<usize>) -> Self {
        self.max_command_chars = max;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the shutdown drain grace period
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set the pool tuning parameters
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(ref key) = self.master_key {
            if key.is_empty() {
                return Err(CoreError::configuration("Master key must not be empty"));
            }
        }
        if self.pool.max_per_host == 0 {
            return Err(CoreError::configuration(
                "Pool must allow at least one connection per host",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("db_path", &self.db_path)
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("execute_timeout", &self.execute_timeout)
            .field("max_command_chars", &self.max_command_chars)
            .field("retry", &self.retry)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("pool", &self.pool)
            .finish()
    }
}
