//! Remote execution core for the homelab monitoring platform
//!
//! This crate is the credential & remote-execution subsystem the platform's
//! orchestration layer (compliance checks, agent deployment, discovery,
//! ad-hoc scans) calls into. It authenticates to heterogeneous, sometimes
//! unreliable machines over SSH and provides:
//!
//! - Encrypted credential storage with global/host scoping (`credentials`)
//! - Trust-on-first-use host identity pinning (`trust`)
//! - A bounded, per-host connection pool (`ssh::pool`)
//! - A retrying, timeout-enforcing command executor (`exec`)
//! - An append-only audit log of every execution attempt (`audit`)
//!
//! The crate owns no inbound listener; it only originates outbound SSH
//! connections, and its only "server" surface is the in-process API below.
//!
//! # Example
//!
//! ```no_run
//! use remote_exec::{CommandSpec, CoreConfig, ExecutionRequest, HostSpec, RemoteExecutor};
//!
//! # async fn run() -> remote_exec::Result<()> {
//! let config = CoreConfig::new("/var/lib/monitor/core.db")
//!     .with_master_key(std::env::var("MONITOR_MASTER_KEY").unwrap_or_default());
//! let core = RemoteExecutor::open(config)?;
//!
//! let host = HostSpec::new("pve-1", "root").with_addr("192.168.1.10");
//! let request = ExecutionRequest::new(host, CommandSpec::new("uptime"));
//! let result = core.execute(&request).await;
//! println!("{}", result.stdout);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod exec;
pub mod ssh;
pub mod trust;

// Re-exports for convenience
pub use audit::{AuditLog, AuditOutcome, AuditRecord};
pub use config::CoreConfig;
pub use credentials::{CredentialKind, CredentialScope, CredentialStatus, CredentialStore};
pub use error::{CoreError, ErrorKind, Result};
pub use exec::{
    CommandSpec, ExecutionRequest, ExecutionResult, ExecutionState, RemoteExecutor, RetryPolicy,
};
pub use ssh::{CommandOutput, ConnectionPool, HostSpec, PoolConfig, PoolStats};
pub use trust::{HostTrustRegistry, PinnedKey, TrustDecision};
