//! SSH connection management module
//!
//! Host specs, the TOFU-verifying client handler, the transport seams, the
//! russh-backed connector, and the bounded per-host connection pool.

pub mod connection;
pub mod handler;
pub mod host;
pub mod pool;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use connection::{SshConnector, SshTransport};
pub use handler::ClientHandler;
pub use host::HostSpec;
pub use pool::{ConnectionPool, PoolConfig, PoolLease, PoolStats};
pub use transport::{CommandOutput, Connector, Transport};
