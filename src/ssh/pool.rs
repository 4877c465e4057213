//! Connection pool
//!
//! Bounded, reusable authenticated sessions per host. Monitored homelab
//! devices are often small machines, so concurrency toward any one host is
//! capped by a per-host semaphore; hosts never contend with one another.
//!
//! The pool owns every connection exclusively. Callers get a [`PoolLease`]
//! and must either `release` it (healthy, back to idle) or `discard` it
//! (transport dead or poisoned). Dropping a lease without doing either
//! discards the transport and frees the slot immediately, so a cancelled
//! caller can never leave a slot leased-but-abandoned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};

use super::host::HostSpec;
use super::transport::{CommandOutput, Connector, Transport};

/// Default per-host connection ceiling
pub const DEFAULT_MAX_PER_HOST: usize = 2;

/// Default idle age after which a connection is probed before reuse
pub const DEFAULT_HEALTH_CHECK_AFTER_SECS: u64 = 30;

/// Default idle age after which a connection is destroyed
pub const DEFAULT_MAX_IDLE_SECS: u64 = 300;

/// Pool tuning parameters
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Ceiling on simultaneous connections per host (keep small, 1-4)
    pub max_per_host: usize,

    /// Idle age beyond which a connection is probed before reuse
    pub health_check_after: Duration,

    /// Idle age beyond which a connection is destroyed outright
    pub max_idle: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_host: DEFAULT_MAX_PER_HOST,
            health_check_after: Duration::from_secs(DEFAULT_HEALTH_CHECK_AFTER_SECS),
            max_idle: Duration::from_secs(DEFAULT_MAX_IDLE_SECS),
        }
    }
}

impl PoolConfig {
    /// Set the per-host connection ceiling
    pub fn with_max_per_host(mut self, max: usize) -> Self {
        self.max_per_host = max;
        self
    }

    /// Set the idle age that triggers a health probe
    pub fn with_health_check_after(mut self, age: Duration) -> Self {
        self.health_check_after = age;
        self
    }

    /// Set the idle age at which connections are destroyed
    pub fn with_max_idle(mut self, age: Duration) -> Self {
        self.max_idle = age;
        self
    }
}

struct IdleConn {
    transport: Box<dyn Transport>,
    last_used: Instant,
}

/// Per-host pool state. All connection mutation for a host goes through its
/// own entry; the pool-wide map is only locked to find or create entries.
struct HostSlots {
    limit: Arc<Semaphore>,
    idle: Mutex<Vec<IdleConn>>,
}

/// Aggregate pool counters, mainly for observability and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub hosts: usize,
    pub idle: usize,
    pub leased: usize,
}

/// Bounded per-host connection pool
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    hosts: Mutex<HashMap<String, Arc<HostSlots>>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Create an empty pool. Connections are established lazily on first
    /// checkout; nothing survives a process restart.
    pub fn new(connector: Arc<dyn Connector>, config: PoolConfig) -> Self {
        Self {
            connector,
            config,
            hosts: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn slots_for(&self, host: &str) -> Arc<HostSlots> {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(HostSlots {
                    limit: Arc::new(Semaphore::new(self.config.max_per_host)),
                    idle: Mutex::new(Vec::new()),
                })
            })
            .clone()
    }

    /// Check out a connection to `host`.
    ///
    /// Returns an idle healthy connection when one is free; otherwise blocks
    /// on the per-host slot up to `wait_timeout`, then establishes a fresh
    /// connection. A slot that cannot be acquired in time yields
    /// `CoreError::Timeout`.
    pub async fn checkout(&self, host: &HostSpec, wait_timeout: Duration) -> Result<PoolLease> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoreError::connection("Pool is shut down"));
        }

        let slots = self.slots_for(&host.name);

        let permit = match tokio::time::timeout(
            wait_timeout,
            slots.limit.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(CoreError::connection("Pool is shut down")),
            Err(_) => {
                debug!(host = %host.name, "checkout timed out waiting for a free slot");
                return Err(CoreError::Timeout(wait_timeout.as_millis() as u64));
            }
        };

        // Reuse the freshest idle connection that is still alive. The idle
        // lock is never held across an await.
        loop {
            let entry = slots
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop();
            let Some(mut entry) = entry else { break };

            let idle_for = entry.last_used.elapsed();
            if idle_for >= self.config.max_idle {
                debug!(host = %host.name, "discarding idle-expired connection");
                entry.transport.close().await;
                continue;
            }
            if idle_for >= self.config.health_check_after {
                if entry.transport.probe().await {
                    debug!(host = %host.name, "reusing probed connection");
                } else {
                    warn!(host = %host.name, "discarding unhealthy pooled connection");
                    continue;
                }
            }
            return Ok(PoolLease {
                host: host.name.clone(),
                transport: Some(entry.transport),
                slots: slots.clone(),
                _permit: permit,
            });
        }

        // No reusable connection: establish a fresh one. On failure the
        // permit drops with the error and the slot frees itself.
        let transport = self.connector.connect(host).await?;
        debug!(host = %host.name, "established fresh pooled connection");

        Ok(PoolLease {
            host: host.name.clone(),
            transport: Some(transport),
            slots,
            _permit: permit,
        })
    }

    /// Aggregate counters across all hosts
    pub fn stats(&self) -> PoolStats {
        let hosts: Vec<Arc<HostSlots>> = {
            let map = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
            map.values().cloned().collect()
        };

        let mut stats = PoolStats {
            hosts: hosts.len(),
            idle: 0,
            leased: 0,
        };
        for slots in hosts {
            stats.idle += slots
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len();
            stats.leased += self.config.max_per_host - slots.limit.available_permits();
        }
        stats
    }

    /// Shut the pool down: refuse new checkouts, wait for in-flight leases
    /// to drain (up to `grace`), then close every idle connection.
    pub async fn shutdown(&self, grace: Duration) {
        self.closed.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + grace;
        loop {
            if self.stats().leased == 0 {
                break;
            }
            if Instant::now() >= deadline {
                warn!("pool shutdown grace expired with leases still out");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let hosts: Vec<Arc<HostSlots>> = {
            let map = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
            map.values().cloned().collect()
        };
        for slots in hosts {
            let drained: Vec<IdleConn> = {
                let mut idle = slots.idle.lock().unwrap_or_else(PoisonError::into_inner);
                idle.drain(..).collect()
            };
            for mut entry in drained {
                entry.transport.close().await;
            }
        }

        info!("connection pool shut down");
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("stats", &stats)
            .finish_non_exhaustive()
    }
}

/// An exclusive lease on one pooled connection.
///
/// The slot is freed when the lease is released, discarded, or dropped;
/// the drop path discards the transport, so cancellation cannot orphan
/// pool accounting.
pub struct PoolLease {
    host: String,
    transport: Option<Box<dyn Transport>>,
    slots: Arc<HostSlots>,
    _permit: OwnedSemaphorePermit,
}

impl PoolLease {
    /// Run a command on the leased connection
    pub async fn exec(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        match self.transport.as_mut() {
            Some(transport) => transport.exec(command, timeout).await,
            None => Err(CoreError::connection("Lease already returned")),
        }
    }

    /// Return the connection to the pool's idle set
    pub async fn release(mut self) {
        if let Some(transport) = self.transport.take() {
            self.slots
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(IdleConn {
                    transport,
                    last_used: Instant::now(),
                });
            debug!(host = %self.host, "lease released to idle set");
        }
        // The permit drops here, freeing the slot.
    }

    /// Close and drop the connection instead of returning it
    pub async fn discard(mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
            debug!(host = %self.host, "leased connection discarded");
        }
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        if self.transport.is_some() {
            // Dropped mid-flight (cancellation or panic): the transport goes
            // down with the lease and the permit frees the slot.
            debug!(host = %self.host, "lease dropped without release; discarding transport");
        }
    }
}
