//! Host trust registry
//!
//! Trust-on-first-use pinning of remote host identity. The first contact
//! with a host records the presented fingerprint and accepts it; every later
//! contact must present the same fingerprint or the connection is refused
//! with [`CoreError::HostKeyMismatch`] before any command is sent.
//!
//! Re-trusting after a mismatch requires the explicit operator action
//! [`HostTrustRegistry::forget`]; a differing fingerprint is never silently
//! re-accepted.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::db::Database;
use crate::error::{CoreError, Result};

/// Outcome of a successful fingerprint check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    /// First contact: the fingerprint was pinned just now
    Established,
    /// The presented fingerprint matches the pinned one
    Verified,
}

/// A pinned host identity
#[derive(Debug, Clone, Serialize)]
pub struct PinnedKey {
    pub host: String,
    pub fingerprint: String,
    pub accepted_at: DateTime<Utc>,
}

/// Durable registry of pinned host fingerprints
pub struct HostTrustRegistry {
    db: Arc<Database>,
    audit: Arc<AuditLog>,
}

impl HostTrustRegistry {
    pub fn new(db: Arc<Database>, audit: Arc<AuditLog>) -> Self {
        Self { db, audit }
    }

    /// Check a presented fingerprint against the pinned one for `host`.
    ///
    /// Pins and accepts on first contact (emitting a trust-established audit
    /// event); refuses with `HostKeyMismatch` when the fingerprint differs
    /// from the pinned one.
    pub fn verify(&self, host: &str, fingerprint: &str) -> Result<TrustDecision> {
        let pinned: Option<String> = self.db.with(|conn| {
            let existing = conn
                .query_row(
                    "SELECT fingerprint FROM host_keys WHERE host = ?1",
                    [host],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_none() {
                conn.execute(
                    "INSERT INTO host_keys (host, fingerprint, accepted_at) VALUES (?1, ?2, ?3)",
                    params![
                        host,
                        fingerprint,
                        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
                    ],
                )?;
            }
            Ok(existing)
        })?;

        match pinned {
            None => {
                info!(host, fingerprint, "trust established on first contact");
                self.audit.append_trust_established(host)?;
                Ok(TrustDecision::Established)
            }
            Some(pinned) if pinned == fingerprint => Ok(TrustDecision::Verified),
            Some(pinned) => {
                warn!(host, pinned, presented = fingerprint, "host key mismatch");
                Err(CoreError::HostKeyMismatch {
                    host: host.to_string(),
                    pinned,
                    presented: fingerprint.to_string(),
                })
            }
        }
    }

    /// Look up the pinned key for `host`, if any
    pub fn lookup(&self, host: &str) -> Result<Option<PinnedKey>> {
        self.db.with(|conn| {
            conn.query_row(
                "SELECT host, fingerprint, accepted_at FROM host_keys WHERE host = ?1",
                [host],
                |row| {
                    Ok(PinnedKey {
                        host: row.get(0)?,
                        fingerprint: row.get(1)?,
                        accepted_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(2)?)
                            .map(|dt| dt.with_timezone(&Utc))
                            .unwrap_or_default(),
                    })
                },
            )
            .optional()
        })
    }

    /// Operator action: drop the pinned key for `host` so the next contact
    /// re-establishes trust. Returns whether a key was pinned.
    pub fn forget(&self, host: &str) -> Result<bool> {
        let removed = self
            .db
            .with(|conn| conn.execute("DELETE FROM host_keys WHERE host = ?1", [host]))?;
        if removed > 0 {
            info!(host, "pinned host key forgotten by operator");
        }
        Ok(removed > 0)
    }
}

impl std::fmt::Debug for HostTrustRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostTrustRegistry").finish_non_exhaustive()
    }
}
