//! Credential store
//!
//! Encrypts, resolves, and deletes the secrets the executor needs to reach
//! monitored hosts. Every secret is scoped either globally or to a single
//! host; a host-specific entry always shadows the global entry of the same
//! kind. Resolution is a pure two-step lookup with no side effects.
//!
//! Plaintext secrets exist only in memory, wrapped in [`Zeroizing`], and are
//! never written to logs or disk.

pub mod crypto;

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::db::Database;
use crate::error::{CoreError, Result};

pub use crypto::Cipher;

/// The kinds of secret the platform stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// API token for a control-plane collaborator (consumed outside this core)
    ControlPlaneToken,
    /// OpenSSH private key content used for SSH authentication
    PrivateKey,
    /// Password piped to `sudo -S` for privilege escalation
    SudoPassword,
    /// Login password used for SSH password authentication
    LoginPassword,
}

impl CredentialKind {
    /// All kinds, in status-report order
    pub const ALL: [CredentialKind; 4] = [
        CredentialKind::ControlPlaneToken,
        CredentialKind::PrivateKey,
        CredentialKind::SudoPassword,
        CredentialKind::LoginPassword,
    ];

    /// Stable identifier used as the database key
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::ControlPlaneToken => "control_plane_token",
            CredentialKind::PrivateKey => "private_key",
            CredentialKind::SudoPassword => "sudo_password",
            CredentialKind::LoginPassword => "login_password",
        }
    }
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a credential applies to one host or to all hosts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialScope {
    /// Default for every host without a more specific entry
    Global,
    /// Applies to the named host only, shadowing any global entry
    Host(String),
}

impl CredentialScope {
    fn host_column(&self) -> &str {
        match self {
            CredentialScope::Global => "",
            CredentialScope::Host(host) => host,
        }
    }
}

/// Per-kind configuration state reported to the orchestrator
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub kind: CredentialKind,
    pub configured: bool,
    /// Scope of the effective entry, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<&'static str>,
}

/// Encrypted credential storage
pub struct CredentialStore {
    db: Arc<Database>,
    cipher: Option<Cipher>,
}

impl CredentialStore {
    /// Create a store over the shared database.
    ///
    /// Without a master key the store can report status and delete entries
    /// but refuses to store or resolve secrets.
    pub fn new(db: Arc<Database>, master_key: Option<&[u8]>) -> Result<Self> {
        let cipher = match master_key {
            Some(key) => Some(Cipher::new(key)?),
            None => None,
        };
        Ok(Self { db, cipher })
    }

    fn cipher(&self) -> Result<&Cipher> {
        self.cipher
            .as_ref()
            .ok_or_else(|| CoreError::configuration("No master key configured"))
    }

    /// Encrypt and store a secret, replacing any existing entry of the same
    /// (kind, scope). Returns the entry's id.
    pub fn store(
        &self,
        kind: CredentialKind,
        scope: &CredentialScope,
        plaintext: &str,
    ) -> Result<Uuid> {
        if plaintext.is_empty() {
            return Err(CoreError::invalid_params("Credential value must not be empty"));
        }
        let (nonce, ciphertext) = self.cipher()?.seal(plaintext.as_bytes())?;

        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let host = scope.host_column().to_string();
        let kind_str = kind.as_str();

        let stored_id: String = self.db.with(|conn| {
            conn.execute(
                "INSERT INTO credentials (id, kind, host, nonce, ciphertext, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(kind, host) DO UPDATE SET
                     nonce = excluded.nonce,
                     ciphertext = excluded.ciphertext,
                     updated_at = excluded.updated_at",
                params![id.to_string(), kind_str, host, nonce.as_slice(), ciphertext, now],
            )?;
            conn.query_row(
                "SELECT id FROM credentials WHERE kind = ?1 AND host = ?2",
                params![kind_str, host],
                |row| row.get(0),
            )
        })?;

        debug!(kind = kind_str, host = %host, "stored credential");
        Uuid::parse_str(&stored_id)
            .map_err(|_| CoreError::configuration("Malformed credential record: bad id"))
    }

    /// Resolve the effective secret for a (kind, host) pair.
    ///
    /// Checks the host-specific entry first and falls back to the global
    /// entry; returns `None` when neither exists.
    pub fn resolve(&self, kind: CredentialKind, host: &str) -> Result<Option<Zeroizing<String>>> {
        let record = match self.fetch(kind, host)? {
            Some(record) => record,
            None => match self.fetch(kind, "")? {
                Some(record) => record,
                None => return Ok(None),
            },
        };

        let (nonce, ciphertext) = record;
        let plaintext = self.cipher()?.open(&nonce, &ciphertext)?;
        let secret = String::from_utf8(plaintext.to_vec())
            .map_err(|_| CoreError::configuration("Malformed credential record: not UTF-8"))?;
        Ok(Some(Zeroizing::new(secret)))
    }

    fn fetch(&self, kind: CredentialKind, host: &str) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.db.with(|conn| {
            conn.query_row(
                "SELECT nonce, ciphertext FROM credentials WHERE kind = ?1 AND host = ?2",
                params![kind.as_str(), host],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        })
    }

    /// Delete a credential. Idempotent: deleting an absent entry reports
    /// not-found (`false`) rather than raising.
    pub fn delete(&self, kind: CredentialKind, scope: &CredentialScope) -> Result<bool> {
        let removed = self.db.with(|conn| {
            conn.execute(
                "DELETE FROM credentials WHERE kind = ?1 AND host = ?2",
                params![kind.as_str(), scope.host_column()],
            )
        })?;
        if removed == 0 {
            debug!(kind = kind.as_str(), "delete: credential not found");
        }
        Ok(removed > 0)
    }

    /// Report, per kind, whether a usable credential exists for `host` and
    /// at which scope the effective entry lives.
    pub fn status(&self, host: &str) -> Result<Vec<CredentialStatus>> {
        CredentialKind::ALL
            .iter()
            .map(|&kind| {
                let host_specific = self.fetch(kind, host)?.is_some();
                let global = self.fetch(kind, "")?.is_some();
                let scope = if host_specific {
                    Some("host")
                } else if global {
                    Some("global")
                } else {
                    None
                };
                Ok(CredentialStatus {
                    kind,
                    configured: host_specific || global,
                    scope,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("encryption_configured", &self.cipher.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        CredentialStore::new(db, Some(b"test-master-key")).unwrap()
    }

    #[test]
    fn test_host_specific_shadows_global() {
        let store = store();

        store
            .store(CredentialKind::SudoPassword, &CredentialScope::Global, "g")
            .unwrap();
        assert_eq!(
            store
                .resolve(CredentialKind::SudoPassword, "host-a")
                .unwrap()
                .unwrap()
                .as_str(),
            "g"
        );

        store
            .store(
                CredentialKind::SudoPassword,
                &CredentialScope::Host("host-a".to_string()),
                "h",
            )
            .unwrap();
        assert_eq!(
            store
                .resolve(CredentialKind::SudoPassword, "host-a")
                .unwrap()
                .unwrap()
                .as_str(),
            "h"
        );
        assert_eq!(
            store
                .resolve(CredentialKind::SudoPassword, "host-b")
                .unwrap()
                .unwrap()
                .as_str(),
            "g"
        );
    }

    #[test]
    fn test_resolve_missing_returns_none() {
        let store = store();
        assert!(store
            .resolve(CredentialKind::PrivateKey, "host-a")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_store_replaces_same_scope_and_keeps_id() {
        let store = store();
        let scope = CredentialScope::Host("host-a".to_string());

        let first = store
            .store(CredentialKind::LoginPassword, &scope, "one")
            .unwrap();
        let second = store
            .store(CredentialKind::LoginPassword, &scope, "two")
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            store
                .resolve(CredentialKind::LoginPassword, "host-a")
                .unwrap()
                .unwrap()
                .as_str(),
            "two"
        );
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = store();
        let scope = CredentialScope::Global;

        assert!(!store.delete(CredentialKind::SudoPassword, &scope).unwrap());

        store
            .store(CredentialKind::SudoPassword, &scope, "secret")
            .unwrap();
        assert!(store.delete(CredentialKind::SudoPassword, &scope).unwrap());
        assert!(!store.delete(CredentialKind::SudoPassword, &scope).unwrap());

        assert!(store
            .resolve(CredentialKind::SudoPassword, "host-a")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_store_requires_master_key() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = CredentialStore::new(db, None).unwrap();

        let err = store
            .store(CredentialKind::SudoPassword, &CredentialScope::Global, "x")
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn test_store_rejects_empty_value() {
        let store = store();
        assert!(store
            .store(CredentialKind::SudoPassword, &CredentialScope::Global, "")
            .is_err());
    }

    #[test]
    fn test_status_reports_effective_scope() {
        let store = store();

        store
            .store(CredentialKind::PrivateKey, &CredentialScope::Global, "key")
            .unwrap();
        store
            .store(
                CredentialKind::SudoPassword,
                &CredentialScope::Host("host-a".to_string()),
                "pw",
            )
            .unwrap();

        let status = store.status("host-a").unwrap();
        let by_kind = |kind: CredentialKind| {
            status
                .iter()
                .find(|s| s.kind == kind)
                .expect("status entry")
        };

        assert!(by_kind(CredentialKind::PrivateKey).configured);
        assert_eq!(by_kind(CredentialKind::PrivateKey).scope, Some("global"));
        assert_eq!(by_kind(CredentialKind::SudoPassword).scope, Some("host"));
        assert!(!by_kind(CredentialKind::LoginPassword).configured);
        assert_eq!(by_kind(CredentialKind::LoginPassword).scope, None);
    }

    #[test]
    fn test_status_serializes_for_orchestrator() {
        let store = store();
        store
            .store(CredentialKind::SudoPassword, &CredentialScope::Global, "pw")
            .unwrap();

        let status = store.status("host-a").unwrap();
        let json = serde_json::to_value(&status).unwrap();

        let sudo = json
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["kind"] == "sudo_password")
            .unwrap();
        assert_eq!(sudo["configured"], true);
        assert_eq!(sudo["scope"], "global");
    }
}
