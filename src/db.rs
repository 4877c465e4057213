//! Database layer
//!
//! SQLite-based persistence shared by the credential store, the host trust
//! registry, and the audit log. Connections survive process restarts; the
//! connection pool deliberately does not live here.
//!
//! WAL mode keeps readers from blocking the executor's audit writes, and
//! `busy_timeout` covers the brief contention between store lookups and
//! audit appends on the single shared connection.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::{CoreError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS credentials (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    host        TEXT NOT NULL DEFAULT '',
    nonce       BLOB NOT NULL,
    ciphertext  BLOB NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE(kind, host)
);

CREATE TABLE IF NOT EXISTS host_keys (
    host        TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL,
    accepted_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id          TEXT PRIMARY KEY,
    host        TEXT NOT NULL,
    command     TEXT NOT NULL,
    actor       TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    outcome     TEXT NOT NULL,
    error_kind  TEXT,
    exit_code   INTEGER
);
CREATE INDEX IF NOT EXISTS idx_audit_host_time
    ON audit_log(host, started_at);
";

/// Shared handle to the core's SQLite database.
///
/// All durable state lives in one file so a single operator backup captures
/// credentials, pinned host keys, and the audit trail together.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (creating if necessary) the database at `path` and run migrations
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000; PRAGMA secure_delete=ON;",
        )?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.with(|conn| conn.execute_batch(SCHEMA))
    }

    /// Run a closure against the underlying connection.
    ///
    /// The lock is held only for the duration of the closure; callers must
    /// not block inside it.
    pub(crate) fn with<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::configuration("Database lock poisoned"))?;
        f(&conn).map_err(CoreError::Storage)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_runs_migrations() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .with(|conn| {
                let mut stmt =
                    conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .unwrap();

        assert!(tables.contains(&"credentials".to_string()));
        assert!(tables.contains(&"host_keys".to_string()));
        assert!(tables.contains(&"audit_log".to_string()));
    }

    #[test]
    fn test_open_on_disk_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.db");

        {
            let db = Database::open(&path).unwrap();
            db.with(|conn| {
                conn.execute(
                    "INSERT INTO host_keys (host, fingerprint, accepted_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params!["host-a", "SHA256:abc", "2026-01-01T00:00:00Z"],
                )
            })
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let fp: String = db
            .with(|conn| {
                conn.query_row(
                    "SELECT fingerprint FROM host_keys WHERE host = ?1",
                    ["host-a"],
                    |row| row.get(0),
                )
            })
            .unwrap();
        assert_eq!(fp, "SHA256:abc");
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db.migrate().unwrap();
    }
}
