//! Audit log
//!
//! Append-only record of every execution attempt and outcome, plus
//! trust-establishment events. No update or delete surface exists; the
//! orchestrator reads it through range queries by host and time.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use serde::Serialize;
use uuid::Uuid;

use crate::db::Database;
use crate::error::Result;

/// Terminal outcome recorded for an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Command ran and exited zero
    Succeeded,
    /// Command ran and exited non-zero, or the channel failed terminally
    Failed,
    /// Connect or execute deadline expired
    TimedOut,
    /// Connection refused before any command was sent (host key mismatch)
    Rejected,
    /// First contact with a host pinned its fingerprint
    TrustEstablished,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Succeeded => "succeeded",
            AuditOutcome::Failed => "failed",
            AuditOutcome::TimedOut => "timed_out",
            AuditOutcome::Rejected => "rejected",
            AuditOutcome::TrustEstablished => "trust_established",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(AuditOutcome::Succeeded),
            "failed" => Some(AuditOutcome::Failed),
            "timed_out" => Some(AuditOutcome::TimedOut),
            "rejected" => Some(AuditOutcome::Rejected),
            "trust_established" => Some(AuditOutcome::TrustEstablished),
            _ => None,
        }
    }
}

/// One immutable audit entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub host: String,
    /// Rendered command text. Escalation wrapping is applied after audit
    /// capture, so the sudo secret never appears here.
    pub command: String,
    pub actor: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: AuditOutcome,
    pub error_kind: Option<String>,
    pub exit_code: Option<i64>,
}

/// Append-only audit store
pub struct AuditLog {
    db: Arc<Database>,
}

impl AuditLog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one record. There is deliberately no update or delete
    /// counterpart.
    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO audit_log
                     (id, host, command, actor, started_at, finished_at, outcome, error_kind, exit_code)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id.to_string(),
                    record.host,
                    record.command,
                    record.actor,
                    fmt_time(&record.started_at),
                    fmt_time(&record.finished_at),
                    record.outcome.as_str(),
                    record.error_kind,
                    record.exit_code,
                ],
            )
        })?;
        Ok(())
    }

    /// Append a trust-establishment event for `host`
    pub fn append_trust_established(&self, host: &str) -> Result<()> {
        let now = Utc::now();
        self.append(&AuditRecord {
            id: Uuid::new_v4(),
            host: host.to_string(),
            command: String::new(),
            actor: "system".to_string(),
            started_at: now,
            finished_at: now,
            outcome: AuditOutcome::TrustEstablished,
            error_kind: None,
            exit_code: None,
        })
    }

    /// Query records, optionally filtered by host and start-time range,
    /// ordered by start time.
    pub fn query(
        &self,
        host: Option<&str>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditRecord>> {
        let mut sql = String::from(
            "SELECT id, host, command, actor, started_at, finished_at, outcome, error_kind, exit_code
             FROM audit_log WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(host) = host {
            sql.push_str(" AND host = ?");
            args.push(Box::new(host.to_string()));
        }
        if let Some(since) = since {
            sql.push_str(" AND started_at >= ?");
            args.push(Box::new(fmt_time(&since)));
        }
        if let Some(until) = until {
            sql.push_str(" AND started_at <= ?");
            args.push(Box::new(fmt_time(&until)));
        }
        sql.push_str(" ORDER BY started_at");

        self.db.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
                row_to_record,
            )?;
            rows.collect()
        })
    }
}

fn fmt_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRecord> {
    Ok(AuditRecord {
        id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_default(),
        host: row.get(1)?,
        command: row.get(2)?,
        actor: row.get(3)?,
        started_at: parse_time(&row.get::<_, String>(4)?),
        finished_at: parse_time(&row.get::<_, String>(5)?),
        outcome: AuditOutcome::parse(&row.get::<_, String>(6)?).unwrap_or(AuditOutcome::Failed),
        error_kind: row.get(7)?,
        exit_code: row.get(8)?,
    })
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}
