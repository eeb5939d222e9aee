use netwarden_core::ChatId;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::{unix_now, Store};
use crate::error::Result;

/// One executed (or rejected) command. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub chat_id: ChatId,
    pub display_name: String,
    pub command: String,
    /// Unix epoch seconds at which the command was received.
    pub timestamp: i64,
    pub success: bool,
    /// Wall time from receipt to completion.
    pub duration_ms: f64,
}

/// Operational counters for dashboards, computed from the live tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityStats {
    pub window_hours: u32,
    /// Audit records inside the window.
    pub commands: u64,
    /// Principals with at least one failure inside the window.
    pub failed_attempts: u64,
    /// Principals whose ban is active right now.
    pub banned_principals: u64,
}

impl Store {
    pub fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO command_history
                    (chat_id, username, command, timestamp, success, execution_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.chat_id.as_i64(),
                    record.display_name,
                    record.command,
                    record.timestamp,
                    record.success as i32,
                    record.duration_ms,
                ],
            )?;
            Ok(())
        })
    }

    pub fn stats(&self, window_hours: u32) -> Result<SecurityStats> {
        self.stats_at(window_hours, unix_now())
    }

    pub fn stats_at(&self, window_hours: u32, now: i64) -> Result<SecurityStats> {
        let since = now - i64::from(window_hours) * 3600;
        self.with_conn(|conn| {
            let commands: i64 = conn.query_row(
                "SELECT COUNT(*) FROM command_history WHERE timestamp > ?1",
                params![since],
                |r| r.get(0),
            )?;
            let failed_attempts: i64 = conn.query_row(
                "SELECT COUNT(*) FROM failed_attempts WHERE last_attempt > ?1",
                params![since],
                |r| r.get(0),
            )?;
            let banned_principals: i64 = conn.query_row(
                "SELECT COUNT(*) FROM failed_attempts WHERE banned_until > ?1",
                params![now],
                |r| r.get(0),
            )?;
            Ok(SecurityStats {
                window_hours,
                commands: commands as u64,
                failed_attempts: failed_attempts as u64,
                banned_principals: banned_principals as u64,
            })
        })
    }

    /// Newest audit records first.
    pub fn recent_audit(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT chat_id, username, command, timestamp, success, execution_ms
                 FROM command_history
                 ORDER BY id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok(AuditRecord {
                        chat_id: ChatId(row.get(0)?),
                        display_name: row.get(1)?,
                        command: row.get(2)?,
                        timestamp: row.get(3)?,
                        success: row.get::<_, i32>(4)? != 0,
                        duration_ms: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}
