use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::info;

use crate::error::{Result, StoreError};

/// How long a writer waits on a lock held by another process before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Current wall-clock time as Unix epoch seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Cheap-clone handle to the single SQLite database backing every
/// access-control component.
///
/// Components never cache rows: each decision re-reads the authoritative
/// state through this handle, so a restart or a second process sharing the
/// file never sees stale counters.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database file and run the idempotent schema setup.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!(path = %path.display(), "opening SQLite database");

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        init_db(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Private, non-durable store. Used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run read-only or single-statement work against the connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.lock()?;
        Ok(f(&conn)?)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken up front, so a check-then-write sequence inside
    /// `f` cannot interleave with another writer on the same file. The
    /// transaction rolls back if `f` fails.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Initialise all access-control tables. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    create_rate_events_table(conn)?;
    create_failed_attempts_table(conn)?;
    create_command_history_table(conn)?;
    create_api_cache_table(conn)?;
    Ok(())
}

fn create_rate_events_table(conn: &Connection) -> rusqlite::Result<()> {
    // Surrogate key: two commands from one chat within the same second are
    // two distinct events.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS rate_events (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id      INTEGER NOT NULL,
            command_time INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_rate_events_chat_time
            ON rate_events(chat_id, command_time);
        CREATE INDEX IF NOT EXISTS idx_rate_events_time
            ON rate_events(command_time);",
    )
}

fn create_failed_attempts_table(conn: &Connection) -> rusqlite::Result<()> {
    // banned_until = 0 means not banned.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS failed_attempts (
            chat_id      INTEGER PRIMARY KEY NOT NULL,
            attempts     INTEGER NOT NULL DEFAULT 0,
            last_attempt INTEGER NOT NULL DEFAULT 0,
            last_reason  TEXT,
            banned_until INTEGER NOT NULL DEFAULT 0
        );",
    )
}

fn create_command_history_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS command_history (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id      INTEGER NOT NULL,
            username     TEXT NOT NULL,
            command      TEXT NOT NULL,
            timestamp    INTEGER NOT NULL,
            success      INTEGER NOT NULL,
            execution_ms REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_command_history_time
            ON command_history(timestamp);",
    )
}

fn create_api_cache_table(conn: &Connection) -> rusqlite::Result<()> {
    // endpoint keeps the raw path so writes can bust related reads; the key
    // itself is a digest and carries no structure.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS api_cache (
            cache_key  TEXT PRIMARY KEY NOT NULL,
            endpoint   TEXT NOT NULL,
            data       TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_api_cache_expires
            ON api_cache(expires_at);",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.with_conn(init_db).unwrap();
        let tables: i64 = store
            .with_conn(|c| {
                c.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                     AND name IN ('rate_events','failed_attempts','command_history','api_cache')",
                    [],
                    |r| r.get(0),
                )
            })
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        let res: Result<()> = store.transaction(|tx| {
            tx.execute(
                "INSERT INTO rate_events (chat_id, command_time) VALUES (1, 100)",
                [],
            )?;
            Err(rusqlite::Error::QueryReturnedNoRows)
        });
        assert!(res.is_err());
        let count: i64 = store
            .with_conn(|c| c.query_row("SELECT COUNT(*) FROM rate_events", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("netwarden.db");
        {
            let store = Store::open(&path).unwrap();
            store
                .with_conn(|c| {
                    c.execute(
                        "INSERT INTO failed_attempts (chat_id, attempts, last_attempt, banned_until)
                         VALUES (7, 3, 10, 0)",
                        [],
                    )
                })
                .unwrap();
        }
        let store = Store::open(&path).unwrap();
        let attempts: i64 = store
            .with_conn(|c| {
                c.query_row(
                    "SELECT attempts FROM failed_attempts WHERE chat_id = 7",
                    [],
                    |r| r.get(0),
                )
            })
            .unwrap();
        assert_eq!(attempts, 3);
    }
}
