//! `SQLite`-backed implementation of [`HistoryStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::Connection;
use sluice_types::state::{ExecId, RunStats, RunStatus, StreamName};

use crate::backend::HistoryStore;
use crate::error::{self, StateError};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for the history table.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS task_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    exec_id TEXT NOT NULL,
    stream TEXT NOT NULL,
    status TEXT NOT NULL,
    config_json TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    rows INTEGER DEFAULT 0,
    bytes_in INTEGER DEFAULT 0,
    bytes_out INTEGER DEFAULT 0,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_task_runs_exec ON task_runs (exec_id);
";

/// `SQLite`-backed run history.
///
/// Create with [`SqliteHistoryStore::open`] for file-backed persistence
/// or [`SqliteHistoryStore::in_memory`] for tests.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Open or create a history database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory history store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Sqlite`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    fn now_sqlite() -> String {
        Utc::now().format(SQLITE_DATETIME_FMT).to_string()
    }

    /// Number of recorded executions for `exec_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on storage failure.
    pub fn count_runs(&self, exec_id: &ExecId) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM task_runs WHERE exec_id = ?1",
            [exec_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    #[cfg(test)]
    fn get_run_row(
        &self,
        run_id: i64,
    ) -> error::Result<(String, i64, Option<String>, Option<String>)> {
        let conn = self.lock_conn()?;
        let row = conn.query_row(
            "SELECT status, rows, finished_at, error_message FROM task_runs WHERE id = ?1",
            [run_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        Ok(row)
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn start_run(
        &self,
        exec_id: &ExecId,
        stream: &StreamName,
        config_json: &str,
    ) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO task_runs (exec_id, stream, status, config_json, started_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                exec_id.as_str(),
                stream.as_str(),
                RunStatus::Running.as_str(),
                config_json,
                Self::now_sqlite(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE task_runs SET status = ?1, finished_at = ?2, \
             rows = ?3, bytes_in = ?4, bytes_out = ?5, error_message = ?6 \
             WHERE id = ?7",
            rusqlite::params![
                status.as_str(),
                Self::now_sqlite(),
                stats.rows as i64,
                stats.bytes_in as i64,
                stats.bytes_out as i64,
                stats.error_message,
                run_id,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(id: &str) -> ExecId {
        ExecId::new(id)
    }

    fn stream(name: &str) -> StreamName {
        StreamName::new(name)
    }

    #[test]
    fn run_lifecycle() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let run_id = store
            .start_run(&exec("e1"), &stream("public.users"), "{}")
            .unwrap();
        assert!(run_id > 0);

        store
            .complete_run(
                run_id,
                RunStatus::Success,
                &RunStats {
                    rows: 1000,
                    bytes_in: 50_000,
                    bytes_out: 48_000,
                    error_message: None,
                },
            )
            .unwrap();

        let (status, rows, finished, _error) = store.get_run_row(run_id).unwrap();
        assert_eq!(status, "success");
        assert_eq!(rows, 1000);
        assert!(finished.is_some());
    }

    #[test]
    fn run_failure_keeps_message() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let run_id = store.start_run(&exec("e1"), &stream("orders"), "{}").unwrap();

        store
            .complete_run(
                run_id,
                RunStatus::Failed,
                &RunStats {
                    rows: 50,
                    error_message: Some("connection reset".into()),
                    ..RunStats::default()
                },
            )
            .unwrap();

        let (status, _rows, _finished, error_msg) = store.get_run_row(run_id).unwrap();
        assert_eq!(status, "failed");
        assert_eq!(error_msg, Some("connection reset".into()));
    }

    #[test]
    fn runs_are_grouped_by_exec_id() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let first = store.start_run(&exec("e1"), &stream("a"), "{}").unwrap();
        let second = store.start_run(&exec("e1"), &stream("b"), "{}").unwrap();
        store.start_run(&exec("e2"), &stream("a"), "{}").unwrap();
        assert!(second > first);
        assert_eq!(store.count_runs(&exec("e1")).unwrap(), 2);
        assert_eq!(store.count_runs(&exec("e2")).unwrap(), 1);
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/history.db");
        let store = SqliteHistoryStore::open(&path).unwrap();
        store.start_run(&exec("e1"), &stream("a"), "{}").unwrap();
        assert!(path.exists());
    }
}
