//! `rusqlite`-backed StateStore adapter
//!
//! Grounded on the teacher's `database/mod.rs` (`Database::open`/
//! `open_in_memory`, WAL mode, `Mutex<Connection>`) and `database/state.rs`'s
//! `INSERT OR REPLACE` pattern, adapted to a single `processes` table.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::mission::process::{ProcessRecord, ProcessStatus};

use super::traits::{StateStore, StateStoreError, StateStoreResult};

pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    pub fn open(path: impl AsRef<Path>) -> StateStoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_tables(&conn)?;

        info!(path = %path.display(), "state store opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> StateStoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_tables(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_tables(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS processes (
                id TEXT PRIMARY KEY,
                issuer_id TEXT NOT NULL,
                group_id TEXT NOT NULL,
                operation_id TEXT NOT NULL,
                image TEXT NOT NULL,
                mission_payload TEXT NOT NULL,
                status TEXT NOT NULL,
                status_message TEXT,
                error_code INTEGER,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_processes_operation
                ON processes(operation_id);
            "#,
        )
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ProcessRecord> {
        let id: String = row.get(0)?;
        let status: String = row.get(6)?;
        let mission_payload: String = row.get(5)?;
        Ok(ProcessRecord {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            issuer_id: row.get(1)?,
            group_id: row.get(2)?,
            operation_id: row.get(3)?,
            image: row.get(4)?,
            mission_payload: serde_json::from_str(&mission_payload).unwrap_or(serde_json::Value::Null),
            status: status_from_str(&status),
            status_message: row.get(7)?,
            error_code: row.get(8)?,
            created_at: row.get::<_, i64>(9)? as u64,
        })
    }
}

#[cfg(test)]
impl SqliteStateStore {
    /// Test-only projection reader: fetches the full record persisted for
    /// `id`, the detail the StateStore carries beyond `processes_info()`'s
    /// bare state name (spec §7).
    pub(crate) async fn fetch_for_test(&self, id: Uuid) -> ProcessRecord {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT * FROM processes WHERE id = ?1", [id.to_string()], |row| {
            Self::row_to_record(row)
        })
        .expect("record persisted")
    }
}

fn status_from_str(s: &str) -> ProcessStatus {
    match s {
        "RUNNING" => ProcessStatus::Running,
        "TERMINATED" => ProcessStatus::Terminated,
        "ERROR" => ProcessStatus::Error,
        "HALTED" => ProcessStatus::Halted,
        _ => ProcessStatus::Created,
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn store_new_process(&self, record: &ProcessRecord) -> StateStoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO processes
                (id, issuer_id, group_id, operation_id, image, mission_payload,
                 status, status_message, error_code, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            rusqlite::params![
                record.id.to_string(),
                record.issuer_id,
                record.group_id,
                record.operation_id,
                record.image,
                serde_json::to_string(&record.mission_payload)
                    .map_err(|e| StateStoreError::Other(e.to_string()))?,
                record.status.as_str(),
                record.status_message,
                record.error_code,
                record.created_at as i64,
            ],
        )?;
        Ok(())
    }

    async fn update_process_status(&self, record: &ProcessRecord) -> StateStoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            UPDATE processes
            SET status = ?2, status_message = ?3, error_code = ?4
            WHERE id = ?1
            "#,
            rusqlite::params![
                record.id.to_string(),
                record.status.as_str(),
                record.status_message,
                record.error_code,
            ],
        )?;
        Ok(())
    }

    async fn cleanup_dangling(&self) -> StateStoreResult<u64> {
        let conn = self.conn.lock().await;
        let touched = conn.execute(
            r#"
            UPDATE processes
            SET status = 'ERROR', status_message = 'abandoned: orchestrator restarted', error_code = ?1
            WHERE status NOT IN ('TERMINATED', 'ERROR', 'HALTED')
            "#,
            rusqlite::params![crate::mission::exit_code::UNDEFINED_ERROR],
        )?;
        Ok(touched as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record(status: ProcessStatus) -> ProcessRecord {
        ProcessRecord {
            id: Uuid::new_v4(),
            issuer_id: "issuer-1".into(),
            group_id: "group-1".into(),
            operation_id: "op-1".into(),
            image: "sim:ok".into(),
            mission_payload: json!({"a": 1}),
            status,
            status_message: None,
            error_code: None,
            created_at: 1000,
        }
    }

    #[tokio::test]
    async fn store_then_update_round_trips() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let record = sample_record(ProcessStatus::Created);
        store.store_new_process(&record).await.unwrap();

        let mut updated = record.clone();
        updated.status = ProcessStatus::Terminated;
        store.update_process_status(&updated).await.unwrap();

        let conn = store.conn.lock().await;
        let fetched: ProcessRecord = conn
            .query_row("SELECT * FROM processes WHERE id = ?1", [record.id.to_string()], |row| {
                SqliteStateStore::row_to_record(row)
            })
            .unwrap();
        assert_eq!(fetched.status, ProcessStatus::Terminated);
        assert_eq!(fetched.operation_id, "op-1");
    }

    #[tokio::test]
    async fn cleanup_dangling_marks_non_terminal_as_error() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store.store_new_process(&sample_record(ProcessStatus::Running)).await.unwrap();
        store.store_new_process(&sample_record(ProcessStatus::Terminated)).await.unwrap();

        let touched = store.cleanup_dangling().await.unwrap();
        assert_eq!(touched, 1);
    }
}
