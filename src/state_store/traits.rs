//! StateStore trait definition (spec §6 "StateStore capability")

use async_trait::async_trait;

use crate::mission::process::ProcessRecord;

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type StateStoreResult<T> = Result<T, StateStoreError>;

/// Persists process records; clears stale records on boot (spec §2, §6).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert a freshly admitted process record.
    async fn store_new_process(&self, record: &ProcessRecord) -> StateStoreResult<()>;

    /// Upsert the status fields of an existing process record.
    async fn update_process_status(&self, record: &ProcessRecord) -> StateStoreResult<()>;

    /// Mark any record still in a non-terminal state from a prior run as
    /// abandoned. Returns the number of records touched. Called once at
    /// startup (spec §4.5 "Boot sequence").
    async fn cleanup_dangling(&self) -> StateStoreResult<u64>;
}
