//! Persistence seams for job records and import logs.

use async_trait::async_trait;

use crate::db::models::{ImportLogRow, JobRow};
use crate::error::StoreError;
use crate::import::models::{JobRecord, NewImportLog, UpsertOutcome};

pub mod memory;

pub use memory::MemoryStore;

/// Identity-keyed job storage.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert the record if its identity is new, otherwise overwrite the
    /// stored record's mutable fields. Refreshes `updated_at` either way.
    async fn upsert(&self, record: &JobRecord) -> Result<UpsertOutcome, StoreError>;

    async fn find_by_identity(&self, identity: &str) -> Result<Option<JobRow>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;
}

/// Append-only audit log of worker runs.
#[async_trait]
pub trait ImportLogStore: Send + Sync {
    async fn record(&self, log: &NewImportLog) -> Result<ImportLogRow, StoreError>;

    /// Import logs newest first, at most `limit` of them when given.
    async fn list_recent(&self, limit: Option<usize>) -> Result<Vec<ImportLogRow>, StoreError>;
}
