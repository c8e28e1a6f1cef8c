use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::db::import_log_repository::ImportLogRepository;
use crate::db::job_repository::JobRepository;
use crate::db::models::{ImportLogRow, JobRow};
use crate::error::StoreError;
use crate::import::models::{JobRecord, NewImportLog, UpsertOutcome};
use crate::store::{ImportLogStore, JobStore};

/// Postgres-backed job and import log store
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn upsert(&self, record: &JobRecord) -> Result<UpsertOutcome, StoreError> {
        Ok(JobRepository::upsert(&self.pool, record).await?)
    }

    async fn find_by_identity(&self, identity: &str) -> Result<Option<JobRow>, StoreError> {
        Ok(JobRepository::find_by_identity(&self.pool, identity).await?)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(JobRepository::count(&self.pool).await?)
    }
}

#[async_trait]
impl ImportLogStore for PgStore {
    async fn record(&self, log: &NewImportLog) -> Result<ImportLogRow, StoreError> {
        Ok(ImportLogRepository::create(&self.pool, log).await?)
    }

    async fn list_recent(&self, limit: Option<usize>) -> Result<Vec<ImportLogRow>, StoreError> {
        let limit = limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX));
        Ok(ImportLogRepository::list_recent(&self.pool, limit).await?)
    }
}
