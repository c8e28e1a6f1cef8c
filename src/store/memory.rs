use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{ImportLogStore, JobStore};
use crate::db::models::{ImportLogRow, JobRow};
use crate::error::StoreError;
use crate::import::models::{JobRecord, NewImportLog, UpsertOutcome};

/// In-process store backing both traits; used for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<String, JobRow>>,
    logs: Mutex<Vec<ImportLogRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn upsert(&self, record: &JobRecord) -> Result<UpsertOutcome, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let now = Utc::now();
        let next_id = i64::try_from(jobs.len()).unwrap_or(i64::MAX) + 1;

        match jobs.get_mut(&record.identity) {
            Some(row) => {
                row.title.clone_from(&record.title);
                row.company.clone_from(&record.company);
                row.location.clone_from(&record.location);
                row.description.clone_from(&record.description);
                row.link.clone_from(&record.link);
                row.published = record.published;
                row.updated_at = now;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                jobs.insert(
                    record.identity.clone(),
                    JobRow {
                        id: next_id,
                        identity: record.identity.clone(),
                        title: record.title.clone(),
                        company: record.company.clone(),
                        location: record.location.clone(),
                        description: record.description.clone(),
                        link: record.link.clone(),
                        published: record.published,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn find_by_identity(&self, identity: &str) -> Result<Option<JobRow>, StoreError> {
        Ok(self.jobs.lock().await.get(identity).cloned())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(i64::try_from(self.jobs.lock().await.len()).unwrap_or(i64::MAX))
    }
}

#[async_trait]
impl ImportLogStore for MemoryStore {
    async fn record(&self, log: &NewImportLog) -> Result<ImportLogRow, StoreError> {
        let mut logs = self.logs.lock().await;
        let row = ImportLogRow {
            id: i64::try_from(logs.len()).unwrap_or(i64::MAX) + 1,
            source_label: log.source_label.clone(),
            timestamp: log.timestamp,
            total_processed: log.total_processed,
            new_count: log.new_count,
            updated_count: log.updated_count,
            failed_count: log.failed_count,
            failure_reasons: log.failure_reasons.clone(),
        };
        logs.push(row.clone());
        Ok(row)
    }

    async fn list_recent(&self, limit: Option<usize>) -> Result<Vec<ImportLogRow>, StoreError> {
        let mut logs = self.logs.lock().await.clone();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            logs.truncate(limit);
        }
        Ok(logs)
    }
}
