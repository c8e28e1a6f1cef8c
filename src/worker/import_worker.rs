use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::db::models::ImportLogRow;
use crate::error::{ItemFailure, StoreError};
use crate::feed::RawItem;
use crate::import::mapper::map_item;
use crate::import::models::{NewImportLog, QueuedTask, UpsertOutcome};
use crate::queue::{HandlerError, TaskHandler};
use crate::store::{ImportLogStore, JobStore};

/// Lifecycle of a worker between and during runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Summarizing,
}

/// Running totals for one batch.
///
/// `seen` holds every identity handled so far in this run; repeats are
/// skipped without touching any counter.
#[derive(Debug, Default)]
pub struct ImportStats {
    pub total_processed: i32,
    pub new_count: i32,
    pub updated_count: i32,
    pub failed_count: i32,
    pub failure_reasons: Vec<String>,
    seen: HashSet<String>,
}

impl ImportStats {
    /// Returns `false` if `identity` was already handled in this run.
    fn first_sighting(&mut self, identity: &str) -> bool {
        self.seen.insert(identity.to_string())
    }

    fn record_outcome(&mut self, outcome: UpsertOutcome) {
        self.total_processed += 1;
        match outcome {
            UpsertOutcome::Created => self.new_count += 1,
            UpsertOutcome::Updated => self.updated_count += 1,
        }
    }

    fn record_failure(&mut self, failure: &ItemFailure) {
        self.failed_count += 1;
        self.failure_reasons.push(failure.to_string());
    }

    fn into_log(self, source_label: &str) -> NewImportLog {
        NewImportLog {
            source_label: source_label.to_string(),
            timestamp: Utc::now(),
            total_processed: self.total_processed,
            new_count: self.new_count,
            updated_count: self.updated_count,
            failed_count: self.failed_count,
            failure_reasons: self.failure_reasons,
        }
    }
}

/// Consumes queued batches: maps, deduplicates and upserts every item, then
/// writes one import log per run.
pub struct ImportWorker {
    jobs: Arc<dyn JobStore>,
    logs: Arc<dyn ImportLogStore>,
    state: watch::Sender<WorkerState>,
}

impl ImportWorker {
    /// Create a new ImportWorker instance
    pub fn new(jobs: Arc<dyn JobStore>, logs: Arc<dyn ImportLogStore>) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        Self { jobs, logs, state }
    }

    pub fn state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Process one batch end to end.
    ///
    /// Per-item mapping and store failures are counted and never abort the
    /// batch. Items run strictly in order, one at a time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only if the closing import log cannot be
    /// written; the caller should treat the task as not done.
    pub async fn process(&self, task: &QueuedTask) -> Result<ImportLogRow, StoreError> {
        self.state.send_replace(WorkerState::Running);
        info!("Import started for source: {}", task.source_label);
        info!("Total items received from feed: {}", task.items.len());

        let mut stats = ImportStats::default();
        for item in &task.items {
            self.process_item(item, &mut stats).await;
        }

        self.state.send_replace(WorkerState::Summarizing);
        let log = stats.into_log(&task.source_label);
        let result = self.logs.record(&log).await;
        self.state.send_replace(WorkerState::Idle);

        let row = result?;
        info!("Import completed for {}", row.source_label);
        info!(
            "Summary: total={}, new={}, updated={}, failed={}",
            row.total_processed, row.new_count, row.updated_count, row.failed_count
        );
        Ok(row)
    }

    async fn process_item(&self, item: &RawItem, stats: &mut ImportStats) {
        let record = match map_item(item, Utc::now()) {
            Ok(record) => record,
            Err(e) => {
                let failure = ItemFailure::from(e);
                error!("Item failed: {}", failure);
                stats.record_failure(&failure);
                return;
            }
        };

        if !stats.first_sighting(&record.identity) {
            debug!("Duplicate skipped: {}", record.identity);
            return;
        }

        match self.jobs.upsert(&record).await {
            Ok(outcome) => {
                debug!("Upserted {} ({:?})", record.identity, outcome);
                stats.record_outcome(outcome);
            }
            Err(e) => {
                let failure = ItemFailure::from(e);
                error!("Item {} failed: {}", record.identity, failure);
                stats.record_failure(&failure);
            }
        }
    }
}

#[async_trait]
impl TaskHandler for ImportWorker {
    async fn handle(&self, task: &QueuedTask) -> Result<(), HandlerError> {
        self.process(task).await?;
        Ok(())
    }
}
