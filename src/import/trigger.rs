use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::models::QueuedTask;
use crate::error::{FeedError, QueueError};
use crate::feed::{self, FeedSource};
use crate::queue::{ImportQueue, TaskId};

/// A source that could not be turned into items during one trigger call.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("no feed URLs were given")]
    NoSources,

    #[error("all {} feed sources failed", .0.len())]
    AllSourcesFailed(Vec<SourceFailure>),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Acknowledgement returned to whoever fired the import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOutcome {
    pub task_id: TaskId,
    pub total_fetched: usize,
    pub queued_at: DateTime<Utc>,
    pub sources_succeeded: usize,
    pub failed_sources: Vec<SourceFailure>,
}

/// Fetches feed sources, concatenates their items and enqueues one batch.
pub struct ImportTrigger {
    source: Arc<dyn FeedSource>,
    queue: Arc<dyn ImportQueue>,
}

impl ImportTrigger {
    pub fn new(source: Arc<dyn FeedSource>, queue: Arc<dyn ImportQueue>) -> Self {
        Self { source, queue }
    }

    /// Fetch every URL in order and enqueue the combined items under
    /// `source_label`.
    ///
    /// A source that fails to fetch or parse is skipped; the call fails only
    /// when every source failed or the queue rejects the task.
    pub async fn trigger(
        &self,
        urls: &[String],
        source_label: &str,
    ) -> Result<TriggerOutcome, TriggerError> {
        if urls.is_empty() {
            return Err(TriggerError::NoSources);
        }

        let mut items = Vec::new();
        let mut failed_sources = Vec::new();

        for url in urls {
            match self.fetch_items(url).await {
                Ok(fetched) => {
                    info!("Fetched {} items from {}", fetched.len(), url);
                    items.extend(fetched);
                }
                Err(e) => {
                    warn!("Skipping feed source {}: {}", url, e);
                    failed_sources.push(SourceFailure {
                        url: url.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if failed_sources.len() == urls.len() {
            return Err(TriggerError::AllSourcesFailed(failed_sources));
        }

        let total_fetched = items.len();
        let task_id = self
            .queue
            .enqueue(QueuedTask {
                source_label: source_label.to_string(),
                items,
            })
            .await?;

        info!(
            "Queued task {} with {} items for source {}",
            task_id, total_fetched, source_label
        );

        Ok(TriggerOutcome {
            task_id,
            total_fetched,
            queued_at: Utc::now(),
            sources_succeeded: urls.len() - failed_sources.len(),
            failed_sources,
        })
    }

    async fn fetch_items(&self, url: &str) -> Result<Vec<feed::RawItem>, FeedError> {
        let body = self.source.fetch(url).await?;
        feed::normalize(&body)
    }
}
