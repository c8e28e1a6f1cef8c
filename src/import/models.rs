use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::RawItem;

/// Canonical job posting produced by the mapper and handed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub identity: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub link: String,
    pub published: DateTime<Utc>,
}

/// Whether an upsert inserted a new row or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// One unit of work on the import queue: every item fetched by a single
/// trigger invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedTask {
    pub source_label: String,
    pub items: Vec<RawItem>,
}

/// Summary of one completed worker run, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImportLog {
    pub source_label: String,
    pub timestamp: DateTime<Utc>,
    pub total_processed: i32,
    pub new_count: i32,
    pub updated_count: i32,
    pub failed_count: i32,
    pub failure_reasons: Vec<String>,
}
