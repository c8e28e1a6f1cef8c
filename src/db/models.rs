use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

use crate::feed::RawItem;

/// Database representation of a stored job posting
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobRow {
    pub id: i64,
    pub identity: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub link: String,
    pub published: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database representation of one worker run's summary
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportLogRow {
    pub id: i64,
    pub source_label: String,
    pub timestamp: DateTime<Utc>,
    pub total_processed: i32,
    pub new_count: i32,
    pub updated_count: i32,
    pub failed_count: i32,
    pub failure_reasons: Vec<String>,
}

/// A row of the `import_tasks` queue table
#[derive(Debug, FromRow)]
pub struct TaskRow {
    pub id: i64,
    pub source_label: String,
    pub items: Json<Vec<RawItem>>,
    pub attempts: i32,
}
