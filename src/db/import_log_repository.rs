use sqlx::{Pool, Postgres};
use tracing::debug;

use crate::db::models::ImportLogRow;
use crate::import::models::NewImportLog;

/// Repository for the append-only import log table
pub struct ImportLogRepository;

impl ImportLogRepository {
    /// Persist one run summary and return the stored row
    pub async fn create(
        pool: &Pool<Postgres>,
        log: &NewImportLog,
    ) -> Result<ImportLogRow, sqlx::Error> {
        let row = sqlx::query_as::<_, ImportLogRow>(
            r#"
            INSERT INTO import_logs
                (source_label, timestamp, total_processed, new_count,
                 updated_count, failed_count, failure_reasons)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, source_label, timestamp, total_processed, new_count,
                      updated_count, failed_count, failure_reasons
            "#,
        )
        .bind(&log.source_label)
        .bind(log.timestamp)
        .bind(log.total_processed)
        .bind(log.new_count)
        .bind(log.updated_count)
        .bind(log.failed_count)
        .bind(&log.failure_reasons)
        .fetch_one(pool)
        .await?;

        debug!("Import log stored with id={}", row.id);
        Ok(row)
    }

    /// Import logs newest first; a `None` limit (bound as NULL) returns all
    pub async fn list_recent(
        pool: &Pool<Postgres>,
        limit: Option<i64>,
    ) -> Result<Vec<ImportLogRow>, sqlx::Error> {
        sqlx::query_as::<_, ImportLogRow>(
            r#"
            SELECT id, source_label, timestamp, total_processed, new_count,
                   updated_count, failed_count, failure_reasons
            FROM import_logs
            ORDER BY timestamp DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
