use sqlx::types::Json;
use sqlx::{Pool, Postgres};
use tracing::{debug, warn};

use crate::db::models::TaskRow;
use crate::import::models::QueuedTask;

/// Repository for the `import_tasks` queue table
pub struct TaskRepository;

impl TaskRepository {
    pub async fn insert(pool: &Pool<Postgres>, task: &QueuedTask) -> Result<i64, sqlx::Error> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO import_tasks (source_label, items)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(&task.source_label)
        .bind(Json(&task.items))
        .fetch_one(pool)
        .await?;

        debug!("Task inserted with id={}", id);
        Ok(id)
    }

    /// Claim the oldest claimable task using FOR UPDATE SKIP LOCKED.
    ///
    /// Running tasks whose lease expired count as claimable, which is how a
    /// task held by a crashed worker gets redelivered.
    pub async fn claim(
        pool: &Pool<Postgres>,
        worker_id: &str,
        lease_secs: u64,
        max_attempts: i32,
    ) -> Result<Option<TaskRow>, sqlx::Error> {
        sqlx::query_as::<_, TaskRow>(
            r#"
            WITH next_task AS (
                SELECT id
                FROM import_tasks
                WHERE
                    (status = 'pending' OR (status = 'running' AND lease_expires_at < NOW()))
                    AND attempts < $1
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE import_tasks
            SET
                status = 'running',
                attempts = attempts + 1,
                worker_id = $2,
                lease_expires_at = NOW() + ($3 || ' seconds')::INTERVAL,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_task)
            RETURNING id, source_label, items, attempts
            "#,
        )
        .bind(max_attempts)
        .bind(worker_id)
        .bind(lease_secs.to_string())
        .fetch_optional(pool)
        .await
    }

    /// Move tasks that used up their attempts while their lease ran out to `dead`.
    pub async fn bury_exhausted(
        pool: &Pool<Postgres>,
        max_attempts: i32,
    ) -> Result<u64, sqlx::Error> {
        let buried = sqlx::query(
            r#"
            UPDATE import_tasks
            SET status = 'dead',
                lease_expires_at = NULL,
                last_error = COALESCE(last_error, 'lease expired'),
                updated_at = NOW()
            WHERE attempts >= $1
              AND (status = 'pending' OR (status = 'running' AND lease_expires_at < NOW()))
            "#,
        )
        .bind(max_attempts)
        .execute(pool)
        .await?
        .rows_affected();

        if buried > 0 {
            warn!("Moved {} exhausted tasks to dead", buried);
        }
        Ok(buried)
    }

    /// Returns `false` unless the task is still running under this claim.
    ///
    /// Every claim bumps `attempts`, so a worker whose lease expired and was
    /// reclaimed no longer matches and cannot finish someone else's delivery.
    pub async fn complete(
        pool: &Pool<Postgres>,
        id: i64,
        attempt: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE import_tasks
            SET status = 'done', lease_expires_at = NULL, updated_at = NOW()
            WHERE id = $1 AND attempts = $2 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(attempt)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Hand a running task back for redelivery, or bury it once it has been
    /// attempted `max_attempts` times. Returns `false` unless the task is
    /// still running under this claim.
    pub async fn release(
        pool: &Pool<Postgres>,
        id: i64,
        attempt: i32,
        reason: &str,
        max_attempts: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE import_tasks
            SET status = CASE WHEN attempts >= $4 THEN 'dead' ELSE 'pending' END,
                last_error = $3,
                lease_expires_at = NULL,
                worker_id = NULL,
                updated_at = NOW()
            WHERE id = $1 AND attempts = $2 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(reason)
        .bind(max_attempts)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Push the lease of a running claim `lease_secs` into the future.
    pub async fn extend_lease(
        pool: &Pool<Postgres>,
        id: i64,
        attempt: i32,
        lease_secs: u64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE import_tasks
            SET lease_expires_at = NOW() + ($3 || ' seconds')::INTERVAL,
                updated_at = NOW()
            WHERE id = $1 AND attempts = $2 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(lease_secs.to_string())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_pending(pool: &Pool<Postgres>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM import_tasks WHERE status = 'pending'")
            .fetch_one(pool)
            .await
    }
}
