use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::debug;

use crate::db::models::TaskRow;
use crate::db::task_repository::TaskRepository;
use crate::error::QueueError;
use crate::import::models::QueuedTask;
use crate::queue::{Delivery, ImportQueue, TaskId};

/// Durable broker on the `import_tasks` table.
///
/// Many workers, in one process or several, can poll the same table; row
/// locks guarantee each claim hands a task to exactly one of them.
#[derive(Clone)]
pub struct PgImportQueue {
    pool: Pool<Postgres>,
    lease: Duration,
    max_attempts: i32,
}

impl PgImportQueue {
    pub fn new(pool: Pool<Postgres>, lease: Duration, max_attempts: i32) -> Self {
        Self {
            pool,
            lease,
            max_attempts,
        }
    }
}

impl From<TaskRow> for Delivery {
    fn from(row: TaskRow) -> Self {
        Delivery {
            id: row.id,
            attempt: row.attempts,
            task: QueuedTask {
                source_label: row.source_label,
                items: row.items.0,
            },
        }
    }
}

#[async_trait]
impl ImportQueue for PgImportQueue {
    async fn enqueue(&self, task: QueuedTask) -> Result<TaskId, QueueError> {
        Ok(TaskRepository::insert(&self.pool, &task).await?)
    }

    async fn claim(&self, worker_id: &str) -> Result<Option<Delivery>, QueueError> {
        TaskRepository::bury_exhausted(&self.pool, self.max_attempts).await?;

        let row = TaskRepository::claim(
            &self.pool,
            worker_id,
            self.lease.as_secs().max(1),
            self.max_attempts,
        )
        .await?;

        if let Some(row) = &row {
            debug!("Task {} claimed by {} (attempt {})", row.id, worker_id, row.attempts);
        }
        Ok(row.map(Delivery::from))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        if TaskRepository::complete(&self.pool, delivery.id, delivery.attempt).await? {
            Ok(())
        } else {
            Err(QueueError::UnknownDelivery(delivery.id))
        }
    }

    async fn release(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        let released = TaskRepository::release(
            &self.pool,
            delivery.id,
            delivery.attempt,
            reason,
            self.max_attempts,
        )
        .await?;

        if released {
            Ok(())
        } else {
            Err(QueueError::UnknownDelivery(delivery.id))
        }
    }

    async fn heartbeat(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let lease_secs = self.lease.as_secs().max(1);
        let extended =
            TaskRepository::extend_lease(&self.pool, delivery.id, delivery.attempt, lease_secs)
                .await?;

        if extended {
            Ok(())
        } else {
            Err(QueueError::UnknownDelivery(delivery.id))
        }
    }

    async fn pending_count(&self) -> Result<i64, QueueError> {
        Ok(TaskRepository::count_pending(&self.pool).await?)
    }
}
