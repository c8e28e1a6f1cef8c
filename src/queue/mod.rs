//! Work distribution between the import trigger and the workers.
//!
//! Delivery is at-least-once: a task stays owned by the broker until it is
//! acknowledged, and is handed out again after a release or an expired
//! lease.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::QueueError;
use crate::import::models::QueuedTask;

pub mod memory;

pub use memory::MemoryQueue;

pub type TaskId = i64;

/// A claimed task together with its broker bookkeeping.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: TaskId,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: i32,
    pub task: QueuedTask,
}

#[async_trait]
pub trait ImportQueue: Send + Sync {
    async fn enqueue(&self, task: QueuedTask) -> Result<TaskId, QueueError>;

    /// Take the next available task, if any, on behalf of `worker_id`.
    async fn claim(&self, worker_id: &str) -> Result<Option<Delivery>, QueueError>;

    /// Mark a delivery as fully processed.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Give a delivery back to the broker for redelivery.
    async fn release(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError>;

    /// Renew the claim on a delivery that is still being processed.
    ///
    /// Brokers without leases have nothing to renew.
    async fn heartbeat(&self, _delivery: &Delivery) -> Result<(), QueueError> {
        Ok(())
    }

    async fn pending_count(&self) -> Result<i64, QueueError>;
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Invoked once per delivered task by [`subscribe`].
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &QueuedTask) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub worker_id: String,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Sleep after a broker or handler error before polling again.
    pub error_backoff: Duration,
    /// Period of [`ImportQueue::heartbeat`] calls while a task is handled.
    /// Must stay well below the broker's lease.
    pub heartbeat_interval: Duration,
}

impl SubscribeOptions {
    pub fn new(worker_id: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            worker_id: worker_id.into(),
            poll_interval,
            error_backoff: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(60),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat_interval: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self
    }
}

/// Run the handler, renewing the claim every `heartbeat_interval` until it
/// returns.
async fn handle_with_heartbeat<H>(
    queue: &dyn ImportQueue,
    handler: &H,
    delivery: &Delivery,
    options: &SubscribeOptions,
) -> Result<(), HandlerError>
where
    H: TaskHandler,
{
    let mut handling = handler.handle(&delivery.task);
    let mut ticker = interval(options.heartbeat_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the claim is fresh.
    ticker.tick().await;

    loop {
        tokio::select! {
            result = &mut handling => return result,
            _ = ticker.tick() => {
                if let Err(e) = queue.heartbeat(delivery).await {
                    warn!(
                        "Worker {} could not renew task {}: {}",
                        options.worker_id, delivery.id, e
                    );
                }
            }
        }
    }
}

/// Drive `handler` with tasks from `queue` until `shutdown` flips to `true`.
///
/// A task is acknowledged only after the handler returns `Ok`; a handler
/// error releases it for redelivery. Shutdown is observed between tasks, so
/// a batch in progress always runs to completion.
pub async fn subscribe<H>(
    queue: Arc<dyn ImportQueue>,
    handler: H,
    options: SubscribeOptions,
    mut shutdown: watch::Receiver<bool>,
) where
    H: TaskHandler,
{
    let worker_id = options.worker_id.as_str();
    info!("Worker {} subscribed to import queue", worker_id);

    loop {
        if *shutdown.borrow() {
            info!("Worker {} received shutdown signal, stopping", worker_id);
            break;
        }

        let idle_for = match queue.claim(worker_id).await {
            Ok(Some(delivery)) => {
                info!(
                    "Worker {} claimed task {} (attempt {}, {} items, source={})",
                    worker_id,
                    delivery.id,
                    delivery.attempt,
                    delivery.task.items.len(),
                    delivery.task.source_label
                );
                match handle_with_heartbeat(queue.as_ref(), &handler, &delivery, &options).await {
                    Ok(()) => {
                        if let Err(e) = queue.ack(&delivery).await {
                            error!(
                                "Worker {} failed to ack task {}: {}",
                                worker_id, delivery.id, e
                            );
                        }
                        None
                    }
                    Err(e) => {
                        warn!(
                            "Worker {} failed task {}, releasing for redelivery: {}",
                            worker_id, delivery.id, e
                        );
                        if let Err(e) = queue.release(&delivery, &e.to_string()).await {
                            error!(
                                "Worker {} failed to release task {}: {}",
                                worker_id, delivery.id, e
                            );
                        }
                        Some(options.error_backoff)
                    }
                }
            }
            Ok(None) => Some(options.poll_interval),
            Err(e) => {
                error!("Worker {} encountered queue error: {}", worker_id, e);
                Some(options.error_backoff)
            }
        };

        if let Some(delay) = idle_for {
            tokio::select! {
                () = sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Worker {} lost its shutdown channel, stopping", worker_id);
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct SlowHandler(Duration);

    #[async_trait]
    impl TaskHandler for SlowHandler {
        async fn handle(&self, _task: &QueuedTask) -> Result<(), HandlerError> {
            sleep(self.0).await;
            Ok(())
        }
    }

    /// Counts lease renewals on top of an in-memory broker.
    struct RenewingQueue {
        inner: MemoryQueue,
        heartbeats: AtomicUsize,
    }

    #[async_trait]
    impl ImportQueue for RenewingQueue {
        async fn enqueue(&self, task: QueuedTask) -> Result<TaskId, QueueError> {
            self.inner.enqueue(task).await
        }

        async fn claim(&self, worker_id: &str) -> Result<Option<Delivery>, QueueError> {
            self.inner.claim(worker_id).await
        }

        async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
            self.inner.ack(delivery).await
        }

        async fn release(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
            self.inner.release(delivery, reason).await
        }

        async fn heartbeat(&self, delivery: &Delivery) -> Result<(), QueueError> {
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
            self.inner.heartbeat(delivery).await
        }

        async fn pending_count(&self) -> Result<i64, QueueError> {
            self.inner.pending_count().await
        }
    }

    struct FlakyHandler {
        calls: Arc<AtomicUsize>,
        fail_first: usize,
    }

    #[async_trait]
    impl TaskHandler for FlakyHandler {
        async fn handle(&self, _task: &QueuedTask) -> Result<(), HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err("store offline".into());
            }
            Ok(())
        }
    }

    fn task(label: &str) -> QueuedTask {
        QueuedTask {
            source_label: label.to_string(),
            items: Vec::new(),
        }
    }

    fn fast_options() -> SubscribeOptions {
        SubscribeOptions {
            worker_id: "test-worker".to_string(),
            poll_interval: Duration::from_millis(5),
            error_backoff: Duration::from_millis(5),
            heartbeat_interval: Duration::from_secs(60),
        }
    }

    async fn wait_for_calls(calls: &AtomicUsize, expected: usize) {
        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) >= expected {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("handler was called {} times", calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_task_is_redelivered_then_acked() {
        let queue: Arc<dyn ImportQueue> = Arc::new(MemoryQueue::new());
        queue.enqueue(task("job_feed")).await.expect("enqueue");

        let calls = Arc::new(AtomicUsize::new(0));
        let handler = FlakyHandler {
            calls: Arc::clone(&calls),
            fail_first: 1,
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loop_handle = tokio::spawn(subscribe(
            Arc::clone(&queue),
            handler,
            fast_options(),
            shutdown_rx,
        ));

        wait_for_calls(&calls, 2).await;
        shutdown_tx.send(true).expect("send shutdown");
        loop_handle.await.expect("subscription loop exits");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(queue.pending_count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn long_running_task_renews_its_claim() {
        let queue = Arc::new(RenewingQueue {
            inner: MemoryQueue::new(),
            heartbeats: AtomicUsize::new(0),
        });
        queue.enqueue(task("job_feed")).await.expect("enqueue");
        let delivery = queue.claim("w1").await.expect("claim").expect("task");

        let options = fast_options().with_heartbeat(Duration::from_millis(10));
        let handler = SlowHandler(Duration::from_millis(80));
        handle_with_heartbeat(queue.as_ref(), &handler, &delivery, &options)
            .await
            .expect("handler succeeds");

        assert!(queue.heartbeats.load(Ordering::SeqCst) >= 2);
        queue.ack(&delivery).await.expect("claim still held");
    }

    #[tokio::test]
    async fn stops_when_shutdown_is_signalled_while_idle() {
        let queue: Arc<dyn ImportQueue> = Arc::new(MemoryQueue::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = FlakyHandler {
            calls: Arc::clone(&calls),
            fail_first: 0,
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loop_handle = tokio::spawn(subscribe(queue, handler, fast_options(), shutdown_rx));

        shutdown_tx.send(true).expect("send shutdown");
        loop_handle.await.expect("subscription loop exits");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
