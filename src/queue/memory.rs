use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Delivery, ImportQueue, TaskId};
use crate::error::QueueError;
use crate::import::models::QueuedTask;

const DEFAULT_MAX_ATTEMPTS: i32 = 5;

#[derive(Debug, Default)]
struct QueueState {
    next_id: TaskId,
    pending: VecDeque<Delivery>,
    in_flight: HashMap<TaskId, Delivery>,
    dead: Vec<Delivery>,
}

impl QueueState {
    /// Remove the in-flight entry only if it belongs to this claim.
    fn take_claim(&mut self, delivery: &Delivery) -> Result<Delivery, QueueError> {
        match self.in_flight.get(&delivery.id) {
            Some(held) if held.attempt == delivery.attempt => self
                .in_flight
                .remove(&delivery.id)
                .ok_or(QueueError::UnknownDelivery(delivery.id)),
            _ => Err(QueueError::UnknownDelivery(delivery.id)),
        }
    }
}

/// Single-process broker. Tasks survive worker failures (release) but not a
/// process restart. A task released `max_attempts` times is parked as dead.
#[derive(Debug)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    max_attempts: i32,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(max_attempts: i32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Number of claimed but not yet acknowledged tasks.
    pub async fn in_flight_count(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Number of tasks that used up their attempts.
    pub async fn dead_count(&self) -> usize {
        self.state.lock().await.dead.len()
    }
}

#[async_trait]
impl ImportQueue for MemoryQueue {
    async fn enqueue(&self, task: QueuedTask) -> Result<TaskId, QueueError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        state.pending.push_back(Delivery {
            id,
            attempt: 0,
            task,
        });
        debug!("Enqueued task {}", id);
        Ok(id)
    }

    async fn claim(&self, worker_id: &str) -> Result<Option<Delivery>, QueueError> {
        let mut state = self.state.lock().await;
        let Some(mut delivery) = state.pending.pop_front() else {
            return Ok(None);
        };
        delivery.attempt += 1;
        state.in_flight.insert(delivery.id, delivery.clone());
        debug!("Task {} claimed by {}", delivery.id, worker_id);
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.take_claim(delivery).map(|_| ())
    }

    async fn release(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let released = state.take_claim(delivery)?;
        if released.attempt >= self.max_attempts {
            warn!(
                "Task {} failed {} times, moving to dead: {}",
                released.id, released.attempt, reason
            );
            state.dead.push(released);
        } else {
            debug!("Task {} released: {}", delivery.id, reason);
            state.pending.push_back(released);
        }
        Ok(())
    }

    async fn heartbeat(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let state = self.state.lock().await;
        match state.in_flight.get(&delivery.id) {
            Some(held) if held.attempt == delivery.attempt => Ok(()),
            _ => Err(QueueError::UnknownDelivery(delivery.id)),
        }
    }

    async fn pending_count(&self) -> Result<i64, QueueError> {
        let state = self.state.lock().await;
        Ok(i64::try_from(state.pending.len()).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(label: &str) -> QueuedTask {
        QueuedTask {
            source_label: label.to_string(),
            items: Vec::new(),
        }
    }

    #[tokio::test]
    async fn tasks_are_claimed_in_fifo_order() {
        let queue = MemoryQueue::new();
        let first = queue.enqueue(task("a")).await.expect("enqueue");
        let second = queue.enqueue(task("b")).await.expect("enqueue");

        let claimed = queue.claim("w1").await.expect("claim").expect("task");
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.attempt, 1);
        let claimed = queue.claim("w1").await.expect("claim").expect("task");
        assert_eq!(claimed.id, second);
        assert!(queue.claim("w1").await.expect("claim").is_none());
    }

    #[tokio::test]
    async fn released_task_comes_back_with_next_attempt() {
        let queue = MemoryQueue::new();
        queue.enqueue(task("a")).await.expect("enqueue");

        let delivery = queue.claim("w1").await.expect("claim").expect("task");
        queue.release(&delivery, "boom").await.expect("release");
        assert_eq!(queue.in_flight_count().await, 0);

        let again = queue.claim("w2").await.expect("claim").expect("redelivered");
        assert_eq!(again.id, delivery.id);
        assert_eq!(again.attempt, 2);

        assert!(matches!(
            queue.ack(&delivery).await,
            Err(QueueError::UnknownDelivery(_))
        ));
        queue.ack(&again).await.expect("ack");
        assert_eq!(queue.pending_count().await.expect("count"), 0);
        assert!(matches!(
            queue.ack(&again).await,
            Err(QueueError::UnknownDelivery(_))
        ));
    }

    #[tokio::test]
    async fn task_failing_every_attempt_ends_up_dead() {
        let queue = MemoryQueue::with_max_attempts(3);
        queue.enqueue(task("a")).await.expect("enqueue");

        for attempt in 1..=3 {
            let delivery = queue.claim("w1").await.expect("claim").expect("task");
            assert_eq!(delivery.attempt, attempt);
            queue.release(&delivery, "store offline").await.expect("release");
        }

        assert!(queue.claim("w1").await.expect("claim").is_none());
        assert_eq!(queue.dead_count().await, 1);
        assert_eq!(queue.pending_count().await.expect("count"), 0);
        assert_eq!(queue.in_flight_count().await, 0);
    }
}
