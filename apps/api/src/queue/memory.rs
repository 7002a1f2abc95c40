//! In-memory queue for tests and local development.
//!
//! Same contract as the Redis implementation, minus durability: FIFO lists,
//! an idempotency-key map, and a task-state map behind one mutex.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    Delivery, QueueError, QueueName, QueueTaskState, TaskPayload, TaskQueue, MAX_DELIVERIES,
};

#[derive(Default)]
struct Inner {
    queues: HashMap<QueueName, VecDeque<Delivery>>,
    dedup: HashMap<String, String>,
    states: HashMap<String, QueueTaskState>,
}

#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently waiting on a queue. Test helper.
    pub fn depth(&self, queue: QueueName) -> usize {
        let inner = self.inner.lock().expect("memory queue poisoned");
        inner.queues.get(&queue).map_or(0, |q| q.len())
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        payload: &TaskPayload,
        idempotency_key: &str,
    ) -> Result<String, QueueError> {
        let mut inner = self.inner.lock().expect("memory queue poisoned");

        if let Some(existing) = inner.dedup.get(idempotency_key) {
            return Ok(existing.clone());
        }

        let task_id = Uuid::new_v4().to_string();
        inner
            .dedup
            .insert(idempotency_key.to_string(), task_id.clone());
        inner.states.insert(task_id.clone(), QueueTaskState::Queued);
        inner.queues.entry(queue).or_default().push_back(Delivery {
            task_id: task_id.clone(),
            attempt: 1,
            payload: payload.clone(),
        });

        Ok(task_id)
    }

    async fn dequeue(&self, queue: QueueName) -> Result<Option<Delivery>, QueueError> {
        let mut inner = self.inner.lock().expect("memory queue poisoned");
        let delivery = inner.queues.entry(queue).or_default().pop_front();
        if let Some(d) = &delivery {
            inner
                .states
                .insert(d.task_id.clone(), QueueTaskState::Running);
        }
        Ok(delivery)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().expect("memory queue poisoned");
        inner
            .states
            .insert(delivery.task_id.clone(), QueueTaskState::Done);
        Ok(())
    }

    async fn nack(&self, queue: QueueName, delivery: Delivery) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().expect("memory queue poisoned");
        if delivery.attempt >= MAX_DELIVERIES {
            inner
                .states
                .insert(delivery.task_id.clone(), QueueTaskState::Failed);
            return Ok(());
        }
        inner
            .states
            .insert(delivery.task_id.clone(), QueueTaskState::Queued);
        inner.queues.entry(queue).or_default().push_back(Delivery {
            attempt: delivery.attempt + 1,
            ..delivery
        });
        Ok(())
    }

    async fn task_state(&self, task_id: &str) -> Result<Option<QueueTaskState>, QueueError> {
        let inner = self.inner.lock().expect("memory queue poisoned");
        Ok(inner.states.get(task_id).copied())
    }
}
