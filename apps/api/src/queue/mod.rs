//! Task Queue contract.
//!
//! The pipeline needs exactly this much from a broker: at-least-once
//! delivery, an idempotency key on enqueue, and a best-effort state probe.
//! `AppState` carries an `Arc<dyn TaskQueue>` constructed at startup — the
//! Redis implementation in production, [`MemoryQueue`] in tests — so no
//! component ever reaches for a process-wide queue singleton.

pub mod memory;
pub mod redis_queue;

pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Redeliveries per message before the queue gives up. The resume row is the
/// durable record; a dropped message leaves it `Failed` or re-dispatchable.
pub const MAX_DELIVERIES: u32 = 3;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),

    #[error("payload serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The two logical queues the pipeline publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Processing,
    Ranking,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Processing => "resume_processing",
            QueueName::Ranking => "resume_ranking",
        }
    }
}

/// Queue message body. One `Process` per resume; one `Rank` per ranking
/// request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    Process {
        resume_id: Uuid,
        tenant_id: Uuid,
        job_id: Uuid,
    },
    Rank {
        job_id: Uuid,
        tenant_id: Uuid,
        requested_by: Uuid,
        top_candidates: i64,
    },
}

/// One checked-out message. `attempt` starts at 1 and grows on each
/// redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub task_id: String,
    pub attempt: u32,
    pub payload: TaskPayload,
}

/// Best-effort delivery state, as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueTaskState {
    Queued,
    Running,
    Done,
    Failed,
}

impl QueueTaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueTaskState::Queued => "queued",
            QueueTaskState::Running => "running",
            QueueTaskState::Done => "done",
            QueueTaskState::Failed => "failed",
        }
    }
}

/// The broker contract. At-least-once delivery; no ordering guarantee across
/// different resumes.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Publishes a task. A repeat of the same `idempotency_key` within the
    /// dedup window returns the original task id without enqueueing again.
    async fn enqueue(
        &self,
        queue: QueueName,
        payload: &TaskPayload,
        idempotency_key: &str,
    ) -> Result<String, QueueError>;

    /// Checks out the next message, blocking briefly when the queue is empty.
    async fn dequeue(&self, queue: QueueName) -> Result<Option<Delivery>, QueueError>;

    /// Marks a delivery finished. Idempotent.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Returns a delivery for another attempt, or drops it once
    /// [`MAX_DELIVERIES`] is exhausted.
    async fn nack(&self, queue: QueueName, delivery: Delivery) -> Result<(), QueueError>;

    /// Probes a task's delivery state. `None` when the broker no longer
    /// remembers the id.
    async fn task_state(&self, task_id: &str) -> Result<Option<QueueTaskState>, QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_wire_format_is_kind_tagged() {
        let payload = TaskPayload::Process {
            resume_id: Uuid::nil(),
            tenant_id: Uuid::nil(),
            job_id: Uuid::nil(),
        };
        let wire = serde_json::to_value(&payload).unwrap();
        assert_eq!(wire["kind"], "process");

        let rank = TaskPayload::Rank {
            job_id: Uuid::nil(),
            tenant_id: Uuid::nil(),
            requested_by: Uuid::nil(),
            top_candidates: 5,
        };
        let wire = serde_json::to_value(&rank).unwrap();
        assert_eq!(wire["kind"], "rank");
        assert_eq!(wire["top_candidates"], 5);
    }

    #[test]
    fn queue_names_are_stable() {
        // Workers and dispatchers agree on these list keys across deploys.
        assert_eq!(QueueName::Processing.as_str(), "resume_processing");
        assert_eq!(QueueName::Ranking.as_str(), "resume_ranking");
    }
}
