//! Redis-backed task queue.
//!
//! Layout:
//!   - one list per [`QueueName`] (`LPUSH` / `BRPOP`),
//!   - `rq:dedup:{key}` strings (`SET NX EX`) mapping idempotency keys to
//!     task ids for the dedup window,
//!   - `rq:task:{id}` strings holding the last observed delivery state,
//!     expired after [`STATE_TTL_SECS`].
//!
//! Delivery is at-least-once: a worker that dies between `BRPOP` and `ack`
//! loses the in-flight message, which is why every effect downstream is
//! guarded by the resume status compare-and-set.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;
use uuid::Uuid;

use super::{
    Delivery, QueueError, QueueName, QueueTaskState, TaskPayload, TaskQueue, MAX_DELIVERIES,
};

/// How long an idempotency key suppresses duplicate enqueues.
const DEDUP_TTL_SECS: u64 = 600;
/// How long a finished task's state stays probeable.
const STATE_TTL_SECS: i64 = 3600;
/// `BRPOP` timeout; bounds worker shutdown latency.
const POP_TIMEOUT_SECS: u64 = 5;

pub struct RedisQueue {
    client: redis::Client,
}

impl RedisQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(backend)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)
    }

    fn list_key(queue: QueueName) -> String {
        format!("rq:queue:{}", queue.as_str())
    }

    fn dedup_key(idempotency_key: &str) -> String {
        format!("rq:dedup:{idempotency_key}")
    }

    fn state_key(task_id: &str) -> String {
        format!("rq:task:{task_id}")
    }

    async fn set_state(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        task_id: &str,
        state: QueueTaskState,
    ) -> Result<(), QueueError> {
        let _: () = redis::cmd("SET")
            .arg(Self::state_key(task_id))
            .arg(state.as_str())
            .arg("EX")
            .arg(STATE_TTL_SECS)
            .query_async(conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

fn backend(e: redis::RedisError) -> QueueError {
    QueueError::Backend(e.to_string())
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        payload: &TaskPayload,
        idempotency_key: &str,
    ) -> Result<String, QueueError> {
        let mut conn = self.connection().await?;
        let task_id = Uuid::new_v4().to_string();

        // Claim the idempotency key; if somebody beat us to it, return their
        // task id and enqueue nothing.
        let claimed: Option<String> = redis::cmd("SET")
            .arg(Self::dedup_key(idempotency_key))
            .arg(&task_id)
            .arg("NX")
            .arg("EX")
            .arg(DEDUP_TTL_SECS)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        if claimed.is_none() {
            let existing: Option<String> = conn
                .get(Self::dedup_key(idempotency_key))
                .await
                .map_err(backend)?;
            if let Some(existing) = existing {
                debug!(idempotency_key, "enqueue deduplicated");
                return Ok(existing);
            }
            // Key expired between SET NX and GET; fall through and publish.
        }

        let delivery = Delivery {
            task_id: task_id.clone(),
            attempt: 1,
            payload: payload.clone(),
        };
        let body = serde_json::to_string(&delivery)?;

        self.set_state(&mut conn, &task_id, QueueTaskState::Queued)
            .await?;
        let _: () = conn
            .lpush(Self::list_key(queue), body)
            .await
            .map_err(backend)?;

        Ok(task_id)
    }

    async fn dequeue(&self, queue: QueueName) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;

        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(Self::list_key(queue))
            .arg(POP_TIMEOUT_SECS)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        let Some((_, body)) = popped else {
            return Ok(None);
        };

        let delivery: Delivery = serde_json::from_str(&body)?;
        self.set_state(&mut conn, &delivery.task_id, QueueTaskState::Running)
            .await?;
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        self.set_state(&mut conn, &delivery.task_id, QueueTaskState::Done)
            .await
    }

    async fn nack(&self, queue: QueueName, delivery: Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;

        if delivery.attempt >= MAX_DELIVERIES {
            debug!(task_id = %delivery.task_id, "delivery budget exhausted, dropping");
            return self
                .set_state(&mut conn, &delivery.task_id, QueueTaskState::Failed)
                .await;
        }

        let redelivery = Delivery {
            attempt: delivery.attempt + 1,
            ..delivery
        };
        let body = serde_json::to_string(&redelivery)?;
        self.set_state(&mut conn, &redelivery.task_id, QueueTaskState::Queued)
            .await?;
        let _: () = conn
            .lpush(Self::list_key(queue), body)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn task_state(&self, task_id: &str) -> Result<Option<QueueTaskState>, QueueError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(Self::state_key(task_id)).await.map_err(backend)?;
        Ok(raw.and_then(|s| match s.as_str() {
            "queued" => Some(QueueTaskState::Queued),
            "running" => Some(QueueTaskState::Running),
            "done" => Some(QueueTaskState::Done),
            "failed" => Some(QueueTaskState::Failed),
            _ => None,
        }))
    }
}
