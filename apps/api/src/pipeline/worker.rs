//! Extraction/Scoring worker.
//!
//! Workers hold no shared in-process state; the persisted resume status is
//! the only coordination point. A redelivered message whose resume already
//! reached a terminal status is discarded as a no-op, which is what makes
//! at-least-once delivery safe end to end. A message that arrives *ahead* of
//! the dispatcher's status write (the resume still dispatchable) is nacked,
//! not discarded — dropping it would strand the row in `Parsing` with no
//! task behind it.
//!
//! Failure handling per message:
//!   - scorer failure: terminal for the resume (`Failed` + error message),
//!     acked — the document is done until someone re-dispatches it;
//!   - store failure: nacked — the queue redelivers with a bounded budget.

use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::resume::ResumeStatus;
use crate::pipeline::ranking;
use crate::queue::{Delivery, QueueName, TaskPayload};
use crate::scoring::ResumeScorer;
use crate::state::AppState;
use crate::store;

/// Idle pause between polls when both queues are empty.
const IDLE_BACKOFF_MS: u64 = 500;
/// Pause after an infrastructure error before polling again.
const ERROR_BACKOFF_MS: u64 = 2000;

/// Task-level failure: either the store is unavailable, or the message beat
/// the dispatcher's status write to the worker. Both are returned for
/// redelivery.
#[derive(Debug, Error)]
enum TaskError {
    #[error(transparent)]
    Store(#[from] sqlx::Error),

    #[error("resume {0} not yet marked parsing")]
    AwaitingDispatchMark(Uuid),
}

/// Routing for a checked-out processing task, decided from the resume's
/// current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// `Parsing`: this delivery owns the document.
    Score,
    /// `Completed`: a prior delivery already wrote the result; drop it.
    Discard,
    /// Still dispatchable (`Uploaded` or `Failed`): the dispatcher's
    /// `mark_parsing` has not landed yet, or this is a stale redelivery of a
    /// failed document. Redelivering covers both — only a `Parsing` row is
    /// ever scored, and the delivery budget bounds the churn.
    Redeliver,
}

fn disposition(status: ResumeStatus) -> Disposition {
    if status == ResumeStatus::Parsing {
        Disposition::Score
    } else if status.is_dispatchable() {
        Disposition::Redeliver
    } else {
        Disposition::Discard
    }
}

/// Worker loop; spawned `WORKER_COUNT` times from `main`. Runs until the
/// process exits.
pub async fn run_worker(state: AppState, worker_id: usize) {
    info!(worker_id, "worker started");
    loop {
        match poll_once(&state).await {
            Ok(true) => {}
            Ok(false) => {
                tokio::time::sleep(std::time::Duration::from_millis(IDLE_BACKOFF_MS)).await;
            }
            Err(e) => {
                error!(worker_id, error = %e, "worker poll failed");
                tokio::time::sleep(std::time::Duration::from_millis(ERROR_BACKOFF_MS)).await;
            }
        }
    }
}

/// Checks out and handles at most one message. Returns whether any work was
/// found.
pub async fn poll_once(state: &AppState) -> Result<bool, crate::queue::QueueError> {
    for queue_name in [QueueName::Processing, QueueName::Ranking] {
        if let Some(delivery) = state.queue.dequeue(queue_name).await? {
            handle_delivery(state, queue_name, delivery).await?;
            return Ok(true);
        }
    }
    Ok(false)
}

async fn handle_delivery(
    state: &AppState,
    queue_name: QueueName,
    delivery: Delivery,
) -> Result<(), crate::queue::QueueError> {
    let outcome = match &delivery.payload {
        TaskPayload::Process { resume_id, .. } => {
            handle_process(&state.db, state.scorer.as_ref(), *resume_id).await
        }
        TaskPayload::Rank { job_id, .. } => handle_rank(&state.db, *job_id).await,
    };

    match outcome {
        Ok(()) => state.queue.ack(&delivery).await,
        Err(e) => {
            warn!(task_id = %delivery.task_id, attempt = delivery.attempt, error = %e,
                "task failed, returning for redelivery");
            state.queue.nack(queue_name, delivery).await
        }
    }
}

/// Processes one resume. Errors returned here trigger redelivery; a scoring
/// failure is absorbed into the resume row instead.
async fn handle_process(
    pool: &PgPool,
    scorer: &dyn ResumeScorer,
    resume_id: Uuid,
) -> Result<(), TaskError> {
    let Some(resume) = store::fetch_resume(pool, resume_id).await? else {
        // Resume deleted after dispatch; nothing to do.
        debug!(%resume_id, "resume gone, discarding task");
        return Ok(());
    };

    match disposition(resume.status) {
        Disposition::Score => {}
        Disposition::Discard => {
            // Idempotency guard: a prior delivery already wrote the result.
            debug!(%resume_id, status = resume.status.as_str(), "stale delivery, discarding");
            return Ok(());
        }
        Disposition::Redeliver => {
            debug!(%resume_id, status = resume.status.as_str(), "delivery ahead of dispatch mark, returning");
            return Err(TaskError::AwaitingDispatchMark(resume_id));
        }
    }

    let Some(job) = store::fetch_job(pool, resume.tenant_id, resume.job_id).await? else {
        store::fail_resume(pool, resume_id, "parent job posting no longer exists").await?;
        return Ok(());
    };

    store::mark_ocr_started(pool, resume_id).await?;

    // The scoring call happens outside any database transaction; it can take
    // tens of seconds and must not pin a connection.
    match scorer.score(&resume.source_key, &job.requirements).await {
        Ok(result) => {
            if !store::complete_resume(pool, resume_id, &result).await? {
                debug!(%resume_id, "lost terminal-write race, result discarded");
            }
        }
        Err(e) => {
            // Per-document failure: this row only, siblings unaffected.
            store::fail_resume(pool, resume_id, &e.to_string()).await?;
        }
    }

    Ok(())
}

/// Runs one ranking pass. A failure mid-pass marks the job's sorting state
/// `Failed`; recovery is a fresh ranking request.
async fn handle_rank(pool: &PgPool, job_id: Uuid) -> Result<(), TaskError> {
    match ranking::run_ranking(pool, job_id).await {
        Ok(total) => {
            info!(%job_id, total, "ranking pass completed");
            Ok(())
        }
        Err(e) => {
            error!(%job_id, error = %e, "ranking pass failed");
            store::mark_sorting_failed(pool, job_id).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sqlx::PgPool;

    use crate::models::job::SortingState;
    use crate::pipeline::dispatcher::dispatch_processing;
    use crate::queue::{MemoryQueue, QueueName, TaskPayload, TaskQueue};
    use crate::scoring::StaticScorer;
    use crate::test_support as support;

    #[test]
    fn disposition_scores_parsing_and_discards_completed_only() {
        assert_eq!(disposition(ResumeStatus::Parsing), Disposition::Score);
        assert_eq!(disposition(ResumeStatus::Completed), Disposition::Discard);
        assert_eq!(disposition(ResumeStatus::Uploaded), Disposition::Redeliver);
        assert_eq!(disposition(ResumeStatus::Failed), Disposition::Redeliver);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn delivery_ahead_of_dispatch_mark_is_redelivered(pool: PgPool) {
        let tenant = Uuid::new_v4();
        let job = support::insert_job(&pool, tenant, None).await;
        let resume =
            support::insert_resume(&pool, tenant, job, ResumeStatus::Uploaded, "resumes/a.pdf")
                .await;

        let queue = Arc::new(MemoryQueue::new());
        let scorer = Arc::new(StaticScorer {
            score: 0.9,
            fail_keys: vec![],
        });
        let state = support::app_state(pool.clone(), queue.clone(), scorer);

        // The task is visible before the dispatcher's status write lands.
        let payload = TaskPayload::Process {
            resume_id: resume,
            tenant_id: tenant,
            job_id: job,
        };
        queue
            .enqueue(QueueName::Processing, &payload, "k1")
            .await
            .unwrap();

        assert!(poll_once(&state).await.unwrap());
        // Neither scored nor lost: the message went back for redelivery.
        assert_eq!(
            support::resume_status(&pool, resume).await,
            ResumeStatus::Uploaded
        );
        assert_eq!(queue.depth(QueueName::Processing), 1);

        // Once the status write lands, the redelivery completes the resume.
        assert!(store::mark_parsing(&pool, resume).await.unwrap());
        assert!(poll_once(&state).await.unwrap());
        assert_eq!(
            support::resume_status(&pool, resume).await,
            ResumeStatus::Completed
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn one_failing_score_isolates_to_its_resume(pool: PgPool) {
        let tenant = Uuid::new_v4();
        let job = support::insert_job(&pool, tenant, None).await;
        let good_a =
            support::insert_resume(&pool, tenant, job, ResumeStatus::Uploaded, "resumes/a.pdf")
                .await;
        let bad =
            support::insert_resume(&pool, tenant, job, ResumeStatus::Uploaded, "resumes/bad.pdf")
                .await;
        let good_b =
            support::insert_resume(&pool, tenant, job, ResumeStatus::Uploaded, "resumes/c.pdf")
                .await;

        let queue = Arc::new(MemoryQueue::new());
        let scorer = Arc::new(StaticScorer {
            score: 0.8,
            fail_keys: vec!["resumes/bad.pdf".to_string()],
        });
        let state = support::app_state(pool.clone(), queue.clone(), scorer);

        dispatch_processing(&pool, queue.as_ref(), &support::ctx(tenant), job)
            .await
            .unwrap();
        support::drain(&state).await;

        assert_eq!(
            support::resume_status(&pool, good_a).await,
            ResumeStatus::Completed
        );
        assert_eq!(
            support::resume_status(&pool, good_b).await,
            ResumeStatus::Completed
        );
        assert_eq!(
            support::resume_status(&pool, bad).await,
            ResumeStatus::Failed
        );

        // Job-level state is untouched by a per-document failure.
        let (sorting, sorted, _) = support::job_sorting(&pool, job).await;
        assert_eq!(sorting, SortingState::Idle);
        assert_eq!(sorted, 0);
    }
}
