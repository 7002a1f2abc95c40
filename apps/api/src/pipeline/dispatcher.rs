//! Processing Dispatcher — fans a job's eligible resumes out to the queue.
//!
//! Per-resume unit of work: publish the task first, then advance the status.
//! A resume whose publish fails keeps its prior status (no orphaned
//! `Parsing` row without a task behind it) and does not abort its siblings.

use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::errors::AppError;
use crate::queue::{QueueError, QueueName, TaskPayload, TaskQueue};
use crate::store;

#[derive(Debug, Serialize)]
pub struct DispatchOutcome {
    pub queued_count: usize,
    pub resume_ids: Vec<Uuid>,
}

pub async fn dispatch_processing(
    pool: &PgPool,
    queue: &dyn TaskQueue,
    ctx: &RequestContext,
    job_id: Uuid,
) -> Result<DispatchOutcome, AppError> {
    let job = store::fetch_job(pool, ctx.tenant_id, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;

    let eligible = store::eligible_for_dispatch(pool, job.id).await?;
    if eligible.is_empty() {
        return Err(AppError::NoEligibleWork(format!(
            "Job {job_id} has no resumes awaiting processing"
        )));
    }

    let mut resume_ids = Vec::with_capacity(eligible.len());
    let mut publish_failures = 0usize;

    for resume in &eligible {
        let payload = TaskPayload::Process {
            resume_id: resume.id,
            tenant_id: resume.tenant_id,
            job_id: resume.job_id,
        };
        // Unique per dispatch call: legitimate re-dispatch of a failed resume
        // must not be swallowed by the dedup window, while retries of one
        // publish stay safe on the broker side.
        let idempotency_key = format!(
            "process:{}:{}",
            resume.id,
            chrono::Utc::now().timestamp_millis()
        );

        match queue.enqueue(QueueName::Processing, &payload, &idempotency_key).await {
            Ok(_) => {
                if store::mark_parsing(pool, resume.id).await? {
                    resume_ids.push(resume.id);
                } else {
                    // Lost a race with another dispatch; the worker-side
                    // status guard turns the duplicate task into a no-op.
                    debug!(resume_id = %resume.id, "resume no longer dispatchable, skipping");
                }
            }
            Err(e) => {
                publish_failures += 1;
                warn!(resume_id = %resume.id, error = %e, "enqueue failed, resume left in prior status");
            }
        }
    }

    if resume_ids.is_empty() && publish_failures > 0 {
        return Err(AppError::Queue(QueueError::Backend(format!(
            "all {publish_failures} enqueue attempts failed"
        ))));
    }

    store::touch_activity(pool, job.id).await?;
    info!(%job_id, queued = resume_ids.len(), "processing dispatched");

    Ok(DispatchOutcome {
        queued_count: resume_ids.len(),
        resume_ids,
    })
}
