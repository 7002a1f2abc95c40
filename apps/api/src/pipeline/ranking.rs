//! Ranking Orchestrator — accepts ranking requests and runs the ranking
//! pass.
//!
//! Ranking is a pure function of the terminal snapshot: it only ever reads
//! `Completed` resumes, so it is unaffected by how dispatch and completion
//! interleave. The ordering here is the single source of truth; the
//! shortlist reader sorts with the same comparator so stage assignment is
//! consistent even before a ranking pass has run.

use std::cmp::Ordering;

use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::errors::AppError;
use crate::models::job::SortingState;
use crate::models::resume::ResumeRow;
use crate::queue::{QueueName, TaskPayload, TaskQueue};
use crate::store;

#[derive(Debug, Serialize)]
pub struct RankingAck {
    pub task_id: String,
    pub sorting_state: SortingState,
    pub total: i64,
    pub top_candidates: i64,
}

/// Requested shortlist size, clamped to `[1, completed]`; defaults to
/// ranking everyone.
pub fn clamp_top(requested: Option<i64>, completed: i64) -> i64 {
    requested.unwrap_or(completed).clamp(1, completed.max(1))
}

/// Canonical ranking order: `overall_score` descending, ties broken by
/// `updated_at` descending — the most recently completed scoring wins.
pub fn cmp_ranked(a: &ResumeRow, b: &ResumeRow) -> Ordering {
    let score_a = a.overall_score.unwrap_or(0.0);
    let score_b = b.overall_score.unwrap_or(0.0);
    score_b
        .partial_cmp(&score_a)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
}

/// Sorts the rows canonically and assigns `rank = 1..N`.
pub fn assign_ranks(mut rows: Vec<ResumeRow>) -> Vec<(Uuid, i64)> {
    rows.sort_by(cmp_ranked);
    rows.iter()
        .enumerate()
        .map(|(i, row)| (row.id, i as i64 + 1))
        .collect()
}

pub async fn request_ranking(
    pool: &PgPool,
    queue: &dyn TaskQueue,
    ctx: &RequestContext,
    job_id: Uuid,
    top_candidates: Option<i64>,
) -> Result<RankingAck, AppError> {
    let job = store::fetch_job(pool, ctx.tenant_id, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;

    let completed = store::completed_count(pool, job.id).await?;
    if completed == 0 {
        return Err(AppError::NothingToRank(format!(
            "Job {job_id} has no completed resumes to rank"
        )));
    }

    let top = clamp_top(top_candidates, completed);

    let payload = TaskPayload::Rank {
        job_id: job.id,
        tenant_id: ctx.tenant_id,
        requested_by: ctx.user_id,
        top_candidates: top,
    };
    // Job id plus a monotonic marker: retries of this request dedup, while
    // two legitimate sequential ranking requests for the same job do not.
    let idempotency_key = format!("rank:{}:{}", job.id, chrono::Utc::now().timestamp_millis());

    // Accept the pass before publishing its task: a worker must never see
    // the task ahead of the state reset, or a fast pass gets overwritten
    // back to `processing` with nothing left in the queue. An enqueue
    // failure leaves the job `processing`, which the next request overwrites.
    store::begin_sorting(pool, job.id).await?;

    let task_id = queue
        .enqueue(QueueName::Ranking, &payload, &idempotency_key)
        .await?;
    info!(%job_id, %task_id, top, "ranking requested");

    Ok(RankingAck {
        task_id,
        sorting_state: SortingState::Processing,
        total: completed,
        top_candidates: top,
    })
}

/// Worker-side ranking pass. Returns the number of resumes ranked.
pub async fn run_ranking(pool: &PgPool, job_id: Uuid) -> Result<i64, sqlx::Error> {
    let rows = store::completed_resumes(pool, job_id).await?;
    let ranks = assign_ranks(rows);
    let total = ranks.len() as i64;

    for (resume_id, rank) in ranks {
        store::write_rank(pool, resume_id, rank).await?;
    }

    store::finish_sorting(pool, job_id, SortingState::Completed, total, total).await?;
    Ok(total)
}
