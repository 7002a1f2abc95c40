//! Record Store — every SQL statement in the pipeline lives here.
//!
//! Status transitions are enforced twice: the [`ResumeStatus::next`] table
//! decides what is legal, and each mutation repeats the source-status check
//! in its `WHERE` clause so racing workers resolve through the database, not
//! through in-process locks. A mutation whose guard does not match affects
//! zero rows and the caller treats that as "someone else got there first".

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::job::{JobPostingRow, SortingState};
use crate::models::resume::{ResumeEvent, ResumeRow, ResumeStatus};
use crate::scoring::ScoreOutcome;

/// Fetches a job posting scoped to a tenant. A job owned by another tenant
/// is reported as absent, never as forbidden, to avoid existence leakage.
pub async fn fetch_job(
    pool: &PgPool,
    tenant_id: Uuid,
    job_id: Uuid,
) -> Result<Option<JobPostingRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM job_postings WHERE id = $1 AND tenant_id = $2")
        .bind(job_id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
}

/// Resumes under a job that the transition table allows to be dispatched,
/// oldest first so large batches drain fairly.
pub async fn eligible_for_dispatch(
    pool: &PgPool,
    job_id: Uuid,
) -> Result<Vec<ResumeRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM resumes
         WHERE job_id = $1 AND status IN ('uploaded', 'failed')
         ORDER BY created_at ASC",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
}

pub async fn fetch_resume(
    pool: &PgPool,
    resume_id: Uuid,
) -> Result<Option<ResumeRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM resumes WHERE id = $1")
        .bind(resume_id)
        .fetch_optional(pool)
        .await
}

/// `{Uploaded,Failed} -dispatch-> Parsing`. Clears the previous attempt's
/// error and OCR timestamp. Returns false when the guard missed (the resume
/// moved since it was selected).
pub async fn mark_parsing(pool: &PgPool, resume_id: Uuid) -> Result<bool, sqlx::Error> {
    debug_assert!(ResumeStatus::Uploaded.next(ResumeEvent::Dispatch).is_some());
    debug_assert!(ResumeStatus::Failed.next(ResumeEvent::Dispatch).is_some());

    let result = sqlx::query(
        "UPDATE resumes
         SET status = 'parsing', error_message = NULL, ocr_started_at = NULL, updated_at = now()
         WHERE id = $1 AND status IN ('uploaded', 'failed')",
    )
    .bind(resume_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Stamps the moment a worker handed the document to the scoring
/// collaborator.
pub async fn mark_ocr_started(pool: &PgPool, resume_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE resumes SET ocr_started_at = now(), updated_at = now()
         WHERE id = $1 AND status = 'parsing'",
    )
    .bind(resume_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// `Parsing -success-> Completed`. `processed_at` is set exactly once, on the
/// first terminal write.
pub async fn complete_resume(
    pool: &PgPool,
    resume_id: Uuid,
    outcome: &ScoreOutcome,
) -> Result<bool, sqlx::Error> {
    debug_assert_eq!(
        ResumeStatus::Parsing.next(ResumeEvent::Succeed),
        Some(ResumeStatus::Completed)
    );

    let result = sqlx::query(
        "UPDATE resumes
         SET status = 'completed',
             overall_score = $2,
             score_breakdown = $3,
             extracted_fields = $4,
             extracted_text = $5,
             error_message = NULL,
             processed_at = COALESCE(processed_at, now()),
             updated_at = now()
         WHERE id = $1 AND status = 'parsing'",
    )
    .bind(resume_id)
    .bind(outcome.overall_score)
    .bind(sqlx::types::Json(&outcome.score_breakdown))
    .bind(sqlx::types::Json(&outcome.extracted_fields))
    .bind(&outcome.extracted_text)
    .execute(pool)
    .await?;

    let applied = result.rows_affected() > 0;
    if applied {
        info!(%resume_id, score = outcome.overall_score, "resume completed");
    }
    Ok(applied)
}

/// `Parsing -failure-> Failed`. Isolated to this row; sibling resumes and
/// job-level state are untouched.
pub async fn fail_resume(
    pool: &PgPool,
    resume_id: Uuid,
    message: &str,
) -> Result<bool, sqlx::Error> {
    debug_assert_eq!(
        ResumeStatus::Parsing.next(ResumeEvent::Fail),
        Some(ResumeStatus::Failed)
    );

    let result = sqlx::query(
        "UPDATE resumes
         SET status = 'failed',
             error_message = $2,
             processed_at = COALESCE(processed_at, now()),
             updated_at = now()
         WHERE id = $1 AND status = 'parsing'",
    )
    .bind(resume_id)
    .bind(message)
    .execute(pool)
    .await?;

    let applied = result.rows_affected() > 0;
    if applied {
        info!(%resume_id, message, "resume failed");
    }
    Ok(applied)
}

/// Completed, scored resumes in the canonical ranking order: score
/// descending, ties broken by most recent completion.
pub async fn completed_resumes(pool: &PgPool, job_id: Uuid) -> Result<Vec<ResumeRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM resumes
         WHERE job_id = $1 AND status = 'completed' AND overall_score IS NOT NULL
         ORDER BY overall_score DESC, updated_at DESC",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
}

pub async fn completed_count(pool: &PgPool, job_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM resumes
         WHERE job_id = $1 AND status = 'completed' AND overall_score IS NOT NULL",
    )
    .bind(job_id)
    .fetch_one(pool)
    .await
}

/// Merges the assigned rank into `score_breakdown`. Deliberately leaves
/// `updated_at` alone: it is the ranking tie-breaker, and bumping it here
/// would reshuffle the order the rank was computed from.
pub async fn write_rank(pool: &PgPool, resume_id: Uuid, rank: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE resumes
         SET score_breakdown = COALESCE(score_breakdown, '{}'::jsonb)
                               || jsonb_build_object('rank', $2::bigint)
         WHERE id = $1 AND status = 'completed'",
    )
    .bind(resume_id)
    .bind(rank)
    .execute(pool)
    .await?;
    Ok(())
}

/// Per-status resume counts for the job progress view.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct StatusCounts {
    pub uploaded: i64,
    pub parsing: i64,
    pub completed: i64,
    pub failed: i64,
}

pub async fn status_counts(pool: &PgPool, job_id: Uuid) -> Result<StatusCounts, sqlx::Error> {
    let rows: Vec<(ResumeStatus, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM resumes WHERE job_id = $1 GROUP BY status")
            .bind(job_id)
            .fetch_all(pool)
            .await?;

    let mut counts = StatusCounts::default();
    for (status, count) in rows {
        match status {
            ResumeStatus::Uploaded => counts.uploaded = count,
            ResumeStatus::Parsing => counts.parsing = count,
            ResumeStatus::Completed => counts.completed = count,
            ResumeStatus::Failed => counts.failed = count,
        }
    }
    Ok(counts)
}

pub async fn touch_activity(pool: &PgPool, job_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE job_postings SET last_activity_at = now(), updated_at = now() WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Accepts a new ranking pass: always legal from any sorting state, and
/// always restarts the progress counter.
pub async fn begin_sorting(pool: &PgPool, job_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE job_postings
         SET sorting_state = 'processing', sorted_count = 0,
             last_activity_at = now(), updated_at = now()
         WHERE id = $1",
    )
    .bind(job_id)
    .execute(pool)
    .await?;
    info!(%job_id, "sorting pass accepted");
    Ok(())
}

/// Marks the in-flight sorting pass failed. `analyzed_count` keeps its value
/// from the last successful pass.
pub async fn mark_sorting_failed(pool: &PgPool, job_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE job_postings
         SET sorting_state = 'failed', sorted_count = 0,
             last_activity_at = now(), updated_at = now()
         WHERE id = $1",
    )
    .bind(job_id)
    .execute(pool)
    .await?;
    info!(%job_id, "sorting pass failed");
    Ok(())
}

pub async fn finish_sorting(
    pool: &PgPool,
    job_id: Uuid,
    state: SortingState,
    sorted_count: i64,
    analyzed_count: i64,
) -> Result<(), sqlx::Error> {
    debug_assert!(state.is_terminal());

    sqlx::query(
        "UPDATE job_postings
         SET sorting_state = $2, sorted_count = $3, analyzed_count = $4,
             last_activity_at = now(), updated_at = now()
         WHERE id = $1",
    )
    .bind(job_id)
    .bind(state)
    .bind(sorted_count)
    .bind(analyzed_count)
    .execute(pool)
    .await?;
    info!(%job_id, state = state.as_str(), sorted_count, "sorting pass finished");
    Ok(())
}
