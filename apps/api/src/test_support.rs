//! Shared fixtures for store-backed tests. Each `#[sqlx::test]` runs against
//! its own freshly migrated database.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::config::Config;
use crate::models::job::SortingState;
use crate::models::resume::ResumeStatus;
use crate::pipeline::worker;
use crate::queue::MemoryQueue;
use crate::scoring::ResumeScorer;
use crate::state::AppState;

pub fn ctx(tenant_id: Uuid) -> RequestContext {
    RequestContext {
        tenant_id,
        user_id: Uuid::new_v4(),
    }
}

pub fn app_state(pool: PgPool, queue: Arc<MemoryQueue>, scorer: Arc<dyn ResumeScorer>) -> AppState {
    AppState {
        db: pool,
        queue,
        scorer,
        config: Config {
            database_url: String::new(),
            redis_url: String::new(),
            anthropic_api_key: String::new(),
            port: 0,
            worker_count: 1,
            rust_log: "info".to_string(),
        },
    }
}

pub async fn insert_job(pool: &PgPool, tenant_id: Uuid, top_candidates: Option<i64>) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO job_postings (tenant_id, title, requirements)
         VALUES ($1, $2,
                 jsonb_build_object('required_skills', '[]'::jsonb,
                                    'top_candidates', $3::bigint))
         RETURNING id",
    )
    .bind(tenant_id)
    .bind("Backend Engineer")
    .bind(top_candidates)
    .fetch_one(pool)
    .await
    .expect("insert job")
}

pub async fn insert_resume(
    pool: &PgPool,
    tenant_id: Uuid,
    job_id: Uuid,
    status: ResumeStatus,
    source_key: &str,
) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO resumes (tenant_id, job_id, candidate_id, status, source_key)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id",
    )
    .bind(tenant_id)
    .bind(job_id)
    .bind(Uuid::new_v4())
    .bind(status)
    .bind(source_key)
    .fetch_one(pool)
    .await
    .expect("insert resume")
}

/// Inserts an already-scored resume; `completed_secs_ago` backdates
/// `updated_at` so ranking tie-breaks are deterministic across rows.
pub async fn insert_completed_resume(
    pool: &PgPool,
    tenant_id: Uuid,
    job_id: Uuid,
    score: f64,
    completed_secs_ago: f64,
) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO resumes (tenant_id, job_id, candidate_id, status, overall_score,
                              source_key, updated_at, processed_at)
         VALUES ($1, $2, $3, 'completed', $4, $5,
                 now() - make_interval(secs => $6),
                 now() - make_interval(secs => $6))
         RETURNING id",
    )
    .bind(tenant_id)
    .bind(job_id)
    .bind(Uuid::new_v4())
    .bind(score)
    .bind(format!("resumes/{}.pdf", Uuid::new_v4()))
    .bind(completed_secs_ago)
    .fetch_one(pool)
    .await
    .expect("insert completed resume")
}

pub async fn resume_status(pool: &PgPool, resume_id: Uuid) -> ResumeStatus {
    sqlx::query_scalar("SELECT status FROM resumes WHERE id = $1")
        .bind(resume_id)
        .fetch_one(pool)
        .await
        .expect("resume status")
}

pub async fn job_sorting(pool: &PgPool, job_id: Uuid) -> (SortingState, i64, i64) {
    sqlx::query_as(
        "SELECT sorting_state, sorted_count, analyzed_count FROM job_postings WHERE id = $1",
    )
    .bind(job_id)
    .fetch_one(pool)
    .await
    .expect("job sorting state")
}

/// Runs the worker poll loop until both queues are empty.
pub async fn drain(state: &AppState) {
    while worker::poll_once(state).await.expect("worker poll") {}
}
