use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::errors::AppError;
use crate::pipeline::dispatcher::{self, DispatchOutcome};
use crate::pipeline::ranking::{self, RankingAck};
use crate::pipeline::status::{self, Shortlist, SortingStatus};
use crate::state::AppState;

/// POST /api/v1/jobs/:job_id/processing/dispatch
pub async fn handle_dispatch(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(job_id): Path<Uuid>,
) -> Result<Json<DispatchOutcome>, AppError> {
    let outcome =
        dispatcher::dispatch_processing(&state.db, state.queue.as_ref(), &ctx, job_id).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Default, Deserialize)]
pub struct RankingRequestBody {
    #[serde(default)]
    pub top_candidates: Option<i64>,
}

/// POST /api/v1/jobs/:job_id/ranking
/// The body is optional; an absent or empty `top_candidates` ranks everyone.
pub async fn handle_ranking_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(job_id): Path<Uuid>,
    body: Option<Json<RankingRequestBody>>,
) -> Result<Json<RankingAck>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let ack = ranking::request_ranking(
        &state.db,
        state.queue.as_ref(),
        &ctx,
        job_id,
        body.top_candidates,
    )
    .await?;
    Ok(Json(ack))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub task_id: Option<String>,
}

/// GET /api/v1/jobs/:job_id/ranking/status
pub async fn handle_ranking_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(job_id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<SortingStatus>, AppError> {
    let status = status::sorting_status(
        &state.db,
        state.queue.as_ref(),
        &ctx,
        job_id,
        query.task_id.as_deref(),
    )
    .await?;
    Ok(Json(status))
}

/// GET /api/v1/jobs/:job_id/shortlist
pub async fn handle_shortlist(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Shortlist>, AppError> {
    let shortlist = status::shortlist(&state.db, &ctx, job_id).await?;
    Ok(Json(shortlist))
}
