pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::pipeline::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/jobs/:job_id/processing/dispatch",
            post(handlers::handle_dispatch),
        )
        .route(
            "/api/v1/jobs/:job_id/ranking",
            post(handlers::handle_ranking_request),
        )
        .route(
            "/api/v1/jobs/:job_id/ranking/status",
            get(handlers::handle_ranking_status),
        )
        .route(
            "/api/v1/jobs/:job_id/shortlist",
            get(handlers::handle_shortlist),
        )
        .with_state(state)
}
