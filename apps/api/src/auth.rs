//! Request-scoped tenant resolution.
//!
//! Every pipeline operation starts from a [`RequestContext`]; handlers never
//! re-do token lookups themselves. The extractor runs the session query once
//! per request and hands the resolved identity to components by value, so the
//! pipeline contracts stay free of transport concerns.

use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

/// Resolved identity for one inbound request.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
}

#[async_trait::async_trait]
impl FromRequestParts<AppState> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;
        let token = bearer_token(header).ok_or(AppError::Unauthorized)?;
        resolve_session(&state.db, token).await
    }
}

/// Looks the bearer token up in `api_sessions`. Unknown or expired tokens are
/// indistinguishable to the caller.
pub async fn resolve_session(pool: &PgPool, token: &str) -> Result<RequestContext, AppError> {
    let session: Option<(Uuid, Uuid)> = sqlx::query_as(
        "SELECT tenant_id, user_id FROM api_sessions WHERE token = $1 AND expires_at > now()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    session
        .map(|(tenant_id, user_id)| RequestContext { tenant_id, user_id })
        .ok_or(AppError::Unauthorized)
}

fn bearer_token(header: &str) -> Option<&str> {
    let rest = header.strip_prefix("Bearer ")?;
    let rest = rest.trim();
    (!rest.is_empty()).then_some(rest)
}
