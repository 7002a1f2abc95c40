use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::queue::TaskQueue;
use crate::scoring::ResumeScorer;

/// Shared application state injected into route handlers and workers.
///
/// Both collaborators are trait objects constructed once in `main`: the queue
/// is Redis in production and an in-memory fake in tests, the scorer is the
/// LLM backend or a scripted stand-in. Nothing below `main` knows which.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<dyn TaskQueue>,
    pub scorer: Arc<dyn ResumeScorer>,
    pub config: Config,
}
