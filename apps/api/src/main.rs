mod auth;
mod config;
mod db;
mod errors;
mod models;
mod pipeline;
mod queue;
mod routes;
mod scoring;
mod state;
mod store;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::pipeline::worker::run_worker;
use crate::queue::RedisQueue;
use crate::routes::build_router;
use crate::scoring::LlmResumeScorer;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_BIN_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Hireworks pipeline API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize the Redis task queue
    let queue = Arc::new(RedisQueue::new(&config.redis_url)?);
    info!("Task queue initialized");

    // Initialize the scoring collaborator
    let scorer = Arc::new(LlmResumeScorer::new(config.anthropic_api_key.clone()));
    info!("Scoring client initialized (model: {})", scoring::MODEL);

    // Build app state
    let state = AppState {
        db,
        queue,
        scorer,
        config: config.clone(),
    };

    // Spawn the worker pool; workers share the pool and queue with the
    // request path and coordinate purely through resume status rows.
    for worker_id in 0..config.worker_count {
        tokio::spawn(run_worker(state.clone(), worker_id));
    }
    info!("Spawned {} workers", config.worker_count);

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn default_log_filter_prefix_matches_event_targets() {
        // Event targets start with the crate name; a mismatched filter
        // prefix would silence our own logs by default.
        let crate_target = module_path!().split("::").next().unwrap();
        assert_eq!(env!("CARGO_BIN_NAME"), crate_target);
    }
}
