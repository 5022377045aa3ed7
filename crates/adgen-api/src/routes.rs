//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::artifacts::get_artifact;
use crate::handlers::broll::{describe_broll, import_broll, list_broll};
use crate::handlers::commercials::{compose_commercial, run_pipeline};
use crate::handlers::health::{health, ready};
use crate::handlers::images::generate_images;
use crate::handlers::jobs::{get_job, list_jobs};
use crate::handlers::loras::{list_loras, train_lora};
use crate::handlers::songs::{generate_song, song_quota};
use crate::handlers::styles::list_styles;
use crate::handlers::videos::{generate_videos, list_generations};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;
use crate::ws::job_progress_ws;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Generation routes fan out into paid vendor calls; rate limit them.
    let rate_limiter = std::sync::Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    let generation_routes = Router::new()
        .route("/loras/train", post(train_lora))
        .route("/images/generate", post(generate_images))
        .route("/videos/generate", post(generate_videos))
        .route("/songs/generate", post(generate_song))
        .route("/broll/describe", post(describe_broll))
        .route("/commercials/compose", post(compose_commercial))
        .route("/commercials/pipeline", post(run_pipeline))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let read_routes = Router::new()
        .route("/loras", get(list_loras))
        .route("/songs/quota", get(song_quota))
        .route("/broll", get(list_broll))
        .route("/styles", get(list_styles))
        .route("/generations", get(list_generations))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/ws", get(job_progress_ws))
        .route("/artifacts/*path", get(get_artifact));

    let upload_routes = Router::new().route("/broll/import", post(import_broll));

    let api_routes = Router::new()
        .merge(generation_routes)
        .merge(read_routes)
        .merge(upload_routes);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Uploads can carry whole training archives
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
