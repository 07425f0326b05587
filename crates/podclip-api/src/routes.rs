//! API routes.

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::analysis::analyze_episode;
use crate::handlers::clips::{
    approve_clip, create_clip, delete_clip, list_clips, update_clip_label,
};
use crate::handlers::export::export_dataset;
use crate::handlers::health::health;
use crate::handlers::jobs::{get_job, list_jobs};
use crate::handlers::stream::{stream_direct, stream_episode};
use crate::handlers::waveform::{generate_waveform, get_waveform};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let episode_routes = Router::new()
        .route("/episodes/:id/clips", post(create_clip))
        .route("/episodes/:id/clips", get(list_clips))
        .route("/episodes/:id/clips/:uuid/approve", put(approve_clip))
        .route("/episodes/:id/clips/:uuid/label", put(update_clip_label))
        .route("/episodes/:id/clips/:uuid", delete(delete_clip))
        .route("/episodes/:id/analyze", post(analyze_episode))
        .route("/episodes/:id/waveform", post(generate_waveform))
        .route("/episodes/:id/waveform", get(get_waveform));

    let stream_routes = Router::new()
        .route("/stream/direct", get(stream_direct))
        .route("/stream/:id", get(stream_episode));

    let job_routes = Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job));

    Router::new()
        .merge(episode_routes)
        .merge(stream_routes)
        .merge(job_routes)
        .route("/clips/export", get(export_dataset))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
