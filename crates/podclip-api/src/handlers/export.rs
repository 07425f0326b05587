//! Dataset export handler.

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::Response;
use tracing::info;

use podclip_storage::{stream_dataset_zip, ExportEntry};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /clips/export
///
/// Streams a ZIP of every ready clip plus a JSONL manifest.
pub async fn export_dataset(State(state): State<AppState>) -> ApiResult<Response> {
    let ready = state.clips.repository().list_ready()?;

    let mut entries = Vec::with_capacity(ready.len());
    for clip in &ready {
        let path = state.clips.store().clip_path(&clip.label, &clip.uuid)?;
        entries.push(ExportEntry {
            uuid: clip.uuid,
            label: clip.label.clone(),
            path,
            duration: clip.clip_duration,
            original_start_time: clip.original_start_time,
            original_end_time: clip.original_end_time,
            source_episode_url: clip.source_episode_url.clone(),
            podcast_index_episode_id: clip.podcast_index_episode_id,
        });
    }

    info!(clips = entries.len(), "Starting dataset export");
    let stream = stream_dataset_zip(entries, state.clips.store().temp_dir()).await?;

    Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"podclip_dataset.zip\"",
        )
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(format!("build export response: {e}")))
}
