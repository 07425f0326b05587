//! Waveform preview endpoints.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;

use podclip_models::JobResponse;
use podclip_queue::WaveformJob;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// POST /episodes/{id}/waveform
///
/// Queues waveform generation for an episode; duplicates collapse onto the
/// running job.
pub async fn generate_waveform(
    State(state): State<AppState>,
    Path(episode_id): Path<i64>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    let audio_url = state
        .directory
        .audio_url(episode_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("episode {episode_id}")))?;

    let job = state
        .queue
        .enqueue_waveform(&WaveformJob::new(episode_id, &audio_url))?;
    Ok((StatusCode::ACCEPTED, Json(JobResponse::from(&job))))
}

/// GET /episodes/{id}/waveform
///
/// Serves the cached preview once generation has completed.
pub async fn get_waveform(
    State(state): State<AppState>,
    Path(episode_id): Path<i64>,
) -> ApiResult<Response> {
    let path = state.waveform_generator().waveform_path(episode_id);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found(format!(
                "waveform for episode {episode_id}"
            )));
        }
        Err(e) => return Err(ApiError::internal(format!("read waveform: {e}"))),
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(bytes))
        .map_err(|e| ApiError::internal(format!("build waveform response: {e}")))
}
