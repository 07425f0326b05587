//! Episode analysis kick-off.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use tracing::debug;

use podclip_db::ClipFilter;
use podclip_models::{AnalysisResponse, ClipStatus, JobStatus};
use podclip_queue::AnalyzeEpisodeJob;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// POST /episodes/{id}/analyze
///
/// Enqueues the analysis (duplicates collapse onto the running job) and
/// waits a bounded moment for fast episodes, so small files report their
/// clip count in the immediate response. Slow analyses return with the job
/// still processing; clients poll GET /jobs/{id}.
pub async fn analyze_episode(
    State(state): State<AppState>,
    Path(episode_id): Path<i64>,
) -> ApiResult<Json<AnalysisResponse>> {
    let audio_url = state
        .directory
        .audio_url(episode_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("episode {episode_id}")))?;

    let job = state
        .queue
        .enqueue_analysis(&AnalyzeEpisodeJob::new(episode_id, &audio_url))?;

    // Bounded wait for the happy path.
    let deadline = tokio::time::Instant::now() + state.config.analysis_wait;
    let mut latest = job.clone();
    while !latest.status.is_terminal() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(POLL_INTERVAL).await;
        match state.jobs.get(job.id)? {
            Some(job) => latest = job,
            None => break,
        }
    }

    let clips_created = if latest.status == JobStatus::Completed {
        let detected = state.clips.list(&ClipFilter {
            episode_id: Some(episode_id),
            status: Some(ClipStatus::Detected),
            limit: Some(1000),
            ..Default::default()
        })?;
        Some(detected.len() as u64)
    } else {
        debug!(job_id = job.id, status = %latest.status, "Analysis still running at response time");
        None
    };

    Ok(Json(AnalysisResponse {
        job_id: job.id,
        episode_id,
        status: latest.status.as_str().to_string(),
        clips_created,
    }))
}
