//! Clip CRUD handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use podclip_db::ClipFilter;
use podclip_models::{ClipResponse, ClipStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateClipRequest {
    pub start_time: f64,
    pub end_time: f64,
    pub label: String,
}

#[derive(Deserialize, Default)]
pub struct ListClipsQuery {
    pub status: Option<String>,
    pub approved: Option<bool>,
    pub label: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Deserialize)]
pub struct UpdateLabelRequest {
    pub label: String,
}

/// POST /episodes/{id}/clips
pub async fn create_clip(
    State(state): State<AppState>,
    Path(episode_id): Path<i64>,
    Json(body): Json<CreateClipRequest>,
) -> ApiResult<(StatusCode, Json<ClipResponse>)> {
    let audio_url = state
        .directory
        .audio_url(episode_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("episode {episode_id}")))?;

    let clip = state.clips.create_manual(
        episode_id,
        &audio_url,
        body.start_time,
        body.end_time,
        &body.label,
    )?;

    Ok((StatusCode::ACCEPTED, Json(ClipResponse::from(&clip))))
}

/// GET /episodes/{id}/clips
pub async fn list_clips(
    State(state): State<AppState>,
    Path(episode_id): Path<i64>,
    Query(query): Query<ListClipsQuery>,
) -> ApiResult<Json<Vec<ClipResponse>>> {
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            ClipStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status {raw:?}")))
        })
        .transpose()?;

    let filter = ClipFilter {
        episode_id: Some(episode_id),
        label: query.label,
        status,
        approved: query.approved,
        limit: query.limit,
        offset: query.offset,
    };

    let clips = state.clips.list(&filter)?;
    Ok(Json(clips.iter().map(ClipResponse::from).collect()))
}

/// PUT /episodes/{id}/clips/{uuid}/approve
pub async fn approve_clip(
    State(state): State<AppState>,
    Path((_episode_id, uuid)): Path<(i64, Uuid)>,
) -> ApiResult<Json<ClipResponse>> {
    let clip = state.clips.approve(&uuid)?;
    Ok(Json(ClipResponse::from(&clip)))
}

/// PUT /episodes/{id}/clips/{uuid}/label
pub async fn update_clip_label(
    State(state): State<AppState>,
    Path((_episode_id, uuid)): Path<(i64, Uuid)>,
    Json(body): Json<UpdateLabelRequest>,
) -> ApiResult<Json<ClipResponse>> {
    let clip = state.clips.update_label(&uuid, &body.label).await?;
    Ok(Json(ClipResponse::from(&clip)))
}

/// DELETE /episodes/{id}/clips/{uuid}
pub async fn delete_clip(
    State(state): State<AppState>,
    Path((_episode_id, uuid)): Path<(i64, Uuid)>,
) -> ApiResult<StatusCode> {
    state.clips.delete(&uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}
