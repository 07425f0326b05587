//! Job inspection handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use podclip_models::{JobResponse, JobStatus, JobType};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct ListJobsQuery {
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
}

/// GET /jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<JobResponse>> {
    let job = state
        .jobs
        .get(id)?
        .ok_or_else(|| ApiError::not_found(format!("job {id}")))?;
    Ok(Json(JobResponse::from(&job)))
}

/// GET /jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<JobResponse>>> {
    let job_type = query
        .job_type
        .as_deref()
        .map(|raw| {
            JobType::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown job type {raw:?}")))
        })
        .transpose()?;
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            JobStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status {raw:?}")))
        })
        .transpose()?;

    let jobs = state
        .jobs
        .list(job_type, status, query.limit.unwrap_or(100))?;
    Ok(Json(jobs.iter().map(JobResponse::from).collect()))
}
