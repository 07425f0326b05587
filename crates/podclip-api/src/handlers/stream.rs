//! Range-preserving audio streaming.
//!
//! `/stream/{id}` proxies an episode's audio by directory lookup;
//! `/stream/direct` proxies an arbitrary URL under the SSRF policy. Both
//! relay upstream status and caching headers so range requests behave as
//! if the client talked to the source directly.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::Response;
use serde::Deserialize;
use tracing::debug;

use podclip_media::Upstream;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct DirectStreamQuery {
    pub url: String,
}

/// GET/HEAD /stream/{id}
pub async fn stream_episode(
    State(state): State<AppState>,
    Path(episode_id): Path<i64>,
    method: Method,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let audio_url = state
        .directory
        .audio_url(episode_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("episode {episode_id}")))?;

    proxy(&state, &method, &headers, &audio_url).await
}

/// GET/HEAD /stream/direct?url=
pub async fn stream_direct(
    State(state): State<AppState>,
    Query(query): Query<DirectStreamQuery>,
    method: Method,
    headers: HeaderMap,
) -> ApiResult<Response> {
    proxy(&state, &method, &headers, &query.url).await
}

async fn proxy(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    url: &str,
) -> ApiResult<Response> {
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    debug!(url, range = range.unwrap_or("-"), "Proxying audio");

    if method == Method::HEAD {
        let upstream = state.fetcher.head(url, range).await?;
        return build_response(upstream, true);
    }

    let upstream = state.fetcher.open(url, range).await?;
    build_response(upstream, false)
}

fn build_response(upstream: Upstream, head_only: bool) -> ApiResult<Response> {
    // reqwest and axum share the same http types, so status and headers
    // relay without conversion.
    let status: StatusCode = upstream.status;
    let relayed = upstream.relay_headers();

    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in relayed.iter() {
            headers.insert(name.clone(), value.clone());
        }
    }

    let body = if head_only {
        Body::empty()
    } else {
        // Disconnects surface as stream errors inside hyper and end the
        // relay; they never reach a handler to be logged as failures.
        Body::from_stream(upstream.into_chunked_stream())
    };

    builder
        .body(body)
        .map_err(|e| ApiError::internal(format!("build proxy response: {e}")))
}
