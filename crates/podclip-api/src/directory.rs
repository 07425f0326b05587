//! Episode directory seam.
//!
//! The upstream podcast directory is a collaborator; the core only ever
//! asks it one question: which audio URL belongs to an episode id.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ApiError, ApiResult};

/// Resolves external episode ids to their audio URLs.
#[async_trait]
pub trait EpisodeDirectory: Send + Sync {
    /// `None` means the directory does not know the episode.
    async fn audio_url(&self, episode_id: i64) -> ApiResult<Option<String>>;
}

/// HTTP client against the configured directory service.
pub struct HttpEpisodeDirectory {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct EpisodeDoc {
    audio_url: Option<String>,
}

impl HttpEpisodeDirectory {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::internal(format!("directory client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl EpisodeDirectory for HttpEpisodeDirectory {
    async fn audio_url(&self, episode_id: i64) -> ApiResult<Option<String>> {
        let url = format!(
            "{}/episodes/{episode_id}",
            self.base_url.trim_end_matches('/')
        );
        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!("Episode directory unreachable: {e}");
            ApiError::BadGateway(format!("episode directory: {e}"))
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ApiError::BadGateway(format!(
                "episode directory returned {}",
                response.status()
            )));
        }

        let doc: EpisodeDoc = response
            .json()
            .await
            .map_err(|e| ApiError::BadGateway(format!("episode directory: {e}")))?;
        Ok(doc.audio_url)
    }
}

/// In-memory directory for tests and demos.
#[derive(Default)]
pub struct StaticEpisodeDirectory {
    episodes: HashMap<i64, String>,
}

impl StaticEpisodeDirectory {
    pub fn new(episodes: impl IntoIterator<Item = (i64, String)>) -> Self {
        Self {
            episodes: episodes.into_iter().collect(),
        }
    }
}

#[async_trait]
impl EpisodeDirectory for StaticEpisodeDirectory {
    async fn audio_url(&self, episode_id: i64) -> ApiResult<Option<String>> {
        Ok(self.episodes.get(&episode_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_directory_resolves_episodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/episodes/12345"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 12345,
                "audio_url": "https://cdn.example/ep.mp3",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/episodes/404404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let directory = HttpEpisodeDirectory::new(server.uri()).unwrap();
        assert_eq!(
            directory.audio_url(12345).await.unwrap(),
            Some("https://cdn.example/ep.mp3".to_string())
        );
        assert_eq!(directory.audio_url(404404).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_static_directory() {
        let directory =
            StaticEpisodeDirectory::new([(7, "https://cdn.example/seven.mp3".to_string())]);
        assert!(directory.audio_url(7).await.unwrap().is_some());
        assert!(directory.audio_url(8).await.unwrap().is_none());
    }
}
