//! Application state.
//!
//! Process singletons (HTTP client, job store, clip store) are built once
//! here and injected everywhere; nothing initializes itself on first use.

use std::sync::Arc;

use podclip_clips::{Analyzer, AudioCache, ClipService, ExtractionPipeline, WaveformGenerator};
use podclip_db::{ClipRepository, Database, JobStore};
use podclip_media::{AudioFetcher, FetchConfig};
use podclip_queue::JobQueue;
use podclip_storage::ClipStore;

use crate::config::ApiConfig;
use crate::directory::{EpisodeDirectory, HttpEpisodeDirectory, StaticEpisodeDirectory};
use crate::error::{ApiError, ApiResult};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub jobs: JobStore,
    pub queue: JobQueue,
    pub clips: ClipService,
    pub fetcher: AudioFetcher,
    pub audio_cache: AudioCache,
    pub directory: Arc<dyn EpisodeDirectory>,
}

impl AppState {
    /// Build state from config, opening the database and storage roots.
    pub fn new(config: ApiConfig) -> ApiResult<Self> {
        let directory: Arc<dyn EpisodeDirectory> = match &config.episode_directory_url {
            Some(base) => Arc::new(HttpEpisodeDirectory::new(base)?),
            None => Arc::new(StaticEpisodeDirectory::default()),
        };
        Self::with_directory(config, directory)
    }

    /// Build state with an explicit directory implementation (tests).
    pub fn with_directory(
        config: ApiConfig,
        directory: Arc<dyn EpisodeDirectory>,
    ) -> ApiResult<Self> {
        let db = Arc::new(
            Database::open(&config.database_path)
                .map_err(|e| ApiError::internal(format!("open database: {e}")))?,
        );
        let jobs = JobStore::new(Arc::clone(&db))
            .with_default_max_attempts(config.jobs_default_max_attempts);
        let clip_repo = ClipRepository::new(db);
        let queue = JobQueue::new(jobs.clone());

        let store = ClipStore::new(&config.storage_path, &config.temp_dir)
            .map_err(|e| ApiError::internal(format!("init clip store: {e}")))?;
        let fetcher = AudioFetcher::new(FetchConfig {
            allow_private_hosts: config.fetch_allow_private_hosts.clone(),
            ..Default::default()
        })
        .map_err(|e| ApiError::internal(format!("init fetcher: {e}")))?;
        let audio_cache = AudioCache::new(&config.audio_cache_dir)
            .map_err(|e| ApiError::internal(format!("init audio cache: {e}")))?
            .with_max_bytes(config.audio_cache_max_bytes);

        let clips = ClipService::new(clip_repo, store, queue.clone());

        Ok(Self {
            config: Arc::new(config),
            jobs,
            queue,
            clips,
            fetcher,
            audio_cache,
            directory,
        })
    }

    /// Extraction pipeline wired from this state (used by the worker pool).
    pub fn extraction_pipeline(&self) -> ExtractionPipeline {
        ExtractionPipeline::new(
            self.clips.repository().clone(),
            self.clips.store().clone(),
            self.fetcher.clone(),
            self.config.target_duration,
        )
    }

    /// Analyzer wired from this state.
    pub fn analyzer(&self) -> Analyzer {
        Analyzer::new(
            self.clips.repository().clone(),
            self.fetcher.clone(),
            self.audio_cache.clone(),
            self.config.analysis.clone(),
        )
    }

    /// Waveform generator wired from this state.
    pub fn waveform_generator(&self) -> WaveformGenerator {
        WaveformGenerator::new(
            self.fetcher.clone(),
            self.audio_cache.clone(),
            self.clips.store().clone(),
        )
    }
}
