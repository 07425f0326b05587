//! API and service configuration.

use std::time::Duration;

use podclip_media::EnvelopeParams;

/// Service configuration, env-driven with workable defaults.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// SQLite database file
    pub database_path: String,
    /// Root for extracted clips (`<root>/<label>/clip_<uuid>.wav`)
    pub storage_path: String,
    /// Scratch space for downloads and transcoding
    pub temp_dir: String,
    /// Download cache for analysis/waveform jobs
    pub audio_cache_dir: String,
    /// Byte budget for the download cache
    pub audio_cache_max_bytes: u64,
    /// Output clip length in seconds
    pub target_duration: f64,
    /// Attempt budget for newly enqueued jobs
    pub jobs_default_max_attempts: u32,
    /// Base URL of the episode directory collaborator
    pub episode_directory_url: Option<String>,
    /// Volume-spike detection parameters
    pub analysis: EnvelopeParams,
    /// How long POST /analyze waits for a fast analysis before returning
    pub analysis_wait: Duration,
    /// Hosts exempt from the SSRF policy (development fixtures only)
    pub fetch_allow_private_hosts: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_path: "podclip.db".to_string(),
            storage_path: "./clips".to_string(),
            temp_dir: std::env::temp_dir()
                .join("podclip")
                .to_string_lossy()
                .to_string(),
            audio_cache_dir: std::env::temp_dir()
                .join("podclip-cache")
                .to_string_lossy()
                .to_string(),
            audio_cache_max_bytes: 2 * 1024 * 1024 * 1024,
            target_duration: 15.0,
            jobs_default_max_attempts: podclip_models::DEFAULT_MAX_ATTEMPTS,
            episode_directory_url: None,
            analysis: EnvelopeParams::default(),
            analysis_wait: Duration::from_secs(25),
            fetch_allow_private_hosts: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_str("API_HOST", &defaults.host),
            port: env_parse("API_PORT", defaults.port),
            database_path: env_str("DATABASE_PATH", &defaults.database_path),
            storage_path: env_str("CLIPS_STORAGE_PATH", &defaults.storage_path),
            temp_dir: env_str("CLIPS_TEMP_DIR", &defaults.temp_dir),
            audio_cache_dir: env_str("AUDIO_CACHE_DIR", &defaults.audio_cache_dir),
            audio_cache_max_bytes: env_parse(
                "AUDIO_CACHE_MAX_BYTES",
                defaults.audio_cache_max_bytes,
            ),
            target_duration: env_parse("CLIPS_TARGET_DURATION_SECS", defaults.target_duration),
            jobs_default_max_attempts: env_parse(
                "JOBS_DEFAULT_MAX_ATTEMPTS",
                defaults.jobs_default_max_attempts,
            ),
            episode_directory_url: std::env::var("EPISODE_DIRECTORY_URL").ok(),
            analysis: EnvelopeParams {
                window_s: env_parse("ANALYSIS_WINDOW_SECS", defaults.analysis.window_s),
                hop_s: env_parse("ANALYSIS_HOP_SECS", defaults.analysis.hop_s),
                k: env_parse("ANALYSIS_PEAK_K", defaults.analysis.k),
                min_width_s: env_parse("ANALYSIS_MIN_WIDTH_SECS", defaults.analysis.min_width_s),
                merge_gap_s: env_parse("ANALYSIS_MERGE_GAP_SECS", defaults.analysis.merge_gap_s),
            },
            analysis_wait: Duration::from_secs(env_parse(
                "ANALYSIS_WAIT_SECS",
                defaults.analysis_wait.as_secs(),
            )),
            fetch_allow_private_hosts: std::env::var("FETCH_ALLOW_PRIVATE_HOSTS")
                .map(|s| {
                    s.split(',')
                        .map(|h| h.trim().to_string())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
