//! Worker configuration.

use std::time::Duration;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of parallel workers
    pub count: usize,
    /// Idle backoff lower bound when the queue is empty
    pub idle_backoff_min: Duration,
    /// Idle backoff upper bound
    pub idle_backoff_max: Duration,
    /// Age after which a processing row is considered abandoned
    pub stale_reclaim_after: Duration,
    /// Interval between stale sweeps
    pub reclaim_interval: Duration,
    /// Grace period for in-flight handlers at shutdown
    pub shutdown_grace: Duration,
    /// Clip extraction attempt timeout
    pub extraction_timeout: Duration,
    /// Episode analysis attempt timeout
    pub analysis_timeout: Duration,
    /// Waveform generation attempt timeout
    pub waveform_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 4,
            idle_backoff_min: Duration::from_millis(250),
            idle_backoff_max: Duration::from_secs(2),
            stale_reclaim_after: Duration::from_secs(600),
            reclaim_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(30),
            extraction_timeout: Duration::from_secs(600),
            analysis_timeout: Duration::from_secs(1800),
            waveform_timeout: Duration::from_secs(900),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            count: env_parse("WORKER_COUNT", defaults.count),
            idle_backoff_min: Duration::from_millis(env_parse(
                "WORKER_IDLE_BACKOFF_MIN_MS",
                defaults.idle_backoff_min.as_millis() as u64,
            )),
            idle_backoff_max: Duration::from_millis(env_parse(
                "WORKER_IDLE_BACKOFF_MAX_MS",
                defaults.idle_backoff_max.as_millis() as u64,
            )),
            stale_reclaim_after: Duration::from_secs(env_parse(
                "JOBS_STALE_RECLAIM_SECS",
                defaults.stale_reclaim_after.as_secs(),
            )),
            reclaim_interval: Duration::from_secs(env_parse(
                "WORKER_RECLAIM_INTERVAL_SECS",
                defaults.reclaim_interval.as_secs(),
            )),
            shutdown_grace: Duration::from_secs(env_parse(
                "WORKER_SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace.as_secs(),
            )),
            extraction_timeout: Duration::from_secs(env_parse(
                "WORKER_EXTRACTION_TIMEOUT_SECS",
                defaults.extraction_timeout.as_secs(),
            )),
            analysis_timeout: Duration::from_secs(env_parse(
                "WORKER_ANALYSIS_TIMEOUT_SECS",
                defaults.analysis_timeout.as_secs(),
            )),
            waveform_timeout: Duration::from_secs(env_parse(
                "WORKER_WAVEFORM_TIMEOUT_SECS",
                defaults.waveform_timeout.as_secs(),
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
