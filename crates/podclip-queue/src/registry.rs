//! Handler registry: job type to processing function, with per-type policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use podclip_models::{JobRecord, JobType, DEFAULT_MAX_ATTEMPTS};

use crate::progress::ProgressReporter;

/// Everything a handler gets for one attempt.
pub struct JobContext {
    pub job: JobRecord,
    pub progress: Arc<ProgressReporter>,
    /// Flips to true on pool shutdown; handlers observe it at I/O boundaries.
    pub cancel: watch::Receiver<bool>,
}

/// A handler failure, already classified for the retry policy.
#[derive(Debug)]
pub struct HandlerError {
    /// Canonical `"<type>:<code>: <human>"` text stored on the job row
    pub message: String,
    /// Whether another attempt could plausibly succeed
    pub retryable: bool,
}

impl HandlerError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerError {}

pub type HandlerResult = Result<(), HandlerError>;

/// A processing function for one job type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, ctx: JobContext) -> HandlerResult;
}

/// Per-type dispatch entry.
#[derive(Clone)]
pub struct HandlerEntry {
    pub handler: Arc<dyn JobHandler>,
    /// Attempt timeout; exceeding it fails the attempt as retryable
    pub timeout: Duration,
    /// Attempt budget applied at enqueue time for this type
    pub max_attempts: u32,
}

/// Immutable map from job type to handler.
///
/// Built once at startup; workers only read it afterwards.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    entries: HashMap<JobType, HandlerEntry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler with the default attempt budget.
    pub fn register(
        self,
        job_type: JobType,
        handler: Arc<dyn JobHandler>,
        timeout: Duration,
    ) -> Self {
        self.register_inner(job_type, handler, timeout, DEFAULT_MAX_ATTEMPTS)
    }

    /// Register a handler with an explicit attempt budget.
    pub fn register_with_attempts(
        self,
        job_type: JobType,
        handler: Arc<dyn JobHandler>,
        timeout: Duration,
        max_attempts: u32,
    ) -> Self {
        self.register_inner(job_type, handler, timeout, max_attempts)
    }

    fn register_inner(
        mut self,
        job_type: JobType,
        handler: Arc<dyn JobHandler>,
        timeout: Duration,
        max_attempts: u32,
    ) -> Self {
        self.entries.insert(
            job_type,
            HandlerEntry {
                handler,
                timeout,
                max_attempts: max_attempts.max(1),
            },
        );
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<&HandlerEntry> {
        self.entries.get(&job_type)
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        self.entries.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl JobHandler for NoopHandler {
        async fn run(&self, _ctx: JobContext) -> HandlerResult {
            Ok(())
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = HandlerRegistry::new()
            .register(
                JobType::ClipExtraction,
                Arc::new(NoopHandler),
                Duration::from_secs(300),
            )
            .register_with_attempts(
                JobType::EpisodeAnalysis,
                Arc::new(NoopHandler),
                Duration::from_secs(900),
                2,
            );

        assert!(registry.get(JobType::ClipExtraction).is_some());
        assert_eq!(
            registry.get(JobType::EpisodeAnalysis).unwrap().max_attempts,
            2
        );
        // Transcription has no engine wired up.
        assert!(registry.get(JobType::TranscriptionGeneration).is_none());
    }
}
