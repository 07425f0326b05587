//! Job handlers binding the pipelines to the registry.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use podclip_clips::{Analyzer, ClipError, ExtractionPipeline, FailureKind, WaveformGenerator};
use podclip_models::JobType;
use podclip_queue::{
    AnalyzeEpisodeJob, ExtractClipJob, HandlerError, HandlerRegistry, HandlerResult, JobContext,
    JobHandler, WaveformJob,
};

use crate::config::WorkerConfig;

/// Build the process-wide handler registry.
///
/// `transcription_generation` is intentionally absent: the transcription
/// engine lives outside this service, so those jobs park as
/// permanently_failed until one is wired up.
pub fn build_registry(
    config: &WorkerConfig,
    extraction: ExtractionPipeline,
    analyzer: Analyzer,
    waveforms: WaveformGenerator,
) -> HandlerRegistry {
    HandlerRegistry::new()
        .register(
            JobType::ClipExtraction,
            Arc::new(ExtractionHandler { pipeline: extraction }),
            config.extraction_timeout,
        )
        .register(
            JobType::EpisodeAnalysis,
            Arc::new(AnalysisHandler { analyzer }),
            config.analysis_timeout,
        )
        .register(
            JobType::WaveformGeneration,
            Arc::new(WaveformHandler { waveforms }),
            config.waveform_timeout,
        )
}

fn to_handler_error(e: ClipError) -> HandlerError {
    if e.is_retryable() {
        HandlerError::retryable(e.failure_message())
    } else {
        HandlerError::permanent(e.failure_message())
    }
}

/// Runs clip extractions.
struct ExtractionHandler {
    pipeline: ExtractionPipeline,
}

#[async_trait]
impl JobHandler for ExtractionHandler {
    async fn run(&self, ctx: JobContext) -> HandlerResult {
        let job = ExtractClipJob::from_payload(&ctx.job.payload)
            .map_err(|e| HandlerError::permanent(format!("validation:bad_payload: {e}")))?;

        match self
            .pipeline
            .run(&job.clip_uuid, &ctx.progress, ctx.cancel.clone(), ctx.job.attempts > 0)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                // Transcode failures get one retry; everything else runs
                // out the job's attempt budget.
                let processing_exhausted =
                    e.kind() == FailureKind::Processing && ctx.job.attempts >= 1;
                let retryable = e.is_retryable() && !processing_exhausted;

                // The pipeline leaves the clip failed; put it back in the
                // queue when the job still has attempts coming.
                if retryable && ctx.job.attempts + 1 < ctx.job.max_attempts {
                    self.pipeline.requeue(&job.clip_uuid).map_err(|requeue_err| {
                        HandlerError::permanent(requeue_err.failure_message())
                    })?;
                }

                let message = e.failure_message();
                if retryable {
                    Err(HandlerError::retryable(message))
                } else {
                    Err(HandlerError::permanent(message))
                }
            }
        }
    }
}

/// Runs episode analyses.
struct AnalysisHandler {
    analyzer: Analyzer,
}

#[async_trait]
impl JobHandler for AnalysisHandler {
    async fn run(&self, ctx: JobContext) -> HandlerResult {
        let job = AnalyzeEpisodeJob::from_payload(&ctx.job.payload)
            .map_err(|e| HandlerError::permanent(format!("validation:bad_payload: {e}")))?;

        let outcome = self
            .analyzer
            .analyze(job.episode_id, &job.audio_url, &ctx.progress, ctx.cancel.clone())
            .await
            .map_err(to_handler_error)?;

        info!(
            episode_id = outcome.episode_id,
            clips_created = outcome.clip_uuids.len(),
            "Analysis job finished"
        );
        Ok(())
    }
}

/// Runs waveform generation.
struct WaveformHandler {
    waveforms: WaveformGenerator,
}

#[async_trait]
impl JobHandler for WaveformHandler {
    async fn run(&self, ctx: JobContext) -> HandlerResult {
        let job = WaveformJob::from_payload(&ctx.job.payload)
            .map_err(|e| HandlerError::permanent(format!("validation:bad_payload: {e}")))?;

        self.waveforms
            .generate(job.episode_id, &job.audio_url, &ctx.progress, ctx.cancel.clone())
            .await
            .map_err(to_handler_error)?;
        Ok(())
    }
}
