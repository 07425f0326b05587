//! The worker pool.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use podclip_db::JobStore;
use podclip_models::JobRecord;
use podclip_queue::{HandlerRegistry, JobContext, ProgressReporter};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;

/// Retry backoff base (doubles per consumed attempt).
const RETRY_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Retry backoff cap.
const RETRY_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Fixed-size pool of claim-dispatch loops over one job store.
pub struct WorkerPool {
    config: WorkerConfig,
    store: JobStore,
    registry: Arc<HandlerRegistry>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn new(config: WorkerConfig, store: JobStore, registry: HandlerRegistry) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            store,
            registry: Arc::new(registry),
            shutdown,
        }
    }

    /// A receiver handlers can watch for pool shutdown.
    pub fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Signal shutdown; `run` drains and returns.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Run the pool until shutdown is signalled.
    ///
    /// Crash recovery happens up front: processing rows older than the
    /// stale threshold are re-pended before any worker claims, so jobs
    /// orphaned by the previous process reappear exactly once.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            workers = self.config.count,
            "Starting worker pool ({} handler types)",
            self.registry.registered_types().len()
        );

        let reclaimed = self.store.reclaim_stale(to_chrono(self.config.stale_reclaim_after))?;
        if reclaimed > 0 {
            info!(count = reclaimed, "Recovered jobs from previous run");
        }

        let mut tasks = JoinSet::new();

        // Periodic stale sweep while the pool runs.
        {
            let store = self.store.clone();
            let threshold = to_chrono(self.config.stale_reclaim_after);
            let interval = self.config.reclaim_interval;
            let mut shutdown_rx = self.shutdown.subscribe();
            tasks.spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = ticker.tick() => {
                            if let Err(e) = store.reclaim_stale(threshold) {
                                warn!("Stale sweep failed: {e}");
                            }
                        }
                    }
                }
            });
        }

        for index in 0..self.config.count {
            let store = self.store.clone();
            let registry = Arc::clone(&self.registry);
            let config = self.config.clone();
            let shutdown_rx = self.shutdown.subscribe();
            tasks.spawn(async move {
                worker_loop(index, store, registry, config, shutdown_rx).await;
            });
        }

        // Block until shutdown, then give in-flight handlers their grace.
        let mut shutdown_rx = self.shutdown.subscribe();
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }

        info!("Shutdown signalled; draining workers");
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.config.shutdown_grace, drain)
            .await
            .is_err()
        {
            warn!("Shutdown grace expired; abandoning in-flight jobs");
            tasks.abort_all();
        }

        info!("Worker pool stopped");
        Ok(())
    }
}

async fn worker_loop(
    index: usize,
    store: JobStore,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let worker_id = format!("worker-{index}");
    debug!(worker = %worker_id, "Worker online");

    while !*shutdown_rx.borrow() {
        let claimed = match store.claim_next(&worker_id) {
            Ok(claimed) => claimed,
            Err(e) => {
                // Store trouble fails the claim, not the pool.
                error!(worker = %worker_id, "Claim failed: {e}");
                None
            }
        };

        match claimed {
            Some(job) => {
                process_job(&store, &registry, job, shutdown_rx.clone()).await;
            }
            None => {
                let idle = jittered(config.idle_backoff_min, config.idle_backoff_max);
                tokio::select! {
                    _ = shutdown_rx.changed() => {}
                    _ = tokio::time::sleep(idle) => {}
                }
            }
        }
    }

    debug!(worker = %worker_id, "Worker offline");
}

/// Dispatch one claimed job and record the verdict.
async fn process_job(
    store: &JobStore,
    registry: &HandlerRegistry,
    job: JobRecord,
    cancel: watch::Receiver<bool>,
) {
    let job_id = job.id;
    let job_type = job.job_type;

    let Some(entry) = registry.get(job_type) else {
        warn!(job_id, %job_type, "No handler registered");
        if let Err(e) = store.fail_permanent(
            job_id,
            &format!("validation:no_handler: no handler registered for {job_type}"),
        ) {
            error!(job_id, "Failed to park handlerless job: {e}");
        }
        return;
    };

    info!(job_id, %job_type, attempt = job.attempts + 1, "Executing job");

    let attempts_before = job.attempts;
    let ctx = JobContext {
        job,
        progress: Arc::new(ProgressReporter::new(store.clone(), job_id)),
        cancel,
    };

    let verdict = tokio::time::timeout(entry.timeout, entry.handler.run(ctx)).await;

    let result = match verdict {
        Ok(Ok(())) => store.complete(job_id).map(|job| {
            info!(job_id, "Job completed");
            job
        }),
        Ok(Err(handler_error)) => {
            warn!(job_id, "Job failed: {}", handler_error.message);
            // The registry's per-type budget caps retries alongside the
            // row's own attempt budget.
            if handler_error.retryable && attempts_before + 1 < entry.max_attempts {
                store.fail(
                    job_id,
                    &handler_error.message,
                    Some(retry_backoff(attempts_before)),
                )
            } else {
                store.fail_permanent(job_id, &handler_error.message)
            }
        }
        Err(_elapsed) => {
            warn!(job_id, timeout = ?entry.timeout, "Job timed out");
            let message = format!("system:timeout: attempt exceeded {:?}", entry.timeout);
            if attempts_before + 1 < entry.max_attempts {
                store.fail(job_id, &message, Some(retry_backoff(attempts_before)))
            } else {
                store.fail_permanent(job_id, &message)
            }
        }
    };

    if let Err(e) = result {
        error!(job_id, "Failed to record job verdict: {e}");
    }
}

/// Exponential backoff for the next attempt: 1 s, 2 s, 4 s ... capped at 30 s.
fn retry_backoff(attempts_so_far: u32) -> chrono::Duration {
    let factor = 2u64.saturating_pow(attempts_so_far.min(16));
    let delay = RETRY_BACKOFF_BASE
        .saturating_mul(factor as u32)
        .min(RETRY_BACKOFF_CAP);
    to_chrono(delay)
}

fn jittered(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let span = (max - min).as_millis() as u64;
    let offset = rand::rng().random_range(0..=span);
    min + Duration::from_millis(offset)
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1000))
}
