//! Podclip service binary: HTTP API plus the worker pool in one process.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use podclip_api::{create_router, ApiConfig, AppState};
use podclip_worker::{build_registry, WorkerConfig, WorkerPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing; LOG_FORMAT=json switches to structured output.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("podclip=info,tower_http=info"));
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("Starting podclip");

    // The extractor and analyzer shell out to ffmpeg; fail fast when absent.
    podclip_media::check_ffmpeg().context("ffmpeg is required on PATH")?;

    let config = ApiConfig::from_env();
    let bind_addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config).map_err(|e| anyhow::anyhow!("startup failed: {e}"))?;

    // Worker pool shares the state's stores and pipelines.
    let worker_config = WorkerConfig::from_env();
    let registry = build_registry(
        &worker_config,
        state.extraction_pipeline(),
        state.analyzer(),
        state.waveform_generator(),
    );
    let pool = Arc::new(WorkerPool::new(
        worker_config,
        state.jobs.clone(),
        registry,
    ));

    let pool_task = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            if let Err(e) = pool.run().await {
                error!("Worker pool exited with error: {e}");
            }
        })
    };

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("bind {bind_addr}"))?;
    info!("Listening on {bind_addr}");

    let shutdown_pool = Arc::clone(&pool);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
            shutdown_pool.shutdown();
        })
        .await
        .context("server error")?;

    pool.shutdown();
    if let Err(e) = pool_task.await {
        warn!("Worker pool task join failed: {e}");
    }

    info!("Shutdown complete");
    Ok(())
}
