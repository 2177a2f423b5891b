//! Monolith Binary - Local deployment
//!
//! This is the main entry point for local development and single-server deployment.
//! It wires up:
//! - Local adapters (filesystem object store, Redis queue/records/ad catalog)
//! - The ffmpeg codec runner
//! - HTTP inbound adapter (uploads, HLS serving, progress WebSocket)
//! - The job workers and the daily stale-chunk sweep

use hlsforge::adapters::ffmpeg::FfmpegCodec;
use hlsforge::adapters::fs::FsObjectStore;
use hlsforge::adapters::hub::EventHub;
use hlsforge::adapters::local::http::{self, AppState};
use hlsforge::adapters::local::RedisPool;
use hlsforge::application::assembler::ChunkAssembler;
use hlsforge::application::lifecycle::StorageLifecycle;
use hlsforge::application::notifier::ProgressNotifier;
use hlsforge::application::orchestrator::TranscodeOrchestrator;
use hlsforge::application::streaming::StreamingService;
use hlsforge::application::worker::{spawn_daily_sweep, RetryPolicy, WorkerService};
use hlsforge::config::PipelineConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = PipelineConfig::from_env();

    tracing_subscriber::fmt::init();

    // 1. Adapters (Local implementations)
    let codec = FfmpegCodec::from_config(&config);
    if let Err(e) = codec.ensure_available().await {
        error!(error = %e, "cannot start without an encoder");
        std::process::exit(1);
    }

    let redis = match RedisPool::new(&config.redis_url) {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "failed to connect to Redis");
            std::process::exit(1);
        }
    };

    let storage = FsObjectStore::new(&config.storage_root);
    let hub = Arc::new(EventHub::new());
    let notifier = ProgressNotifier::new(hub.clone());

    // 2. Application Services
    let assembler = Arc::new(ChunkAssembler::new(
        storage.clone(),
        redis.clone(),
        redis.clone(),
        notifier.clone(),
        config.work_dir.clone(),
    ));
    let orchestrator = Arc::new(TranscodeOrchestrator::new(
        storage.clone(),
        redis.clone(),
        codec,
        notifier,
        config.work_dir.clone(),
    ));
    let streaming = Arc::new(StreamingService::new(
        storage.clone(),
        redis.clone(),
        redis.clone(),
        config.backend_url.clone(),
    ));
    let lifecycle = StorageLifecycle::new(storage.clone());

    // 3. Start Workers
    let shutdown = CancellationToken::new();
    let worker_service = Arc::new(WorkerService::new(
        redis.clone(),
        assembler.clone(),
        orchestrator.clone(),
        lifecycle.clone(),
        RetryPolicy::from_config(&config),
    ));
    for i in 0..config.workers {
        let w = worker_service.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            w.run_worker_loop(i, token).await;
        });
    }
    info!(workers = config.workers, "started pipeline workers");

    spawn_daily_sweep(redis.clone(), shutdown.clone());

    // 4. HTTP Layer
    let app = http::router(AppState {
        assembler,
        orchestrator,
        streaming,
        lifecycle,
        repo: redis,
        hub,
    });

    // 5. Start Server
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    info!(addr = %config.addr, port = %config.port, "listening");

    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
            token.cancel();
        })
        .await
        .expect("Server failed to start");
}
