//! AWS Worker Binary
//!
//! Worker-only node for deployments that keep media in S3. It:
//! 1. Stores chunks, originals and HLS trees in S3.
//! 2. Shares the Redis job queue and video records with the HTTP front.
//! 3. Runs the worker pool and the daily stale-chunk sweep.
//!
//! Progress events are published into a process-local hub that has no
//! WebSocket front here, so they are dropped. Live progress is only
//! available for jobs run by the monolith; clients of this deployment poll
//! `GET /streaming/videos/{id}/status` instead.
//!
//! Environment Variables:
//! - AWS_REGION: AWS region (e.g., us-east-1)
//! - S3_BUCKET: S3 bucket for video storage
//! - REDIS_URL and the rest of the pipeline settings

use hlsforge::adapters::aws::S3ObjectStore;
use hlsforge::adapters::ffmpeg::FfmpegCodec;
use hlsforge::adapters::hub::EventHub;
use hlsforge::adapters::local::RedisPool;
use hlsforge::application::assembler::ChunkAssembler;
use hlsforge::application::lifecycle::StorageLifecycle;
use hlsforge::application::notifier::ProgressNotifier;
use hlsforge::application::orchestrator::TranscodeOrchestrator;
use hlsforge::application::worker::{spawn_daily_sweep, RetryPolicy, WorkerService};
use hlsforge::config::{AwsConfig, PipelineConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = PipelineConfig::from_env();
    let aws = AwsConfig::from_env();

    let codec = FfmpegCodec::from_config(&config);
    if let Err(e) = codec.ensure_available().await {
        error!(error = %e, "cannot start without an encoder");
        std::process::exit(1);
    }

    // Load AWS config
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let storage = S3ObjectStore::new(aws_sdk_s3::Client::new(&sdk_config), aws.s3_bucket);

    let redis = match RedisPool::new(&config.redis_url) {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "failed to connect to Redis");
            std::process::exit(1);
        }
    };

    // No subscribers ever attach to this hub.
    let notifier = ProgressNotifier::new(Arc::new(EventHub::new()));

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
    let worker = Arc::new(WorkerService::new(
        redis.clone(),
        assembler,
        orchestrator,
        StorageLifecycle::new(storage),
        RetryPolicy::from_config(&config),
    ));

    let shutdown = CancellationToken::new();
    spawn_daily_sweep(redis, shutdown.clone());

    let mut handles = Vec::with_capacity(config.workers);
    for i in 0..config.workers {
        let w = worker.clone();
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            w.run_worker_loop(i, token).await;
        }));
    }
    info!(workers = config.workers, "AWS worker started, polling for jobs");

    let _ = tokio::signal::ctrl_c().await;
    shutdown.cancel();
    for handle in handles {
        let _ = handle.await;
    }
}
