//! Job loop shared by every deployment: pulls jobs, dispatches them, and
//! owns the retry policy.

use crate::application::assembler::ChunkAssembler;
use crate::application::lifecycle::StorageLifecycle;
use crate::application::orchestrator::TranscodeOrchestrator;
use crate::config::PipelineConfig;
use crate::domain::jobs::{Job, QueuedJob};
use crate::error::{PipelineError, Result};
use crate::ports::codec::CodecPort;
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::VideoRepository;
use crate::ports::storage::ObjectStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long a worker blocks on an empty queue before checking for shutdown.
const DEQUEUE_TIMEOUT_SECS: f64 = 5.0;
const SWEEP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_secs: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.job_max_attempts,
            backoff_secs: config.job_retry_backoff_secs,
        }
    }

    /// The follow-up attempt and its delay, or `None` when the job is done for good.
    pub fn next_attempt(&self, job: &QueuedJob, err: &PipelineError) -> Option<(QueuedJob, Duration)> {
        if !err.is_retryable() || job.attempt >= self.max_attempts {
            return None;
        }
        let delay = Duration::from_secs(self.backoff_secs.saturating_mul(job.attempt as u64));
        Some((job.retry(), delay))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Retrying { attempt: u32, delay: Duration },
    Dropped,
}

pub struct WorkerService<S, Q, R, C> {
    queue: Q,
    assembler: Arc<ChunkAssembler<S, Q, R>>,
    orchestrator: Arc<TranscodeOrchestrator<S, R, C>>,
    lifecycle: StorageLifecycle<S>,
    retry: RetryPolicy,
}

impl<S, Q, R, C> WorkerService<S, Q, R, C>
where
    S: ObjectStore + Clone + 'static,
    Q: JobQueuePort + Clone + 'static,
    R: VideoRepository + 'static,
    C: CodecPort + 'static,
{
    pub fn new(
        queue: Q,
        assembler: Arc<ChunkAssembler<S, Q, R>>,
        orchestrator: Arc<TranscodeOrchestrator<S, R, C>>,
        lifecycle: StorageLifecycle<S>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            assembler,
            orchestrator,
            lifecycle,
            retry,
        }
    }

    pub async fn run_worker_loop(&self, worker_id: usize, shutdown: CancellationToken) {
        info!(worker_id, "worker started");
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = self.queue.dequeue_job(DEQUEUE_TIMEOUT_SECS) => next,
            };
            match next {
                Ok(Some(job)) => {
                    self.handle_job(job).await;
                }
                Ok(None) => continue,
                Err(e) => {
                    error!(worker_id, error = %e, "queue error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        info!(worker_id, "worker stopped");
    }

    /// Run one job and apply the retry policy to its failure.
    pub async fn handle_job(&self, job: QueuedJob) -> JobOutcome {
        info!(job_id = %job.id, job = job.job.name(), attempt = job.attempt, "processing job");
        let err = match self.process_job(&job.job).await {
            Ok(()) => return JobOutcome::Succeeded,
            Err(e) => e,
        };

        match self.retry.next_attempt(&job, &err) {
            Some((retry, delay)) => {
                warn!(job_id = %job.id, attempt = job.attempt, delay_secs = delay.as_secs(), error = %err, "job failed, retrying");
                let attempt = retry.attempt;
                let queue = self.queue.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = queue.enqueue_job(retry).await {
                        error!(error = %e, "could not re-queue job");
                    }
                });
                JobOutcome::Retrying { attempt, delay }
            }
            None => {
                error!(job_id = %job.id, attempt = job.attempt, error = %err, "job failed permanently");
                JobOutcome::Dropped
            }
        }
    }

    async fn process_job(&self, job: &Job) -> Result<()> {
        match job {
            Job::AssembleChunks(assemble) => self.assembler.assemble(assemble).await.map(|_| ()),
            Job::Transcode(transcode) => self.orchestrator.transcode(transcode).await.map(|_| ()),
            Job::SweepStaleChunks => {
                self.lifecycle.sweep_stale_chunks(Utc::now()).await;
                Ok(())
            }
        }
    }
}

/// Queue a stale-chunk sweep once a day until shutdown.
pub fn spawn_daily_sweep<Q>(queue: Q, shutdown: CancellationToken) -> JoinHandle<()>
where
    Q: JobQueuePort + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_PERIOD);
        // The first tick fires immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = queue.enqueue_job(QueuedJob::new(Job::SweepStaleChunks)).await {
                        error!(error = %e, "could not schedule stale chunk sweep");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryJobQueue, MemoryObjectStore, MemoryVideoRepository};
    use crate::application::notifier::ProgressNotifier;
    use crate::application::testing::{RecordingSink, ScriptedCodec};
    use crate::domain::jobs::{AssembleJob, TranscodeJob};
    use crate::domain::layout;
    use crate::domain::video::{ProcessingStatus, Video};
    use crate::ports::queue::MockJobQueuePort;
    use bytes::Bytes;

    type Worker = WorkerService<MemoryObjectStore, MemoryJobQueue, MemoryVideoRepository, ScriptedCodec>;

    struct Fixture {
        worker: Worker,
        queue: MemoryJobQueue,
        storage: MemoryObjectStore,
        repo: MemoryVideoRepository,
        _work: tempfile::TempDir,
    }

    fn fixture(codec: ScriptedCodec, retry: RetryPolicy) -> Fixture {
        let storage = MemoryObjectStore::new();
        let queue = MemoryJobQueue::new();
        let repo = MemoryVideoRepository::with_videos([Video::new(5, "Demo")]);
        let notifier = ProgressNotifier::new(Arc::new(RecordingSink::default()));
        let work = tempfile::tempdir().unwrap();

        let assembler = Arc::new(ChunkAssembler::new(
            storage.clone(),
            queue.clone(),
            repo.clone(),
            notifier.clone(),
            work.path().to_path_buf(),
        ));
        let orchestrator = Arc::new(TranscodeOrchestrator::new(
            storage.clone(),
            repo.clone(),
            codec,
            notifier,
            work.path().to_path_buf(),
        ));
        let worker = WorkerService::new(
            queue.clone(),
            assembler,
            orchestrator,
            StorageLifecycle::new(storage.clone()),
            retry,
        );
        Fixture {
            worker,
            queue,
            storage,
            repo,
            _work: work,
        }
    }

    fn no_backoff(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_secs: 0,
        }
    }

    #[test]
    fn test_backoff_grows_with_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_secs: 30,
        };
        let err = PipelineError::AllVariantsFailed { attempted: 4 };
        let first = QueuedJob::new(Job::Transcode(TranscodeJob { video_id: 1 }));

        let (second, delay) = policy.next_attempt(&first, &err).unwrap();
        assert_eq!((second.attempt, delay), (2, Duration::from_secs(30)));
        let (third, delay) = policy.next_attempt(&second, &err).unwrap();
        assert_eq!((third.attempt, delay), (3, Duration::from_secs(60)));
        assert!(policy.next_attempt(&third, &err).is_none());

        assert!(policy
            .next_attempt(&first, &PipelineError::Cancelled(1))
            .is_none());
    }

    #[tokio::test]
    async fn test_upload_to_completion_through_the_queue() {
        let fx = fixture(ScriptedCodec::succeeding(), no_backoff(3));
        fx.storage
            .put(&layout::chunk_key(5, 0), Bytes::from_static(b"video"))
            .await
            .unwrap();

        let assemble = QueuedJob::new(Job::AssembleChunks(AssembleJob {
            video_id: 5,
            file_name: String::from("demo.mp4"),
        }));
        assert_eq!(fx.worker.handle_job(assemble).await, JobOutcome::Succeeded);

        let transcode = fx.queue.dequeue_job(1.0).await.unwrap().unwrap();
        assert_eq!(transcode.job, Job::Transcode(TranscodeJob { video_id: 5 }));
        assert_eq!(fx.worker.handle_job(transcode).await, JobOutcome::Succeeded);

        let video = fx.repo.snapshot(5).unwrap();
        assert_eq!(video.processing_status, ProcessingStatus::Completed);
        assert!(fx.storage.contains(video.hls_master_playlist.as_deref().unwrap()));
        assert!(!fx.storage.contains(&layout::original_key(5, "demo.mp4")));
    }

    #[tokio::test]
    async fn test_retryable_failure_is_requeued() {
        let fx = fixture(ScriptedCodec::failing(&["1080p", "720p", "480p", "360p"]), no_backoff(2));
        let mut video = fx.repo.snapshot(5).unwrap();
        video.source = Some(layout::original_key(5, "demo.mp4"));
        fx.repo.save(&video).await.unwrap();
        fx.storage
            .put(&layout::original_key(5, "demo.mp4"), Bytes::from_static(b"video"))
            .await
            .unwrap();

        let job = QueuedJob::new(Job::Transcode(TranscodeJob { video_id: 5 }));
        let outcome = fx.worker.handle_job(job.clone()).await;
        assert_eq!(
            outcome,
            JobOutcome::Retrying {
                attempt: 2,
                delay: Duration::ZERO
            }
        );

        let again = fx.queue.dequeue_job(1.0).await.unwrap().unwrap();
        assert_eq!(again.id, job.id);
        assert_eq!(fx.worker.handle_job(again).await, JobOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_is_dropped() {
        let fx = fixture(ScriptedCodec::succeeding(), no_backoff(3));
        let job = QueuedJob::new(Job::Transcode(TranscodeJob { video_id: 404 }));
        assert_eq!(fx.worker.handle_job(job).await, JobOutcome::Dropped);
        assert!(fx.queue.pending().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_job_runs_lifecycle() {
        let fx = fixture(ScriptedCodec::succeeding(), no_backoff(3));
        fx.storage.put_at(
            "videos/chunks/9/chunk_0000",
            "old",
            Utc::now() - chrono::Duration::hours(48),
        );

        let outcome = fx
            .worker
            .handle_job(QueuedJob::new(Job::SweepStaleChunks))
            .await;
        assert_eq!(outcome, JobOutcome::Succeeded);
        assert!(fx.storage.keys().is_empty());
    }

    #[tokio::test]
    async fn test_worker_loop_stops_on_shutdown() {
        let fx = fixture(ScriptedCodec::succeeding(), no_backoff(3));
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        fx.worker.run_worker_loop(0, shutdown).await;
    }

    #[tokio::test]
    async fn test_daily_sweep_stops_on_shutdown() {
        let mut queue = MockJobQueuePort::new();
        queue.expect_enqueue_job().never();
        let shutdown = CancellationToken::new();
        let handle = spawn_daily_sweep(queue, shutdown.clone());
        shutdown.cancel();
        handle.await.unwrap();
    }
}
