//! Chunked-upload intake and reassembly.

use crate::application::notifier::ProgressNotifier;
use crate::domain::events::Stage;
use crate::domain::jobs::{AssembleJob, Job, QueuedJob, TranscodeJob};
use crate::domain::layout;
use crate::domain::video::VideoId;
use crate::error::{PipelineError, Result};
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::VideoRepository;
use crate::ports::storage::{ObjectMeta, ObjectStore};
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Minimum step, in percent, between two per-chunk progress events.
const PROGRESS_STEP: u8 = 10;

#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub video_id: VideoId,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub file_name: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceipt {
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Echo of the client's position; assembly never relies on it.
    pub is_last_chunk: bool,
}

/// Handle returned when a job is queued on a client's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTicket {
    pub job_id: String,
    pub video_id: VideoId,
}

fn validate_file_name(file_name: &str) -> Result<()> {
    if file_name.is_empty() || file_name.contains('/') || !layout::is_safe_relative(file_name) {
        return Err(PipelineError::InvalidChunk(format!(
            "invalid file name {:?}",
            file_name
        )));
    }
    Ok(())
}

/// Indices present under a chunk prefix, taken from one listing.
fn received_chunks(objects: Vec<ObjectMeta>) -> BTreeMap<u32, String> {
    objects
        .into_iter()
        .filter_map(|meta| layout::parse_chunk_index(&meta.key).map(|idx| (idx, meta.key)))
        .collect()
}

/// Keys of the run `0, 1, 2, ...` up to the first missing index.
fn contiguous_run(received: &BTreeMap<u32, String>) -> Vec<String> {
    (0u32..)
        .map_while(|idx| received.get(&idx).cloned())
        .collect()
}

pub struct ChunkAssembler<S, Q, R> {
    storage: S,
    queue: Q,
    repo: R,
    notifier: ProgressNotifier,
    work_dir: PathBuf,
}

impl<S, Q, R> ChunkAssembler<S, Q, R>
where
    S: ObjectStore,
    Q: JobQueuePort,
    R: VideoRepository,
{
    pub fn new(storage: S, queue: Q, repo: R, notifier: ProgressNotifier, work_dir: PathBuf) -> Self {
        Self {
            storage,
            queue,
            repo,
            notifier,
            work_dir,
        }
    }

    /// Persist one chunk. The video record is only looked up for chunk 0.
    pub async fn store_chunk(&self, upload: ChunkUpload) -> Result<ChunkReceipt> {
        if upload.total_chunks == 0 || upload.chunk_index >= upload.total_chunks {
            return Err(PipelineError::InvalidChunk(format!(
                "chunk {} out of range for {} chunks",
                upload.chunk_index, upload.total_chunks
            )));
        }
        validate_file_name(&upload.file_name)?;

        if upload.chunk_index == 0 && self.repo.get(upload.video_id).await?.is_none() {
            return Err(PipelineError::VideoNotFound(upload.video_id.to_string()));
        }

        let key = layout::chunk_key(upload.video_id, upload.chunk_index);
        self.storage.put(&key, upload.data).await?;
        debug!(
            video_id = upload.video_id,
            chunk = upload.chunk_index,
            total = upload.total_chunks,
            "stored chunk"
        );

        Ok(ChunkReceipt {
            chunk_index: upload.chunk_index,
            total_chunks: upload.total_chunks,
            is_last_chunk: upload.chunk_index + 1 == upload.total_chunks,
        })
    }

    /// Claim the video and queue its assembly. Returns without waiting.
    pub async fn trigger_assembly(&self, video_id: VideoId, file_name: &str) -> Result<JobTicket> {
        validate_file_name(file_name)?;

        let mut video = self
            .repo
            .get(video_id)
            .await?
            .ok_or_else(|| PipelineError::VideoNotFound(video_id.to_string()))?;

        if !self.repo.try_claim(video_id).await? {
            return Err(PipelineError::AlreadyProcessing(video_id));
        }

        let job = QueuedJob::new(Job::AssembleChunks(AssembleJob {
            video_id,
            file_name: file_name.to_string(),
        }));
        let job_id = job.id.clone();

        if let Err(e) = self.queue.enqueue_job(job).await {
            // Release the claim so the client can trigger again.
            video.mark_failed(format!("Failed to queue assembly: {}", e));
            self.repo.update(&video).await?;
            return Err(e);
        }

        info!(video_id, job_id = %job_id, "assembly queued");
        Ok(JobTicket { job_id, video_id })
    }

    /// Queue transcoding of an already assembled original, for a video whose
    /// earlier run failed. The chunks are not needed.
    pub async fn requeue_transcode(&self, video_id: VideoId) -> Result<JobTicket> {
        let mut video = self
            .repo
            .get(video_id)
            .await?
            .ok_or_else(|| PipelineError::VideoNotFound(video_id.to_string()))?;
        let source = video
            .source
            .clone()
            .ok_or(PipelineError::SourceMissing(video_id))?;
        if !self.storage.exists(&source).await? {
            return Err(PipelineError::SourceMissing(video_id));
        }

        if !self.repo.try_claim(video_id).await? {
            return Err(PipelineError::AlreadyProcessing(video_id));
        }

        let job = QueuedJob::new(Job::Transcode(TranscodeJob { video_id }));
        let job_id = job.id.clone();
        if let Err(e) = self.queue.enqueue_job(job).await {
            video.mark_failed(format!("Failed to queue transcoding: {}", e));
            self.repo.update(&video).await?;
            return Err(e);
        }

        info!(video_id, job_id = %job_id, "transcoding re-queued");
        Ok(JobTicket { job_id, video_id })
    }

    /// Concatenate the contiguous chunk run into the original object and
    /// queue transcoding. A failure marks the video failed before returning.
    pub async fn assemble(&self, job: &AssembleJob) -> Result<String> {
        match self.run_assembly(job).await {
            Ok(key) => Ok(key),
            Err(e) => {
                error!(video_id = job.video_id, error = %e, "chunk assembly failed");
                if let Ok(Some(mut video)) = self.repo.get(job.video_id).await {
                    video.mark_failed(e.to_string());
                    if let Err(save_err) = self.repo.update(&video).await {
                        warn!(video_id = job.video_id, error = %save_err, "could not record assembly failure");
                    }
                }
                self.notifier
                    .error(job.video_id, "Chunk assembly failed", Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_assembly(&self, job: &AssembleJob) -> Result<String> {
        let video_id = job.video_id;
        validate_file_name(&job.file_name)?;
        self.notifier
            .progress(video_id, Stage::Assembling, 0, "Starting chunk assembly");

        let prefix = layout::chunk_prefix(video_id);
        let received = received_chunks(self.storage.list(&prefix).await?);
        let chunks = contiguous_run(&received);
        if chunks.is_empty() {
            return Err(PipelineError::ChunkSetIncomplete(video_id));
        }
        if received.len() > chunks.len() {
            warn!(
                video_id,
                assembled = chunks.len(),
                received = received.len(),
                "chunk set has a gap, assembling the leading run only"
            );
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let temp = tempfile::NamedTempFile::new_in(&self.work_dir)?;
        let mut out = tokio::fs::File::from_std(temp.reopen()?);

        let total = chunks.len();
        let mut last_reported = 0u8;
        for (idx, key) in chunks.iter().enumerate() {
            let mut body = self.storage.open(key).await?;
            while let Some(piece) = body.next().await {
                let piece = piece.map_err(|e| PipelineError::storage(key.as_str(), e))?;
                out.write_all(&piece).await?;
            }

            let percent = (5 + (idx + 1) * 75 / total) as u8;
            if percent >= last_reported + PROGRESS_STEP || idx + 1 == total {
                last_reported = percent;
                self.notifier.progress(
                    video_id,
                    Stage::Assembling,
                    percent,
                    format!("Assembled chunk {}/{}", idx + 1, total),
                );
            }
        }
        out.flush().await?;
        drop(out);

        let original = layout::original_key(video_id, &job.file_name);
        self.storage.upload(temp.path(), &original).await?;
        self.notifier
            .progress(video_id, Stage::Assembling, 85, "Assembled file saved");

        let mut video = self
            .repo
            .get(video_id)
            .await?
            .ok_or_else(|| PipelineError::VideoNotFound(video_id.to_string()))?;
        video.source = Some(original.clone());
        if !self.repo.update(&video).await? {
            return Err(PipelineError::VideoNotFound(video_id.to_string()));
        }

        // The original is kept; the failed status lets requeue_transcode
        // restart from it.
        let transcode = QueuedJob::new(Job::Transcode(TranscodeJob { video_id }));
        if let Err(e) = self.queue.enqueue_job(transcode).await {
            error!(video_id, error = %e, "could not queue transcoding");
            video.mark_failed(format!("Failed to queue transcoding: {}", e));
            if let Err(save_err) = self.repo.update(&video).await {
                warn!(video_id, error = %save_err, "could not record queueing failure");
            }
            self.notifier
                .error(video_id, "Failed to queue transcoding", Some(e.to_string()));
        }

        self.notifier
            .progress(video_id, Stage::Cleanup, 95, "Removing uploaded chunks");
        self.remove_chunks(&prefix, &chunks).await;

        info!(video_id, chunks = total, key = %original, "chunks assembled");
        self.notifier
            .progress(video_id, Stage::Assembling, 100, "Chunk assembly completed");
        Ok(original)
    }

    async fn remove_chunks(&self, prefix: &str, chunks: &[String]) {
        for key in chunks {
            if let Err(e) = self.storage.delete(key).await {
                warn!(key = %key, error = %e, "could not delete chunk");
            }
        }
        if let Err(e) = self.storage.delete_prefix(prefix).await {
            warn!(prefix, error = %e, "could not remove chunk directory");
        }
    }
}
