//! Pipeline error taxonomy.

use crate::domain::video::VideoId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// No contiguous run of chunks starting at index 0.
    #[error("no chunks found for video {0}")]
    ChunkSetIncomplete(VideoId),

    #[error("video {0} has no uploaded source file")]
    SourceMissing(VideoId),

    /// Fatal at startup, never raised per job.
    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// Soft failure. Logged and skipped by the orchestrator.
    #[error("encoding preset {preset} failed: {stderr}")]
    VariantEncodeFailed { preset: String, stderr: String },

    #[error("all {attempted} quality variants failed to encode")]
    AllVariantsFailed { attempted: usize },

    #[error("failed to write master manifest: {0}")]
    ManifestWriteFailed(#[source] std::io::Error),

    #[error("video {0} not found")]
    VideoNotFound(String),

    #[error("storage error on {key}: {message}")]
    StorageIo { key: String, message: String },

    #[error("video {0} is already being processed")]
    AlreadyProcessing(VideoId),

    #[error("processing of video {0} was cancelled")]
    Cancelled(VideoId),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn storage(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        PipelineError::StorageIo {
            key: key.into(),
            message: err.to_string(),
        }
    }

    /// Whether the job queue should re-attempt a job that failed with this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::AlreadyProcessing(_)
                | PipelineError::VideoNotFound(_)
                | PipelineError::Cancelled(_)
                | PipelineError::ChunkSetIncomplete(_)
                | PipelineError::SourceMissing(_)
                | PipelineError::InvalidPath(_)
                | PipelineError::InvalidChunk(_)
                | PipelineError::EncoderUnavailable(_)
        )
    }
}
