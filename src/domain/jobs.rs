use super::video::VideoId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembleJob {
    pub video_id: VideoId,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub video_id: VideoId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Job {
    AssembleChunks(AssembleJob),
    Transcode(TranscodeJob),
    SweepStaleChunks,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::AssembleChunks(_) => "assemble_chunks",
            Job::Transcode(_) => "transcode",
            Job::SweepStaleChunks => "sweep_stale_chunks",
        }
    }
}

/// Queue envelope: the job plus the bookkeeping the retry policy needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub job: Job,
}

impl QueuedJob {
    pub fn new(job: Job) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            attempt: 1,
            job,
        }
    }

    pub fn retry(&self) -> Self {
        Self {
            id: self.id.clone(),
            attempt: self.attempt + 1,
            job: self.job.clone(),
        }
    }
}
