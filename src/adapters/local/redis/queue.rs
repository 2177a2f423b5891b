//! Redis JobQueuePort implementation.

use super::error::QueueError;
use super::pool::RedisPool;
use super::{JOB_QUEUE_HIGH_PRIORITY, JOB_QUEUE_NORMAL};
use crate::domain::jobs::{Job, QueuedJob};
use crate::error::Result;
use crate::ports::queue::JobQueuePort;
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;

/// Assembly sits in front of encoding: an uploader is waiting on it.
fn queue_for(job: &Job) -> &'static str {
    match job {
        Job::AssembleChunks(_) => JOB_QUEUE_HIGH_PRIORITY,
        Job::Transcode(_) | Job::SweepStaleChunks => JOB_QUEUE_NORMAL,
    }
}

#[async_trait]
impl JobQueuePort for RedisPool {
    async fn enqueue_job(&self, job: QueuedJob) -> Result<()> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(&job).map_err(QueueError::from)?;

        conn.lpush::<_, _, ()>(queue_for(&job.job), json)
            .await
            .map_err(QueueError::from)?;
        Ok(())
    }

    async fn dequeue_job(&self, timeout_secs: f64) -> Result<Option<QueuedJob>> {
        let mut conn = self.conn().await?;

        // First, try high priority queue (non-blocking)
        let high_result: Option<String> = conn
            .rpop(JOB_QUEUE_HIGH_PRIORITY, None)
            .await
            .map_err(QueueError::from)?;
        if let Some(json) = high_result {
            return Ok(Some(serde_json::from_str(&json).map_err(QueueError::from)?));
        }

        // No high priority jobs, block on both so a late assembly job still wakes us
        let result: Option<(String, String)> = conn
            .brpop(&[JOB_QUEUE_HIGH_PRIORITY, JOB_QUEUE_NORMAL], timeout_secs)
            .await
            .map_err(QueueError::from)?;
        match result {
            Some((_, json)) => Ok(Some(serde_json::from_str(&json).map_err(QueueError::from)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::{AssembleJob, TranscodeJob};

    #[test]
    fn test_assembly_jobs_are_high_priority() {
        let assemble = Job::AssembleChunks(AssembleJob {
            video_id: 1,
            file_name: String::from("a.mp4"),
        });
        assert_eq!(queue_for(&assemble), JOB_QUEUE_HIGH_PRIORITY);
        assert_eq!(queue_for(&Job::Transcode(TranscodeJob { video_id: 1 })), JOB_QUEUE_NORMAL);
        assert_eq!(queue_for(&Job::SweepStaleChunks), JOB_QUEUE_NORMAL);
    }
}
