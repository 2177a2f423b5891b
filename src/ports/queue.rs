use crate::domain::jobs::QueuedJob;
use crate::error::Result;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueuePort: Send + Sync {
    /// Enqueue a job
    async fn enqueue_job(&self, job: QueuedJob) -> Result<()>;

    /// Dequeue a job (blocking with timeout or non-blocking)
    /// timeout_secs: 0.0 for infinite (or long poll), >0.0 for specific timeout
    async fn dequeue_job(&self, timeout_secs: f64) -> Result<Option<QueuedJob>>;
}
