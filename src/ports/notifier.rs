use crate::domain::events::ProgressEvent;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no subscribers on {0}")]
    NoSubscribers(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Real-time fan-out to everyone subscribed to a channel.
///
/// Publishing never blocks; callers treat every error as droppable.
pub trait ProgressSink: Send + Sync {
    /// Returns the number of subscribers reached.
    fn publish(&self, channel: &str, event: ProgressEvent) -> Result<usize, PublishError>;
}
