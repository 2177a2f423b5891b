use crate::domain::video::{Video, VideoId};
use crate::error::Result;
use async_trait::async_trait;

/// Record store for video processing state.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn get(&self, id: VideoId) -> Result<Option<Video>>;

    /// Look a video up by slug or uid.
    async fn find_by_public_id(&self, key: &str) -> Result<Option<Video>>;

    async fn save(&self, video: &Video) -> Result<()>;

    /// Overwrite the record only if it still exists. Returns `false`, and
    /// writes nothing, once the video has been deleted.
    async fn update(&self, video: &Video) -> Result<bool>;

    /// Atomically move `processing_status` from pending/failed to processing.
    /// Returns `false` when the video is in any other state.
    async fn try_claim(&self, id: VideoId) -> Result<bool>;

    /// Remove the record, returning it if it existed.
    async fn delete(&self, id: VideoId) -> Result<Option<Video>>;
}
