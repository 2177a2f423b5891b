use crate::domain::ad_slot::AdSlot;
use crate::domain::video::Video;
use crate::error::Result;
use async_trait::async_trait;

/// Read-only view of the advertising catalog.
#[async_trait]
pub trait AdSlotSource: Send + Sync {
    /// Slots that are active right now for `video`.
    async fn active_slots(&self, video: &Video) -> Result<Vec<AdSlot>>;
}
