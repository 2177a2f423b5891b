//! Redis AdSlotSource implementation.
//!
//! Slots live in two JSON arrays: a global list and an optional per-video list.

use super::error::QueueError;
use super::pool::RedisPool;
use super::{AD_SLOTS_KEY, VIDEO_AD_SLOTS_PREFIX};
use crate::domain::ad_slot::AdSlot;
use crate::domain::video::Video;
use crate::error::Result;
use crate::ports::ads::AdSlotSource;
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use tracing::warn;

fn parse_slots(key: &str, json: Option<String>) -> Vec<AdSlot> {
    let Some(json) = json else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<AdSlot>>(&json) {
        Ok(slots) => slots,
        Err(e) => {
            warn!(key, error = %e, "ignoring malformed ad slot list");
            Vec::new()
        }
    }
}

#[async_trait]
impl AdSlotSource for RedisPool {
    async fn active_slots(&self, video: &Video) -> Result<Vec<AdSlot>> {
        let mut conn = self.conn().await.map_err(QueueError::into_repository)?;
        let video_key = format!("{}{}", VIDEO_AD_SLOTS_PREFIX, video.id);

        let (global, per_video): (Option<String>, Option<String>) = conn
            .mget(&[AD_SLOTS_KEY, video_key.as_str()])
            .await
            .map_err(|e| QueueError::from(e).into_repository())?;

        Ok(parse_slots(AD_SLOTS_KEY, global)
            .into_iter()
            .chain(parse_slots(&video_key, per_video))
            .filter(AdSlot::is_servable)
            .collect())
    }
}
