//! Redis VideoRepository implementation.
//!
//! Each video is one JSON document; slug and uid resolve to the id through
//! small index keys.

use super::error::QueueError;
use super::pool::RedisPool;
use super::{VIDEO_INDEX_PREFIX, VIDEO_PREFIX};
use crate::domain::video::{Video, VideoId};
use crate::error::{PipelineError, Result};
use crate::ports::repository::VideoRepository;
use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use tracing::debug;

fn video_key(id: VideoId) -> String {
    format!("{}{}", VIDEO_PREFIX, id)
}

/// Optimistic writes give up after this many lost races.
const UPDATE_ATTEMPTS: usize = 5;

async fn unwatch(conn: &mut deadpool_redis::Connection) -> Result<()> {
    let _: () = redis::cmd("UNWATCH")
        .query_async(conn)
        .await
        .map_err(|e| QueueError::from(e).into_repository())?;
    Ok(())
}

fn index_keys(video: &Video) -> Vec<String> {
    let mut keys = vec![format!("{}{}", VIDEO_INDEX_PREFIX, video.uid)];
    if let Some(slug) = &video.slug {
        keys.push(format!("{}{}", VIDEO_INDEX_PREFIX, slug));
    }
    keys
}

#[async_trait]
impl VideoRepository for RedisPool {
    async fn get(&self, id: VideoId) -> Result<Option<Video>> {
        let mut conn = self.conn().await.map_err(QueueError::into_repository)?;
        let json: Option<String> = conn
            .get(video_key(id))
            .await
            .map_err(|e| QueueError::from(e).into_repository())?;
        match json {
            Some(data) => Ok(Some(
                serde_json::from_str(&data).map_err(|e| QueueError::from(e).into_repository())?,
            )),
            None => Ok(None),
        }
    }

    async fn find_by_public_id(&self, key: &str) -> Result<Option<Video>> {
        let mut conn = self.conn().await.map_err(QueueError::into_repository)?;
        let id: Option<VideoId> = conn
            .get(format!("{}{}", VIDEO_INDEX_PREFIX, key))
            .await
            .map_err(|e| QueueError::from(e).into_repository())?;
        match id {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }

    async fn save(&self, video: &Video) -> Result<()> {
        let mut conn = self.conn().await.map_err(QueueError::into_repository)?;
        let json = serde_json::to_string(video).map_err(|e| QueueError::from(e).into_repository())?;

        let mut pipe = redis::pipe();
        pipe.atomic().set(video_key(video.id), json).ignore();
        for index in index_keys(video) {
            pipe.set(index, video.id).ignore();
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::from(e).into_repository())?;
        Ok(())
    }

    async fn update(&self, video: &Video) -> Result<bool> {
        let mut conn = self.conn().await.map_err(QueueError::into_repository)?;
        let key = video_key(video.id);
        let json = serde_json::to_string(video).map_err(|e| QueueError::from(e).into_repository())?;

        for _ in 0..UPDATE_ATTEMPTS {
            let _: () = redis::cmd("WATCH")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|e| QueueError::from(e).into_repository())?;

            let exists: bool = conn
                .exists(&key)
                .await
                .map_err(|e| QueueError::from(e).into_repository())?;
            if !exists {
                unwatch(&mut conn).await?;
                return Ok(false);
            }

            let mut pipe = redis::pipe();
            pipe.atomic().set(&key, &json).ignore();
            for index in index_keys(video) {
                pipe.set(index, video.id).ignore();
            }
            let committed: Option<()> = pipe
                .query_async(&mut conn)
                .await
                .map_err(|e| QueueError::from(e).into_repository())?;
            if committed.is_some() {
                return Ok(true);
            }
            debug!(video_id = video.id, "record changed during update, retrying");
        }

        Err(PipelineError::Repository(format!(
            "video {} kept changing during update",
            video.id
        )))
    }

    async fn try_claim(&self, id: VideoId) -> Result<bool> {
        let mut conn = self.conn().await.map_err(QueueError::into_repository)?;
        let key = video_key(id);

        let _: () = redis::cmd("WATCH")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::from(e).into_repository())?;

        let json: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| QueueError::from(e).into_repository())?;
        let mut video: Video = match json {
            Some(data) => {
                serde_json::from_str(&data).map_err(|e| QueueError::from(e).into_repository())?
            }
            None => {
                unwatch(&mut conn).await?;
                return Ok(false);
            }
        };

        if !video.processing_status.is_claimable() {
            unwatch(&mut conn).await?;
            return Ok(false);
        }

        video.mark_processing();
        let json = serde_json::to_string(&video).map_err(|e| QueueError::from(e).into_repository())?;

        // EXEC replies nil when the watched key changed underneath us.
        let committed: Option<()> = redis::pipe()
            .atomic()
            .set(&key, json)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::from(e).into_repository())?;

        if committed.is_none() {
            debug!(video_id = id, "claim lost to a concurrent writer");
        }
        Ok(committed.is_some())
    }

    async fn delete(&self, id: VideoId) -> Result<Option<Video>> {
        let existing = self.get(id).await?;
        let Some(video) = existing else {
            return Ok(None);
        };

        let mut conn = self.conn().await.map_err(QueueError::into_repository)?;
        let mut keys = index_keys(&video);
        keys.push(video_key(id));
        conn.del::<_, ()>(keys)
            .await
            .map_err(|e| QueueError::from(e).into_repository())?;
        Ok(Some(video))
    }
}
