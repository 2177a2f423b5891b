//! Lifecycle events pushed to live viewers of a video's processing state.

use super::video::VideoId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Assembling,
    Downloading,
    Probing,
    Encoding,
    Uploading,
    Finalizing,
    Cleanup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Connection {
        video_id: VideoId,
        message: String,
    },
    Progress {
        video_id: VideoId,
        stage: Stage,
        percent: u8,
        message: String,
    },
    Complete {
        video_id: VideoId,
        hls_path: String,
        message: String,
    },
    Error {
        video_id: VideoId,
        message: String,
        detail: Option<String>,
    },
}

impl ProgressEvent {
    pub fn video_id(&self) -> VideoId {
        match self {
            ProgressEvent::Connection { video_id, .. }
            | ProgressEvent::Progress { video_id, .. }
            | ProgressEvent::Complete { video_id, .. }
            | ProgressEvent::Error { video_id, .. } => *video_id,
        }
    }
}

/// Subscription key of a video's progress channel.
pub fn progress_channel(video_id: VideoId) -> String {
    format!("video_progress_{}", video_id)
}
