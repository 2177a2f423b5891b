use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type VideoId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    /// States from which a new pipeline run may claim the video.
    pub fn is_claimable(self) -> bool {
        matches!(self, ProcessingStatus::Pending | ProcessingStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

/// A video record as seen by the pipeline.
///
/// `hls_master_playlist` is set if and only if the status is `Completed`; the
/// `mark_*` transitions below are the only writers of these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    /// Opaque public identifier, also the HLS directory name.
    pub uid: Uuid,
    pub title: String,
    pub slug: Option<String>,
    /// Owned by the external catalog.
    pub category_id: Option<i64>,
    /// Object key of the uploaded source file.
    pub source: Option<String>,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub hls_path: Option<String>,
    pub hls_master_playlist: Option<String>,
    /// Seconds, set once probed.
    pub duration: Option<f64>,
}

impl Video {
    pub fn new(id: VideoId, title: impl Into<String>) -> Self {
        Self {
            id,
            uid: Uuid::new_v4(),
            title: title.into(),
            slug: None,
            category_id: None,
            source: None,
            processing_status: ProcessingStatus::Pending,
            processing_error: None,
            hls_path: None,
            hls_master_playlist: None,
            duration: None,
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    /// Matches either the slug or the uid.
    pub fn matches_public_id(&self, key: &str) -> bool {
        self.slug.as_deref() == Some(key) || self.uid.to_string() == key
    }

    pub fn mark_processing(&mut self) {
        self.processing_status = ProcessingStatus::Processing;
        self.hls_master_playlist = None;
    }

    pub fn mark_completed(&mut self, hls_path: String, master_playlist: String, duration: f64) {
        self.hls_path = Some(hls_path);
        self.hls_master_playlist = Some(master_playlist);
        self.duration = Some(duration);
        self.processing_status = ProcessingStatus::Completed;
        self.processing_error = None;
    }

    pub fn mark_failed(&mut self, cause: impl Into<String>) {
        self.processing_status = ProcessingStatus::Failed;
        self.processing_error = Some(cause.into());
        self.hls_master_playlist = None;
    }

    pub fn is_ready_for_streaming(&self) -> bool {
        self.processing_status == ProcessingStatus::Completed && self.hls_master_playlist.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_playlist_follows_status() {
        let mut video = Video::new(1, "Intro");
        assert!(!video.is_ready_for_streaming());

        video.mark_processing();
        video.mark_completed(
            "videos/hls/x".to_string(),
            "videos/hls/x/master.m3u8".to_string(),
            12.5,
        );
        assert!(video.is_ready_for_streaming());
        assert_eq!(video.processing_error, None);

        // Re-queue resets to processing and drops the master playlist
        video.mark_processing();
        assert_eq!(video.processing_status, ProcessingStatus::Processing);
        assert!(video.hls_master_playlist.is_none());

        video.mark_failed("boom");
        assert_eq!(video.processing_error.as_deref(), Some("boom"));
        assert!(video.hls_master_playlist.is_none());
    }

    #[test]
    fn test_claimable_states() {
        assert!(ProcessingStatus::Pending.is_claimable());
        assert!(ProcessingStatus::Failed.is_claimable());
        assert!(!ProcessingStatus::Processing.is_claimable());
        assert!(!ProcessingStatus::Completed.is_claimable());
    }

    #[test]
    fn test_public_id_matches_slug_or_uid() {
        let video = Video::new(3, "Match").with_slug("match-day");
        assert!(video.matches_public_id("match-day"));
        assert!(video.matches_public_id(&video.uid.to_string()));
        assert!(!video.matches_public_id("other"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ProcessingStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
