//! Storage cleanup: originals after conversion, HLS trees on deletion and
//! the stale-chunk sweep. Nothing here ever fails its caller; problems are
//! logged and counted.

use crate::domain::layout;
use crate::domain::video::Video;
use crate::ports::storage::ObjectStore;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Chunks untouched for longer than this belong to abandoned uploads.
pub fn stale_chunk_age() -> Duration {
    Duration::hours(12)
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub directories_scanned: usize,
    pub chunks_deleted: usize,
    pub directories_removed: usize,
    pub failures: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub hls_objects_deleted: usize,
    pub original_deleted: bool,
    pub chunks_deleted: usize,
}

#[derive(Clone)]
pub struct StorageLifecycle<S> {
    storage: S,
}

impl<S: ObjectStore> StorageLifecycle<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Remove the uploaded source once the video no longer needs it.
    pub async fn delete_original(&self, video: &Video) -> bool {
        let Some(source) = video.source.as_deref() else {
            return false;
        };
        match self.storage.delete(source).await {
            Ok(()) => {
                info!(video_id = video.id, key = source, "deleted original upload");
                true
            }
            Err(e) => {
                warn!(video_id = video.id, key = source, error = %e, "could not delete original upload");
                false
            }
        }
    }

    /// Delete every object below `hls_path`, then the prefix itself.
    /// Returns how many objects were deleted; a missing tree yields zero.
    pub async fn delete_hls_tree(&self, hls_path: &str) -> usize {
        let prefix = format!("{}/", hls_path.trim_end_matches('/'));
        self.delete_all_under(&prefix).await
    }

    async fn delete_all_under(&self, prefix: &str) -> usize {
        let objects = match self.storage.list(prefix).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!(prefix, error = %e, "could not list objects for deletion");
                return 0;
            }
        };

        let mut deleted = 0;
        for object in &objects {
            match self.storage.delete(&object.key).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(key = %object.key, error = %e, "could not delete object"),
            }
        }
        if let Err(e) = self.storage.delete_prefix(prefix).await {
            warn!(prefix, error = %e, "could not remove directory");
        }
        deleted
    }

    /// Reap chunks older than [`stale_chunk_age`] relative to `now`, removing
    /// directories left empty.
    pub async fn sweep_stale_chunks(&self, now: DateTime<Utc>) -> SweepReport {
        let cutoff = now - stale_chunk_age();
        let mut report = SweepReport::default();

        let directories = match self.storage.list_prefixes(layout::CHUNKS_ROOT).await {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!(error = %e, "could not list chunk directories");
                report.failures += 1;
                return report;
            }
        };

        for dir in directories {
            report.directories_scanned += 1;
            let objects = match self.storage.list(&dir).await {
                Ok(objects) => objects,
                Err(e) => {
                    warn!(prefix = %dir, error = %e, "could not list chunk directory");
                    report.failures += 1;
                    continue;
                }
            };

            let mut remaining = objects.len();
            for object in objects.iter().filter(|o| o.last_modified < cutoff) {
                match self.storage.delete(&object.key).await {
                    Ok(()) => {
                        report.chunks_deleted += 1;
                        remaining -= 1;
                    }
                    Err(e) => {
                        warn!(key = %object.key, error = %e, "could not delete stale chunk");
                        report.failures += 1;
                    }
                }
            }

            if remaining == 0 {
                match self.storage.delete_prefix(&dir).await {
                    Ok(()) => report.directories_removed += 1,
                    Err(e) => {
                        warn!(prefix = %dir, error = %e, "could not remove chunk directory");
                        report.failures += 1;
                    }
                }
            }
        }

        info!(
            scanned = report.directories_scanned,
            deleted = report.chunks_deleted,
            removed = report.directories_removed,
            failures = report.failures,
            "stale chunk sweep finished"
        );
        report
    }

    /// Everything a deleted video leaves behind. Safe to repeat.
    pub async fn purge_video(&self, video: &Video) -> PurgeReport {
        let hls_path = video
            .hls_path
            .clone()
            .unwrap_or_else(|| layout::hls_dir(&video.uid.to_string()));

        PurgeReport {
            hls_objects_deleted: self.delete_hls_tree(&hls_path).await,
            original_deleted: self.delete_original(video).await,
            chunks_deleted: self.delete_all_under(&layout::chunk_prefix(video.id)).await,
        }
    }
}
