//! Playback side: resolves a public video id and serves its HLS files,
//! rewriting manifests and injecting ad breaks on the way out.

use crate::domain::hls::ad_injection::SeededRandom;
use crate::domain::hls::{
    inject_ad_markers, rewrite_to_proxy, AdRandom, ThreadRandom, MANIFEST_CONTENT_TYPE,
    SEGMENT_CONTENT_TYPE,
};
use crate::domain::layout;
use crate::domain::video::Video;
use crate::error::{PipelineError, Result};
use crate::ports::ads::AdSlotSource;
use crate::ports::repository::VideoRepository;
use crate::ports::storage::{ObjectStore, ObjectStream};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Manifests change with the ad schedule; keep them short-lived.
pub const MANIFEST_CACHE_CONTROL: &str = "public, max-age=10";
pub const SEGMENT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

pub enum ServedBody {
    Manifest(String),
    Stream(ObjectStream),
}

pub struct ServedAsset {
    pub content_type: String,
    pub cache_control: &'static str,
    pub body: ServedBody,
}

impl std::fmt::Debug for ServedAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServedAsset")
            .field("content_type", &self.content_type)
            .field("cache_control", &self.cache_control)
            .finish_non_exhaustive()
    }
}

pub struct StreamingService<S, R, A> {
    storage: S,
    repo: R,
    ads: A,
    backend_url: String,
    random: Mutex<Box<dyn AdRandom + Send>>,
}

impl<S, R, A> StreamingService<S, R, A>
where
    S: ObjectStore,
    R: VideoRepository,
    A: AdSlotSource,
{
    pub fn new(storage: S, repo: R, ads: A, backend_url: impl Into<String>) -> Self {
        Self {
            storage,
            repo,
            ads,
            backend_url: backend_url.into(),
            random: Mutex::new(Box::new(ThreadRandom)),
        }
    }

    /// Reproducible ad placement, for previews and tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random = Mutex::new(Box::new(SeededRandom::new(seed)));
        self
    }

    async fn resolve(&self, public_id: &str) -> Result<Video> {
        let video = self
            .repo
            .find_by_public_id(public_id)
            .await?
            .ok_or_else(|| PipelineError::VideoNotFound(public_id.to_string()))?;
        if !video.is_ready_for_streaming() {
            debug!(video_id = video.id, status = video.processing_status.as_str(), "video not streamable yet");
            return Err(PipelineError::VideoNotFound(public_id.to_string()));
        }
        Ok(video)
    }

    /// Serve `file_path` from the HLS tree of the video whose slug or uid is `public_id`.
    pub async fn serve(&self, public_id: &str, file_path: &str) -> Result<ServedAsset> {
        if !layout::is_safe_relative(file_path) {
            return Err(PipelineError::InvalidPath(file_path.to_string()));
        }

        let video = self.resolve(public_id).await?;
        let hls_dir = video
            .hls_path
            .clone()
            .unwrap_or_else(|| layout::hls_dir(&video.uid.to_string()));
        let key = layout::join_key(&hls_dir, file_path);

        if !self.storage.exists(&key).await? {
            return Err(PipelineError::VideoNotFound(format!("{}/{}", public_id, file_path)));
        }

        if file_path.ends_with(".m3u8") {
            let raw = self.storage.get(&key).await?;
            let manifest = String::from_utf8_lossy(&raw);

            // Only variant playlists live in a sub-directory.
            let manifest = if file_path.contains('/') {
                self.inject(&video, &manifest).await
            } else {
                manifest.into_owned()
            };

            return Ok(ServedAsset {
                content_type: MANIFEST_CONTENT_TYPE.to_string(),
                cache_control: MANIFEST_CACHE_CONTROL,
                body: ServedBody::Manifest(rewrite_to_proxy(
                    &manifest,
                    &self.backend_url,
                    public_id,
                    file_path,
                )),
            });
        }

        let content_type = if file_path.ends_with(".ts") {
            SEGMENT_CONTENT_TYPE.to_string()
        } else {
            mime_guess::from_path(file_path)
                .first_or_octet_stream()
                .to_string()
        };

        Ok(ServedAsset {
            content_type,
            cache_control: SEGMENT_CACHE_CONTROL,
            body: ServedBody::Stream(self.storage.open(&key).await?),
        })
    }

    async fn inject(&self, video: &Video, manifest: &str) -> String {
        let slots = match self.ads.active_slots(video).await {
            Ok(slots) => slots,
            Err(e) => {
                warn!(video_id = video.id, error = %e, "ad catalog unavailable, serving without ads");
                Vec::new()
            }
        };
        let mut random = self.random.lock().unwrap_or_else(|e| e.into_inner());
        inject_ad_markers(manifest, &slots, random.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryAdSlots, MemoryObjectStore, MemoryVideoRepository};
    use crate::domain::ad_slot::{AdSlot, MediaKind, OwnedMedia};
    use bytes::Bytes;
    use futures::TryStreamExt;

    type Service = StreamingService<MemoryObjectStore, MemoryVideoRepository, MemoryAdSlots>;

    fn variant_playlist(segments: usize) -> String {
        let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n");
        for i in 0..segments {
            out.push_str(&format!("#EXTINF:6.000000,\n720p_{:03}.ts\n", i));
        }
        out.push_str("#EXT-X-ENDLIST\n");
        out
    }

    fn slot() -> AdSlot {
        AdSlot::self_contained(
            4,
            OwnedMedia {
                media_kind: MediaKind::Video,
                media_url: String::from("https://cdn.example.com/ad.mp4"),
                redirect_url: None,
                display_duration: 15,
            },
        )
    }

    async fn service(slots: Vec<AdSlot>) -> (Service, Video) {
        let mut video = Video::new(1, "Talk").with_slug("talk");
        let hls = layout::hls_dir(&video.uid.to_string());
        video.mark_completed(hls.clone(), layout::join_key(&hls, "master.m3u8"), 600.0);

        let storage = MemoryObjectStore::new();
        let files = [
            ("master.m3u8", String::from("#EXTM3U\n#EXT-X-VERSION:3\n\n#EXT-X-STREAM-INF:BANDWIDTH=2928000,RESOLUTION=1280x720\n720p/720p.m3u8\n")),
            ("720p/720p.m3u8", variant_playlist(100)),
            ("720p/720p_000.ts", String::from("segment-bytes")),
        ];
        for (path, body) in files {
            storage
                .put(&layout::join_key(&hls, path), Bytes::from(body))
                .await
                .unwrap();
        }

        let repo = MemoryVideoRepository::with_videos([video.clone()]);
        let service = StreamingService::new(storage, repo, MemoryAdSlots::new(slots), "https://api.example.com")
            .with_seed(7);
        (service, video)
    }

    fn manifest(asset: ServedAsset) -> String {
        match asset.body {
            ServedBody::Manifest(text) => text,
            ServedBody::Stream(_) => panic!("expected a manifest"),
        }
    }

    #[tokio::test]
    async fn test_master_is_rewritten_without_ads() {
        let (service, _) = service(vec![slot()]).await;
        let asset = service.serve("talk", "master.m3u8").await.unwrap();
        assert_eq!(asset.content_type, MANIFEST_CONTENT_TYPE);
        assert_eq!(asset.cache_control, MANIFEST_CACHE_CONTROL);

        let text = manifest(asset);
        assert!(text.contains("https://api.example.com/streaming/hls/talk/720p/720p.m3u8"));
        assert!(!text.contains("#EXT-X-CUE-OUT"));
    }

    #[tokio::test]
    async fn test_variant_gets_pre_roll_and_proxy_urls() {
        let (service, video) = service(vec![slot()]).await;
        let uid = video.uid.to_string();
        let text = manifest(service.serve(&uid, "720p/720p.m3u8").await.unwrap());

        let cue = text.find("#EXT-X-CUE-OUT:DURATION=15").unwrap();
        let first_segment = text.find("720p_000.ts").unwrap();
        assert!(cue < first_segment);
        assert!(text.contains("#EXT-X-ASSET:CAID=slot-4"));
        assert!(text.contains(&format!(
            "https://api.example.com/streaming/hls/{}/720p/720p_001.ts",
            uid
        )));
    }

    #[tokio::test]
    async fn test_variant_without_slots_has_no_cues() {
        let (service, _) = service(Vec::new()).await;
        let text = manifest(service.serve("talk", "720p/720p.m3u8").await.unwrap());
        assert!(!text.contains("#EXT-X-CUE-OUT"));
    }

    #[tokio::test]
    async fn test_segments_stream_unmodified() {
        let (service, _) = service(vec![slot()]).await;
        let asset = service.serve("talk", "720p/720p_000.ts").await.unwrap();
        assert_eq!(asset.content_type, SEGMENT_CONTENT_TYPE);
        assert_eq!(asset.cache_control, SEGMENT_CACHE_CONTROL);

        let ServedBody::Stream(stream) = asset.body else {
            panic!("expected a stream");
        };
        let bytes: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(bytes.concat(), b"segment-bytes");
    }

    #[tokio::test]
    async fn test_rejects_traversal_and_unknown_videos() {
        let (service, _) = service(Vec::new()).await;
        assert!(matches!(
            service.serve("talk", "../../secrets").await.unwrap_err(),
            PipelineError::InvalidPath(_)
        ));
        assert!(matches!(
            service.serve("nope", "master.m3u8").await.unwrap_err(),
            PipelineError::VideoNotFound(_)
        ));
        assert!(matches!(
            service.serve("talk", "720p/720p_999.ts").await.unwrap_err(),
            PipelineError::VideoNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_unfinished_video_is_not_served() {
        let (service, video) = service(Vec::new()).await;
        let mut pending = video.clone();
        pending.mark_processing();
        service.repo.save(&pending).await.unwrap();

        assert!(service.serve("talk", "master.m3u8").await.is_err());
    }
}
