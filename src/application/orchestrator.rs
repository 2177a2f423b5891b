//! Drives one video from its uploaded original to a published HLS tree.

use crate::application::lifecycle::StorageLifecycle;
use crate::application::notifier::ProgressNotifier;
use crate::domain::events::Stage;
use crate::domain::hls::MasterPlaylist;
use crate::domain::jobs::TranscodeJob;
use crate::domain::layout;
use crate::domain::preset::{QualityPreset, VariantDescriptor};
use crate::domain::video::{Video, VideoId};
use crate::error::{PipelineError, Result};
use crate::ports::codec::{CodecPort, EncodeOutcome};
use crate::ports::repository::VideoRepository;
use crate::ports::storage::ObjectStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Tokens of every live run, per video. Overlapping runs of one video each
/// keep their own entry.
type Registry = Mutex<HashMap<VideoId, Vec<(u64, CancellationToken)>>>;

/// Removes this run's token when the run ends, however it ends.
struct Registration<'a> {
    registry: &'a Registry,
    video_id: VideoId,
    run_id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(runs) = registry.get_mut(&self.video_id) {
            runs.retain(|(run_id, _)| *run_id != self.run_id);
            if runs.is_empty() {
                registry.remove(&self.video_id);
            }
        }
    }
}

pub struct TranscodeOrchestrator<S, R, C> {
    storage: S,
    repo: R,
    codec: C,
    lifecycle: StorageLifecycle<S>,
    notifier: ProgressNotifier,
    presets: Vec<QualityPreset>,
    work_dir: PathBuf,
    running: Registry,
    next_run: AtomicU64,
}

impl<S, R, C> TranscodeOrchestrator<S, R, C>
where
    S: ObjectStore + Clone,
    R: VideoRepository,
    C: CodecPort,
{
    pub fn new(storage: S, repo: R, codec: C, notifier: ProgressNotifier, work_dir: PathBuf) -> Self {
        Self {
            lifecycle: StorageLifecycle::new(storage.clone()),
            storage,
            repo,
            codec,
            notifier,
            presets: QualityPreset::ladder(),
            work_dir,
            running: Mutex::new(HashMap::new()),
            next_run: AtomicU64::new(0),
        }
    }

    pub fn with_presets(mut self, presets: Vec<QualityPreset>) -> Self {
        self.presets = presets;
        self
    }

    /// Cancel every in-flight run for `video_id`. Returns whether any was running.
    pub fn cancel(&self, video_id: VideoId) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        match running.get(&video_id) {
            Some(runs) if !runs.is_empty() => {
                info!(video_id, runs = runs.len(), "cancelling transcode");
                for (_, token) in runs {
                    token.cancel();
                }
                true
            }
            _ => false,
        }
    }

    fn register(&self, video_id: VideoId) -> (CancellationToken, Registration<'_>) {
        let token = CancellationToken::new();
        let run_id = self.next_run.fetch_add(1, Ordering::Relaxed);
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(video_id)
            .or_default()
            .push((run_id, token.clone()));
        (
            token,
            Registration {
                registry: &self.running,
                video_id,
                run_id,
            },
        )
    }

    /// Run the whole job. Any failure is recorded on the video and then
    /// returned so the queue can decide about retrying. A video deleted
    /// mid-run is never written back.
    pub async fn transcode(&self, job: &TranscodeJob) -> Result<Video> {
        let video_id = job.video_id;
        let mut video = self
            .repo
            .get(video_id)
            .await?
            .ok_or_else(|| PipelineError::VideoNotFound(video_id.to_string()))?;

        let (token, _registration) = self.register(video_id);

        video.mark_processing();
        video.processing_error = None;
        if !self.repo.update(&video).await? {
            return Err(PipelineError::VideoNotFound(video_id.to_string()));
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let work = tempfile::Builder::new()
            .prefix(&format!("transcode-{}-", video_id))
            .tempdir_in(&self.work_dir)?;

        let outcome = self.run(&mut video, &token, work.path()).await;
        if let Err(e) = work.close() {
            warn!(video_id, error = %e, "could not remove working directory");
        }

        match outcome {
            Ok(()) => {
                let hls_path = video.hls_path.clone().unwrap_or_default();
                info!(video_id, hls_path = %hls_path, "transcode completed");
                self.notifier.complete(video_id, hls_path);
                Ok(video)
            }
            Err(e) => {
                error!(video_id, error = %e, "transcode failed");
                video.mark_failed(e.to_string());
                match self.repo.update(&video).await {
                    Ok(true) => {}
                    Ok(false) => debug!(video_id, "video deleted, failure not recorded"),
                    Err(save_err) => {
                        error!(video_id, error = %save_err, "could not record transcode failure")
                    }
                }
                self.notifier
                    .error(video_id, "Video processing failed", Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run(&self, video: &mut Video, token: &CancellationToken, work: &Path) -> Result<()> {
        let video_id = video.id;
        let source = video
            .source
            .clone()
            .ok_or(PipelineError::SourceMissing(video_id))?;
        if !self.storage.exists(&source).await? {
            return Err(PipelineError::SourceMissing(video_id));
        }

        self.notifier
            .progress(video_id, Stage::Downloading, 5, "Downloading source");
        let extension = Path::new(&source)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let input = work.join(format!("source.{}", extension));
        self.storage.download(&source, &input).await?;
        check_cancelled(token, video_id)?;

        self.notifier
            .progress(video_id, Stage::Probing, 10, "Probing duration");
        let duration = self.codec.probe_duration(&input).await;

        let output_dir = work.join("hls");
        tokio::fs::create_dir_all(&output_dir).await?;
        let variants = self
            .encode_all(video_id, token, &input, &output_dir)
            .await?;

        let master = MasterPlaylist::new(variants);
        master
            .write_to(&output_dir.join(layout::MASTER_PLAYLIST))
            .await
            .map_err(PipelineError::ManifestWriteFailed)?;
        check_cancelled(token, video_id)?;

        self.notifier
            .progress(video_id, Stage::Uploading, 80, "Uploading stream files");
        let hls_dir = layout::hls_dir(&video.uid.to_string());
        let published = self.publish(video, token, &output_dir, &hls_dir, duration).await;
        if let Err(e) = published {
            let removed = self.lifecycle.delete_hls_tree(&hls_dir).await;
            warn!(video_id, removed, hls_dir = %hls_dir, "discarded unpublished HLS tree");
            return Err(e);
        }

        self.lifecycle.delete_original(video).await;
        Ok(())
    }

    /// Upload the tree and record completion. Cancellation or deletion
    /// landing during the upload leaves the record untouched.
    async fn publish(
        &self,
        video: &mut Video,
        token: &CancellationToken,
        output_dir: &Path,
        hls_dir: &str,
        duration: f64,
    ) -> Result<()> {
        let video_id = video.id;
        let uploaded = self.upload_tree(output_dir, hls_dir).await?;
        info!(video_id, files = uploaded, hls_dir = %hls_dir, "uploaded HLS tree");
        check_cancelled(token, video_id)?;

        self.notifier
            .progress(video_id, Stage::Finalizing, 95, "Finalizing");
        let mut completed = video.clone();
        let master_key = layout::join_key(hls_dir, layout::MASTER_PLAYLIST);
        completed.mark_completed(hls_dir.to_string(), master_key, duration);
        if !self.repo.update(&completed).await? {
            return Err(PipelineError::VideoNotFound(video_id.to_string()));
        }
        *video = completed;
        Ok(())
    }

    /// Encode every preset in ladder order. A failed preset is dropped from
    /// the result; only an empty result is an error.
    async fn encode_all(
        &self,
        video_id: VideoId,
        token: &CancellationToken,
        input: &Path,
        output_dir: &Path,
    ) -> Result<Vec<VariantDescriptor>> {
        let total = self.presets.len();
        let mut variants = Vec::with_capacity(total);

        let percent_at = |step: usize| (15 + step * 60 / total.max(1)) as u8;

        for (idx, preset) in self.presets.iter().enumerate() {
            check_cancelled(token, video_id)?;
            self.notifier.progress(
                video_id,
                Stage::Encoding,
                percent_at(idx),
                format!("Encoding {}", preset.name),
            );

            // Dropping the encode future kills the encoder child.
            let outcome = tokio::select! {
                _ = token.cancelled() => return Err(PipelineError::Cancelled(video_id)),
                outcome = self.codec.encode_variant(input, output_dir, preset) => outcome,
            };

            let message = match outcome {
                EncodeOutcome::Encoded(variant) => {
                    info!(video_id, preset = %preset.name, "variant encoded");
                    variants.push(variant);
                    format!("Encoded {}", preset.name)
                }
                EncodeOutcome::Failed { stderr } => {
                    let err = PipelineError::VariantEncodeFailed {
                        preset: preset.name.clone(),
                        stderr,
                    };
                    warn!(video_id, preset = %preset.name, error = %err, "skipping variant");
                    format!("Skipped {}", preset.name)
                }
            };
            self.notifier
                .progress(video_id, Stage::Encoding, percent_at(idx + 1), message);
        }

        if variants.is_empty() {
            return Err(PipelineError::AllVariantsFailed { attempted: total });
        }
        Ok(variants)
    }

    async fn upload_tree(&self, local_root: &Path, remote_dir: &str) -> Result<usize> {
        let files = local_files(local_root).await?;
        for file in &files {
            let relative = relative_key(local_root, file)
                .ok_or_else(|| PipelineError::InvalidPath(file.display().to_string()))?;
            self.storage
                .upload(file, &layout::join_key(remote_dir, &relative))
                .await?;
        }
        Ok(files.len())
    }
}

fn check_cancelled(token: &CancellationToken, video_id: VideoId) -> Result<()> {
    if token.is_cancelled() {
        return Err(PipelineError::Cancelled(video_id));
    }
    Ok(())
}

fn relative_key(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

async fn local_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                pending.push(entry.path());
            } else {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryObjectStore, MemoryVideoRepository};
    use crate::application::testing::{RecordingSink, ScriptedCodec};
    use crate::domain::events::ProgressEvent;
    use crate::domain::hls::MediaPlaylist;
    use crate::domain::video::ProcessingStatus;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Arc;
    use tokio::sync::Notify;

    const SOURCE: &str = "videos/originals/1_clip.mp4";

    struct Fixture<C> {
        orchestrator: TranscodeOrchestrator<MemoryObjectStore, MemoryVideoRepository, C>,
        storage: MemoryObjectStore,
        repo: MemoryVideoRepository,
        sink: Arc<RecordingSink>,
        work: tempfile::TempDir,
    }

    async fn fixture<C: CodecPort>(codec: C) -> Fixture<C> {
        let storage = MemoryObjectStore::new();
        storage
            .put(SOURCE, Bytes::from_static(b"fake video"))
            .await
            .unwrap();
        let mut video = Video::new(1, "Clip");
        video.source = Some(SOURCE.to_string());
        let repo = MemoryVideoRepository::with_videos([video]);
        let sink = Arc::new(RecordingSink::default());
        let work = tempfile::tempdir().unwrap();
        let orchestrator = TranscodeOrchestrator::new(
            storage.clone(),
            repo.clone(),
            codec,
            ProgressNotifier::new(sink.clone()),
            work.path().to_path_buf(),
        );
        Fixture {
            orchestrator,
            storage,
            repo,
            sink,
            work,
        }
    }

    fn job() -> TranscodeJob {
        TranscodeJob { video_id: 1 }
    }

    fn work_is_empty(work: &tempfile::TempDir) -> bool {
        std::fs::read_dir(work.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_all_presets_publish_full_tree() {
        let fx = fixture(ScriptedCodec::succeeding()).await;
        let video = fx.orchestrator.transcode(&job()).await.unwrap();

        assert_eq!(video.processing_status, ProcessingStatus::Completed);
        assert_eq!(video.duration, Some(42.0));
        let hls = layout::hls_dir(&video.uid.to_string());
        assert_eq!(video.hls_path.as_deref(), Some(hls.as_str()));

        let master_key = video.hls_master_playlist.clone().unwrap();
        let master = fx.storage.get(&master_key).await.unwrap();
        let master = String::from_utf8(master.to_vec()).unwrap();
        let order: Vec<&str> = master
            .lines()
            .filter(|l| l.ends_with(".m3u8"))
            .collect();
        assert_eq!(
            order,
            vec!["1080p/1080p.m3u8", "720p/720p.m3u8", "480p/480p.m3u8", "360p/360p.m3u8"]
        );

        let variant = fx
            .storage
            .get(&layout::join_key(&hls, "720p/720p.m3u8"))
            .await
            .unwrap();
        assert_eq!(
            MediaPlaylist::parse(&String::from_utf8(variant.to_vec()).unwrap())
                .segments
                .len(),
            1
        );
        assert!(fx.storage.contains(&layout::join_key(&hls, "720p/720p_000.ts")));

        assert!(!fx.storage.contains(SOURCE));
        assert_eq!(fx.repo.snapshot(1).unwrap(), video);
        assert!(work_is_empty(&fx.work));
        assert!(matches!(fx.sink.events().last(), Some(ProgressEvent::Complete { .. })));
    }

    #[tokio::test]
    async fn test_single_surviving_preset_still_completes() {
        let fx = fixture(ScriptedCodec::failing(&["1080p", "720p", "360p"])).await;
        let video = fx.orchestrator.transcode(&job()).await.unwrap();

        assert_eq!(video.processing_status, ProcessingStatus::Completed);
        let master = fx
            .storage
            .get(video.hls_master_playlist.as_deref().unwrap())
            .await
            .unwrap();
        let master = String::from_utf8(master.to_vec()).unwrap();
        assert_eq!(master.matches("#EXT-X-STREAM-INF").count(), 1);
        assert!(master.contains("480p/480p.m3u8"));
    }

    #[tokio::test]
    async fn test_no_surviving_preset_fails_and_keeps_original() {
        let fx = fixture(ScriptedCodec::failing(&["1080p", "720p", "480p", "360p"])).await;
        let err = fx.orchestrator.transcode(&job()).await.unwrap_err();
        assert!(matches!(err, PipelineError::AllVariantsFailed { attempted: 4 }));

        let video = fx.repo.snapshot(1).unwrap();
        assert_eq!(video.processing_status, ProcessingStatus::Failed);
        assert!(video.processing_error.is_some());
        assert!(video.hls_master_playlist.is_none());
        assert!(fx.storage.contains(SOURCE));
        assert!(work_is_empty(&fx.work));
        assert!(matches!(fx.sink.events().last(), Some(ProgressEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_missing_source_is_reported() {
        let fx = fixture(ScriptedCodec::succeeding()).await;
        fx.storage.delete(SOURCE).await.unwrap();

        let err = fx.orchestrator.transcode(&job()).await.unwrap_err();
        assert!(matches!(err, PipelineError::SourceMissing(1)));
        assert_eq!(fx.repo.snapshot(1).unwrap().processing_status, ProcessingStatus::Failed);
    }

    #[tokio::test]
    async fn test_upload_failure_marks_failed() {
        let fx = fixture(ScriptedCodec::succeeding()).await;
        fx.storage.fail_writes_under("videos/hls/");

        let err = fx.orchestrator.transcode(&job()).await.unwrap_err();
        assert!(matches!(err, PipelineError::StorageIo { .. }));
        assert!(err.is_retryable());
        let video = fx.repo.snapshot(1).unwrap();
        assert_eq!(video.processing_status, ProcessingStatus::Failed);
        assert!(fx.storage.contains(SOURCE));
    }

    #[tokio::test]
    async fn test_unknown_video() {
        let fx = fixture(ScriptedCodec::succeeding()).await;
        let err = fx
            .orchestrator
            .transcode(&TranscodeJob { video_id: 2 })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::VideoNotFound(_)));
    }

    #[tokio::test]
    async fn test_progress_stages_run_in_order() {
        let fx = fixture(ScriptedCodec::failing(&["480p"])).await;
        fx.orchestrator.transcode(&job()).await.unwrap();

        let progress: Vec<(Stage, u8, String)> = fx
            .sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress {
                    stage,
                    percent,
                    message,
                    ..
                } => Some((stage, percent, message)),
                _ => None,
            })
            .collect();
        assert!(progress.windows(2).all(|w| w[0].1 <= w[1].1));
        assert_eq!(progress.first().map(|p| p.1), Some(5));

        let encoding: Vec<&str> = progress
            .iter()
            .filter(|(stage, _, _)| *stage == Stage::Encoding)
            .map(|(_, _, message)| message.as_str())
            .collect();
        assert_eq!(
            encoding,
            vec![
                "Encoding 1080p",
                "Encoded 1080p",
                "Encoding 720p",
                "Encoded 720p",
                "Encoding 480p",
                "Skipped 480p",
                "Encoding 360p",
                "Encoded 360p",
            ]
        );
    }

    /// Blocks in the encoder until the test cancels.
    struct HangingCodec {
        started: Arc<Notify>,
    }

    #[async_trait]
    impl CodecPort for HangingCodec {
        async fn encode_variant(&self, _input: &Path, _output_dir: &Path, _preset: &QualityPreset) -> EncodeOutcome {
            self.started.notify_one();
            std::future::pending::<EncodeOutcome>().await
        }

        async fn probe_duration(&self, _input: &Path) -> f64 {
            10.0
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_encoding_and_cleans_up() {
        let started = Arc::new(Notify::new());
        let fx = fixture(HangingCodec {
            started: started.clone(),
        })
        .await;
        let orchestrator = Arc::new(fx.orchestrator);
        assert!(!orchestrator.cancel(1));

        let handle = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.transcode(&TranscodeJob { video_id: 1 }).await }
        });
        started.notified().await;
        assert!(orchestrator.cancel(1));

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled(1)));
        assert!(!err.is_retryable());

        let video = fx.repo.snapshot(1).unwrap();
        assert_eq!(video.processing_status, ProcessingStatus::Failed);
        assert!(fx.storage.contains(SOURCE));
        assert!(work_is_empty(&fx.work));
        assert!(!orchestrator.cancel(1));
    }

    #[tokio::test]
    async fn test_delete_while_encoding_leaves_no_record() {
        let started = Arc::new(Notify::new());
        let fx = fixture(HangingCodec {
            started: started.clone(),
        })
        .await;
        let orchestrator = Arc::new(fx.orchestrator);

        let handle = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.transcode(&TranscodeJob { video_id: 1 }).await }
        });
        started.notified().await;
        // Same order as the delete endpoint: record first, then the run.
        fx.repo.delete(1).await.unwrap();
        assert!(orchestrator.cancel(1));

        assert!(handle.await.unwrap().is_err());
        assert!(fx.repo.snapshot(1).is_none());
    }

    /// Encodes normally, but the video is deleted before the run publishes.
    struct DeletedAfterEncode {
        inner: ScriptedCodec,
        repo: MemoryVideoRepository,
    }

    #[async_trait]
    impl CodecPort for DeletedAfterEncode {
        async fn encode_variant(&self, input: &Path, output_dir: &Path, preset: &QualityPreset) -> EncodeOutcome {
            let outcome = self.inner.encode_variant(input, output_dir, preset).await;
            self.repo.delete(1).await.unwrap();
            outcome
        }

        async fn probe_duration(&self, input: &Path) -> f64 {
            self.inner.probe_duration(input).await
        }
    }

    #[tokio::test]
    async fn test_delete_before_publish_discards_tree() {
        let storage = MemoryObjectStore::new();
        storage
            .put(SOURCE, Bytes::from_static(b"fake video"))
            .await
            .unwrap();
        let mut video = Video::new(1, "Clip");
        video.source = Some(SOURCE.to_string());
        let hls = layout::hls_dir(&video.uid.to_string());
        let repo = MemoryVideoRepository::with_videos([video]);
        let work = tempfile::tempdir().unwrap();
        let orchestrator = TranscodeOrchestrator::new(
            storage.clone(),
            repo.clone(),
            DeletedAfterEncode {
                inner: ScriptedCodec::succeeding(),
                repo: repo.clone(),
            },
            ProgressNotifier::new(Arc::new(RecordingSink::default())),
            work.path().to_path_buf(),
        );

        let err = orchestrator.transcode(&job()).await.unwrap_err();
        assert!(matches!(err, PipelineError::VideoNotFound(_)));
        assert!(repo.snapshot(1).is_none());
        assert!(storage.keys().iter().all(|k| !k.starts_with(&hls)));
    }

    #[tokio::test]
    async fn test_overlapping_runs_keep_their_own_tokens() {
        let fx = fixture(ScriptedCodec::succeeding()).await;
        let (stale_token, stale) = fx.orchestrator.register(1);
        let (retry_token, retry) = fx.orchestrator.register(1);

        // The stale run ending must not unregister the retry.
        drop(stale);
        assert!(fx.orchestrator.cancel(1));
        assert!(retry_token.is_cancelled());
        assert!(!stale_token.is_cancelled());

        drop(retry);
        assert!(!fx.orchestrator.cancel(1));
    }

    #[tokio::test]
    async fn test_cancel_reaches_every_live_run() {
        let fx = fixture(ScriptedCodec::succeeding()).await;
        let (first_token, _first) = fx.orchestrator.register(1);
        let (second_token, _second) = fx.orchestrator.register(1);

        assert!(fx.orchestrator.cancel(1));
        assert!(first_token.is_cancelled());
        assert!(second_token.is_cancelled());
    }
}
