//! In-memory adapters. Used by the test suites and for running the pipeline
//! without external services.

use crate::domain::ad_slot::AdSlot;
use crate::domain::jobs::QueuedJob;
use crate::domain::video::{Video, VideoId};
use crate::error::{PipelineError, Result};
use crate::ports::ads::AdSlotSource;
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::VideoRepository;
use crate::ports::storage::{ObjectMeta, ObjectStore, ObjectStream};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct StoreState {
    objects: BTreeMap<String, (Bytes, DateTime<Utc>)>,
    failing_deletes: HashSet<String>,
    failing_write_prefixes: Vec<String>,
}

/// Flat key/value object store.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object with an explicit modification time.
    pub fn put_at(&self, key: &str, data: impl Into<Bytes>, modified: DateTime<Utc>) {
        lock(&self.state)
            .objects
            .insert(key.to_string(), (data.into(), modified));
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.state).objects.keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.state).objects.contains_key(key)
    }

    /// Make every delete of `key` fail.
    pub fn fail_deletes_of(&self, key: &str) {
        lock(&self.state).failing_deletes.insert(key.to_string());
    }

    /// Make every write below `prefix` fail.
    pub fn fail_writes_under(&self, prefix: &str) {
        lock(&self.state)
            .failing_write_prefixes
            .push(prefix.to_string());
    }

    fn check_writable(state: &StoreState, key: &str) -> Result<()> {
        if state
            .failing_write_prefixes
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
        {
            return Err(PipelineError::storage(key, "write rejected"));
        }
        Ok(())
    }

    fn fetch(&self, key: &str) -> Result<Bytes> {
        lock(&self.state)
            .objects
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| PipelineError::storage(key, "no such key"))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.contains(key))
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.fetch(key)
    }

    async fn open(&self, key: &str) -> Result<ObjectStream> {
        let data = self.fetch(key)?;
        Ok(futures::stream::once(async move { Ok(data) }).boxed())
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let mut state = lock(&self.state);
        Self::check_writable(&state, key)?;
        state.objects.insert(key.to_string(), (data, Utc::now()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if state.failing_deletes.contains(key) {
            return Err(PipelineError::storage(key, "delete rejected"));
        }
        state.objects.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        Ok(lock(&self.state)
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, (data, modified))| ObjectMeta {
                key: key.clone(),
                size: data.len() as u64,
                last_modified: *modified,
            })
            .collect())
    }

    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>> {
        let state = lock(&self.state);
        let prefixes: BTreeSet<String> = state
            .objects
            .keys()
            .filter_map(|key| {
                let rest = key.strip_prefix(prefix)?;
                let (child, _) = rest.split_once('/')?;
                Some(format!("{}{}/", prefix, child))
            })
            .collect();
        Ok(prefixes.into_iter().collect())
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<()> {
        let data = self.fetch(key)?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &data)
            .await
            .map_err(|e| PipelineError::storage(key, e))
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<()> {
        Self::check_writable(&lock(&self.state), key)?;
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| PipelineError::storage(key, e))?;
        self.put(key, Bytes::from(data)).await
    }
}

/// Video records keyed by id.
#[derive(Clone, Default)]
pub struct MemoryVideoRepository {
    videos: Arc<Mutex<HashMap<VideoId, Video>>>,
}

impl MemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_videos(videos: impl IntoIterator<Item = Video>) -> Self {
        let repo = Self::new();
        lock(&repo.videos).extend(videos.into_iter().map(|v| (v.id, v)));
        repo
    }

    pub fn snapshot(&self, id: VideoId) -> Option<Video> {
        lock(&self.videos).get(&id).cloned()
    }
}

#[async_trait]
impl VideoRepository for MemoryVideoRepository {
    async fn get(&self, id: VideoId) -> Result<Option<Video>> {
        Ok(self.snapshot(id))
    }

    async fn find_by_public_id(&self, key: &str) -> Result<Option<Video>> {
        Ok(lock(&self.videos)
            .values()
            .find(|v| v.matches_public_id(key))
            .cloned())
    }

    async fn save(&self, video: &Video) -> Result<()> {
        lock(&self.videos).insert(video.id, video.clone());
        Ok(())
    }

    async fn update(&self, video: &Video) -> Result<bool> {
        match lock(&self.videos).get_mut(&video.id) {
            Some(stored) => {
                *stored = video.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn try_claim(&self, id: VideoId) -> Result<bool> {
        let mut videos = lock(&self.videos);
        match videos.get_mut(&id) {
            Some(video) if video.processing_status.is_claimable() => {
                video.mark_processing();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: VideoId) -> Result<Option<Video>> {
        Ok(lock(&self.videos).remove(&id))
    }
}

/// Fixed ad catalog.
#[derive(Clone, Default)]
pub struct MemoryAdSlots {
    slots: Arc<Mutex<Vec<AdSlot>>>,
}

impl MemoryAdSlots {
    pub fn new(slots: Vec<AdSlot>) -> Self {
        Self {
            slots: Arc::new(Mutex::new(slots)),
        }
    }
}

#[async_trait]
impl AdSlotSource for MemoryAdSlots {
    async fn active_slots(&self, _video: &Video) -> Result<Vec<AdSlot>> {
        Ok(lock(&self.slots)
            .iter()
            .filter(|slot| slot.is_servable())
            .cloned()
            .collect())
    }
}

/// FIFO job queue with blocking dequeue.
#[derive(Clone, Default)]
pub struct MemoryJobQueue {
    jobs: Arc<Mutex<VecDeque<QueuedJob>>>,
    notify: Arc<Notify>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<QueuedJob> {
        lock(&self.jobs).iter().cloned().collect()
    }
}

#[async_trait]
impl JobQueuePort for MemoryJobQueue {
    async fn enqueue_job(&self, job: QueuedJob) -> Result<()> {
        lock(&self.jobs).push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue_job(&self, timeout_secs: f64) -> Result<Option<QueuedJob>> {
        loop {
            let notified = self.notify.notified();
            if let Some(job) = lock(&self.jobs).pop_front() {
                return Ok(Some(job));
            }
            if timeout_secs > 0.0 {
                if tokio::time::timeout(Duration::from_secs_f64(timeout_secs), notified)
                    .await
                    .is_err()
                {
                    return Ok(None);
                }
            } else {
                notified.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::Job;

    #[tokio::test]
    async fn test_list_prefixes_groups_children() {
        let store = MemoryObjectStore::new();
        for key in ["videos/chunks/1/chunk_0000", "videos/chunks/2/chunk_0000", "videos/chunks/2/chunk_0001"] {
            store.put(key, Bytes::from_static(b"x")).await.unwrap();
        }
        assert_eq!(
            store.list_prefixes("videos/chunks/").await.unwrap(),
            vec!["videos/chunks/1/", "videos/chunks/2/"]
        );
        assert_eq!(store.list("videos/chunks/2/").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let repo = MemoryVideoRepository::with_videos([Video::new(1, "a")]);
        assert!(repo.try_claim(1).await.unwrap());
        assert!(!repo.try_claim(1).await.unwrap());
        assert!(!repo.try_claim(2).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_never_recreates_deleted_record() {
        let repo = MemoryVideoRepository::with_videos([Video::new(1, "a")]);
        let mut video = repo.snapshot(1).unwrap();
        video.mark_failed("boom");
        assert!(repo.update(&video).await.unwrap());
        assert_eq!(repo.snapshot(1).unwrap().processing_error.as_deref(), Some("boom"));

        repo.delete(1).await.unwrap();
        assert!(!repo.update(&video).await.unwrap());
        assert!(repo.snapshot(1).is_none());
    }

    #[tokio::test]
    async fn test_queue_times_out_when_empty() {
        let queue = MemoryJobQueue::new();
        assert!(queue.dequeue_job(0.01).await.unwrap().is_none());

        queue
            .enqueue_job(QueuedJob::new(Job::SweepStaleChunks))
            .await
            .unwrap();
        let job = queue.dequeue_job(0.01).await.unwrap().unwrap();
        assert_eq!(job.job, Job::SweepStaleChunks);
    }
}
