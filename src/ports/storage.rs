use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::path::Path;

/// Byte stream of an object body.
pub type ObjectStream = BoxStream<'static, std::io::Result<Bytes>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Blob storage addressed by slash-separated keys.
///
/// Directory-like prefixes end with `/`. Deleting a key that does not exist
/// succeeds.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Read a whole object into memory.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Stream an object without buffering it.
    async fn open(&self, key: &str) -> Result<ObjectStream>;

    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Every object under `prefix`, at any depth.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Immediate child prefixes of `prefix`, each ending with `/`.
    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove a prefix that no longer holds objects. No-op on flat stores.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    /// Download an object to a local file, streaming.
    async fn download(&self, key: &str, local_path: &Path) -> Result<()>;

    /// Upload a local file, streaming.
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()>;
}
