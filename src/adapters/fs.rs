//! Filesystem object store. Keys map to paths under a root directory.

use crate::domain::layout;
use crate::error::{PipelineError, Result};
use crate::ports::storage::{ObjectMeta, ObjectStore, ObjectStream};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;

#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = key.trim_end_matches('/');
        if relative.is_empty() {
            return Ok(self.root.clone());
        }
        if !layout::is_safe_relative(relative) {
            return Err(PipelineError::InvalidPath(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// All files and directories below `dir`, depth first.
    async fn walk(&self, dir: &Path) -> Result<(Vec<(PathBuf, std::fs::Metadata)>, Vec<PathBuf>)> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(PipelineError::storage(current.display().to_string(), e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| PipelineError::storage(current.display().to_string(), e))?
            {
                let path = entry.path();
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| PipelineError::storage(path.display().to_string(), e))?;
                if meta.is_dir() {
                    dirs.push(path.clone());
                    pending.push(path);
                } else {
                    files.push((path, meta));
                }
            }
        }
        Ok((files, dirs))
    }
}

fn modified_at(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| PipelineError::storage(key, e))
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| PipelineError::storage(key, e))
    }

    async fn open(&self, key: &str) -> Result<ObjectStream> {
        let path = self.path_for(key)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| PipelineError::storage(key, e))?;
        Ok(ReaderStream::new(file).boxed())
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.path_for(key)?;
        ensure_parent(&path)
            .await
            .map_err(|e| PipelineError::storage(key, e))?;
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| PipelineError::storage(key, e))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::storage(key, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        // Walk the deepest directory the prefix names, then filter on the full prefix.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let dir = self.path_for(dir_part)?;
        let (files, _) = self.walk(&dir).await?;

        let mut objects: Vec<ObjectMeta> = files
            .into_iter()
            .filter_map(|(path, meta)| {
                let key = self.key_for(&path)?;
                key.starts_with(prefix).then(|| ObjectMeta {
                    key,
                    size: meta.len(),
                    last_modified: modified_at(&meta),
                })
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.path_for(prefix)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PipelineError::storage(prefix, e)),
        };

        let mut prefixes = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PipelineError::storage(prefix, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if is_dir {
                prefixes.push(format!("{}{}/", prefix, entry.file_name().to_string_lossy()));
            }
        }
        prefixes.sort();
        Ok(prefixes)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let dir = self.path_for(prefix)?;
        let (_, mut dirs) = self.walk(&dir).await?;

        // Deepest first so parents are empty by the time they are removed.
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        dirs.push(dir);
        for d in dirs {
            match tokio::fs::remove_dir(&d).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(PipelineError::storage(d.display().to_string(), e)),
            }
        }
        Ok(())
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<()> {
        let path = self.path_for(key)?;
        if path == local_path {
            return Ok(());
        }
        ensure_parent(local_path)
            .await
            .map_err(|e| PipelineError::storage(key, e))?;
        tokio::fs::copy(&path, local_path)
            .await
            .map(|_| ())
            .map_err(|e| PipelineError::storage(key, e))
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if path == local_path {
            return Ok(());
        }
        ensure_parent(&path)
            .await
            .map_err(|e| PipelineError::storage(key, e))?;
        tokio::fs::copy(local_path, &path)
            .await
            .map(|_| ())
            .map_err(|e| PipelineError::storage(key, e))
    }
}
