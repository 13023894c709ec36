//! Local disk tier of the image cache.
//!
//! Blobs live as flat files under a per-installation directory, keyed by a
//! caller-chosen name (typically a document id). Writes are atomic: the bytes
//! land in a temp file first and are renamed into place, so a concurrent
//! reader never observes a partial file. There is no eviction; capacity
//! management is the host's (or the OS's) problem.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::images::format::ImageFormat;

pub struct LocalImageCache {
    dir: PathBuf,
}

impl LocalImageCache {
    /// Creates the cache over `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Saves image bytes under `name`. Fails with `Encode` when the bytes are
    /// not a recognizable image.
    pub async fn save(&self, bytes: &Bytes, name: &str) -> Result<(), StoreError> {
        if ImageFormat::sniff(bytes).is_none() {
            return Err(StoreError::Encode);
        }
        let target = self.path_for(name);
        // Write-then-rename so readers only ever see a complete file.
        let tmp = self.dir.join(format!(".{}.{}", name, Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!("cached image {name} locally ({} bytes)", bytes.len());
        Ok(())
    }

    /// Loads the image bytes stored under `name`. `NotFound` when absent
    /// (expected), `Decode` when a file exists but is not an image.
    pub async fn load(&self, name: &str) -> Result<Bytes, StoreError> {
        let path = self.path_for(name);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if ImageFormat::sniff(&data).is_none() {
            return Err(StoreError::Decode);
        }
        Ok(Bytes::from(data))
    }

    /// Deletes the file stored under `name`.
    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
