//! Two-tier image storage: a local disk cache in front of the remote blob
//! store.
//!
//! Reads are local-first (read-through); writes go to both tiers
//! (write-through). The remote store is the durable source of truth, so its
//! failures are terminal, while local failures are always recoverable via a
//! remote re-fetch and are swallowed with a log line.

pub mod format;
pub mod local;
pub mod s3;

use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;

use crate::backend::RemoteImageStore;
use crate::errors::StoreError;
use crate::images::local::LocalImageCache;

/// Unified retrieval coordinator over the two tiers.
///
/// The local name (typically a document id) and the remote path are
/// independent keys; callers pass a matching pair and the coordinator does
/// not persist the mapping itself.
pub struct ImageStore {
    local: LocalImageCache,
    remote: Arc<dyn RemoteImageStore>,
}

impl ImageStore {
    pub fn new(local: LocalImageCache, remote: Arc<dyn RemoteImageStore>) -> Self {
        Self { local, remote }
    }

    /// Retrieves an image, prioritizing the local cache before fetching from
    /// the remote store. A local hit is authoritative: no freshness check, no
    /// remote round trip.
    pub async fn retrieve(&self, name: &str, remote_path: &str) -> Result<Bytes, StoreError> {
        if let Ok(bytes) = self.local.load(name).await {
            return Ok(bytes);
        }

        // Any local failure, miss or otherwise, falls through to remote.
        let bytes = self.remote.get(remote_path).await?;

        // Best-effort re-cache: must never fail the retrieve itself.
        if let Err(e) = self.local.save(&bytes, name).await {
            warn!("failed to cache image {name} locally: {e}");
        }

        Ok(bytes)
    }

    /// Stores an image to both tiers and returns the remote download URL.
    ///
    /// The remote write's outcome is authoritative for the result; a local
    /// write failure is logged and not reflected in it (known lenient
    /// behavior, kept deliberately).
    pub async fn store(
        &self,
        bytes: Bytes,
        name: &str,
        remote_path: &str,
    ) -> Result<String, StoreError> {
        if let Err(e) = self.local.save(&bytes, name).await {
            warn!("failed to write image {name} to local cache: {e}");
        }
        self.remote.put(bytes, remote_path).await
    }

    /// Deletes from both tiers: best-effort locally, propagated remotely.
    pub async fn delete(&self, name: &str, remote_url: &str) -> Result<(), StoreError> {
        if let Err(e) = self.local.delete(name).await {
            warn!("failed to delete local image {name}: {e}");
        }
        self.remote.delete(remote_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryImageStore;
    use crate::images::s3::MAX_DOWNLOAD_BYTES;

    fn jpeg_bytes() -> Bytes {
        Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0, 0x0A, 0x0B])
    }

    fn fixture() -> (tempfile::TempDir, ImageStore, Arc<MemoryImageStore>) {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalImageCache::new(dir.path()).unwrap();
        let remote = Arc::new(MemoryImageStore::new(MAX_DOWNLOAD_BYTES));
        let store = ImageStore::new(local, remote.clone());
        (dir, store, remote)
    }

    #[tokio::test]
    async fn test_retrieve_falls_back_to_remote_then_caches() {
        let (_dir, store, remote) = fixture();
        remote.seed("p/img", jpeg_bytes()).await;

        let first = store.retrieve("missing", "p/img").await.unwrap();
        assert_eq!(first, jpeg_bytes());
        assert_eq!(remote.get_calls(), 1);

        // Second read must be served locally.
        let second = store.retrieve("missing", "p/img").await.unwrap();
        assert_eq!(second, jpeg_bytes());
        assert_eq!(remote.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_surfaces_remote_failure() {
        let (_dir, store, _remote) = fixture();
        let err = store.retrieve("nope", "p/absent").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_size_cap_is_distinguishable() {
        let (_dir, store, remote) = fixture();
        let oversized = Bytes::from(
            [&[0xFF, 0xD8, 0xFF][..], &vec![0u8; 6 * 1024 * 1024][..]].concat(),
        );
        remote.seed("p/big", oversized).await;

        let err = store.retrieve("big", "p/big").await.unwrap_err();
        assert!(
            matches!(err, StoreError::SizeExceeded { limit, .. } if limit == MAX_DOWNLOAD_BYTES),
            "expected SizeExceeded, got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_store_writes_both_tiers_and_returns_url() {
        let (_dir, store, remote) = fixture();

        let url = store.store(jpeg_bytes(), "n1", "p/n1").await.unwrap();
        assert_eq!(url, "memory://p/n1");
        assert_eq!(remote.put_calls(), 1);

        // Subsequent read is a local hit.
        store.retrieve("n1", "p/n1").await.unwrap();
        assert_eq!(remote.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_succeeds_when_local_write_fails() {
        // Known lenient behavior: a local-tier failure during store is not
        // reflected in the composite result.
        let (_dir, store, remote) = fixture();

        // A name pointing into a nonexistent subdirectory makes the local
        // write fail with Io while the remote write proceeds.
        let url = store
            .store(jpeg_bytes(), "no/such/subdir", "p/n2")
            .await
            .unwrap();
        assert_eq!(url, "memory://p/n2");
        assert_eq!(remote.put_calls(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_best_effort_locally() {
        let (_dir, store, remote) = fixture();
        remote.seed("p/d", jpeg_bytes()).await;

        // Nothing cached locally; local delete fails and is swallowed, the
        // remote delete still runs.
        store.delete("never-cached", "memory://p/d").await.unwrap();
        assert!(remote.get("p/d").await.unwrap_err().is_not_found());
    }
}
