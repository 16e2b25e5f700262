//! Blob storage for user avatars.
//!
//! Federated logins persist the provider-hosted avatar image locally so the
//! userinfo endpoint can hand out a URL this deployment controls. The store
//! is keyed by user id; serving the files is outside this crate (a reverse
//! proxy or static file layer fronts `public_base_url`).

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::StorageError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist a blob under the given key, overwriting any previous value.
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Public URL the blob is reachable at.
    fn url(&self, key: &str) -> String;
}

/// Filesystem-backed store.
pub struct FsStore {
    dir: PathBuf,
    public_base_url: String,
}

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        let mut public_base_url = public_base_url.into();
        while public_base_url.ends_with('/') {
            public_base_url.pop();
        }
        Self {
            dir: dir.into(),
            public_base_url,
        }
    }
}

#[async_trait]
impl BlobStore for FsStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        // Keys are opaque ids we generate; anything path-like is a bug.
        if key.is_empty() || key.contains(['/', '\\', '.']) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StorageError::Write {
                key: key.to_string(),
                source,
            })?;
        tokio::fs::write(self.dir.join(key), data)
            .await
            .map_err(|source| StorageError::Write {
                key: key.to_string(),
                source,
            })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_writes_blob_and_url_points_at_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path(), "http://localhost:3000/static/avatars/");

        store.put("abc123", b"image-bytes").await.unwrap();
        let on_disk = std::fs::read(dir.path().join("abc123")).unwrap();
        assert_eq!(on_disk, b"image-bytes");

        assert_eq!(
            store.url("abc123"),
            "http://localhost:3000/static/avatars/abc123"
        );
    }

    #[tokio::test]
    async fn put_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path(), "http://localhost:3000/static");

        assert!(store.put("../escape", b"x").await.is_err());
        assert!(store.put("a/b", b"x").await.is_err());
        assert!(store.put("", b"x").await.is_err());
    }
}
