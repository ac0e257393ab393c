//! Invoice scans live in an opaque blob store addressed by `image_key`.
//!
//! The engine only ever deletes blobs, and only after the database has
//! committed; failures are logged by the caller and otherwise ignored.

use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob key: {0}")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Delete the blob stored under `key`. Deleting a missing blob succeeds.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
}

/// Store used when no blob storage is configured: nothing to delete.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBlobStore;

#[async_trait]
impl BlobStore for NoopBlobStore {
    async fn delete(&self, _key: &str) -> Result<(), BlobError> {
        Ok(())
    }
}

/// Blobs stored as plain files below a root directory.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `key` below the root, refusing anything that could escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_cannot_escape_the_root() {
        let store = FsBlobStore::new("/srv/blobs");
        assert_eq!(
            store.path_for("2024/01/scan.pdf").unwrap(),
            PathBuf::from("/srv/blobs/2024/01/scan.pdf")
        );
        assert!(store.path_for("../etc/passwd").is_err());
        assert!(store.path_for("/etc/passwd").is_err());
        assert!(store.path_for("").is_err());
    }
}
