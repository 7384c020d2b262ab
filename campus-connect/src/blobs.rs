//! Binary object storage for society images.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use crate::errors::StorageError;

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Stores `bytes` at `path`, replacing any previous blob, and returns its download URL.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String, StorageError>;

    async fn get_url(&self, path: &str) -> Result<String, StorageError>;

    /// Deletes a blob addressed either by its path or by a URL this storage issued.
    async fn delete(&self, path_or_url: &str) -> Result<(), StorageError>;
}

/// Blob storage held in memory. URLs have the form `memory://{bucket}/{path}`.
pub struct MemoryBlobStorage {
    bucket: String,
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStorage {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            blobs: Mutex::new(BTreeMap::new()),
        }
    }

    fn blobs(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn url_for(&self, path: &str) -> String {
        format!("memory://{}/{}", self.bucket, path)
    }

    fn resolve(&self, path_or_url: &str) -> Result<String, StorageError> {
        let url_prefix = format!("memory://{}/", self.bucket);
        let path = match path_or_url.strip_prefix(&url_prefix) {
            Some(path) => path,
            None if path_or_url.contains("://") => {
                return Err(StorageError::InvalidPath {
                    path: path_or_url.to_string(),
                });
            }
            None => path_or_url,
        };
        let valid = !path.is_empty() && path.split('/').all(|segment| !segment.is_empty() && segment != "..");
        if !valid {
            return Err(StorageError::InvalidPath {
                path: path_or_url.to_string(),
            });
        }
        Ok(path.to_string())
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.blobs().keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let path = self.resolve(path)?;
        let url = self.url_for(&path);
        self.blobs().insert(path, bytes);
        Ok(url)
    }

    async fn get_url(&self, path: &str) -> Result<String, StorageError> {
        let path = self.resolve(path)?;
        if !self.blobs().contains_key(&path) {
            return Err(StorageError::NotFound { path });
        }
        Ok(self.url_for(&path))
    }

    async fn delete(&self, path_or_url: &str) -> Result<(), StorageError> {
        let path = self.resolve(path_or_url)?;
        match self.blobs().remove(&path) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound { path }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_issues_urls_that_delete_accepts() {
        let storage = MemoryBlobStorage::new("campus");
        let url = storage
            .upload("events/backgroundImages/E1", vec![1, 2, 3])
            .await
            .expect("upload");
        assert_eq!(url, "memory://campus/events/backgroundImages/E1");
        assert_eq!(storage.get_url("events/backgroundImages/E1").await.expect("url"), url);

        storage.delete(&url).await.expect("delete by url");
        assert!(storage.get("events/backgroundImages/E1").is_none());
        assert!(matches!(storage.delete(&url).await, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn rejects_foreign_urls_and_bad_paths() {
        let storage = MemoryBlobStorage::new("campus");
        for bad in ["https://cdn.example.com/a.png", "memory://other/a.png", "", "a//b", "../a", "/a"] {
            assert!(
                matches!(storage.delete(bad).await, Err(StorageError::InvalidPath { .. })),
                "{bad} should be rejected"
            );
        }
    }
}
