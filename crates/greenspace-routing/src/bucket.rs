//! Object storage for generated GPX files.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{Result, RoutingError};

/// A flat object store for route files.
#[async_trait]
pub trait GpxBucket: Send + Sync {
    /// Store an object, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns `Bucket` when the write fails.
    async fn put_object(&self, name: &str, content: &[u8]) -> Result<()>;

    /// Fetch an object.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` when no object has that name.
    async fn get_object(&self, name: &str) -> Result<Vec<u8>>;

    /// Whether the bucket is reachable.
    async fn bucket_exists(&self) -> bool;
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(RoutingError::Bucket(format!("invalid object name: {name:?}")));
    }
    Ok(())
}

/// Bucket stored as files in a local directory.
#[derive(Debug, Clone)]
pub struct FsBucket {
    root: PathBuf,
}

impl FsBucket {
    /// Create a bucket rooted at `root`. The directory is created on first
    /// write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl GpxBucket for FsBucket {
    async fn put_object(&self, name: &str, content: &[u8]) -> Result<()> {
        validate_name(name)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| RoutingError::Bucket(format!("create {}: {e}", self.root.display())))?;
        tokio::fs::write(self.root.join(name), content)
            .await
            .map_err(|e| RoutingError::Bucket(format!("write {name}: {e}")))?;
        tracing::debug!(object = %name, bytes = content.len(), "Stored object");
        Ok(())
    }

    async fn get_object(&self, name: &str) -> Result<Vec<u8>> {
        validate_name(name)?;
        match tokio::fs::read(self.root.join(name)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RoutingError::ObjectNotFound(name.to_string()))
            }
            Err(e) => Err(RoutingError::Bucket(format!("read {name}: {e}"))),
        }
    }

    async fn bucket_exists(&self) -> bool {
        tokio::fs::metadata(&self.root)
            .await
            .is_ok_and(|m| m.is_dir())
    }
}

/// In-memory bucket for tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MemoryBucket {
    objects: parking_lot::RwLock<std::collections::HashMap<String, Vec<u8>>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryBucket {
    /// Create an empty bucket.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of stored objects, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.objects.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl GpxBucket for MemoryBucket {
    async fn put_object(&self, name: &str, content: &[u8]) -> Result<()> {
        validate_name(name)?;
        self.objects.write().insert(name.to_string(), content.to_vec());
        Ok(())
    }

    async fn get_object(&self, name: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RoutingError::ObjectNotFound(name.to_string()))
    }

    async fn bucket_exists(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn fs_bucket_round_trip() {
        let dir = TempDir::new().unwrap();
        let bucket = FsBucket::new(dir.path().join("gpx"));
        assert!(!bucket.bucket_exists().await);

        bucket.put_object("route-FL-1.gpx", b"<gpx/>").await.unwrap();
        assert!(bucket.bucket_exists().await);
        assert_eq!(bucket.get_object("route-FL-1.gpx").await.unwrap(), b"<gpx/>");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = TempDir::new().unwrap();
        let bucket = FsBucket::new(dir.path());
        assert!(matches!(
            bucket.get_object("nope.gpx").await,
            Err(RoutingError::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let bucket = FsBucket::new(dir.path());
        assert!(matches!(
            bucket.get_object("../secret").await,
            Err(RoutingError::Bucket(_))
        ));
        assert!(bucket.put_object("a/b.gpx", b"x").await.is_err());
    }
}
