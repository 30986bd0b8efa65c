//! Image reference service.

use std::sync::Arc;

use greenspace_core::{ImageId, Result, ServiceError};
use greenspace_store::{Image, ImageRepository, Store};

use crate::types::ImageRequest;

/// Stores references to images hosted elsewhere.
pub struct ImageService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> ImageService<S> {
    /// Create a new image service.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// List every image.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn get_all(&self) -> Result<Vec<Image>> {
        self.store.with_tx(|tx| Ok(tx.get_all_images()?))
    }

    /// Get an image by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the image doesn't exist.
    pub async fn get_by_id(&self, id: ImageId) -> Result<Image> {
        self.store.with_tx(|tx| Ok(tx.get_image(id)?))
    }

    /// Store an image reference.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an empty URL.
    pub async fn create(&self, request: ImageRequest) -> Result<Image> {
        if request.url.trim().is_empty() {
            return Err(ServiceError::bad_request("image url must not be empty"));
        }
        let image = self.store.with_tx(|tx| {
            Ok::<_, ServiceError>(tx.create_image(|image| {
                image.url.clone_from(&request.url);
                image.filename.clone_from(&request.filename);
                image.mime_type.clone_from(&request.mime_type);
                Ok(true)
            })?)
        })?;
        tracing::debug!(image_id = %image.id, "Created image");
        Ok(image)
    }

    /// Delete an image and drop it from every tree that links it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the image doesn't exist.
    pub async fn delete(&self, id: ImageId) -> Result<()> {
        self.store
            .with_tx(|tx| Ok::<_, ServiceError>(tx.delete_image(id)?))?;
        tracing::debug!(image_id = %id, "Deleted image");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use crate::types::TreeRequest;
    use greenspace_core::ErrorKind;

    fn request(url: &str) -> ImageRequest {
        ImageRequest {
            url: url.to_string(),
            filename: Some("tree.jpg".into()),
            mime_type: Some("image/jpeg".into()),
        }
    }

    #[tokio::test]
    async fn empty_url_is_rejected() {
        let h = Harness::new();
        let err = h.images.create(request(" ")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn delete_unlinks_trees() {
        let h = Harness::new();
        let image = h
            .images
            .create(request("https://cdn.example.org/tree.jpg"))
            .await
            .unwrap();
        let mut tree = TreeRequest::new("T-1", 2021, 54.8, 9.4);
        tree.image_ids = vec![image.id];
        let tree = h.trees.create(tree).await.unwrap();
        assert_eq!(tree.image_ids, vec![image.id]);

        h.images.delete(image.id).await.unwrap();
        assert!(h.trees.get_by_id(tree.id).await.unwrap().image_ids.is_empty());
        assert_eq!(
            h.images.get_by_id(image.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
