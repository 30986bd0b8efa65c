//! Region service.

use std::sync::Arc;

use greenspace_core::{Point, RegionId, Result, ServiceError};
use greenspace_store::{Region, RegionPlanCount, RegionRepository, Store, TreeClusterRepository};

/// Read access to administrative regions, plus seeding.
pub struct RegionService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> RegionService<S> {
    /// Create a new region service.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// List every region.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn get_all(&self) -> Result<Vec<Region>> {
        self.store.with_tx(|tx| Ok(tx.get_all_regions()?))
    }

    /// Get a region by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the region doesn't exist.
    pub async fn get_by_id(&self, id: RegionId) -> Result<Region> {
        self.store.with_tx(|tx| Ok(tx.get_region(id)?))
    }

    /// Get the region containing a position.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an invalid position and `NotFound` if no
    /// region contains it.
    pub async fn get_by_point(&self, latitude: f64, longitude: f64) -> Result<Region> {
        let _ = Point::new(latitude, longitude)?;
        self.store
            .with_tx(|tx| Ok::<_, ServiceError>(tx.get_region_by_point(latitude, longitude)?))?
            .ok_or_else(|| {
                ServiceError::not_found(format!("no region contains ({latitude}, {longitude})"))
            })
    }

    /// Every region with the number of plans watering clusters in it.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn get_all_with_plan_count(&self) -> Result<Vec<RegionPlanCount>> {
        self.store
            .with_tx(|tx| Ok(tx.get_all_regions_with_watering_plan_count()?))
    }

    /// Store a region polygon given as a `[lon, lat]` ring.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an empty name or a degenerate polygon and
    /// `Conflict` if the name is taken.
    pub async fn create(&self, name: &str, polygon: Vec<[f64; 2]>) -> Result<Region> {
        let region = self
            .store
            .with_tx(|tx| Ok::<_, ServiceError>(tx.create_region(name, polygon)?))?;
        tracing::info!(region_id = %region.id, name = %region.name, "Created region");
        Ok(region)
    }

    /// Delete a region.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the region doesn't exist.
    pub async fn delete(&self, id: RegionId) -> Result<()> {
        self.store
            .with_tx(|tx| Ok::<_, ServiceError>(tx.delete_region(id)?))?;
        tracing::info!(region_id = %id, "Deleted region");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use crate::types::{ClusterRequest, CreatePlanRequest, TreeRequest};
    use greenspace_core::ErrorKind;

    const MITTE: [[f64; 2]; 4] = [[9.40, 54.75], [9.50, 54.75], [9.50, 54.85], [9.40, 54.85]];

    #[tokio::test]
    async fn point_lookup() {
        let h = Harness::new();
        let region = h.regions.create("Mitte", MITTE.to_vec()).await.unwrap();

        assert_eq!(h.regions.get_by_point(54.80, 9.45).await.unwrap().id, region.id);
        assert_eq!(
            h.regions.get_by_point(54.90, 9.45).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            h.regions.get_by_point(91.0, 9.45).await.unwrap_err().kind(),
            ErrorKind::BadRequest
        );
    }

    #[tokio::test]
    async fn duplicate_names_conflict() {
        let h = Harness::new();
        h.regions.create("Mitte", MITTE.to_vec()).await.unwrap();
        let err = h.regions.create("Mitte", MITTE.to_vec()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn plan_count_per_region() {
        let h = Harness::new();
        let region = h.regions.create("Mitte", MITTE.to_vec()).await.unwrap();
        h.regions
            .create("Sued", vec![[9.40, 54.60], [9.50, 54.60], [9.50, 54.70], [9.40, 54.70]])
            .await
            .unwrap();
        let tree = h.trees.create(TreeRequest::new("A", 2020, 54.80, 9.45)).await.unwrap();
        let cluster = h
            .clusters
            .create(ClusterRequest::new("Nord", vec![tree.id]))
            .await
            .unwrap();
        assert_eq!(cluster.region_id, Some(region.id));

        h.plans
            .create(CreatePlanRequest {
                date: Some(chrono::Utc::now()),
                tree_cluster_ids: vec![cluster.id],
                ..CreatePlanRequest::default()
            })
            .await
            .unwrap();

        let counts = h.regions.get_all_with_plan_count().await.unwrap();
        assert_eq!(counts.len(), 2);
        for count in counts {
            let expected = usize::from(count.region.id == region.id);
            assert_eq!(count.watering_plan_count, expected);
        }
    }
}
