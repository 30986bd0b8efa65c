//! Cluster geometry and aggregate watering status.
//!
//! A cluster's position is the centroid of its member trees and its region is
//! the region containing that centroid. Both are cleared when the cluster has
//! no members. These helpers run on a transaction handle so that the read of
//! the members and the write of the cluster commit together.

use greenspace_core::{watering, TreeClusterId, WateringStatus};
use greenspace_store::{Repositories, Result, TreeCluster};

/// A cluster before and after a recompute.
#[derive(Debug, Clone)]
pub struct Recomputed {
    /// State before the recompute.
    pub prev: TreeCluster,
    /// State after the recompute.
    pub new: TreeCluster,
}

impl Recomputed {
    /// Whether the recompute changed anything.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.prev != self.new
    }
}

/// Recenter a cluster on its members and resolve its region.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if the cluster doesn't exist.
pub fn update_cluster<T: Repositories>(tx: &T, id: TreeClusterId) -> Result<Recomputed> {
    let prev = tx.get_cluster(id)?;

    let (position, region_id) = match tx.get_center_point(&prev.tree_ids)? {
        Some((lat, lon)) => {
            let region = tx.get_region_by_point(lat, lon)?;
            (Some((lat, lon)), region.map(|r| r.id))
        }
        None => (None, None),
    };

    let new = tx.update_cluster(id, |cluster| {
        let mut changed = false;
        if cluster.position() != position {
            cluster.latitude = position.map(|p| p.0);
            cluster.longitude = position.map(|p| p.1);
            changed = true;
        }
        if cluster.region_id != region_id {
            cluster.region_id = region_id;
            changed = true;
        }
        Ok(changed)
    })?;

    if prev != new {
        tracing::debug!(
            cluster_id = %id,
            latitude = ?new.latitude,
            longitude = ?new.longitude,
            region_id = ?new.region_id,
            "Recentered tree cluster"
        );
    }
    Ok(Recomputed { prev, new })
}

/// [`update_cluster`], then re-evaluate the aggregate watering status.
///
/// Membership changes move the centroid and can change which sensors feed
/// the status, so services recompute both together.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if the cluster doesn't exist.
pub fn refresh_cluster<T: Repositories>(tx: &T, id: TreeClusterId) -> Result<Recomputed> {
    let Recomputed { prev, new } = update_cluster(tx, id)?;
    let Some(status) = cluster_status(tx, &new)?.filter(|s| *s != new.watering_status) else {
        return Ok(Recomputed { prev, new });
    };

    let new = tx.update_cluster(id, |cluster| {
        cluster.watering_status = status;
        Ok(true)
    })?;
    tracing::debug!(cluster_id = %id, status = %new.watering_status, "Re-evaluated tree cluster");
    Ok(Recomputed { prev, new })
}

/// Aggregate status of a cluster from the latest reading of every member
/// sensor.
///
/// Readings are averaged per depth and evaluated against the youngest
/// member tree. Returns `None` when there is nothing to evaluate.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn cluster_status<T: Repositories>(
    tx: &T,
    cluster: &TreeCluster,
) -> Result<Option<WateringStatus>> {
    let readings = tx.get_all_latest_sensor_data_by_cluster_id(cluster.id)?;
    if readings.is_empty() {
        return Ok(None);
    }
    let youngest = tx
        .get_trees_by_cluster_id(cluster.id)?
        .iter()
        .map(|t| t.planting_year)
        .max();
    let Some(planting_year) = youngest else {
        return Ok(None);
    };

    let averaged =
        watering::average_by_depth(readings.iter().map(|d| d.payload.watermarks.as_slice()));
    Ok(Some(watering::status(planting_year, &averaged)))
}
