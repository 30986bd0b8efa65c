//! Tree service.

use std::sync::Arc;

use greenspace_core::{watering, Result, SensorId, ServiceError, TreeClusterId, TreeId};
use greenspace_events::{Event, EventBus};
use greenspace_store::{
    ImageRepository, SensorData, SensorRepository, Store, Tree, TreeClusterRepository,
    TreeRepository,
};

use crate::{publish, publish_follow_up};
use crate::types::TreeRequest;

/// CRUD over trees and the tree-side reaction to new readings.
pub struct TreeService<S: Store> {
    store: Arc<S>,
    bus: Arc<EventBus>,
}

impl<S: Store> TreeService<S> {
    /// Create a new tree service.
    #[must_use]
    pub fn new(store: Arc<S>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// List trees, optionally only those of one provider.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn get_all(&self, provider: Option<&str>) -> Result<Vec<Tree>> {
        self.store.with_tx(|tx| match provider {
            Some(provider) => Ok(tx.get_trees_by_provider(provider)?),
            None => Ok(tx.get_all_trees()?),
        })
    }

    /// Get a tree by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the tree doesn't exist.
    pub async fn get_by_id(&self, id: TreeId) -> Result<Tree> {
        self.store.with_tx(|tx| Ok(tx.get_tree(id)?))
    }

    /// Get the tree a sensor is bound to.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no tree is bound to the sensor.
    pub async fn get_by_sensor_id(&self, sensor_id: &SensorId) -> Result<Tree> {
        self.store
            .with_tx(|tx| Ok::<_, ServiceError>(tx.get_tree_by_sensor_id(sensor_id)?))?
            .ok_or_else(|| ServiceError::not_found(format!("no tree bound to sensor {sensor_id}")))
    }

    /// Get the tree at a position.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no tree stands there.
    pub async fn get_by_coordinates(&self, latitude: f64, longitude: f64) -> Result<Tree> {
        self.store
            .with_tx(|tx| Ok::<_, ServiceError>(tx.get_tree_by_coordinates(latitude, longitude)?))?
            .ok_or_else(|| {
                ServiceError::not_found(format!("no tree at ({latitude}, {longitude})"))
            })
    }

    /// List the members of a cluster.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn get_by_cluster_id(&self, cluster_id: TreeClusterId) -> Result<Vec<Tree>> {
        self.store.with_tx(|tx| Ok(tx.get_trees_by_cluster_id(cluster_id)?))
    }

    /// Create a tree.
    ///
    /// Publishes `CreateTree` when the tree joins a cluster.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for invalid input, `NotFound` for a missing
    /// cluster, sensor or image, and `Conflict` if the sensor is bound to
    /// another tree.
    pub async fn create(&self, request: TreeRequest) -> Result<Tree> {
        request.validate()?;

        let tree = self.store.with_tx(|tx| {
            check_references(tx, None, &request)?;
            Ok::<_, ServiceError>(tx.create_tree(|tree| {
                apply(tree, &request);
                Ok(true)
            })?)
        })?;

        tracing::info!(tree_id = %tree.id, number = %tree.number, "Created tree");
        if tree.tree_cluster_id.is_some() {
            publish(&self.bus, Event::CreateTree { new: tree.clone() }).await;
        }
        Ok(tree)
    }

    /// Replace a tree's editable fields.
    ///
    /// Publishes `UpdateTree` when the cluster or the position changed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the tree doesn't exist, plus the errors of
    /// [`TreeService::create`].
    pub async fn update(&self, id: TreeId, request: TreeRequest) -> Result<Tree> {
        request.validate()?;

        let (prev, new) = self.store.with_tx(|tx| {
            let prev = tx.get_tree(id)?;
            check_references(tx, Some(id), &request)?;
            let new = tx.update_tree(id, |tree| {
                apply(tree, &request);
                Ok(true)
            })?;
            Ok::<_, ServiceError>((prev, new))
        })?;

        tracing::info!(tree_id = %id, "Updated tree");
        #[allow(clippy::float_cmp)]
        let moved = prev.latitude != new.latitude || prev.longitude != new.longitude;
        if moved || prev.tree_cluster_id != new.tree_cluster_id {
            publish(
                &self.bus,
                Event::UpdateTree {
                    prev,
                    new: new.clone(),
                },
            )
            .await;
        }
        Ok(new)
    }

    /// Delete a tree.
    ///
    /// Publishes `DeleteTree` when the tree belonged to a cluster.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the tree doesn't exist.
    pub async fn delete(&self, id: TreeId) -> Result<()> {
        let prev = self.store.with_tx(|tx| Ok::<_, ServiceError>(tx.delete_tree(id)?))?;

        tracing::info!(tree_id = %id, "Deleted tree");
        if prev.tree_cluster_id.is_some() {
            publish(&self.bus, Event::DeleteTree { prev }).await;
        }
        Ok(())
    }

    /// Re-evaluate the tree bound to the reading's sensor.
    ///
    /// A reading from a sensor without a tree is ignored.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn handle_new_sensor_data(&self, data: &SensorData) -> Result<()> {
        let changed = self.store.with_tx(|tx| {
            let Some(tree) = tx.get_tree_by_sensor_id(&data.sensor_id)? else {
                tracing::debug!(sensor_id = %data.sensor_id, "No tree bound to sensor");
                return Ok::<_, ServiceError>(None);
            };

            let status = watering::status(tree.planting_year, &data.payload.watermarks);
            if status == tree.watering_status {
                return Ok(None);
            }
            let new = tx.update_tree(tree.id, |t| {
                if t.watering_status == status {
                    return Ok(false);
                }
                t.watering_status = status;
                Ok(true)
            })?;
            Ok(Some((tree, new)))
        })?;

        if let Some((prev, new)) = changed {
            tracing::info!(
                tree_id = %new.id,
                from = %prev.watering_status,
                to = %new.watering_status,
                "Tree watering status changed"
            );
            publish_follow_up(&self.bus, Event::UpdateTree { prev, new });
        }
        Ok(())
    }
}

/// Copy the request onto a tree, keeping derived fields.
fn apply(tree: &mut Tree, request: &TreeRequest) {
    tree.number.clone_from(&request.number);
    tree.species.clone_from(&request.species);
    tree.planting_year = request.planting_year;
    tree.latitude = request.latitude;
    tree.longitude = request.longitude;
    tree.description.clone_from(&request.description);
    tree.readonly = request.readonly;
    tree.provider.clone_from(&request.provider);
    tree.additional_info.clone_from(&request.additional_info);
    tree.tree_cluster_id = request.tree_cluster_id;
    tree.sensor_id.clone_from(&request.sensor_id);
    tree.image_ids.clone_from(&request.image_ids);
}

fn check_references<T>(tx: &T, tree_id: Option<TreeId>, request: &TreeRequest) -> Result<()>
where
    T: TreeRepository + TreeClusterRepository + SensorRepository + ImageRepository,
{
    if let Some(cluster_id) = request.tree_cluster_id {
        tx.get_cluster(cluster_id)?;
    }
    if let Some(sensor_id) = &request.sensor_id {
        tx.get_sensor(sensor_id)?;
        if let Some(bound) = tx.get_tree_by_sensor_id(sensor_id)? {
            if Some(bound.id) != tree_id {
                return Err(ServiceError::conflict(format!(
                    "sensor {sensor_id} is already bound to tree {}",
                    bound.id
                )));
            }
        }
    }
    for image_id in &request.image_ids {
        tx.get_image(*image_id)?;
    }
    Ok(())
}
