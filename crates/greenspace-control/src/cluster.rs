//! Tree cluster service and the cluster-side event handlers.

use std::collections::BTreeSet;
use std::sync::Arc;

use greenspace_core::{
    Result, ServiceError, TreeClusterId, TreeId, WateringPlanStatus, WateringStatus,
};
use greenspace_events::{Event, EventBus};
use greenspace_store::{
    Repositories, SensorData, Store, Tree, TreeCluster, TreeClusterRepository, TreeRepository,
    WateringPlan,
};

use crate::locator::{self, Recomputed};
use crate::{publish, publish_follow_up};
use crate::types::ClusterRequest;

/// Cluster CRUD and the reactions that keep cluster geometry and status
/// current.
pub struct ClusterService<S: Store> {
    store: Arc<S>,
    bus: Arc<EventBus>,
}

impl<S: Store> ClusterService<S> {
    /// Create a new cluster service.
    #[must_use]
    pub fn new(store: Arc<S>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// List every cluster.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn get_all(&self) -> Result<Vec<TreeCluster>> {
        self.store.with_tx(|tx| Ok(tx.get_all_clusters()?))
    }

    /// Get a cluster by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the cluster doesn't exist.
    pub async fn get_by_id(&self, id: TreeClusterId) -> Result<TreeCluster> {
        self.store.with_tx(|tx| Ok(tx.get_cluster(id)?))
    }

    /// Create a cluster and move the requested trees into it.
    ///
    /// Clusters the trees leave are recomputed and publish
    /// `UpdateTreeCluster` when they change.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for invalid input and `NotFound` if a tree
    /// doesn't exist.
    pub async fn create(&self, request: ClusterRequest) -> Result<TreeCluster> {
        request.validate()?;

        let (cluster, others) = self.store.with_tx(|tx| {
            let created = tx.create_cluster(|cluster| {
                apply(cluster, &request);
                Ok(true)
            })?;
            let left = assign_trees(tx, created.id, &request.tree_ids)?;
            let cluster = locator::refresh_cluster(tx, created.id)?.new;
            let others = refresh_all(tx, left)?;
            Ok::<_, ServiceError>((cluster, others))
        })?;

        tracing::info!(
            cluster_id = %cluster.id,
            name = %cluster.name,
            trees = cluster.tree_ids.len(),
            "Created tree cluster"
        );
        self.publish_changes(others).await;
        Ok(cluster)
    }

    /// Replace a cluster's editable fields and membership.
    ///
    /// Publishes `UpdateTreeCluster` for this cluster and for every cluster
    /// that lost trees to it, when they changed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the cluster or a tree doesn't exist.
    pub async fn update(&self, id: TreeClusterId, request: ClusterRequest) -> Result<TreeCluster> {
        request.validate()?;

        let (prev, cluster, others) = self.store.with_tx(|tx| {
            let prev = tx.get_cluster(id)?;
            tx.update_cluster(id, |cluster| {
                apply(cluster, &request);
                Ok(true)
            })?;

            let wanted: BTreeSet<TreeId> = request.tree_ids.iter().copied().collect();
            for tree_id in prev.tree_ids.iter().filter(|t| !wanted.contains(t)) {
                tx.update_tree(*tree_id, |tree| {
                    tree.tree_cluster_id = None;
                    Ok(true)
                })?;
            }
            let left = assign_trees(tx, id, &request.tree_ids)?;

            let cluster = locator::refresh_cluster(tx, id)?.new;
            let others = refresh_all(tx, left)?;
            Ok::<_, ServiceError>((prev, cluster, others))
        })?;

        tracing::info!(cluster_id = %id, trees = cluster.tree_ids.len(), "Updated tree cluster");
        if prev != cluster {
            publish(
                &self.bus,
                Event::UpdateTreeCluster {
                    prev,
                    new: cluster.clone(),
                },
            )
            .await;
        }
        self.publish_changes(others).await;
        Ok(cluster)
    }

    /// Delete a cluster, releasing its trees first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the cluster doesn't exist.
    pub async fn delete(&self, id: TreeClusterId) -> Result<()> {
        let released = self.store.with_tx(|tx| {
            tx.get_cluster(id)?;
            let released = tx.unlink_tree_cluster_id(id)?;
            tx.delete_cluster(id)?;
            Ok::<_, ServiceError>(released)
        })?;
        tracing::info!(cluster_id = %id, released = released.len(), "Deleted tree cluster");
        Ok(())
    }

    // =========================================================================
    // Event handlers
    // =========================================================================

    /// Recompute the cluster a new tree joined.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn handle_create_tree(&self, tree: &Tree) -> Result<()> {
        match tree.tree_cluster_id {
            Some(id) => self.refresh_and_relay(id).await,
            None => Ok(()),
        }
    }

    /// Recompute the cluster a deleted tree belonged to.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn handle_delete_tree(&self, prev: &Tree) -> Result<()> {
        match prev.tree_cluster_id {
            Some(id) => self.refresh_and_relay(id).await,
            None => Ok(()),
        }
    }

    /// Recompute the clusters touched by a moved or reassigned tree.
    ///
    /// Status-only updates are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn handle_update_tree(&self, prev: &Tree, new: &Tree) -> Result<()> {
        #[allow(clippy::float_cmp)]
        let moved = prev.latitude != new.latitude || prev.longitude != new.longitude;
        let reassigned = prev.tree_cluster_id != new.tree_cluster_id;
        if !moved && !reassigned {
            return Ok(());
        }

        if let Some(id) = prev.tree_cluster_id {
            self.refresh_and_relay(id).await?;
        }
        if reassigned {
            if let Some(id) = new.tree_cluster_id {
                self.refresh_and_relay(id).await?;
            }
        }
        Ok(())
    }

    /// Re-evaluate the status of the cluster the reading's tree belongs to.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn handle_new_sensor_data(&self, data: &SensorData) -> Result<()> {
        let changed = self.store.with_tx(|tx| {
            let Some(tree) = tx.get_tree_by_sensor_id(&data.sensor_id)? else {
                return Ok::<_, ServiceError>(None);
            };
            let Some(cluster_id) = tree.tree_cluster_id else {
                return Ok(None);
            };

            let prev = tx.get_cluster(cluster_id)?;
            let Some(status) = locator::cluster_status(tx, &prev)? else {
                return Ok(None);
            };
            if status == prev.watering_status {
                return Ok(None);
            }
            let new = tx.update_cluster(cluster_id, |cluster| {
                cluster.watering_status = status;
                Ok(true)
            })?;
            Ok(Some(Recomputed { prev, new }))
        })?;

        if let Some(recomputed) = changed {
            tracing::info!(
                cluster_id = %recomputed.new.id,
                from = %recomputed.prev.watering_status,
                to = %recomputed.new.watering_status,
                "Cluster watering status changed"
            );
            self.relay_changes(vec![recomputed]);
        }
        Ok(())
    }

    /// Mark the clusters and trees of a just finished plan as watered.
    ///
    /// Applies only when the update moved the plan to `finished` and left its
    /// date and clusters untouched.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn handle_update_watering_plan(
        &self,
        prev: &WateringPlan,
        new: &WateringPlan,
    ) -> Result<()> {
        let finished = prev.status != WateringPlanStatus::Finished
            && new.status == WateringPlanStatus::Finished;
        if !finished || prev.date != new.date || prev.tree_cluster_ids != new.tree_cluster_ids {
            return Ok(());
        }

        let date = new.date;
        let watered = self.store.with_tx(|tx| {
            let mut watered = Vec::with_capacity(new.tree_cluster_ids.len());
            for cluster_id in &new.tree_cluster_ids {
                let prev = match tx.get_cluster(*cluster_id) {
                    Ok(cluster) => cluster,
                    Err(e) if e.is_not_found() => {
                        tracing::warn!(plan_id = %new.id, cluster_id = %cluster_id, "Plan references missing cluster");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                let cluster = tx.update_cluster(*cluster_id, |cluster| {
                    cluster.last_watered = Some(date);
                    cluster.watering_status = WateringStatus::JustWatered;
                    Ok(true)
                })?;
                for tree_id in &cluster.tree_ids {
                    tx.update_tree(*tree_id, |tree| {
                        tree.last_watered = Some(date);
                        tree.watering_status = WateringStatus::JustWatered;
                        Ok(true)
                    })?;
                }
                watered.push(Recomputed { prev, new: cluster });
            }
            Ok::<_, ServiceError>(watered)
        })?;

        tracing::info!(plan_id = %new.id, clusters = watered.len(), "Marked plan clusters as watered");
        self.relay_changes(watered);
        Ok(())
    }

    /// Recompute one cluster and relay the change.
    ///
    /// A cluster deleted in the meantime is skipped.
    async fn refresh_and_relay(&self, id: TreeClusterId) -> Result<()> {
        let recomputed = match self.store.with_tx(|tx| locator::refresh_cluster(tx, id)) {
            Ok(recomputed) => recomputed,
            Err(e) if e.is_not_found() => {
                tracing::debug!(cluster_id = %id, "Cluster vanished before recompute");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        self.relay_changes(vec![recomputed]);
        Ok(())
    }

    async fn publish_changes(&self, recomputed: Vec<Recomputed>) {
        for Recomputed { prev, new } in recomputed {
            if prev != new {
                publish(&self.bus, Event::UpdateTreeCluster { prev, new }).await;
            }
        }
    }

    fn relay_changes(&self, recomputed: Vec<Recomputed>) {
        for Recomputed { prev, new } in recomputed {
            if prev != new {
                publish_follow_up(&self.bus, Event::UpdateTreeCluster { prev, new });
            }
        }
    }
}

fn apply(cluster: &mut TreeCluster, request: &ClusterRequest) {
    cluster.name.clone_from(&request.name);
    cluster.address.clone_from(&request.address);
    cluster.description.clone_from(&request.description);
    cluster.soil_condition = request.soil_condition;
    cluster.archived = request.archived;
}

/// Point `tree_ids` at `cluster_id`, returning the clusters they left.
fn assign_trees<T: Repositories>(
    tx: &T,
    cluster_id: TreeClusterId,
    tree_ids: &[TreeId],
) -> Result<BTreeSet<TreeClusterId>> {
    let mut left = BTreeSet::new();
    for tree_id in tree_ids {
        let tree = tx.get_tree(*tree_id)?;
        match tree.tree_cluster_id {
            Some(current) if current == cluster_id => continue,
            Some(current) => {
                left.insert(current);
            }
            None => {}
        }
        tx.update_tree(*tree_id, |t| {
            t.tree_cluster_id = Some(cluster_id);
            Ok(true)
        })?;
    }
    Ok(left)
}

fn refresh_all<T: Repositories>(
    tx: &T,
    ids: BTreeSet<TreeClusterId>,
) -> Result<Vec<Recomputed>> {
    ids.into_iter()
        .map(|id| Ok(locator::refresh_cluster(tx, id)?))
        .collect()
}
