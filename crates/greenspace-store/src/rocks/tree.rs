use chrono::Utc;
use greenspace_core::geo::{validate_latitude, validate_longitude};
use greenspace_core::{ImageId, SensorId, TreeClusterId, TreeId};

use super::StoreTx;
use crate::error::{Result, StoreError};
use crate::geometry::{centroid, haversine_m};
use crate::keys;
use crate::repository::TreeRepository;
use crate::schema::{cf, seq};
use crate::types::Tree;

impl StoreTx<'_> {
    /// Bring the cluster and sensor indexes in line with `new`.
    fn reindex_tree(&self, prev: Option<&Tree>, new: &Tree) -> Result<()> {
        let prev_cluster = prev.and_then(|t| t.tree_cluster_id);
        if prev.is_none() || prev_cluster != new.tree_cluster_id {
            if let Some(old) = prev_cluster {
                self.delete(cf::TREES_BY_CLUSTER, &keys::cluster_tree_key(old, new.id))?;
            }
            if let Some(cluster_id) = new.tree_cluster_id {
                self.put_raw(
                    cf::TREES_BY_CLUSTER,
                    &keys::cluster_tree_key(cluster_id, new.id),
                    &[],
                )?;
            }
        }

        let prev_sensor = prev.and_then(|t| t.sensor_id.as_ref());
        if prev.is_none() || prev_sensor != new.sensor_id.as_ref() {
            if let Some(old) = prev_sensor {
                self.delete(cf::TREES_BY_SENSOR, old.as_bytes())?;
            }
            if let Some(sensor_id) = &new.sensor_id {
                let bound = self
                    .get_raw_for_update(cf::TREES_BY_SENSOR, sensor_id.as_bytes())?
                    .and_then(|raw| keys::tree_id_from_value(&raw));
                if let Some(other) = bound.filter(|other| *other != new.id) {
                    return Err(StoreError::Conflict(format!(
                        "sensor {sensor_id} is already bound to tree {other}"
                    )));
                }
                self.put_raw(
                    cf::TREES_BY_SENSOR,
                    sensor_id.as_bytes(),
                    &new.id.to_be_bytes(),
                )?;
            }
        }
        Ok(())
    }

    fn validate_tree(tree: &Tree) -> Result<()> {
        validate_latitude(tree.latitude)?;
        validate_longitude(tree.longitude)?;
        Ok(())
    }

    pub(super) fn tree_ids_in_cluster(&self, cluster_id: TreeClusterId) -> Result<Vec<TreeId>> {
        Ok(self
            .scan_prefix(cf::TREES_BY_CLUSTER, &keys::cluster_prefix(cluster_id))?
            .iter()
            .filter_map(|(key, _)| keys::tree_id_from_cluster_key(key))
            .collect())
    }
}

impl TreeRepository for StoreTx<'_> {
    fn get_all_trees(&self) -> Result<Vec<Tree>> {
        self.scan_values(cf::TREES)
    }

    fn get_trees_by_provider(&self, provider: &str) -> Result<Vec<Tree>> {
        Ok(self
            .get_all_trees()?
            .into_iter()
            .filter(|t| t.provider.as_deref() == Some(provider))
            .collect())
    }

    fn get_tree(&self, id: TreeId) -> Result<Tree> {
        self.get(cf::TREES, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::not_found("tree", id))
    }

    fn get_trees_by_ids(&self, ids: &[TreeId]) -> Result<Vec<Tree>> {
        let mut trees = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(tree) = self.get(cf::TREES, &id.to_be_bytes())? {
                trees.push(tree);
            }
        }
        Ok(trees)
    }

    fn get_tree_by_sensor_id(&self, sensor_id: &SensorId) -> Result<Option<Tree>> {
        let Some(tree_id) = self
            .get_raw(cf::TREES_BY_SENSOR, sensor_id.as_bytes())?
            .and_then(|raw| keys::tree_id_from_value(&raw))
        else {
            return Ok(None);
        };
        self.get(cf::TREES, &tree_id.to_be_bytes())
    }

    fn get_trees_by_sensor_ids(&self, sensor_ids: &[SensorId]) -> Result<Vec<Tree>> {
        let mut trees = Vec::new();
        for sensor_id in sensor_ids {
            if let Some(tree) = self.get_tree_by_sensor_id(sensor_id)? {
                trees.push(tree);
            }
        }
        Ok(trees)
    }

    fn get_tree_by_coordinates(&self, latitude: f64, longitude: f64) -> Result<Option<Tree>> {
        Ok(self.get_all_trees()?.into_iter().find(|t| {
            (t.latitude - latitude).abs() < f64::EPSILON
                && (t.longitude - longitude).abs() < f64::EPSILON
        }))
    }

    fn get_trees_by_cluster_id(&self, cluster_id: TreeClusterId) -> Result<Vec<Tree>> {
        let ids = self.tree_ids_in_cluster(cluster_id)?;
        self.get_trees_by_ids(&ids)
    }

    fn find_nearest_tree(
        &self,
        latitude: f64,
        longitude: f64,
        max_distance_m: f64,
    ) -> Result<Option<Tree>> {
        let nearest = self
            .get_all_trees()?
            .into_iter()
            .map(|t| (haversine_m(latitude, longitude, t.latitude, t.longitude), t))
            .filter(|(d, _)| *d <= max_distance_m)
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, t)| t);
        Ok(nearest)
    }

    fn get_center_point(&self, ids: &[TreeId]) -> Result<Option<(f64, f64)>> {
        let trees = self.get_trees_by_ids(ids)?;
        Ok(centroid(trees.iter().map(|t| (t.latitude, t.longitude))))
    }

    fn create_tree<F>(&self, f: F) -> Result<Tree>
    where
        F: FnOnce(&mut Tree) -> Result<bool>,
    {
        let id = TreeId::new(self.next_id_i32(seq::TREE)?);
        let now = Utc::now();
        let mut tree = Tree::blank(id, now);
        if !f(&mut tree)? {
            return Err(StoreError::Aborted);
        }
        tree.id = id;
        tree.created_at = now;
        tree.updated_at = now;
        Self::validate_tree(&tree)?;

        self.reindex_tree(None, &tree)?;
        self.put(cf::TREES, &id.to_be_bytes(), &tree)?;
        tracing::debug!(tree_id = %id, "Created tree");
        Ok(tree)
    }

    fn update_tree<F>(&self, id: TreeId, f: F) -> Result<Tree>
    where
        F: FnOnce(&mut Tree) -> Result<bool>,
    {
        let prev: Tree = self
            .get_for_update(cf::TREES, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::not_found("tree", id))?;

        let mut tree = prev.clone();
        if !f(&mut tree)? {
            return Ok(prev);
        }
        tree.id = prev.id;
        tree.created_at = prev.created_at;
        tree.updated_at = Utc::now();
        Self::validate_tree(&tree)?;

        self.reindex_tree(Some(&prev), &tree)?;
        self.put(cf::TREES, &id.to_be_bytes(), &tree)?;
        Ok(tree)
    }

    fn delete_tree(&self, id: TreeId) -> Result<Tree> {
        let tree: Tree = self
            .get_for_update(cf::TREES, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::not_found("tree", id))?;

        if let Some(cluster_id) = tree.tree_cluster_id {
            self.delete(cf::TREES_BY_CLUSTER, &keys::cluster_tree_key(cluster_id, id))?;
        }
        if let Some(sensor_id) = &tree.sensor_id {
            self.delete(cf::TREES_BY_SENSOR, sensor_id.as_bytes())?;
        }
        self.delete(cf::TREES, &id.to_be_bytes())?;
        tracing::debug!(tree_id = %id, "Deleted tree");
        Ok(tree)
    }

    fn unlink_sensor_id(&self, sensor_id: &SensorId) -> Result<Vec<TreeId>> {
        let Some(tree_id) = self
            .get_raw_for_update(cf::TREES_BY_SENSOR, sensor_id.as_bytes())?
            .and_then(|raw| keys::tree_id_from_value(&raw))
        else {
            return Ok(Vec::new());
        };
        self.update_tree(tree_id, |tree| {
            tree.sensor_id = None;
            Ok(true)
        })?;
        Ok(vec![tree_id])
    }

    fn unlink_tree_cluster_id(&self, cluster_id: TreeClusterId) -> Result<Vec<TreeId>> {
        let ids = self.tree_ids_in_cluster(cluster_id)?;
        for id in &ids {
            self.update_tree(*id, |tree| {
                tree.tree_cluster_id = None;
                Ok(true)
            })?;
        }
        Ok(ids)
    }

    fn unlink_image_id(&self, image_id: ImageId) -> Result<Vec<TreeId>> {
        let linked: Vec<TreeId> = self
            .get_all_trees()?
            .into_iter()
            .filter(|t| t.image_ids.contains(&image_id))
            .map(|t| t.id)
            .collect();
        for id in &linked {
            self.update_tree(*id, |tree| {
                tree.image_ids.retain(|i| *i != image_id);
                Ok(true)
            })?;
        }
        Ok(linked)
    }
}
