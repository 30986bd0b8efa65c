use std::collections::HashSet;

use chrono::Utc;
use greenspace_core::geo::{validate_latitude, validate_longitude};
use greenspace_core::TreeClusterId;

use super::StoreTx;
use crate::error::{Result, StoreError};
use crate::repository::{RegionRepository, SensorRepository, TreeClusterRepository, TreeRepository};
use crate::schema::{cf, seq};
use crate::types::{RegionPlanCount, SensorData, TreeCluster, WateringPlan};

impl StoreTx<'_> {
    fn hydrate_cluster(&self, mut cluster: TreeCluster) -> Result<TreeCluster> {
        cluster.tree_ids = self.tree_ids_in_cluster(cluster.id)?;
        Ok(cluster)
    }

    fn validate_cluster(cluster: &TreeCluster) -> Result<()> {
        if cluster.latitude.is_some() != cluster.longitude.is_some() {
            return Err(StoreError::Validation(
                "cluster latitude and longitude must be set together".into(),
            ));
        }
        if let Some(lat) = cluster.latitude {
            validate_latitude(lat)?;
        }
        if let Some(lon) = cluster.longitude {
            validate_longitude(lon)?;
        }
        Ok(())
    }
}

impl TreeClusterRepository for StoreTx<'_> {
    fn get_all_clusters(&self) -> Result<Vec<TreeCluster>> {
        self.scan_values(cf::TREE_CLUSTERS)?
            .into_iter()
            .map(|c| self.hydrate_cluster(c))
            .collect()
    }

    fn get_cluster(&self, id: TreeClusterId) -> Result<TreeCluster> {
        let cluster = self
            .get(cf::TREE_CLUSTERS, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::not_found("tree cluster", id))?;
        self.hydrate_cluster(cluster)
    }

    fn get_clusters_by_ids(&self, ids: &[TreeClusterId]) -> Result<Vec<TreeCluster>> {
        let mut clusters = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(cluster) = self.get(cf::TREE_CLUSTERS, &id.to_be_bytes())? {
                clusters.push(self.hydrate_cluster(cluster)?);
            }
        }
        Ok(clusters)
    }

    fn create_cluster<F>(&self, f: F) -> Result<TreeCluster>
    where
        F: FnOnce(&mut TreeCluster) -> Result<bool>,
    {
        let id = TreeClusterId::new(self.next_id_i32(seq::TREE_CLUSTER)?);
        let now = Utc::now();
        let mut cluster = TreeCluster::blank(id, now);
        if !f(&mut cluster)? {
            return Err(StoreError::Aborted);
        }
        cluster.id = id;
        cluster.created_at = now;
        cluster.updated_at = now;
        Self::validate_cluster(&cluster)?;

        self.put(cf::TREE_CLUSTERS, &id.to_be_bytes(), &cluster)?;
        tracing::debug!(cluster_id = %id, "Created tree cluster");
        self.hydrate_cluster(cluster)
    }

    fn update_cluster<F>(&self, id: TreeClusterId, f: F) -> Result<TreeCluster>
    where
        F: FnOnce(&mut TreeCluster) -> Result<bool>,
    {
        let prev: TreeCluster = self
            .get_for_update(cf::TREE_CLUSTERS, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::not_found("tree cluster", id))?;
        let prev = self.hydrate_cluster(prev)?;

        let mut cluster = prev.clone();
        if !f(&mut cluster)? {
            return Ok(prev);
        }
        cluster.id = prev.id;
        cluster.created_at = prev.created_at;
        cluster.tree_ids = prev.tree_ids;
        cluster.updated_at = Utc::now();
        Self::validate_cluster(&cluster)?;

        self.put(cf::TREE_CLUSTERS, &id.to_be_bytes(), &cluster)?;
        Ok(cluster)
    }

    fn delete_cluster(&self, id: TreeClusterId) -> Result<()> {
        if self
            .get_raw_for_update(cf::TREE_CLUSTERS, &id.to_be_bytes())?
            .is_none()
        {
            return Err(StoreError::not_found("tree cluster", id));
        }
        if !self.tree_ids_in_cluster(id)?.is_empty() {
            return Err(StoreError::Validation(format!(
                "tree cluster {id} still has member trees"
            )));
        }
        self.delete(cf::TREE_CLUSTERS, &id.to_be_bytes())?;
        tracing::debug!(cluster_id = %id, "Deleted tree cluster");
        Ok(())
    }

    fn get_all_latest_sensor_data_by_cluster_id(
        &self,
        cluster_id: TreeClusterId,
    ) -> Result<Vec<SensorData>> {
        let mut latest = Vec::new();
        for tree in self.get_trees_by_cluster_id(cluster_id)? {
            let Some(sensor_id) = tree.sensor_id else {
                continue;
            };
            if let Some(data) = self.get_latest_sensor_data_by_sensor_id(&sensor_id)? {
                latest.push(data);
            }
        }
        Ok(latest)
    }

    fn get_all_regions_with_watering_plan_count(&self) -> Result<Vec<RegionPlanCount>> {
        let clusters: Vec<TreeCluster> = self.scan_values(cf::TREE_CLUSTERS)?;
        let plans: Vec<WateringPlan> = self.scan_values(cf::WATERING_PLANS)?;

        self.get_all_regions()?
            .into_iter()
            .map(|region| {
                let in_region: HashSet<TreeClusterId> = clusters
                    .iter()
                    .filter(|c| c.region_id == Some(region.id))
                    .map(|c| c.id)
                    .collect();
                let watering_plan_count = plans
                    .iter()
                    .filter(|p| p.tree_cluster_ids.iter().any(|c| in_region.contains(c)))
                    .count();
                Ok(RegionPlanCount {
                    region,
                    watering_plan_count,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::create_test_store;
    use crate::repository::{
        RegionRepository, SensorRepository, TreeClusterRepository, TreeRepository,
        WateringPlanRepository,
    };
    use crate::{Store, StoreError};
    use chrono::Utc;
    use greenspace_core::{MqttPayload, SensorId, SoilCondition};

    #[test]
    fn cluster_crud_hydrates_members() {
        let (store, _dir) = create_test_store();
        let cluster = store
            .with_tx(|tx| {
                tx.create_cluster(|c| {
                    c.name = "Westufer".into();
                    c.soil_condition = SoilCondition::Lehmig;
                    Ok(true)
                })
            })
            .unwrap();
        assert!(cluster.tree_ids.is_empty());

        let tree = store
            .with_tx(|tx| {
                tx.create_tree(|t| {
                    t.tree_cluster_id = Some(cluster.id);
                    Ok(true)
                })
            })
            .unwrap();
        let loaded = store.with_tx(|tx| tx.get_cluster(cluster.id)).unwrap();
        assert_eq!(loaded.tree_ids, vec![tree.id]);
        assert_eq!(loaded.soil_condition, SoilCondition::Lehmig);

        let blocked = store.with_tx(|tx| tx.delete_cluster(cluster.id));
        assert!(matches!(blocked, Err(StoreError::Validation(_))));

        store
            .with_tx(|tx| {
                tx.unlink_tree_cluster_id(cluster.id)?;
                tx.delete_cluster(cluster.id)
            })
            .unwrap();
        assert!(store.with_tx(|tx| tx.get_cluster(cluster.id)).unwrap_err().is_not_found());
    }

    #[test]
    fn half_set_centroid_is_rejected() {
        let (store, _dir) = create_test_store();
        let result = store.with_tx(|tx| {
            tx.create_cluster(|c| {
                c.latitude = Some(54.0);
                Ok(true)
            })
        });
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn latest_data_per_sensor_in_cluster() {
        let (store, _dir) = create_test_store();
        let readings = store
            .with_tx(|tx| {
                let cluster = tx.create_cluster(|_| Ok(true))?;
                for device in ["s1", "s2"] {
                    let sensor_id = SensorId::new(device).unwrap();
                    tx.create_sensor(sensor_id.clone(), |_| Ok(true))?;
                    let payload = MqttPayload {
                        device_id: device.into(),
                        battery: 0.0,
                        humidity: 0.0,
                        temperature: 0.0,
                        latitude: None,
                        longitude: None,
                        watermarks: Vec::new(),
                    };
                    tx.insert_sensor_data(&sensor_id, payload.clone(), Utc::now())?;
                    tx.insert_sensor_data(&sensor_id, payload, Utc::now())?;
                    tx.create_tree(|t| {
                        t.tree_cluster_id = Some(cluster.id);
                        t.sensor_id = Some(sensor_id);
                        Ok(true)
                    })?;
                }
                tx.create_tree(|t| {
                    t.tree_cluster_id = Some(cluster.id);
                    Ok(true)
                })?;
                tx.get_all_latest_sensor_data_by_cluster_id(cluster.id)
            })
            .unwrap();
        assert_eq!(readings.len(), 2);
    }

    #[test]
    fn regions_with_plan_counts() {
        let (store, _dir) = create_test_store();
        let counts = store
            .with_tx(|tx| {
                let north = tx.create_region(
                    "Nord",
                    vec![[9.0, 54.5], [10.0, 54.5], [10.0, 55.0], [9.0, 55.0]],
                )?;
                tx.create_region(
                    "Sued",
                    vec![[9.0, 54.0], [10.0, 54.0], [10.0, 54.5], [9.0, 54.5]],
                )?;
                let cluster = tx.create_cluster(|c| {
                    c.region_id = Some(north.id);
                    Ok(true)
                })?;
                for _ in 0..2 {
                    tx.create_plan(|p| {
                        p.tree_cluster_ids = vec![cluster.id];
                        Ok(true)
                    })?;
                }
                tx.get_all_regions_with_watering_plan_count()
            })
            .unwrap();
        let by_name: Vec<_> = counts
            .iter()
            .map(|c| (c.region.name.as_str(), c.watering_plan_count))
            .collect();
        assert_eq!(by_name, vec![("Nord", 2), ("Sued", 0)]);
    }
}
