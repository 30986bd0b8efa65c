//! Repository contracts consumed by the domain services.
//!
//! Every repository is implemented on a transaction handle obtained through
//! [`Store::with_tx`](crate::Store::with_tx), so a service can combine calls
//! across repositories and have them commit or roll back together.
//!
//! Mutators take a callback that receives the hydrated entity and returns
//! whether to proceed. Returning `Ok(false)` from an update leaves the record
//! untouched. Returning `Ok(false)` from a create yields
//! [`StoreError::Aborted`](crate::StoreError::Aborted).

use chrono::{DateTime, Utc};
use greenspace_core::{
    ImageId, MqttPayload, RegionId, SensorId, TreeClusterId, TreeId, VehicleId, VehicleType,
    WateringPlanId, WateringPlanStatus,
};

use crate::error::Result;
use crate::types::{
    Image, Region, RegionPlanCount, Sensor, SensorData, Tree, TreeCluster, Vehicle, WateringPlan,
};

/// Tree storage.
pub trait TreeRepository {
    /// List every tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_all_trees(&self) -> Result<Vec<Tree>>;

    /// List trees created by the given provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_trees_by_provider(&self, provider: &str) -> Result<Vec<Tree>>;

    /// Get a tree by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the tree doesn't exist.
    fn get_tree(&self, id: TreeId) -> Result<Tree>;

    /// Get the trees with the given IDs, skipping missing ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_trees_by_ids(&self, ids: &[TreeId]) -> Result<Vec<Tree>>;

    /// Get the tree bound to a sensor.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_tree_by_sensor_id(&self, sensor_id: &SensorId) -> Result<Option<Tree>>;

    /// Get the trees bound to any of the given sensors.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_trees_by_sensor_ids(&self, sensor_ids: &[SensorId]) -> Result<Vec<Tree>>;

    /// Get the tree at exactly the given position.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_tree_by_coordinates(&self, latitude: f64, longitude: f64) -> Result<Option<Tree>>;

    /// List the members of a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_trees_by_cluster_id(&self, cluster_id: TreeClusterId) -> Result<Vec<Tree>>;

    /// Find the closest tree within `max_distance_m` metres.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_nearest_tree(
        &self,
        latitude: f64,
        longitude: f64,
        max_distance_m: f64,
    ) -> Result<Option<Tree>>;

    /// Centroid of the given trees as `(lat, lon)`; `None` when no tree matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_center_point(&self, ids: &[TreeId]) -> Result<Option<(f64, f64)>>;

    /// Create a tree initialised by the callback.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the sensor is already bound to a
    /// tree, or a coordinate error if the position is out of range.
    fn create_tree<F>(&self, f: F) -> Result<Tree>
    where
        F: FnOnce(&mut Tree) -> Result<bool>;

    /// Update a tree in place.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the tree doesn't exist.
    fn update_tree<F>(&self, id: TreeId, f: F) -> Result<Tree>
    where
        F: FnOnce(&mut Tree) -> Result<bool>;

    /// Delete a tree and its index entries, returning the removed record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the tree doesn't exist.
    fn delete_tree(&self, id: TreeId) -> Result<Tree>;

    /// Remove the sensor from every tree bound to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn unlink_sensor_id(&self, sensor_id: &SensorId) -> Result<Vec<TreeId>>;

    /// Detach every member tree from the cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn unlink_tree_cluster_id(&self, cluster_id: TreeClusterId) -> Result<Vec<TreeId>>;

    /// Remove an image from every tree that links it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn unlink_image_id(&self, image_id: ImageId) -> Result<Vec<TreeId>>;
}

/// Sensor and reading storage.
pub trait SensorRepository {
    /// List every sensor.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_all_sensors(&self) -> Result<Vec<Sensor>>;

    /// Get a sensor by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the sensor doesn't exist.
    fn get_sensor(&self, id: &SensorId) -> Result<Sensor>;

    /// Get a sensor by ID, locking it for the rest of the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_sensor_for_update(&self, id: &SensorId) -> Result<Option<Sensor>>;

    /// Create a sensor.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if the sensor already exists.
    fn create_sensor<F>(&self, id: SensorId, f: F) -> Result<Sensor>
    where
        F: FnOnce(&mut Sensor) -> Result<bool>;

    /// Update a sensor in place.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the sensor doesn't exist.
    fn update_sensor<F>(&self, id: &SensorId, f: F) -> Result<Sensor>
    where
        F: FnOnce(&mut Sensor) -> Result<bool>;

    /// Delete a sensor together with all of its readings.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the sensor doesn't exist.
    fn delete_sensor(&self, id: &SensorId) -> Result<()>;

    /// Store a reading and make it the sensor's latest if it is the newest.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the sensor doesn't exist.
    fn insert_sensor_data(
        &self,
        sensor_id: &SensorId,
        payload: MqttPayload,
        created_at: DateTime<Utc>,
    ) -> Result<SensorData>;

    /// Latest reading of a sensor.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_latest_sensor_data_by_sensor_id(&self, sensor_id: &SensorId)
        -> Result<Option<SensorData>>;

    /// All readings of a sensor, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_sensor_data(&self, sensor_id: &SensorId) -> Result<Vec<SensorData>>;
}

/// Tree cluster storage.
pub trait TreeClusterRepository {
    /// List every cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_all_clusters(&self) -> Result<Vec<TreeCluster>>;

    /// Get a cluster by ID with its member ids hydrated.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the cluster doesn't exist.
    fn get_cluster(&self, id: TreeClusterId) -> Result<TreeCluster>;

    /// Get the clusters with the given IDs, skipping missing ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_clusters_by_ids(&self, ids: &[TreeClusterId]) -> Result<Vec<TreeCluster>>;

    /// Create a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_cluster<F>(&self, f: F) -> Result<TreeCluster>
    where
        F: FnOnce(&mut TreeCluster) -> Result<bool>;

    /// Update a cluster in place. Member ids are read-only here.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the cluster doesn't exist.
    fn update_cluster<F>(&self, id: TreeClusterId, f: F) -> Result<TreeCluster>
    where
        F: FnOnce(&mut TreeCluster) -> Result<bool>;

    /// Delete a cluster. Members must have been unlinked first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the cluster doesn't exist, or
    /// `StoreError::Validation` if it still has members.
    fn delete_cluster(&self, id: TreeClusterId) -> Result<()>;

    /// Latest reading of every sensor bound to a member tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_all_latest_sensor_data_by_cluster_id(
        &self,
        cluster_id: TreeClusterId,
    ) -> Result<Vec<SensorData>>;

    /// Every region with the number of plans that water a cluster in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_all_regions_with_watering_plan_count(&self) -> Result<Vec<RegionPlanCount>>;
}

/// Region storage.
pub trait RegionRepository {
    /// List every region.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_all_regions(&self) -> Result<Vec<Region>>;

    /// Get a region by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the region doesn't exist.
    fn get_region(&self, id: RegionId) -> Result<Region>;

    /// Region whose polygon contains the point.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_region_by_point(&self, latitude: f64, longitude: f64) -> Result<Option<Region>>;

    /// Create a region from a `[lon, lat]` ring.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` if the ring has fewer than three
    /// vertices, or a coordinate error for out-of-range vertices.
    fn create_region(&self, name: &str, polygon: Vec<[f64; 2]>) -> Result<Region>;

    /// Delete a region.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the region doesn't exist.
    fn delete_region(&self, id: RegionId) -> Result<()>;
}

/// Vehicle storage.
pub trait VehicleRepository {
    /// List every vehicle.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_all_vehicles(&self) -> Result<Vec<Vehicle>>;

    /// List vehicles of one type.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_vehicles_by_type(&self, vehicle_type: VehicleType) -> Result<Vec<Vehicle>>;

    /// Get a vehicle by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the vehicle doesn't exist.
    fn get_vehicle(&self, id: VehicleId) -> Result<Vehicle>;

    /// Get a vehicle by licence plate.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no vehicle has this plate.
    fn get_vehicle_by_plate(&self, number_plate: &str) -> Result<Vehicle>;

    /// Create a vehicle.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if the plate is taken.
    fn create_vehicle<F>(&self, f: F) -> Result<Vehicle>
    where
        F: FnOnce(&mut Vehicle) -> Result<bool>;

    /// Update a vehicle in place.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the vehicle doesn't exist, or
    /// `StoreError::Duplicate` if the new plate is taken.
    fn update_vehicle<F>(&self, id: VehicleId, f: F) -> Result<Vehicle>
    where
        F: FnOnce(&mut Vehicle) -> Result<bool>;

    /// Delete a vehicle.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the vehicle doesn't exist.
    fn delete_vehicle(&self, id: VehicleId) -> Result<()>;
}

/// Watering plan storage.
pub trait WateringPlanRepository {
    /// List every plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_all_plans(&self) -> Result<Vec<WateringPlan>>;

    /// Get a plan by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the plan doesn't exist.
    fn get_plan(&self, id: WateringPlanId) -> Result<WateringPlan>;

    /// List plans in one status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_all_plans_by_status(&self, status: WateringPlanStatus) -> Result<Vec<WateringPlan>>;

    /// Create a plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_plan<F>(&self, f: F) -> Result<WateringPlan>
    where
        F: FnOnce(&mut WateringPlan) -> Result<bool>;

    /// Update a plan in place.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the plan doesn't exist.
    fn update_plan<F>(&self, id: WateringPlanId, f: F) -> Result<WateringPlan>
    where
        F: FnOnce(&mut WateringPlan) -> Result<bool>;

    /// Delete a plan.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the plan doesn't exist.
    fn delete_plan(&self, id: WateringPlanId) -> Result<()>;

    /// Litres delivered by finished plans.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_total_consumed_water(&self) -> Result<f64>;

    /// Number of distinct users assigned to any plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_all_user_count(&self) -> Result<usize>;
}

/// Image reference storage.
pub trait ImageRepository {
    /// List every image.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_all_images(&self) -> Result<Vec<Image>>;

    /// Get an image by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the image doesn't exist.
    fn get_image(&self, id: ImageId) -> Result<Image>;

    /// Create an image reference.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` if the url is empty.
    fn create_image<F>(&self, f: F) -> Result<Image>
    where
        F: FnOnce(&mut Image) -> Result<bool>;

    /// Delete an image reference.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the image doesn't exist.
    fn delete_image(&self, id: ImageId) -> Result<()>;
}

/// The full set of repositories available inside a transaction.
pub trait Repositories:
    TreeRepository
    + SensorRepository
    + TreeClusterRepository
    + RegionRepository
    + VehicleRepository
    + WateringPlanRepository
    + ImageRepository
{
}

impl<T> Repositories for T where
    T: TreeRepository
        + SensorRepository
        + TreeClusterRepository
        + RegionRepository
        + VehicleRepository
        + WateringPlanRepository
        + ImageRepository
{
}
