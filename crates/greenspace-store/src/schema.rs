//! Database schema definitions and column families.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Identifier sequences, keyed by sequence name.
    pub const META: &str = "meta";

    /// Primary tree records, keyed by `tree_id`.
    pub const TREES: &str = "trees";

    /// Index: trees by cluster, keyed by `cluster_id || tree_id`.
    pub const TREES_BY_CLUSTER: &str = "trees_by_cluster";

    /// Index: tree bound to a sensor, keyed by `sensor_id`, value `tree_id`.
    pub const TREES_BY_SENSOR: &str = "trees_by_sensor";

    /// Primary sensor records, keyed by `sensor_id`.
    pub const SENSORS: &str = "sensors";

    /// Primary sensor readings, keyed by `data_id`.
    pub const SENSOR_DATA: &str = "sensor_data";

    /// Index: readings by sensor, keyed by `sensor_id || 0x00 || data_id`.
    pub const SENSOR_DATA_BY_SENSOR: &str = "sensor_data_by_sensor";

    /// Primary cluster records, keyed by `cluster_id`.
    pub const TREE_CLUSTERS: &str = "tree_clusters";

    /// Primary region records, keyed by `region_id`.
    pub const REGIONS: &str = "regions";

    /// Primary vehicle records, keyed by `vehicle_id`.
    pub const VEHICLES: &str = "vehicles";

    /// Index: vehicle by plate, keyed by `number_plate`, value `vehicle_id`.
    pub const VEHICLES_BY_PLATE: &str = "vehicles_by_plate";

    /// Primary watering plan records, keyed by `plan_id`.
    pub const WATERING_PLANS: &str = "watering_plans";

    /// Index: plans by status, keyed by `status || plan_id`.
    pub const PLANS_BY_STATUS: &str = "plans_by_status";

    /// Primary image records, keyed by `image_id`.
    pub const IMAGES: &str = "images";
}

/// Sequence names stored in [`cf::META`].
pub mod seq {
    /// Next tree id.
    pub const TREE: &str = "seq/tree";
    /// Next sensor reading id.
    pub const SENSOR_DATA: &str = "seq/sensor_data";
    /// Next cluster id.
    pub const TREE_CLUSTER: &str = "seq/tree_cluster";
    /// Next region id.
    pub const REGION: &str = "seq/region";
    /// Next vehicle id.
    pub const VEHICLE: &str = "seq/vehicle";
    /// Next plan id.
    pub const WATERING_PLAN: &str = "seq/watering_plan";
    /// Next image id.
    pub const IMAGE: &str = "seq/image";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::META,
        cf::TREES,
        cf::TREES_BY_CLUSTER,
        cf::TREES_BY_SENSOR,
        cf::SENSORS,
        cf::SENSOR_DATA,
        cf::SENSOR_DATA_BY_SENSOR,
        cf::TREE_CLUSTERS,
        cf::REGIONS,
        cf::VEHICLES,
        cf::VEHICLES_BY_PLATE,
        cf::WATERING_PLANS,
        cf::PLANS_BY_STATUS,
        cf::IMAGES,
    ]
}
