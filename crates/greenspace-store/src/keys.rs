//! Key encoding utilities for `RocksDB`.
//!
//! Integer identifiers are encoded big-endian so that byte order matches
//! numeric order for the positive ids the store hands out. Composite index
//! keys are built so that a prefix scan yields all entries of one owner.

use greenspace_core::{
    SensorDataId, SensorId, TreeClusterId, TreeId, WateringPlanId, WateringPlanStatus,
};

/// Separator between a variable-length sensor id and the data id.
const SENSOR_SEPARATOR: u8 = 0x00;

/// Encode a cluster-tree index key: `cluster_id || tree_id`.
#[must_use]
pub fn cluster_tree_key(cluster_id: TreeClusterId, tree_id: TreeId) -> Vec<u8> {
    let mut key = Vec::with_capacity(8);
    key.extend_from_slice(&cluster_id.to_be_bytes());
    key.extend_from_slice(&tree_id.to_be_bytes());
    key
}

/// Encode a cluster prefix for scanning all trees of a cluster.
#[must_use]
pub fn cluster_prefix(cluster_id: TreeClusterId) -> Vec<u8> {
    cluster_id.to_be_bytes().to_vec()
}

/// Extract the tree ID from a cluster-tree key.
#[must_use]
pub fn tree_id_from_cluster_key(key: &[u8]) -> Option<TreeId> {
    let bytes: [u8; 4] = key.get(4..8)?.try_into().ok()?;
    Some(TreeId::from_be_bytes(bytes))
}

/// Decode a tree ID stored as an index value.
#[must_use]
pub fn tree_id_from_value(value: &[u8]) -> Option<TreeId> {
    let bytes: [u8; 4] = value.try_into().ok()?;
    Some(TreeId::from_be_bytes(bytes))
}

/// Encode a sensor-data index key: `sensor_id || 0x00 || data_id`.
#[must_use]
pub fn sensor_data_key(sensor_id: &SensorId, data_id: SensorDataId) -> Vec<u8> {
    let mut key = sensor_prefix(sensor_id);
    key.extend_from_slice(&data_id.to_be_bytes());
    key
}

/// Encode a sensor prefix for scanning all readings of a sensor.
///
/// The trailing separator keeps `abc` from matching readings of `abcd`.
#[must_use]
pub fn sensor_prefix(sensor_id: &SensorId) -> Vec<u8> {
    let mut key = Vec::with_capacity(sensor_id.as_bytes().len() + 9);
    key.extend_from_slice(sensor_id.as_bytes());
    key.push(SENSOR_SEPARATOR);
    key
}

/// Extract the data ID from a sensor-data key.
#[must_use]
pub fn data_id_from_sensor_key(key: &[u8]) -> Option<SensorDataId> {
    let start = key.len().checked_sub(8)?;
    let bytes: [u8; 8] = key.get(start..)?.try_into().ok()?;
    Some(SensorDataId::from_be_bytes(bytes))
}

/// Stable one-byte tag for a plan status.
#[must_use]
pub const fn plan_status_tag(status: WateringPlanStatus) -> u8 {
    match status {
        WateringPlanStatus::Planned => 1,
        WateringPlanStatus::Active => 2,
        WateringPlanStatus::Cancelled => 3,
        WateringPlanStatus::Finished => 4,
        WateringPlanStatus::NotCompleted => 5,
        WateringPlanStatus::Unknown => 0,
    }
}

/// Encode a status-plan index key: `status || plan_id`.
#[must_use]
pub fn status_plan_key(status: WateringPlanStatus, plan_id: WateringPlanId) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(plan_status_tag(status));
    key.extend_from_slice(&plan_id.to_be_bytes());
    key
}

/// Encode a status prefix for scanning all plans with a given status.
#[must_use]
pub fn status_prefix(status: WateringPlanStatus) -> Vec<u8> {
    vec![plan_status_tag(status)]
}

/// Extract the plan ID from a status-plan key.
#[must_use]
pub fn plan_id_from_status_key(key: &[u8]) -> Option<WateringPlanId> {
    let bytes: [u8; 4] = key.get(1..5)?.try_into().ok()?;
    Some(WateringPlanId::from_be_bytes(bytes))
}
