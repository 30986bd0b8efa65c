//! Request types and service configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use greenspace_core::geo::{validate_latitude, validate_longitude};
use greenspace_core::{
    DrivingLicense, ImageId, SensorId, ServiceError, SoilCondition, TreeClusterId, TreeId, UserId,
    VehicleId, VehicleStatus, VehicleType, WateringPlanStatus,
};
use serde::{Deserialize, Serialize};

/// Request to create a tree. Also used to replace one on update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeRequest {
    /// Inventory number.
    pub number: String,
    /// Species name.
    #[serde(default)]
    pub species: String,
    /// Year the tree was planted.
    pub planting_year: i32,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Free text.
    #[serde(default)]
    pub description: String,
    /// Whether users may edit the tree.
    #[serde(default)]
    pub readonly: bool,
    /// Plugin that owns the tree.
    #[serde(default)]
    pub provider: Option<String>,
    /// Provider-specific data.
    #[serde(default)]
    pub additional_info: BTreeMap<String, serde_json::Value>,
    /// Owning cluster.
    #[serde(default)]
    pub tree_cluster_id: Option<TreeClusterId>,
    /// Linked sensor.
    #[serde(default)]
    pub sensor_id: Option<SensorId>,
    /// Linked images.
    #[serde(default)]
    pub image_ids: Vec<ImageId>,
}

impl TreeRequest {
    /// Create a request with the required fields set.
    #[must_use]
    pub fn new(number: impl Into<String>, planting_year: i32, latitude: f64, longitude: f64) -> Self {
        Self {
            number: number.into(),
            planting_year,
            latitude,
            longitude,
            ..Self::default()
        }
    }

    /// Set the owning cluster.
    #[must_use]
    pub fn in_cluster(mut self, cluster_id: TreeClusterId) -> Self {
        self.tree_cluster_id = Some(cluster_id);
        self
    }

    /// Link a sensor.
    #[must_use]
    pub fn with_sensor(mut self, sensor_id: SensorId) -> Self {
        self.sensor_id = Some(sensor_id);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ServiceError> {
        if self.number.trim().is_empty() {
            return Err(ServiceError::bad_request("tree number must not be empty"));
        }
        if self.planting_year < 1 {
            return Err(ServiceError::bad_request(format!(
                "invalid planting year: {}",
                self.planting_year
            )));
        }
        validate_latitude(self.latitude)?;
        validate_longitude(self.longitude)?;
        Ok(())
    }
}

/// Request to create or replace a tree cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterRequest {
    /// Display name.
    pub name: String,
    /// Street address.
    #[serde(default)]
    pub address: String,
    /// Free text.
    #[serde(default)]
    pub description: String,
    /// Soil type.
    #[serde(default)]
    pub soil_condition: SoilCondition,
    /// Hidden from planning.
    #[serde(default)]
    pub archived: bool,
    /// Member trees.
    #[serde(default)]
    pub tree_ids: Vec<TreeId>,
}

impl ClusterRequest {
    /// Create a request for a named cluster with the given members.
    #[must_use]
    pub fn new(name: impl Into<String>, tree_ids: Vec<TreeId>) -> Self {
        Self {
            name: name.into(),
            tree_ids,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ServiceError> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::bad_request("cluster name must not be empty"));
        }
        Ok(())
    }
}

/// Request to create a watering plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePlanRequest {
    /// Day the plan is carried out.
    pub date: Option<DateTime<Utc>>,
    /// Free text.
    #[serde(default)]
    pub description: String,
    /// Clusters to water.
    #[serde(default)]
    pub tree_cluster_ids: Vec<TreeClusterId>,
    /// Assigned staff.
    #[serde(default)]
    pub user_ids: Vec<UserId>,
    /// Transporter used.
    #[serde(default)]
    pub transporter_id: Option<VehicleId>,
    /// Trailer used.
    #[serde(default)]
    pub trailer_id: Option<VehicleId>,
}

/// Request to replace a watering plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePlanRequest {
    /// Day the plan is carried out.
    pub date: DateTime<Utc>,
    /// Free text.
    #[serde(default)]
    pub description: String,
    /// Target status.
    pub status: WateringPlanStatus,
    /// Reason for a cancellation.
    #[serde(default)]
    pub cancellation_note: String,
    /// Clusters to water.
    #[serde(default)]
    pub tree_cluster_ids: Vec<TreeClusterId>,
    /// Assigned staff.
    #[serde(default)]
    pub user_ids: Vec<UserId>,
    /// Transporter used.
    #[serde(default)]
    pub transporter_id: Option<VehicleId>,
    /// Trailer used.
    #[serde(default)]
    pub trailer_id: Option<VehicleId>,
}

impl UpdatePlanRequest {
    /// Request that keeps everything of `plan` and only sets the status.
    #[must_use]
    pub fn from_plan(plan: &greenspace_store::WateringPlan, status: WateringPlanStatus) -> Self {
        Self {
            date: plan.date,
            description: plan.description.clone(),
            status,
            cancellation_note: plan.cancellation_note.clone(),
            tree_cluster_ids: plan.tree_cluster_ids.clone(),
            user_ids: plan.user_ids.clone(),
            transporter_id: plan.transporter_id,
            trailer_id: plan.trailer_id,
        }
    }
}

/// Request to create or replace a vehicle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehicleRequest {
    /// Licence plate; unique.
    pub number_plate: String,
    /// Free text.
    #[serde(default)]
    pub description: String,
    /// Tank size in litres.
    pub water_capacity: f64,
    /// Transporter or trailer.
    #[serde(rename = "type", default)]
    pub vehicle_type: VehicleType,
    /// Availability.
    #[serde(default)]
    pub status: VehicleStatus,
    /// Model name.
    #[serde(default)]
    pub model: String,
    /// Licence class needed to drive it.
    #[serde(default)]
    pub driving_license: DrivingLicense,
    /// Height in metres.
    #[serde(default)]
    pub height: f64,
    /// Length in metres.
    #[serde(default)]
    pub length: f64,
    /// Width in metres.
    #[serde(default)]
    pub width: f64,
    /// Weight in tonnes.
    #[serde(default)]
    pub weight: f64,
}

impl VehicleRequest {
    /// Create a request with the required fields set.
    #[must_use]
    pub fn new(number_plate: impl Into<String>, vehicle_type: VehicleType, water_capacity: f64) -> Self {
        Self {
            number_plate: number_plate.into(),
            vehicle_type,
            water_capacity,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ServiceError> {
        if self.number_plate.trim().is_empty() {
            return Err(ServiceError::bad_request("number plate must not be empty"));
        }
        if self.water_capacity.is_nan() || self.water_capacity <= 0.0 {
            return Err(ServiceError::bad_request(
                "water capacity must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Vehicles and clusters of a route to plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Vehicle driving the route.
    pub transporter_id: VehicleId,
    /// Optional trailer adding capacity.
    #[serde(default)]
    pub trailer_id: Option<VehicleId>,
    /// Clusters to water.
    pub tree_cluster_ids: Vec<TreeClusterId>,
}

/// Request to store an image reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Where the image is served from.
    pub url: String,
    /// Original file name.
    #[serde(default)]
    pub filename: Option<String>,
    /// MIME type.
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Credentials a plugin registers with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginAuth {
    /// Account name at the identity provider.
    pub username: String,
    /// Account password.
    pub password: String,
}

/// An external integration registered at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plugin {
    /// Unique key.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Base URL the plugin is served from.
    pub path: String,
    /// Plugin version.
    #[serde(default)]
    pub version: String,
    /// Free text.
    #[serde(default)]
    pub description: String,
    /// Credentials checked at registration.
    #[serde(skip_serializing)]
    pub auth: PluginAuth,
}

impl Plugin {
    pub(crate) fn validate(&self) -> Result<(), ServiceError> {
        if self.slug.trim().is_empty() {
            return Err(ServiceError::bad_request("plugin slug must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(ServiceError::bad_request("plugin name must not be empty"));
        }
        if !(self.path.starts_with("http://") || self.path.starts_with("https://")) {
            return Err(ServiceError::bad_request(format!(
                "plugin path must be an http(s) url: {}",
                self.path
            )));
        }
        if self.auth.username.is_empty() || self.auth.password.is_empty() {
            return Err(ServiceError::bad_request("plugin credentials are required"));
        }
        Ok(())
    }
}

/// Configuration for the domain services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// A sensor binds to the nearest tree within this many metres.
    #[serde(default = "ControlConfig::default_nearest_tree_radius")]
    pub nearest_tree_radius_m: f64,
    /// How often the plugin registry evicts silent plugins (seconds).
    #[serde(default = "ControlConfig::default_plugin_interval")]
    pub plugin_interval_seconds: u64,
    /// How long a plugin may go without a heartbeat (seconds).
    #[serde(default = "ControlConfig::default_plugin_timeout")]
    pub plugin_timeout_seconds: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            nearest_tree_radius_m: Self::default_nearest_tree_radius(),
            plugin_interval_seconds: Self::default_plugin_interval(),
            plugin_timeout_seconds: Self::default_plugin_timeout(),
        }
    }
}

impl ControlConfig {
    const fn default_nearest_tree_radius() -> f64 {
        5.0
    }

    const fn default_plugin_interval() -> u64 {
        60
    }

    const fn default_plugin_timeout() -> u64 {
        300
    }

    /// Get the plugin eviction interval.
    #[must_use]
    pub const fn plugin_interval(&self) -> Duration {
        Duration::from_secs(self.plugin_interval_seconds)
    }

    /// Get the plugin heartbeat timeout.
    #[must_use]
    pub const fn plugin_timeout(&self) -> Duration {
        Duration::from_secs(self.plugin_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenspace_core::ErrorKind;

    #[test]
    fn tree_request_validation() {
        assert!(TreeRequest::new("T-1", 2022, 54.8, 9.4).validate().is_ok());
        let kind = |r: TreeRequest| r.validate().unwrap_err().kind();
        assert_eq!(kind(TreeRequest::new(" ", 2022, 54.8, 9.4)), ErrorKind::BadRequest);
        assert_eq!(kind(TreeRequest::new("T-1", 0, 54.8, 9.4)), ErrorKind::BadRequest);
        assert_eq!(kind(TreeRequest::new("T-1", 2022, 91.0, 9.4)), ErrorKind::BadRequest);
        assert_eq!(kind(TreeRequest::new("T-1", 2022, 54.8, 181.0)), ErrorKind::BadRequest);
    }

    #[test]
    fn vehicle_capacity_must_be_positive() {
        assert!(VehicleRequest::new("FL-1", VehicleType::Trailer, 0.0).validate().is_err());
        assert!(VehicleRequest::new("FL-1", VehicleType::Trailer, f64::NAN).validate().is_err());
        assert!(VehicleRequest::new("FL-1", VehicleType::Trailer, 500.0).validate().is_ok());
    }

    #[test]
    fn plugin_path_must_be_url() {
        let mut plugin = Plugin {
            slug: "csv-import".into(),
            name: "CSV import".into(),
            path: "ftp://plugins/csv".into(),
            version: "1.0.0".into(),
            description: String::new(),
            auth: PluginAuth {
                username: "csv".into(),
                password: "pw".into(),
            },
        };
        assert!(plugin.validate().is_err());
        plugin.path = "http://plugins:8080/csv".into();
        assert!(plugin.validate().is_ok());
    }

    #[test]
    fn config_defaults() {
        let config: ControlConfig = serde_json::from_str("{}").unwrap();
        assert!((config.nearest_tree_radius_m - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.plugin_interval(), Duration::from_secs(60));
        assert_eq!(config.plugin_timeout(), Duration::from_secs(300));
    }
}
