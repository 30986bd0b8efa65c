//! Domain records stored in the database.
//!
//! Cross-entity references are plain identifiers resolved through the
//! repositories. Nothing here hydrates a referenced entity on its own.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use greenspace_core::{
    DrivingLicense, ImageId, MqttPayload, RegionId, SensorDataId, SensorId, SensorStatus,
    SoilCondition, TreeClusterId, TreeId, UserId, VehicleId, VehicleStatus, VehicleType,
    WateringPlanId, WateringPlanStatus, WateringStatus,
};
use serde::{Deserialize, Serialize};

/// A tree record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    /// Store-assigned identifier.
    pub id: TreeId,
    /// Cadastre number.
    pub number: String,
    /// Species name.
    pub species: String,
    /// Year the tree was planted.
    pub planting_year: i32,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Free-text description.
    pub description: String,
    /// Managed by an external provider and not editable by users.
    pub readonly: bool,
    /// Provider that created this tree, if any.
    #[serde(default)]
    pub provider: Option<String>,
    /// Provider-specific attributes.
    #[serde(default)]
    pub additional_info: BTreeMap<String, serde_json::Value>,
    /// Derived watering status.
    pub watering_status: WateringStatus,
    /// When the tree was last watered.
    pub last_watered: Option<DateTime<Utc>>,
    /// Owning cluster.
    pub tree_cluster_id: Option<TreeClusterId>,
    /// Linked sensor.
    pub sensor_id: Option<SensorId>,
    /// Linked images.
    #[serde(default)]
    pub image_ids: Vec<ImageId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Tree {
    pub(crate) fn blank(id: TreeId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            number: String::new(),
            species: String::new(),
            planting_year: 0,
            latitude: 0.0,
            longitude: 0.0,
            description: String::new(),
            readonly: false,
            provider: None,
            additional_info: BTreeMap::new(),
            watering_status: WateringStatus::Unknown,
            last_watered: None,
            tree_cluster_id: None,
            sensor_id: None,
            image_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A soil-moisture sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    /// Device identifier.
    pub id: SensorId,
    /// Connectivity status.
    pub status: SensorStatus,
    /// Last reported latitude.
    pub latitude: f64,
    /// Last reported longitude.
    pub longitude: f64,
    /// Most recent reading.
    pub latest_data: Option<SensorData>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Sensor {
    pub(crate) fn blank(id: SensorId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: SensorStatus::Unknown,
            latitude: 0.0,
            longitude: 0.0,
            latest_data: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One stored sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    /// Store-assigned identifier.
    pub id: SensorDataId,
    /// Sensor that produced the reading.
    pub sensor_id: SensorId,
    /// Raw telemetry.
    pub payload: MqttPayload,
    /// Time of ingestion.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A group of trees watered together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeCluster {
    /// Store-assigned identifier.
    pub id: TreeClusterId,
    /// Display name.
    pub name: String,
    /// Street address.
    pub address: String,
    /// Free-text description.
    pub description: String,
    /// Soil type.
    pub soil_condition: SoilCondition,
    /// Hidden from planning.
    pub archived: bool,
    /// Centroid latitude; `None` when the cluster has no trees.
    pub latitude: Option<f64>,
    /// Centroid longitude; `None` when the cluster has no trees.
    pub longitude: Option<f64>,
    /// Region containing the centroid.
    pub region_id: Option<RegionId>,
    /// Member trees, hydrated from the membership index on read.
    #[serde(skip)]
    pub tree_ids: Vec<TreeId>,
    /// Aggregate watering status.
    pub watering_status: WateringStatus,
    /// When the cluster was last watered.
    pub last_watered: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TreeCluster {
    pub(crate) fn blank(id: TreeClusterId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: String::new(),
            address: String::new(),
            description: String::new(),
            soil_condition: SoilCondition::Unknown,
            archived: false,
            latitude: None,
            longitude: None,
            region_id: None,
            tree_ids: Vec::new(),
            watering_status: WateringStatus::Unknown,
            last_watered: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Centroid when both components are set.
    #[must_use]
    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// An administrative region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Store-assigned identifier.
    pub id: RegionId,
    /// Unique name.
    pub name: String,
    /// Outer ring as `[lon, lat]` pairs.
    pub polygon: Vec<[f64; 2]>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A region together with the number of plans touching it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPlanCount {
    /// The region.
    pub region: Region,
    /// Plans with at least one member cluster in the region.
    pub watering_plan_count: usize,
}

/// A watering vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Store-assigned identifier.
    pub id: VehicleId,
    /// Unique licence plate.
    pub number_plate: String,
    /// Free-text description.
    pub description: String,
    /// Tank capacity in litres.
    pub water_capacity: f64,
    /// Kind of vehicle.
    pub vehicle_type: VehicleType,
    /// Availability.
    pub status: VehicleStatus,
    /// Manufacturer model.
    pub model: String,
    /// Licence class needed to drive it.
    pub driving_license: DrivingLicense,
    /// Height in metres.
    pub height: f64,
    /// Length in metres.
    pub length: f64,
    /// Width in metres.
    pub width: f64,
    /// Weight in tonnes.
    pub weight: f64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    pub(crate) fn blank(id: VehicleId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            number_plate: String::new(),
            description: String::new(),
            water_capacity: 0.0,
            vehicle_type: VehicleType::Unknown,
            status: VehicleStatus::Unknown,
            model: String::new(),
            driving_license: DrivingLicense::Unknown,
            height: 0.0,
            length: 0.0,
            width: 0.0,
            weight: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A scheduled watering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WateringPlan {
    /// Store-assigned identifier.
    pub id: WateringPlanId,
    /// Day of the run.
    pub date: DateTime<Utc>,
    /// Free-text description.
    pub description: String,
    /// Lifecycle state.
    pub status: WateringPlanStatus,
    /// Route length in metres, once planned.
    pub distance: Option<f64>,
    /// Water demand in litres.
    pub total_water_required: Option<f64>,
    /// Reason given when cancelled.
    #[serde(default)]
    pub cancellation_note: String,
    /// Member clusters.
    pub tree_cluster_ids: Vec<TreeClusterId>,
    /// Assigned staff.
    pub user_ids: Vec<UserId>,
    /// Assigned transporter.
    pub transporter_id: Option<VehicleId>,
    /// Assigned trailer.
    pub trailer_id: Option<VehicleId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl WateringPlan {
    pub(crate) fn blank(id: WateringPlanId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            date: now,
            description: String::new(),
            status: WateringPlanStatus::Unknown,
            distance: None,
            total_water_required: None,
            cancellation_note: String::new(),
            tree_cluster_ids: Vec::new(),
            user_ids: Vec::new(),
            transporter_id: None,
            trailer_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Store-assigned identifier.
    pub id: ImageId,
    /// Location of the image.
    pub url: String,
    /// Original file name.
    pub filename: Option<String>,
    /// MIME type.
    pub mime_type: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Image {
    pub(crate) fn blank(id: ImageId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            url: String::new(),
            filename: None,
            mime_type: None,
            created_at: now,
            updated_at: now,
        }
    }
}
