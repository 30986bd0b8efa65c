//! Core types for greenspace.
//!
//! This crate provides the shared vocabulary of the green-space backend:
//!
//! - Identifier newtypes for every entity
//! - Closed enumerations with an `unknown` sentinel
//! - The kind-tagged [`ServiceError`]
//! - Coordinate validation and the sensor telemetry payload
//! - The pure watering-status evaluator

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod geo;
pub mod ids;
pub mod payload;
pub mod status;
pub mod watering;

pub use error::{ErrorKind, Result, ServiceError};
pub use geo::{CoordinateError, Point};
pub use ids::{
    IdError, ImageId, RegionId, SensorDataId, SensorId, TreeClusterId, TreeId, UserId, VehicleId,
    WateringPlanId,
};
pub use payload::MqttPayload;
pub use status::{
    DrivingLicense, SensorStatus, SoilCondition, UserRole, VehicleStatus, VehicleType,
    WateringPlanStatus, WateringStatus,
};
pub use watering::Watermark;

/// Water demand per tree in litres for one watering run.
pub const WATER_PER_TREE: u32 = 120;
