//! Telemetry payload delivered by soil-moisture sensors.

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::geo::{validate_latitude, validate_longitude};
use crate::ids::SensorId;
use crate::watering::Watermark;

/// A sensor message as received from the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttPayload {
    /// Device identifier; becomes the sensor id.
    pub device_id: String,
    /// Battery voltage.
    #[serde(default)]
    pub battery: f64,
    /// Relative humidity.
    #[serde(default)]
    pub humidity: f64,
    /// Temperature in degrees Celsius.
    #[serde(default)]
    pub temperature: f64,
    /// Reported latitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Reported longitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Soil-moisture readings by depth.
    #[serde(default)]
    pub watermarks: Vec<Watermark>,
}

impl MqttPayload {
    /// Structural validation.
    ///
    /// # Errors
    ///
    /// Returns a `BadRequest` error if the device id is empty or a present
    /// coordinate is out of range.
    pub fn validate(&self) -> Result<SensorId, ServiceError> {
        let sensor_id = SensorId::new(self.device_id.as_str())
            .map_err(|e| ServiceError::bad_request(format!("device_id: {e}")))?;
        if let Some(lat) = self.latitude {
            validate_latitude(lat)?;
        }
        if let Some(lon) = self.longitude {
            validate_longitude(lon)?;
        }
        Ok(sensor_id)
    }

    /// Reported position when both components are present.
    #[must_use]
    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}
