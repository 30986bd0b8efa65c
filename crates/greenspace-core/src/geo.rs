//! Geographic coordinate checks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Point {
    /// Create a validated point.
    ///
    /// # Errors
    ///
    /// Returns an error if either component is outside its range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        validate_latitude(latitude)?;
        validate_longitude(longitude)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// `[lon, lat]` order, as used by routing services and GeoJSON.
    #[must_use]
    pub const fn lon_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }

    /// Build from a `[lon, lat]` pair.
    #[must_use]
    pub const fn from_lon_lat(pair: [f64; 2]) -> Self {
        Self {
            latitude: pair[1],
            longitude: pair[0],
        }
    }
}

/// Invalid coordinate component.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateError {
    /// Latitude outside `[-90, 90]` or not finite.
    #[error("invalid latitude: {0}")]
    InvalidLatitude(f64),
    /// Longitude outside `[-180, 180]` or not finite.
    #[error("invalid longitude: {0}")]
    InvalidLongitude(f64),
}

/// Check that a latitude lies in `[-90, 90]`.
///
/// # Errors
///
/// Returns [`CoordinateError::InvalidLatitude`] otherwise.
pub fn validate_latitude(latitude: f64) -> Result<(), CoordinateError> {
    if (-90.0..=90.0).contains(&latitude) {
        Ok(())
    } else {
        Err(CoordinateError::InvalidLatitude(latitude))
    }
}

/// Check that a longitude lies in `[-180, 180]`.
///
/// # Errors
///
/// Returns [`CoordinateError::InvalidLongitude`] otherwise.
pub fn validate_longitude(longitude: f64) -> Result<(), CoordinateError> {
    if (-180.0..=180.0).contains(&longitude) {
        Ok(())
    } else {
        Err(CoordinateError::InvalidLongitude(longitude))
    }
}

impl From<CoordinateError> for crate::ServiceError {
    fn from(err: CoordinateError) -> Self {
        Self::bad_request(err.to_string())
    }
}
