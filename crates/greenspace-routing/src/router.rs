//! Turn-by-turn routing capability.

use async_trait::async_trait;
use greenspace_core::VehicleType;

use crate::error::Result;
use crate::types::{GeoJson, LonLat, RouteSummary};

/// A service that turns an ordered point list into a drivable route.
#[async_trait]
pub trait Router: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Routing profile for a vehicle type.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedVehicleType` when the type has no profile.
    fn profile(&self, vehicle_type: VehicleType) -> Result<&'static str>;

    /// Route as GeoJSON.
    ///
    /// # Errors
    ///
    /// Returns `Router` when the routing service fails.
    async fn geojson(&self, profile: &str, points: &[LonLat]) -> Result<GeoJson>;

    /// Route as a GPX document.
    ///
    /// # Errors
    ///
    /// Returns `Router` when the routing service fails.
    async fn gpx(&self, profile: &str, points: &[LonLat]) -> Result<Vec<u8>>;

    /// Distance and duration only.
    ///
    /// # Errors
    ///
    /// Returns `Router` when the routing service fails.
    async fn summary(&self, profile: &str, points: &[LonLat]) -> Result<RouteSummary>;
}

/// In-memory router that connects the points with straight lines.
///
/// Distance is the sum of segment lengths in degrees times 100 km; every
/// request is recorded.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockRouter {
    calls: parking_lot::Mutex<Vec<(String, Vec<LonLat>)>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRouter {
    /// Create a new mock router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `(profile, points)` pairs.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Vec<LonLat>)> {
        self.calls.lock().clone()
    }

    fn record(&self, profile: &str, points: &[LonLat]) -> RouteSummary {
        self.calls.lock().push((profile.to_string(), points.to_vec()));
        let distance: f64 = points
            .windows(2)
            .map(|w| ((w[1][0] - w[0][0]).powi(2) + (w[1][1] - w[0][1]).powi(2)).sqrt() * 100_000.0)
            .sum();
        RouteSummary {
            distance,
            duration: distance / 10.0,
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Router for MockRouter {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn profile(&self, vehicle_type: VehicleType) -> Result<&'static str> {
        match vehicle_type {
            VehicleType::Transporter | VehicleType::Trailer => Ok("mock-truck"),
            VehicleType::Unknown => Err(crate::RoutingError::UnsupportedVehicleType(vehicle_type)),
        }
    }

    async fn geojson(&self, profile: &str, points: &[LonLat]) -> Result<GeoJson> {
        let summary = self.record(profile, points);
        Ok(GeoJson::line(points, summary))
    }

    async fn gpx(&self, profile: &str, points: &[LonLat]) -> Result<Vec<u8>> {
        self.record(profile, points);
        Ok(crate::gpx::write_track("mock route", points).into_bytes())
    }

    async fn summary(&self, profile: &str, points: &[LonLat]) -> Result<RouteSummary> {
        Ok(self.record(profile, points))
    }
}
