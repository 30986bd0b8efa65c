//! Route planning: optimize the visiting order, then render it.

use async_trait::async_trait;
use greenspace_store::{TreeCluster, Vehicle};

use crate::error::{Result, RoutingError};
use crate::optimizer::{build_request, compress_steps, OptimizationClient};
use crate::router::Router;
use crate::types::{GeoJson, LonLat, RouteEndpoints, RouteMetadata};

/// Route generation as seen by the control plane.
#[async_trait]
pub trait RoutingRepository: Send + Sync {
    /// Route for a vehicle through the clusters, as GeoJSON.
    ///
    /// # Errors
    ///
    /// Returns an error if optimization or rendering fails.
    async fn generate_route(&self, vehicle: &Vehicle, clusters: &[TreeCluster]) -> Result<GeoJson>;

    /// Route for a vehicle through the clusters, as a GPX document.
    ///
    /// # Errors
    ///
    /// Returns an error if optimization or rendering fails.
    async fn generate_raw_gpx_route(
        &self,
        vehicle: &Vehicle,
        clusters: &[TreeCluster],
    ) -> Result<Vec<u8>>;

    /// Refill count, distance and duration of the route.
    ///
    /// # Errors
    ///
    /// Returns an error if optimization or rendering fails.
    async fn generate_route_information(
        &self,
        vehicle: &Vehicle,
        clusters: &[TreeCluster],
    ) -> Result<RouteMetadata>;
}

/// Ordered stops produced by the optimizer.
struct PlannedStops {
    profile: &'static str,
    points: Vec<LonLat>,
    refills: usize,
}

/// Planner combining a shipment optimizer with a turn-by-turn router.
pub struct RoutePlanner<R: Router> {
    optimizer: OptimizationClient,
    router: R,
    endpoints: RouteEndpoints,
}

impl<R: Router> RoutePlanner<R> {
    /// Create a new planner.
    #[must_use]
    pub fn new(optimizer: OptimizationClient, router: R, endpoints: RouteEndpoints) -> Self {
        Self {
            optimizer,
            router,
            endpoints,
        }
    }

    /// Get the route endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &RouteEndpoints {
        &self.endpoints
    }

    /// Get the router.
    #[must_use]
    pub fn router(&self) -> &R {
        &self.router
    }

    async fn plan(&self, vehicle: &Vehicle, clusters: &[TreeCluster]) -> Result<PlannedStops> {
        let profile = self.router.profile(vehicle.vehicle_type)?;
        let request = build_request(vehicle, clusters, &self.endpoints, profile)?;
        let route = self.optimizer.optimize(&request).await?;
        let (steps, refills) = compress_steps(&route.steps);
        let points: Vec<LonLat> = steps.iter().filter_map(|s| s.location).collect();

        tracing::debug!(
            vehicle_id = %vehicle.id,
            router = self.router.name(),
            stops = points.len(),
            refills,
            "Planned route"
        );
        Ok(PlannedStops {
            profile,
            points,
            refills,
        })
    }
}

#[async_trait]
impl<R: Router> RoutingRepository for RoutePlanner<R> {
    async fn generate_route(&self, vehicle: &Vehicle, clusters: &[TreeCluster]) -> Result<GeoJson> {
        let stops = self.plan(vehicle, clusters).await?;
        let mut geo = self.router.geojson(stops.profile, &stops.points).await?;
        geo.metadata = Some(self.endpoints);
        Ok(geo)
    }

    async fn generate_raw_gpx_route(
        &self,
        vehicle: &Vehicle,
        clusters: &[TreeCluster],
    ) -> Result<Vec<u8>> {
        let stops = self.plan(vehicle, clusters).await?;
        self.router.gpx(stops.profile, &stops.points).await
    }

    async fn generate_route_information(
        &self,
        vehicle: &Vehicle,
        clusters: &[TreeCluster],
    ) -> Result<RouteMetadata> {
        let stops = self.plan(vehicle, clusters).await?;
        let summary = self.router.summary(stops.profile, &stops.points).await?;
        Ok(RouteMetadata {
            refills: stops.refills,
            distance: summary.distance,
            time: summary.duration,
        })
    }
}

/// Routing backend used when routing is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRouting;

#[async_trait]
impl RoutingRepository for DisabledRouting {
    async fn generate_route(&self, _: &Vehicle, _: &[TreeCluster]) -> Result<GeoJson> {
        Err(RoutingError::Disabled)
    }

    async fn generate_raw_gpx_route(&self, _: &Vehicle, _: &[TreeCluster]) -> Result<Vec<u8>> {
        Err(RoutingError::Disabled)
    }

    async fn generate_route_information(
        &self,
        _: &Vehicle,
        _: &[TreeCluster],
    ) -> Result<RouteMetadata> {
        Err(RoutingError::Disabled)
    }
}
