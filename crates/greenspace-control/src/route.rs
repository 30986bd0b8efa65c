//! Route orchestration: resolves vehicles and clusters, hands them to the
//! routing collaborator and stores exported GPX tracks.

use std::sync::Arc;

use chrono::Utc;
use greenspace_core::{Result, ServiceError, VehicleType};
use greenspace_routing::{GeoJson, GpxBucket, RouteMetadata, RoutingRepository};
use greenspace_store::{Store, TreeCluster, TreeClusterRepository, Vehicle, VehicleRepository};

use crate::types::RouteRequest;

/// Plans watering routes for a vehicle and a set of clusters.
pub struct RouteService<S: Store> {
    store: Arc<S>,
    routing: Arc<dyn RoutingRepository>,
    bucket: Option<Arc<dyn GpxBucket>>,
}

impl<S: Store> RouteService<S> {
    /// Create a new route service. Without a bucket GPX export is disabled.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        routing: Arc<dyn RoutingRepository>,
        bucket: Option<Arc<dyn GpxBucket>>,
    ) -> Self {
        Self {
            store,
            routing,
            bucket,
        }
    }

    /// Route as GeoJSON, with the configured endpoints as metadata.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing vehicle or cluster or an unsupported
    /// vehicle type, `BadRequest` when no cluster has a position, `Gone`
    /// when routing is disabled and `Internal` when a collaborator fails.
    pub async fn preview_route(&self, request: &RouteRequest) -> Result<GeoJson> {
        let (vehicle, clusters) = self.resolve(request)?;
        let route = self.routing.generate_route(&vehicle, &clusters).await?;
        tracing::info!(
            vehicle_id = %vehicle.id,
            clusters = clusters.len(),
            "Generated route preview"
        );
        Ok(route)
    }

    /// Distance, duration and refill count of a route.
    ///
    /// # Errors
    ///
    /// See [`RouteService::preview_route`].
    pub async fn generate_route_metadata(&self, request: &RouteRequest) -> Result<RouteMetadata> {
        let (vehicle, clusters) = self.resolve(request)?;
        Ok(self
            .routing
            .generate_route_information(&vehicle, &clusters)
            .await?)
    }

    /// Render a route as GPX, store it and return the object name.
    ///
    /// # Errors
    ///
    /// Returns `Gone` when no bucket is configured, plus the errors of
    /// [`RouteService::preview_route`].
    pub async fn generate_gpx(&self, request: &RouteRequest) -> Result<String> {
        let bucket = self.bucket()?;
        let (vehicle, clusters) = self.resolve(request)?;
        let gpx = self
            .routing
            .generate_raw_gpx_route(&vehicle, &clusters)
            .await?;

        let name = object_name(&vehicle.number_plate, Utc::now().timestamp());
        bucket.put_object(&name, &gpx).await?;
        tracing::info!(vehicle_id = %vehicle.id, object = %name, bytes = gpx.len(), "Stored GPX route");
        Ok(name)
    }

    /// Read back a stored GPX file.
    ///
    /// # Errors
    ///
    /// Returns `Gone` when no bucket is configured and `NotFound` if the
    /// object doesn't exist.
    pub async fn download_gpx(&self, name: &str) -> Result<Vec<u8>> {
        Ok(self.bucket()?.get_object(name).await?)
    }

    fn bucket(&self) -> Result<&Arc<dyn GpxBucket>> {
        self.bucket
            .as_ref()
            .ok_or_else(|| ServiceError::gone("GPX export is disabled"))
    }

    /// Load the vehicles and clusters. A trailer adds its capacity to the
    /// transporter.
    fn resolve(&self, request: &RouteRequest) -> Result<(Vehicle, Vec<TreeCluster>)> {
        if request.tree_cluster_ids.is_empty() {
            return Err(ServiceError::bad_request("at least one tree cluster is required"));
        }
        self.store.with_tx(|tx| {
            let mut vehicle = tx.get_vehicle(request.transporter_id)?;
            if let Some(trailer_id) = request.trailer_id {
                let trailer = tx.get_vehicle(trailer_id)?;
                if trailer.vehicle_type != VehicleType::Trailer {
                    return Err(ServiceError::bad_request(format!(
                        "vehicle {trailer_id} is not a trailer"
                    )));
                }
                vehicle.water_capacity += trailer.water_capacity;
            }

            let clusters = request
                .tree_cluster_ids
                .iter()
                .map(|id| tx.get_cluster(*id))
                .collect::<greenspace_store::Result<Vec<_>>>()?;
            Ok((vehicle, clusters))
        })
    }
}

/// `route-<plate>-<unix ts>.gpx` with the plate reduced to a safe file name.
fn object_name(number_plate: &str, timestamp: i64) -> String {
    let plate: String = number_plate
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("route-{plate}-{timestamp}.gpx")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use crate::types::{ClusterRequest, TreeRequest, VehicleRequest};
    use greenspace_core::{ErrorKind, VehicleId};
    use greenspace_routing::{
        DisabledRouting, MemoryBucket, MockRouter, OptimizationClient, RouteEndpoints,
        RoutePlanner,
    };
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ENDPOINTS: RouteEndpoints = RouteEndpoints {
        start_point: [9.43, 54.77],
        end_point: [9.42, 54.76],
        watering_point: [9.44, 54.78],
    };

    async fn optimizer() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/optimize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "routes": [{
                    "vehicle": 1,
                    "steps": [
                        {"type": "start", "location": [9.43, 54.77], "load": [0]},
                        {"type": "pickup", "location": [9.44, 54.78], "load": [240], "id": 1},
                        {"type": "delivery", "location": [9.45, 54.79], "load": [0], "id": 1},
                        {"type": "end", "location": [9.42, 54.76], "load": [0]}
                    ]
                }]
            })))
            .mount(&server)
            .await;
        server
    }

    async fn seeded(h: &Harness) -> RouteRequest {
        let truck = h
            .vehicles
            .create(VehicleRequest::new("SL-GR 1", VehicleType::Transporter, 2000.0))
            .await
            .unwrap();
        let mut trees = Vec::new();
        for n in 0..2 {
            let tree = h
                .trees
                .create(TreeRequest::new(format!("T-{n}"), 2020, 54.79, 9.45))
                .await
                .unwrap();
            trees.push(tree.id);
        }
        let cluster = h
            .clusters
            .create(ClusterRequest::new("Nord", trees))
            .await
            .unwrap();
        RouteRequest {
            transporter_id: truck.id,
            trailer_id: None,
            tree_cluster_ids: vec![cluster.id],
        }
    }

    fn service(
        h: &Harness,
        server: &MockServer,
        bucket: Option<Arc<dyn GpxBucket>>,
    ) -> RouteService<greenspace_store::RocksStore> {
        let planner = RoutePlanner::new(
            OptimizationClient::new(format!("{}/optimize", server.uri())),
            MockRouter::new(),
            ENDPOINTS,
        );
        RouteService::new(Arc::clone(&h.store), Arc::new(planner), bucket)
    }

    #[tokio::test]
    async fn preview_carries_endpoints() {
        let h = Harness::new();
        let server = optimizer().await;
        let routes = service(&h, &server, None);
        let request = seeded(&h).await;

        let geo = routes.preview_route(&request).await.unwrap();
        assert_eq!(geo.metadata, Some(ENDPOINTS));

        let info = routes.generate_route_metadata(&request).await.unwrap();
        assert_eq!(info.refills, 1);
        assert!(info.distance > 0.0);
    }

    #[tokio::test]
    async fn missing_vehicle_is_not_found() {
        let h = Harness::new();
        let server = optimizer().await;
        let routes = service(&h, &server, None);
        let mut request = seeded(&h).await;
        request.transporter_id = VehicleId::new(404);
        assert_eq!(
            routes.preview_route(&request).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn trailer_must_be_a_trailer() {
        let h = Harness::new();
        let server = optimizer().await;
        let routes = service(&h, &server, None);
        let mut request = seeded(&h).await;
        request.trailer_id = Some(request.transporter_id);
        assert_eq!(
            routes.preview_route(&request).await.unwrap_err().kind(),
            ErrorKind::BadRequest
        );
    }

    #[tokio::test]
    async fn gpx_export_round_trip() {
        let h = Harness::new();
        let server = optimizer().await;
        let bucket = Arc::new(MemoryBucket::new());
        let routes = service(&h, &server, Some(Arc::clone(&bucket) as Arc<dyn GpxBucket>));
        let request = seeded(&h).await;

        let name = routes.generate_gpx(&request).await.unwrap();
        assert!(name.starts_with("route-SL-GR_1-"));
        assert!(name.ends_with(".gpx"));
        assert_eq!(bucket.names(), vec![name.clone()]);

        let content = routes.download_gpx(&name).await.unwrap();
        assert!(!content.is_empty());
        assert_eq!(
            routes.download_gpx("route-missing.gpx").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn disabled_features_are_gone() {
        let h = Harness::new();
        let request = seeded(&h).await;
        let routes = RouteService::new(Arc::clone(&h.store), Arc::new(DisabledRouting), None);

        assert_eq!(
            routes.preview_route(&request).await.unwrap_err().kind(),
            ErrorKind::Gone
        );
        assert_eq!(
            routes.generate_gpx(&request).await.unwrap_err().kind(),
            ErrorKind::Gone
        );
        assert_eq!(
            routes.download_gpx("route-x.gpx").await.unwrap_err().kind(),
            ErrorKind::Gone
        );
    }

    #[test]
    fn object_names_are_safe() {
        assert_eq!(object_name("SL-GR 1", 1_700_000_000), "route-SL-GR_1-1700000000.gpx");
        assert_eq!(object_name("A/B", 1), "route-A_B-1.gpx");
    }
}
