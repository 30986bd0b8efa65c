//! Client for a VROOM-compatible shipment optimizer.
//!
//! One vehicle and one shipment per cluster: each shipment is picked up at
//! the watering point and delivered to the cluster centroid, with a demand
//! of 120 litres per member tree.

use std::time::Duration;

use greenspace_core::WATER_PER_TREE;
use greenspace_store::{TreeCluster, Vehicle};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoutingError};
use crate::types::{LonLat, RouteEndpoints};

/// Request body sent to the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    /// Vehicles; always exactly one.
    pub vehicles: Vec<OptimizationVehicle>,
    /// One shipment per routable cluster.
    pub shipments: Vec<Shipment>,
}

/// Vehicle description for the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationVehicle {
    /// Vehicle identifier.
    pub id: i64,
    /// Routing profile.
    pub profile: String,
    /// Start location.
    pub start: LonLat,
    /// End location.
    pub end: LonLat,
    /// Tank capacity in litres.
    pub capacity: Vec<u64>,
}

/// A pickup/delivery pair with a demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    /// Demand in litres.
    pub amount: Vec<u64>,
    /// Where the water is loaded.
    pub pickup: ShipmentStep,
    /// Where the water is delivered.
    pub delivery: ShipmentStep,
}

/// One end of a shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentStep {
    /// Task identifier, the cluster id.
    pub id: i64,
    /// Location of the task.
    pub location: LonLat,
}

/// Optimizer response body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OptimizationResponse {
    /// Zero on success.
    #[serde(default)]
    pub code: i32,
    /// Error message when `code` is non-zero.
    #[serde(default)]
    pub error: Option<String>,
    /// Computed routes.
    #[serde(default)]
    pub routes: Vec<OptimizedRoute>,
}

/// One vehicle's route.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OptimizedRoute {
    /// Vehicle identifier.
    pub vehicle: i64,
    /// Ordered steps.
    pub steps: Vec<RouteStep>,
}

/// A step in an optimized route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    /// `start`, `pickup`, `delivery` or `end`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Step location.
    #[serde(default)]
    pub location: Option<LonLat>,
    /// Vehicle load after the step.
    #[serde(default)]
    pub load: Vec<u64>,
    /// Task identifier for pickups and deliveries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl RouteStep {
    fn is_pickup(&self) -> bool {
        self.kind == "pickup"
    }
}

/// Build the optimizer request for a vehicle and a set of clusters.
///
/// Clusters without a centroid are skipped.
///
/// # Errors
///
/// Returns `NoRoutableClusters` when no cluster has a centroid.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn build_request(
    vehicle: &Vehicle,
    clusters: &[TreeCluster],
    endpoints: &RouteEndpoints,
    profile: &str,
) -> Result<OptimizationRequest> {
    let shipments: Vec<Shipment> = clusters
        .iter()
        .filter_map(|cluster| {
            let (lat, lon) = cluster.position()?;
            let trees = u64::try_from(cluster.tree_ids.len()).unwrap_or(u64::MAX);
            Some(Shipment {
                amount: vec![trees.saturating_mul(u64::from(WATER_PER_TREE))],
                pickup: ShipmentStep {
                    id: i64::from(cluster.id.get()),
                    location: endpoints.watering_point,
                },
                delivery: ShipmentStep {
                    id: i64::from(cluster.id.get()),
                    location: [lon, lat],
                },
            })
        })
        .collect();

    if shipments.is_empty() {
        return Err(RoutingError::NoRoutableClusters);
    }

    Ok(OptimizationRequest {
        vehicles: vec![OptimizationVehicle {
            id: i64::from(vehicle.id.get()),
            profile: profile.to_string(),
            start: endpoints.start_point,
            end: endpoints.end_point,
            capacity: vec![vehicle.water_capacity.max(0.0).round() as u64],
        }],
        shipments,
    })
}

/// Collapse consecutive pickups into one.
///
/// The surviving pickup keeps the load of the last one in its run. Returns
/// the compressed steps and the number of pickups left, which is the
/// refill count.
#[must_use]
pub fn compress_steps(steps: &[RouteStep]) -> (Vec<RouteStep>, usize) {
    let mut compressed: Vec<RouteStep> = Vec::with_capacity(steps.len());
    for step in steps {
        match compressed.last_mut() {
            Some(prev) if prev.is_pickup() && step.is_pickup() => {
                prev.load.clone_from(&step.load);
            }
            _ => compressed.push(step.clone()),
        }
    }
    let refills = compressed.iter().filter(|s| s.is_pickup()).count();
    (compressed, refills)
}

/// HTTP client for the optimizer.
#[derive(Debug, Clone)]
pub struct OptimizationClient {
    client: reqwest::Client,
    url: String,
}

impl OptimizationClient {
    /// Create a client posting to `url`.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client");

        Self::with_client(client, url)
    }

    /// Create a client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Get the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Submit a request and return the first route.
    ///
    /// # Errors
    ///
    /// Returns `Optimizer` for transport or solver failures and
    /// `EmptyRoute` when the solver returns no route.
    pub async fn optimize(&self, request: &OptimizationRequest) -> Result<OptimizedRoute> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| RoutingError::Optimizer(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Optimizer request failed");
            return Err(RoutingError::Optimizer(format!("HTTP {status}")));
        }

        let body: OptimizationResponse = response
            .json()
            .await
            .map_err(|e| RoutingError::Optimizer(format!("invalid response: {e}")))?;
        if body.code != 0 {
            return Err(RoutingError::Optimizer(
                body.error.unwrap_or_else(|| format!("code {}", body.code)),
            ));
        }

        let route = body.routes.into_iter().next().ok_or(RoutingError::EmptyRoute)?;
        tracing::debug!(
            vehicle = route.vehicle,
            steps = route.steps.len(),
            shipments = request.shipments.len(),
            "Optimized route"
        );
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use greenspace_core::{TreeClusterId, TreeId, VehicleId, VehicleType};

    fn step(kind: &str, load: u64) -> RouteStep {
        RouteStep {
            kind: kind.to_string(),
            location: Some([9.0, 54.0]),
            load: vec![load],
            id: None,
        }
    }

    fn vehicle(capacity: f64) -> Vehicle {
        let now = Utc::now();
        Vehicle {
            id: VehicleId::new(1),
            number_plate: "FL-GS 1".into(),
            description: String::new(),
            water_capacity: capacity,
            vehicle_type: VehicleType::Transporter,
            status: greenspace_core::VehicleStatus::Available,
            model: String::new(),
            driving_license: greenspace_core::DrivingLicense::C,
            height: 0.0,
            length: 0.0,
            width: 0.0,
            weight: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    fn cluster(id: i32, trees: i32, position: Option<(f64, f64)>) -> TreeCluster {
        let now = Utc::now();
        TreeCluster {
            id: TreeClusterId::new(id),
            name: format!("cluster {id}"),
            address: String::new(),
            description: String::new(),
            soil_condition: greenspace_core::SoilCondition::Unknown,
            archived: false,
            latitude: position.map(|p| p.0),
            longitude: position.map(|p| p.1),
            region_id: None,
            tree_ids: (0..trees).map(TreeId::new).collect(),
            watering_status: greenspace_core::WateringStatus::Unknown,
            last_watered: None,
            created_at: now,
            updated_at: now,
        }
    }

    const ENDPOINTS: RouteEndpoints = RouteEndpoints {
        start_point: [9.43, 54.77],
        end_point: [9.43, 54.77],
        watering_point: [9.44, 54.78],
    };

    #[test]
    fn demands_follow_tree_counts() {
        let clusters = [
            cluster(1, 10, Some((54.79, 9.45))),
            cluster(2, 5, Some((54.80, 9.46))),
            cluster(3, 8, None),
        ];
        let request = build_request(&vehicle(2000.0), &clusters, &ENDPOINTS, "car").unwrap();

        assert_eq!(request.vehicles[0].capacity, vec![2000]);
        let amounts: Vec<_> = request.shipments.iter().map(|s| s.amount[0]).collect();
        assert_eq!(amounts, vec![1200, 600]);
        assert_eq!(request.shipments[0].pickup.location, ENDPOINTS.watering_point);
        assert_eq!(request.shipments[1].delivery.location, [9.46, 54.80]);
    }

    #[test]
    fn no_positions_is_an_error() {
        let clusters = [cluster(1, 3, None)];
        assert!(matches!(
            build_request(&vehicle(2000.0), &clusters, &ENDPOINTS, "car"),
            Err(RoutingError::NoRoutableClusters)
        ));
    }

    #[test]
    fn consecutive_pickups_collapse() {
        let steps = [
            step("start", 0),
            step("pickup", 1200),
            step("pickup", 1800),
            step("delivery", 600),
            step("delivery", 0),
            step("pickup", 960),
            step("delivery", 0),
            step("end", 0),
        ];
        let (compressed, refills) = compress_steps(&steps);
        let kinds: Vec<_> = compressed.iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["start", "pickup", "delivery", "delivery", "pickup", "delivery", "end"]
        );
        assert_eq!(compressed[1].load, vec![1800]);
        assert_eq!(refills, 2);
    }

    #[test]
    fn no_pickups_means_no_refills() {
        let (compressed, refills) = compress_steps(&[step("start", 0), step("end", 0)]);
        assert_eq!(compressed.len(), 2);
        assert_eq!(refills, 0);
    }
}
