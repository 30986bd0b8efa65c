//! OpenRouteService directions client.

use std::time::Duration;

use async_trait::async_trait;
use greenspace_core::VehicleType;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoutingError};
use crate::router::Router;
use crate::types::{GeoJson, LonLat, RouteSummary};

#[derive(Debug, Serialize)]
struct DirectionsRequest<'a> {
    coordinates: &'a [LonLat],
    units: &'static str,
}

#[derive(Debug, Deserialize)]
struct JsonDirections {
    #[serde(default)]
    routes: Vec<JsonRoute>,
}

#[derive(Debug, Deserialize)]
struct JsonRoute {
    summary: JsonSummary,
}

#[derive(Debug, Deserialize)]
struct JsonSummary {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

/// Error body returned by OpenRouteService.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Detailed { message: String },
    Plain(String),
}

/// Router backed by an OpenRouteService instance.
#[derive(Debug, Clone)]
pub struct OrsRouter {
    client: reqwest::Client,
    host: String,
}

impl OrsRouter {
    /// Create a router for the given host.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client");

        Self::with_client(client, host)
    }

    /// Create a router with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, host: impl Into<String>) -> Self {
        Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, path: &str, points: &[LonLat]) -> Result<reqwest::Response> {
        let url = format!("{}/v2/directions/{path}", self.host);
        let response = self
            .client
            .post(&url)
            .json(&DirectionsRequest {
                coordinates: points,
                units: "m",
            })
            .send()
            .await
            .map_err(|e| RoutingError::Router(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| match b.error {
                ErrorDetail::Detailed { message } | ErrorDetail::Plain(message) => message,
            })
            .unwrap_or(text);
        tracing::error!(status = %status, url = %url, error = %message, "Directions request failed");
        Err(RoutingError::Router(format!("HTTP {status}: {message}")))
    }
}

#[async_trait]
impl Router for OrsRouter {
    fn name(&self) -> &'static str {
        "openrouteservice"
    }

    fn profile(&self, vehicle_type: VehicleType) -> Result<&'static str> {
        match vehicle_type {
            VehicleType::Transporter | VehicleType::Trailer => Ok("driving-hgv"),
            VehicleType::Unknown => Err(RoutingError::UnsupportedVehicleType(vehicle_type)),
        }
    }

    async fn geojson(&self, profile: &str, points: &[LonLat]) -> Result<GeoJson> {
        let response = self.post(&format!("{profile}/geojson"), points).await?;
        response
            .json()
            .await
            .map_err(|e| RoutingError::Router(format!("invalid geojson: {e}")))
    }

    async fn gpx(&self, profile: &str, points: &[LonLat]) -> Result<Vec<u8>> {
        let response = self.post(&format!("{profile}/gpx"), points).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RoutingError::Router(format!("failed to read gpx: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn summary(&self, profile: &str, points: &[LonLat]) -> Result<RouteSummary> {
        let response = self.post(profile, points).await?;
        let body: JsonDirections = response
            .json()
            .await
            .map_err(|e| RoutingError::Router(format!("invalid directions: {e}")))?;
        let route = body.routes.into_iter().next().ok_or(RoutingError::EmptyRoute)?;
        Ok(RouteSummary {
            distance: route.summary.distance,
            duration: route.summary.duration,
        })
    }
}
