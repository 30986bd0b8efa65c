//! Valhalla route client.
//!
//! Valhalla answers with encoded leg shapes, so GeoJSON and GPX are built
//! locally from the decoded coordinates.

use std::time::Duration;

use async_trait::async_trait;
use greenspace_core::VehicleType;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoutingError};
use crate::gpx;
use crate::router::Router;
use crate::types::{GeoJson, LonLat, RouteSummary};

#[derive(Debug, Serialize)]
struct RouteRequest<'a> {
    locations: Vec<Location>,
    costing: &'a str,
    units: &'static str,
}

#[derive(Debug, Serialize)]
struct Location {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    trip: Trip,
}

#[derive(Debug, Deserialize)]
struct Trip {
    #[serde(default)]
    legs: Vec<Leg>,
    summary: TripSummary,
}

#[derive(Debug, Deserialize)]
struct Leg {
    shape: String,
}

#[derive(Debug, Deserialize)]
struct TripSummary {
    /// Kilometres.
    #[serde(default)]
    length: f64,
    /// Seconds.
    #[serde(default)]
    time: f64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

/// Router backed by a Valhalla instance.
#[derive(Debug, Clone)]
pub struct ValhallaRouter {
    client: reqwest::Client,
    host: String,
}

impl ValhallaRouter {
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

    async fn route(&self, costing: &str, points: &[LonLat]) -> Result<(Vec<LonLat>, RouteSummary)> {
        let request = RouteRequest {
            locations: points
                .iter()
                .map(|[lon, lat]| Location { lat: *lat, lon: *lon })
                .collect(),
            costing,
            units: "kilometers",
        };
        let response = self
            .client
            .post(format!("{}/route", self.host))
            .json(&request)
            .send()
            .await
            .map_err(|e| RoutingError::Router(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or(text);
            tracing::error!(status = %status, error = %message, "Valhalla request failed");
            return Err(RoutingError::Router(format!("HTTP {status}: {message}")));
        }

        let body: RouteResponse = response
            .json()
            .await
            .map_err(|e| RoutingError::Router(format!("invalid route: {e}")))?;

        let mut coordinates = Vec::new();
        for leg in &body.trip.legs {
            let decoded = decode_polyline6(&leg.shape)?;
            // Consecutive legs share their joining point.
            let skip = usize::from(!coordinates.is_empty() && coordinates.last() == decoded.first());
            coordinates.extend(decoded.into_iter().skip(skip));
        }
        let summary = RouteSummary {
            distance: body.trip.summary.length * 1000.0,
            duration: body.trip.summary.time,
        };
        Ok((coordinates, summary))
    }
}

#[async_trait]
impl Router for ValhallaRouter {
    fn name(&self) -> &'static str {
        "valhalla"
    }

    fn profile(&self, vehicle_type: VehicleType) -> Result<&'static str> {
        match vehicle_type {
            VehicleType::Transporter | VehicleType::Trailer => Ok("truck"),
            VehicleType::Unknown => Err(RoutingError::UnsupportedVehicleType(vehicle_type)),
        }
    }

    async fn geojson(&self, profile: &str, points: &[LonLat]) -> Result<GeoJson> {
        let (coordinates, summary) = self.route(profile, points).await?;
        Ok(GeoJson::line(&coordinates, summary))
    }

    async fn gpx(&self, profile: &str, points: &[LonLat]) -> Result<Vec<u8>> {
        let (coordinates, _) = self.route(profile, points).await?;
        Ok(gpx::write_track("watering route", &coordinates).into_bytes())
    }

    async fn summary(&self, profile: &str, points: &[LonLat]) -> Result<RouteSummary> {
        let (_, summary) = self.route(profile, points).await?;
        Ok(summary)
    }
}

/// Decode a polyline with six digits of precision into `[lon, lat]` pairs.
///
/// # Errors
///
/// Returns `Router` when the shape is truncated.
pub fn decode_polyline6(encoded: &str) -> Result<Vec<LonLat>> {
    const FACTOR: f64 = 1e6;

    let mut bytes = encoded.bytes();
    let mut coordinates = Vec::new();
    let (mut lat, mut lon) = (0i64, 0i64);

    loop {
        let Some(dlat) = next_value(&mut bytes)? else {
            break;
        };
        let dlon = next_value(&mut bytes)?
            .ok_or_else(|| RoutingError::Router("truncated route shape".into()))?;
        lat += dlat;
        lon += dlon;
        #[allow(clippy::cast_precision_loss)]
        coordinates.push([lon as f64 / FACTOR, lat as f64 / FACTOR]);
    }
    Ok(coordinates)
}

fn next_value(bytes: &mut impl Iterator<Item = u8>) -> Result<Option<i64>> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    let mut started = false;
    loop {
        let Some(byte) = bytes.next() else {
            return if started {
                Err(RoutingError::Router("truncated route shape".into()))
            } else {
                Ok(None)
            };
        };
        started = true;
        let chunk = i64::from(byte.wrapping_sub(63));
        if shift > 56 {
            return Err(RoutingError::Router("malformed route shape".into()));
        }
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }
    let value = if result & 1 == 1 { !(result >> 1) } else { result >> 1 };
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // Three points: (38.5, -120.2), (40.7, -120.95), (43.252, -126.453).
    const SHAPE: &str = "_izlhA~rlgdF_{geC~ywl@_kwzCn`{nI";

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn decodes_polyline6() {
        let points = decode_polyline6(SHAPE).unwrap();
        assert_eq!(points.len(), 3);
        assert!(close(points[0][0], -120.2) && close(points[0][1], 38.5));
        assert!(close(points[1][0], -120.95) && close(points[1][1], 40.7));
        assert!(close(points[2][0], -126.453) && close(points[2][1], 43.252));
    }

    #[test]
    fn empty_shape_has_no_points() {
        assert!(decode_polyline6("").unwrap().is_empty());
    }

    #[test]
    fn truncated_shape_is_rejected() {
        assert!(decode_polyline6("_izlhA").is_err());
    }

    #[tokio::test]
    async fn route_builds_geojson_and_gpx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/route"))
            .and(body_partial_json(json!({
                "costing": "truck",
                "locations": [{"lat": 54.77, "lon": 9.43}, {"lat": 54.79, "lon": 9.45}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "trip": {
                    "legs": [{"shape": SHAPE}],
                    "summary": {"length": 1.5, "time": 240.0}
                }
            })))
            .mount(&server)
            .await;

        let router = ValhallaRouter::new(server.uri());
        let points = [[9.43, 54.77], [9.45, 54.79]];

        let geo = router.geojson("truck", &points).await.unwrap();
        let value = serde_json::to_value(&geo).unwrap();
        assert_eq!(value["features"][0]["geometry"]["coordinates"].as_array().unwrap().len(), 3);
        assert_eq!(value["features"][0]["properties"]["summary"]["distance"], 1500.0);

        let summary = router.summary("truck", &points).await.unwrap();
        assert!(close(summary.duration, 240.0));

        let gpx = String::from_utf8(router.gpx("truck", &points).await.unwrap()).unwrap();
        assert_eq!(gpx.matches("<trkpt").count(), 3);
    }

    #[tokio::test]
    async fn error_message_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/route"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error_code": 171,
                "error": "No suitable edges near location"
            })))
            .mount(&server)
            .await;

        let router = ValhallaRouter::new(server.uri());
        let err = router.summary("truck", &[[9.43, 54.77]]).await.unwrap_err();
        assert!(err.to_string().contains("No suitable edges"));
    }
}
