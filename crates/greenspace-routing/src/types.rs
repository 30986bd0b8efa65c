//! Shared routing types.

use serde::{Deserialize, Serialize};

/// A coordinate pair in `[longitude, latitude]` order.
pub type LonLat = [f64; 2];

/// Fixed points every route is built around.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteEndpoints {
    /// Depot the vehicle leaves from.
    pub start_point: LonLat,
    /// Depot the vehicle returns to.
    pub end_point: LonLat,
    /// Station where the tank is refilled.
    pub watering_point: LonLat,
}

/// Distance and duration of a rendered route.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RouteSummary {
    /// Length in metres.
    pub distance: f64,
    /// Duration in seconds.
    pub duration: f64,
}

/// Summary returned to planners.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteMetadata {
    /// Stops at the watering point after compression.
    pub refills: usize,
    /// Length in metres.
    pub distance: f64,
    /// Duration in seconds.
    pub time: f64,
}

/// A GeoJSON feature collection describing a route.
///
/// Both routers produce the same shape: one `LineString` feature whose
/// properties carry the summary, an optional bounding box, and the route
/// markers in `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoJson {
    /// Always `FeatureCollection`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Route features.
    pub features: Vec<serde_json::Value>,
    /// Bounding box `[min_lon, min_lat, max_lon, max_lat]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
    /// Route markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RouteEndpoints>,
}

impl GeoJson {
    /// Build a collection holding one line feature.
    #[must_use]
    pub fn line(coordinates: &[LonLat], summary: RouteSummary) -> Self {
        let feature = serde_json::json!({
            "type": "Feature",
            "geometry": {
                "type": "LineString",
                "coordinates": coordinates,
            },
            "properties": {
                "summary": {
                    "distance": summary.distance,
                    "duration": summary.duration,
                }
            }
        });
        Self {
            kind: "FeatureCollection".to_string(),
            features: vec![feature],
            bbox: bounding_box(coordinates),
            metadata: None,
        }
    }
}

/// Bounding box of a coordinate list.
#[must_use]
pub fn bounding_box(coordinates: &[LonLat]) -> Option<Vec<f64>> {
    let first = coordinates.first()?;
    let mut bbox = [first[0], first[1], first[0], first[1]];
    for [lon, lat] in coordinates {
        bbox[0] = bbox[0].min(*lon);
        bbox[1] = bbox[1].min(*lat);
        bbox[2] = bbox[2].max(*lon);
        bbox[3] = bbox[3].max(*lat);
    }
    Some(bbox.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_feature_shape() {
        let geo = GeoJson::line(
            &[[9.43, 54.78], [9.45, 54.80], [9.44, 54.79]],
            RouteSummary {
                distance: 1200.0,
                duration: 300.0,
            },
        );
        let value = serde_json::to_value(&geo).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"][0]["geometry"]["type"], "LineString");
        assert_eq!(value["features"][0]["properties"]["summary"]["distance"], 1200.0);
        assert_eq!(value["bbox"], serde_json::json!([9.43, 54.78, 9.45, 54.80]));
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn empty_bbox() {
        assert!(bounding_box(&[]).is_none());
    }
}
