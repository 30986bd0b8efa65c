//! Spatial helpers backing the geodesic repository queries.

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance between two positions in metres.
#[must_use]
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
}

/// Arithmetic centroid of a set of `(lat, lon)` positions.
///
/// Clusters span a few hundred metres at most, where the planar mean is
/// indistinguishable from the geodesic one.
#[must_use]
pub fn centroid<I>(points: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (mut lat, mut lon, mut n) = (0.0, 0.0, 0u32);
    for (p_lat, p_lon) in points {
        lat += p_lat;
        lon += p_lon;
        n += 1;
    }
    (n > 0).then(|| (lat / f64::from(n), lon / f64::from(n)))
}

/// Ray-casting point-in-polygon test on a `[lon, lat]` ring.
///
/// The ring may be open or closed. Points on an edge may land on either side.
#[must_use]
pub fn polygon_contains(ring: &[[f64; 2]], lat: f64, lon: f64) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}
