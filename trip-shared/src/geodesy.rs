//! Great-circle distance on the WGS84 sphere.

use crate::telemetry::Point;

/// Average radius of the Earth, in kilometers.
const EARTH_RADIUS_KM: f64 = 6_371.0;

fn deg_to_rad(degrees: f64) -> f64 {
    degrees.to_radians()
}

/// Great-circle distance between two points using the haversine
/// formula, in meters. Symmetric; zero for identical points.
pub fn haversine_distance(p1: &Point, p2: &Point) -> f64 {
    let lat1_rad = deg_to_rad(p1.latitude);
    let lat2_rad = deg_to_rad(p2.latitude);
    let delta_lat = deg_to_rad(p2.latitude - p1.latitude);
    let delta_lon = deg_to_rad(p2.longitude - p1.longitude);

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c * 1000.0
}
