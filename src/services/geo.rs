//! Geographic calculations

use std::f64::consts::TAU;

use crate::types::Coordinates;

/// Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Road distance coefficient (straight line to road)
const ROAD_COEFFICIENT: f64 = 1.3;

/// Calculate Haversine distance between two points in kilometers
pub fn haversine_distance(from: &Coordinates, to: &Coordinates) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lon = (to.lng - from.lng).to_radians();

    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Estimate road distance from straight-line distance
pub fn road_distance(from: &Coordinates, to: &Coordinates) -> f64 {
    haversine_distance(from, to) * ROAD_COEFFICIENT
}

/// Bearing of `point` seen from `origin`, normalized to [0, 2π).
///
/// atan2 over the lat/lon deltas. This is the sweep sort key, not a great-circle
/// bearing.
pub fn bearing_from(origin: &Coordinates, point: &Coordinates) -> f64 {
    let lat_diff = point.lat - origin.lat;
    let lng_diff = point.lng - origin.lng;
    lat_diff.atan2(lng_diff).rem_euclid(TAU)
}

/// Squared planar distance from `origin` to `point` in degrees².
/// Cheap tie-breaker for the sweep sort; never compared across origins.
pub fn distance_squared(origin: &Coordinates, point: &Coordinates) -> f64 {
    let lat_diff = point.lat - origin.lat;
    let lng_diff = point.lng - origin.lng;
    lat_diff * lat_diff + lng_diff * lng_diff
}

/// Estimated road length of a route in km: warehouse to each stop in order,
/// optionally back to the warehouse.
pub fn route_length_km(
    warehouse: &Coordinates,
    stops: &[Coordinates],
    return_to_warehouse: bool,
) -> f64 {
    let mut total = 0.0;
    let mut previous = warehouse;
    for stop in stops {
        total += road_distance(previous, stop);
        previous = stop;
    }
    if return_to_warehouse && !stops.is_empty() {
        total += road_distance(previous, warehouse);
    }
    total
}
