//! Geographic calculations

use crate::types::Coordinates;

/// Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Road distance coefficient (straight line to road)
pub const ROAD_COEFFICIENT: f64 = 1.3;

/// Points closer than this (1 m) are the same place
const COINCIDENT_THRESHOLD_KM: f64 = 0.001;

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

/// Estimate travel time in minutes at the given average speed
pub fn travel_time_minutes(from: &Coordinates, to: &Coordinates, average_speed_kmh: f64) -> f64 {
    let distance = road_distance(from, to);
    (distance / average_speed_kmh) * 60.0
}

/// Two points denote the same place
pub fn is_coincident(from: &Coordinates, to: &Coordinates) -> bool {
    haversine_distance(from, to) < COINCIDENT_THRESHOLD_KM
}

/// Round a distance to 2 decimals (10 m)
pub fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}

/// Whole minutes for a leg: nearest minute, at least 1 unless the points coincide
pub fn leg_minutes(seconds: f64, coincident: bool) -> u32 {
    if coincident {
        return 0;
    }
    let minutes = (seconds / 60.0).round();
    if minutes.is_finite() && minutes >= 1.0 {
        minutes.min(u32::MAX as f64) as u32
    } else {
        1
    }
}
