//! Route types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Geographic coordinates (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside the latitude/longitude ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// A resolved location with an optional display address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Point {
    pub fn new(coordinates: Coordinates, address: Option<String>) -> Self {
        Self {
            lat: coordinates.lat,
            lng: coordinates.lng,
            address,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// A visit target with resolved coordinates.
///
/// Built by the orchestrator from a `StopRequest` once coordinates are
/// known; the engine never mutates it afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub id: String,
    pub label: String,
    pub point: Point,
    pub service_duration_minutes: u32,
    pub external_ref: Option<String>,
    /// Coordinates came from the caller rather than the geocoder
    pub coordinates_known: bool,
    /// Desired latest end of service
    pub expected_by: Option<NaiveDateTime>,
    /// Keep this stop at its input position
    pub pinned: bool,
    /// Position in the caller's stop list (tie-break key)
    pub input_index: usize,
}

impl Stop {
    pub fn coordinates(&self) -> Coordinates {
        self.point.coordinates()
    }
}

/// Timing parameters for one optimize call
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub start_point: Point,
    pub start_date_time: NaiveDateTime,
    pub travel_buffer_minutes: u32,
    pub stop_buffer_minutes: u32,
    pub consider_traffic: bool,
    pub max_return_time: Option<NaiveDateTime>,
}

/// A stop with its computed position and ETAs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedStop {
    pub id: String,
    /// 1-based visiting order
    pub order: u32,
    pub label: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub service_duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_by: Option<NaiveDateTime>,
    pub eta_arrival: NaiveDateTime,
    pub eta_service_start: NaiveDateTime,
    pub eta_service_end: NaiveDateTime,
    pub travel_minutes_from_previous: u32,
    pub distance_km_from_previous: f64,
    pub conflict: bool,
    pub delay_minutes: u32,
    /// Inbound leg was estimated without the routing backend
    pub approximate: bool,
}

/// Non-fatal issue found while planning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteWarning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_id: Option<String>,
    pub warning_type: String,
    pub message: String,
}

impl RouteWarning {
    pub fn new(stop_id: Option<&str>, warning_type: &str, message: impl Into<String>) -> Self {
        Self {
            stop_id: stop_id.map(str::to_string),
            warning_type: warning_type.to_string(),
            message: message.into(),
        }
    }
}

pub const WARNING_GEOCODE_FAILED: &str = "GEOCODE_FAILED";
pub const WARNING_GEOCODE_FALLBACK: &str = "GEOCODE_FALLBACK";
pub const WARNING_ROUTING_FALLBACK: &str = "ROUTING_FALLBACK";
pub const WARNING_SEQUENCING_FALLBACK: &str = "SEQUENCING_FALLBACK";

/// Headline figures for the timeline header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub total_stops: usize,
    pub start_time: NaiveDateTime,
    /// Service end of the last stop (start time for an empty plan)
    pub end_time: NaiveDateTime,
    /// Total duration in hours, one decimal
    pub total_duration_hours: f64,
}

/// Result of route optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub ordered_stops: Vec<OptimizedStop>,
    pub total_distance_km: f64,
    pub total_duration_minutes: u32,
    pub conflicts: Vec<String>,
    pub return_conflict: bool,
    /// At least one estimate fell back to straight-line distance
    pub degraded: bool,
    pub warnings: Vec<RouteWarning>,
    pub summary: RouteSummary,
    /// Route polyline as [lng, lat] pairs (GeoJSON order)
    pub geometry: Vec<[f64; 2]>,
}

impl OptimizationResult {
    /// Result for a plan with nothing left to visit
    pub fn empty(start_date_time: NaiveDateTime, warnings: Vec<RouteWarning>) -> Self {
        Self {
            ordered_stops: vec![],
            total_distance_km: 0.0,
            total_duration_minutes: 0,
            conflicts: vec![],
            return_conflict: false,
            degraded: false,
            warnings,
            summary: RouteSummary {
                total_stops: 0,
                start_time: start_date_time,
                end_time: start_date_time,
                total_duration_hours: 0.0,
            },
            geometry: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn coordinates_validity() {
        assert!(Coordinates::new(50.0755, 14.4378).is_valid());
        assert!(!Coordinates::new(91.0, 14.0).is_valid());
        assert!(!Coordinates::new(50.0, -181.0).is_valid());
        assert!(!Coordinates::new(f64::NAN, 14.0).is_valid());
    }

    #[test]
    fn empty_result_has_no_stops_or_distance() {
        let result = OptimizationResult::empty(at(8, 0), vec![]);
        assert!(result.ordered_stops.is_empty());
        assert_eq!(result.total_distance_km, 0.0);
        assert!(result.conflicts.is_empty());
        assert_eq!(result.summary.end_time, at(8, 0));
    }

    #[test]
    fn optimized_stop_serializes_camel_case() {
        let stop = OptimizedStop {
            id: "a".into(),
            order: 1,
            label: "Pharmacy".into(),
            lat: 50.0,
            lng: 14.0,
            address: None,
            service_duration_minutes: 30,
            external_ref: Some("rec-1".into()),
            expected_by: None,
            eta_arrival: at(8, 15),
            eta_service_start: at(8, 20),
            eta_service_end: at(8, 50),
            travel_minutes_from_previous: 5,
            distance_km_from_previous: 2.5,
            conflict: false,
            delay_minutes: 0,
            approximate: false,
        };

        let json = serde_json::to_value(&stop).unwrap();
        assert_eq!(json["etaArrival"], "2025-03-14T08:15:00");
        assert_eq!(json["travelMinutesFromPrevious"], 5);
        assert_eq!(json["externalRef"], "rec-1");
        assert!(json.get("address").is_none());
    }
}
