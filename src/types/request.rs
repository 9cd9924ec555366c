//! Inbound optimize/cancel request types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::{DEFAULT_STOP_BUFFER_MINUTES, DEFAULT_TRAVEL_BUFFER_MINUTES};
use super::Coordinates;

/// A location given as coordinates, an address, or both
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRequest {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
}

impl PlaceRequest {
    pub fn at(lat: f64, lng: f64) -> Self {
        Self {
            lat: Some(lat),
            lng: Some(lng),
            address: None,
        }
    }

    pub fn address(address: impl Into<String>) -> Self {
        Self {
            lat: None,
            lng: None,
            address: Some(address.into()),
        }
    }

    /// Both coordinates, if supplied
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }

    /// Non-blank address text
    pub fn address_text(&self) -> Option<&str> {
        non_blank(self.address.as_deref())
    }
}

/// A visit target as supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    /// Defaults to `true` when both coordinates are present
    #[serde(default)]
    pub coordinates_known: Option<bool>,
    #[serde(default)]
    pub service_duration_minutes: u32,
    #[serde(default)]
    pub external_ref: Option<String>,
    #[serde(default)]
    pub expected_by: Option<NaiveDateTime>,
    #[serde(default)]
    pub pinned: bool,
}

impl StopRequest {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }

    pub fn address_text(&self) -> Option<&str> {
        non_blank(self.address.as_deref())
    }

    /// Coordinates can be used as-is, without geocoding
    pub fn has_known_coordinates(&self) -> bool {
        self.coordinates().is_some() && self.coordinates_known.unwrap_or(true)
    }
}

/// Request to sequence and schedule a set of visits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRouteRequest {
    pub origin: PlaceRequest,
    #[serde(default)]
    pub start_date_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub stops: Vec<StopRequest>,
    #[serde(default = "default_travel_buffer")]
    pub travel_buffer_minutes: u32,
    #[serde(default = "default_stop_buffer")]
    pub stop_buffer_minutes: u32,
    #[serde(default = "default_consider_traffic")]
    pub consider_traffic: bool,
    #[serde(default)]
    pub max_return_time: Option<NaiveDateTime>,
    /// Give up with `Cancelled` after this many milliseconds
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl OptimizeRouteRequest {
    pub fn new(origin: PlaceRequest, start_date_time: NaiveDateTime, stops: Vec<StopRequest>) -> Self {
        Self {
            origin,
            start_date_time: Some(start_date_time),
            stops,
            travel_buffer_minutes: DEFAULT_TRAVEL_BUFFER_MINUTES,
            stop_buffer_minutes: DEFAULT_STOP_BUFFER_MINUTES,
            consider_traffic: true,
            max_return_time: None,
            deadline_ms: None,
        }
    }
}

fn default_travel_buffer() -> u32 {
    DEFAULT_TRAVEL_BUFFER_MINUTES
}

fn default_stop_buffer() -> u32 {
    DEFAULT_STOP_BUFFER_MINUTES
}

fn default_consider_traffic() -> bool {
    true
}

/// Request to cancel a running optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRouteRequest {
    pub plan_id: Uuid,
}

/// Reply to a cancel request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRouteResponse {
    pub plan_id: Uuid,
    /// A running plan was found and signalled
    pub cancelled: bool,
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|s| !s.is_empty())
}
