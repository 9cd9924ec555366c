//! Valhalla routing engine client
//!
//! Valhalla API documentation:
//! https://valhalla.github.io/valhalla/api/matrix/api-reference/
//! https://valhalla.github.io/valhalla/api/turn-by-turn/api-reference/

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RoutingError;
use crate::types::Coordinates;
use super::{DistanceTimeMatrices, LegRoute, RouteGeometry, RoutingService};

/// Valhalla error code for "no path could be found for input"
const NO_PATH_ERROR_CODE: u32 = 442;

/// Valhalla client configuration
#[derive(Debug, Clone)]
pub struct ValhallaConfig {
    /// Base URL of Valhalla server (e.g., "http://localhost:8002")
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ValhallaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl ValhallaConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }
}

/// Valhalla routing client
pub struct ValhallaClient {
    client: Client,
    config: ValhallaConfig,
}

impl ValhallaClient {
    pub fn new(config: ValhallaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    fn locations(locations: &[Coordinates]) -> Vec<ValhallaLocation> {
        locations
            .iter()
            .map(|c| ValhallaLocation {
                lat: c.lat,
                lon: c.lng,
                // 500m radius – sufficient for geocoded coordinates
                // that may be slightly off-road (building centroid vs road edge)
                radius: Some(500),
            })
            .collect()
    }

    /// Time-dependent costing departing now
    fn departure(consider_traffic: bool) -> Option<DateTimeOption> {
        consider_traffic.then_some(DateTimeOption { kind: 0 })
    }

    /// Build the sources_to_targets request
    fn build_matrix_request(&self, locations: &[Coordinates], consider_traffic: bool) -> MatrixRequest {
        let locs = Self::locations(locations);

        MatrixRequest {
            sources: locs.clone(),
            targets: locs,
            costing: "auto".to_string(),
            units: "kilometers".to_string(),
            date_time: Self::departure(consider_traffic),
        }
    }

    /// Build the route request for one leg
    fn build_route_request(&self, from: &Coordinates, to: &Coordinates, consider_traffic: bool) -> RouteRequest {
        RouteRequest {
            locations: Self::locations(&[*from, *to]),
            costing: "auto".to_string(),
            units: "kilometers".to_string(),
            directions_type: "none".to_string(), // Summary and shape only, no turn-by-turn
            date_time: Self::departure(consider_traffic),
        }
    }

    async fn post<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, RoutingError>
    where
        Req: Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.config.base_url, path);

        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), body));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| RoutingError::InvalidResponse(e.to_string()))
    }
}

/// Map a non-2xx Valhalla reply to a routing error
fn classify_error(status: u16, body: String) -> RoutingError {
    if status == 400 {
        if let Ok(error) = serde_json::from_str::<ErrorBody>(&body) {
            if error.error_code == Some(NO_PATH_ERROR_CODE) {
                return RoutingError::NoRoute;
            }
        }
    }
    RoutingError::Status { status, body }
}

#[async_trait]
impl RoutingService for ValhallaClient {
    async fn get_matrices(
        &self,
        locations: &[Coordinates],
        consider_traffic: bool,
    ) -> Result<DistanceTimeMatrices, RoutingError> {
        let n = locations.len();

        if n == 0 {
            return Ok(DistanceTimeMatrices::empty());
        }

        if n == 1 {
            return Ok(DistanceTimeMatrices {
                distances: vec![vec![Some(0)]],
                durations: vec![vec![Some(0)]],
                size: 1,
            });
        }

        debug!("Requesting distance matrix from Valhalla for {} locations", n);

        let request = self.build_matrix_request(locations, consider_traffic);
        let matrix_response: MatrixResponse = self.post("sources_to_targets", &request).await?;

        if matrix_response.sources_to_targets.len() != n {
            return Err(RoutingError::InvalidResponse(format!(
                "expected {} matrix rows, got {}",
                n,
                matrix_response.sources_to_targets.len()
            )));
        }

        let mut distances = vec![vec![None; n]; n];
        let mut durations = vec![vec![None; n]; n];

        for (i, row) in matrix_response.sources_to_targets.iter().enumerate() {
            if row.len() != n {
                return Err(RoutingError::InvalidResponse(format!(
                    "matrix row {} has {} cells, expected {}",
                    i,
                    row.len(),
                    n
                )));
            }
            for (j, cell) in row.iter().enumerate() {
                // Convert km to meters; missing means no route for this pair
                distances[i][j] = cell.distance.map(|d| (d * 1000.0).round() as u64);
                durations[i][j] = cell.time.map(|t| t.round() as u64);
            }
        }

        debug!("Received distance matrix from Valhalla: {}x{}", n, n);

        Ok(DistanceTimeMatrices {
            distances,
            durations,
            size: n,
        })
    }

    async fn route_leg(
        &self,
        from: &Coordinates,
        to: &Coordinates,
        consider_traffic: bool,
    ) -> Result<LegRoute, RoutingError> {
        let request = self.build_route_request(from, to, consider_traffic);
        let route_response: RouteResponse = self.post("route", &request).await?;

        let mut geometry = RouteGeometry::empty();
        for leg in &route_response.trip.legs {
            let shape = decode_polyline(&leg.shape, 6)
                .map_err(|e| RoutingError::InvalidResponse(e.to_string()))?;
            geometry.append(&RouteGeometry { coordinates: shape });
        }

        debug!(
            "Valhalla leg: {:.2} km, {:.0} s, {} shape points",
            route_response.trip.summary.length,
            route_response.trip.summary.time,
            geometry.coordinates.len()
        );

        Ok(LegRoute {
            distance_km: route_response.trip.summary.length,
            duration_seconds: route_response.trip.summary.time,
            geometry,
        })
    }

    fn name(&self) -> &str {
        "Valhalla"
    }
}

// Valhalla API types

#[derive(Debug, Serialize)]
struct MatrixRequest {
    sources: Vec<ValhallaLocation>,
    targets: Vec<ValhallaLocation>,
    costing: String,
    units: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<DateTimeOption>,
}

#[derive(Debug, Serialize, Clone)]
struct ValhallaLocation {
    lat: f64,
    lon: f64,
    /// Radius in meters for snapping to roads
    #[serde(skip_serializing_if = "Option::is_none")]
    radius: Option<u32>,
}

/// `type` 0 = depart now, using live/historic traffic where available
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
struct DateTimeOption {
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    sources_to_targets: Vec<Vec<MatrixCell>>,
}

#[derive(Debug, Deserialize)]
struct MatrixCell {
    /// Distance in kilometers (when units="kilometers")
    distance: Option<f64>,
    /// Time in seconds
    time: Option<f64>,
}

#[derive(Debug, Serialize)]
struct RouteRequest {
    locations: Vec<ValhallaLocation>,
    costing: String,
    units: String,
    directions_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<DateTimeOption>,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    trip: Trip,
}

#[derive(Debug, Deserialize)]
struct Trip {
    summary: TripSummary,
    #[serde(default)]
    legs: Vec<Leg>,
}

#[derive(Debug, Deserialize)]
struct TripSummary {
    /// Seconds
    time: f64,
    /// Kilometers (when units="kilometers")
    length: f64,
}

#[derive(Debug, Deserialize)]
struct Leg {
    /// Encoded polyline shape
    shape: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_code: Option<u32>,
}

/// Decode Valhalla's encoded polyline format
/// Precision is 6 decimal places for Valhalla (vs 5 for Google)
fn decode_polyline(encoded: &str, precision: u32) -> Result<Vec<[f64; 2]>> {
    let factor = 10_f64.powi(precision as i32);
    let bytes = encoded.as_bytes();
    let mut coordinates = Vec::new();
    let mut i = 0;
    let mut lat = 0i64;
    let mut lng = 0i64;

    while i < bytes.len() {
        lat += decode_value(bytes, &mut i)?;
        lng += decode_value(bytes, &mut i)?;

        // GeoJSON uses [lng, lat] order
        coordinates.push([lng as f64 / factor, lat as f64 / factor]);
    }

    Ok(coordinates)
}

/// One zig-zag encoded delta starting at `bytes[*i]`
fn decode_value(bytes: &[u8], i: &mut usize) -> Result<i64> {
    let mut shift = 0;
    let mut result = 0i64;
    loop {
        let Some(&raw) = bytes.get(*i) else {
            anyhow::bail!("Invalid polyline encoding");
        };
        if shift > 60 {
            anyhow::bail!("Polyline value overflows");
        }
        let byte = raw as i64 - 63;
        *i += 1;
        result |= (byte & 0x1f) << shift;
        shift += 5;
        if byte < 0x20 {
            break;
        }
    }
    Ok(if result & 1 != 0 { !(result >> 1) } else { result >> 1 })
}
