//! Road routing backends for travel matrices and single legs
//!
//! Uses Valhalla for production, mock for tests.

mod valhalla;

pub use valhalla::{ValhallaClient, ValhallaConfig};

use anyhow::Result;
use async_trait::async_trait;

use crate::error::RoutingError;
use crate::services::geo::{haversine_distance, ROAD_COEFFICIENT};
use crate::types::Coordinates;

/// Distance and time matrices between locations.
///
/// A `None` cell means the backend found no route for that pair.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceTimeMatrices {
    /// Distance in meters [i][j] from location i to location j
    pub distances: Vec<Vec<Option<u64>>>,
    /// Duration in seconds [i][j] from location i to location j
    pub durations: Vec<Vec<Option<u64>>>,
    /// Number of locations
    pub size: usize,
}

impl DistanceTimeMatrices {
    /// Create empty matrices
    pub fn empty() -> Self {
        Self {
            distances: vec![],
            durations: vec![],
            size: 0,
        }
    }

    /// Distance from location i to location j in meters
    pub fn distance(&self, from: usize, to: usize) -> Option<u64> {
        self.distances.get(from)?.get(to).copied().flatten()
    }

    /// Duration from location i to location j in seconds
    pub fn duration(&self, from: usize, to: usize) -> Option<u64> {
        self.durations.get(from)?.get(to).copied().flatten()
    }

    /// Every row has `size` cells in both matrices
    pub fn is_square(&self) -> bool {
        self.distances.len() == self.size
            && self.durations.len() == self.size
            && self.distances.iter().all(|row| row.len() == self.size)
            && self.durations.iter().all(|row| row.len() == self.size)
    }
}

/// Route geometry as GeoJSON coordinates
/// Coordinates are in [longitude, latitude] order (GeoJSON standard)
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct RouteGeometry {
    /// Array of [lng, lat] coordinates forming the route polyline
    pub coordinates: Vec<[f64; 2]>,
}

impl RouteGeometry {
    /// Create empty geometry
    pub fn empty() -> Self {
        Self { coordinates: vec![] }
    }

    /// Create geometry from a list of coordinates (straight lines)
    pub fn from_coordinates(coords: &[Coordinates]) -> Self {
        Self {
            coordinates: coords.iter().map(|c| [c.lng, c.lat]).collect(),
        }
    }

    /// Check if geometry is empty
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Append the next leg, skipping its first point when it repeats our last one
    pub fn append(&mut self, leg: &RouteGeometry) {
        let skip = match (self.coordinates.last(), leg.coordinates.first()) {
            (Some(last), Some(first)) if last == first => 1,
            _ => 0,
        };
        self.coordinates.extend(leg.coordinates.iter().skip(skip).copied());
    }
}

/// One routed leg between two points
#[derive(Debug, Clone, PartialEq)]
pub struct LegRoute {
    pub distance_km: f64,
    pub duration_seconds: f64,
    pub geometry: RouteGeometry,
}

/// Routing service trait for abstraction (Valhalla, mock, etc.)
#[async_trait]
pub trait RoutingService: Send + Sync {
    /// Get distance and time matrices for a list of locations
    /// First location is the origin of the plan
    async fn get_matrices(
        &self,
        locations: &[Coordinates],
        consider_traffic: bool,
    ) -> Result<DistanceTimeMatrices, RoutingError>;

    /// Route a single leg, with its shape
    async fn route_leg(
        &self,
        from: &Coordinates,
        to: &Coordinates,
        consider_traffic: bool,
    ) -> Result<LegRoute, RoutingError>;

    /// Get service name for logging
    fn name(&self) -> &str;
}

/// Mock routing service for tests
/// Uses Haversine distance × coefficient for estimation
pub struct MockRoutingService {
    /// Coefficient for converting straight-line to road distance (default: 1.3)
    road_coefficient: f64,
    /// Average speed in km/h for time estimation (default: 40)
    average_speed_kmh: f64,
}

impl Default for MockRoutingService {
    fn default() -> Self {
        Self {
            road_coefficient: ROAD_COEFFICIENT,
            average_speed_kmh: 40.0,
        }
    }
}

impl MockRoutingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(road_coefficient: f64, average_speed_kmh: f64) -> Self {
        Self {
            road_coefficient,
            average_speed_kmh,
        }
    }

    fn road_km(&self, from: &Coordinates, to: &Coordinates) -> f64 {
        haversine_distance(from, to) * self.road_coefficient
    }
}

#[async_trait]
impl RoutingService for MockRoutingService {
    async fn get_matrices(
        &self,
        locations: &[Coordinates],
        _consider_traffic: bool,
    ) -> Result<DistanceTimeMatrices, RoutingError> {
        let n = locations.len();
        if n == 0 {
            return Ok(DistanceTimeMatrices::empty());
        }

        let mut distances = vec![vec![Some(0u64); n]; n];
        let mut durations = vec![vec![Some(0u64); n]; n];

        for i in 0..n {
            for j in 0..n {
                if i != j {
                    let road_km = self.road_km(&locations[i], &locations[j]);
                    distances[i][j] = Some((road_km * 1000.0) as u64);
                    durations[i][j] = Some((road_km / self.average_speed_kmh * 3600.0) as u64);
                }
            }
        }

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
        _consider_traffic: bool,
    ) -> Result<LegRoute, RoutingError> {
        let road_km = self.road_km(from, to);
        Ok(LegRoute {
            distance_km: road_km,
            duration_seconds: road_km / self.average_speed_kmh * 3600.0,
            geometry: RouteGeometry::from_coordinates(&[*from, *to]),
        })
    }

    fn name(&self) -> &str {
        "MockRouting"
    }
}

/// Create routing service with automatic Valhalla detection and fallback
///
/// Tries to connect to Valhalla if URL is provided. Falls back to mock
/// routing service if Valhalla is unavailable or URL is not configured.
pub async fn create_routing_service_with_fallback(
    valhalla_url: Option<String>,
) -> Box<dyn RoutingService> {
    use tracing::{info, warn};

    if let Some(url) = valhalla_url {
        match ValhallaClient::new(ValhallaConfig::new(&url)) {
            Ok(client) => match check_valhalla_health(&url).await {
                Ok(()) => {
                    info!("Valhalla routing service available at {}", url);
                    return Box::new(client);
                }
                Err(e) => {
                    warn!("Valhalla not available at {}: {}. Falling back to mock routing.", url, e);
                }
            },
            Err(e) => warn!("Could not create Valhalla client: {}", e),
        }
    }

    info!("Using mock routing service (Valhalla not configured or unavailable)");
    Box::new(MockRoutingService::new())
}

/// Check if Valhalla is healthy by making a simple status request
async fn check_valhalla_health(base_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    let url = format!("{}/status", base_url.trim_end_matches('/'));
    let response = client.get(&url).send().await?;

    if response.status().is_success() {
        Ok(())
    } else {
        anyhow::bail!("Valhalla returned status {}", response.status())
    }
}
