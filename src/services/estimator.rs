//! Travel time estimation with straight-line fallback
//!
//! Every estimate goes to the routing backend first. When the backend is
//! unreachable or keeps failing after bounded retries, the leg is computed
//! from haversine distance × road coefficient at the fallback speed and
//! flagged `approximate`.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::error::RoutingError;
use crate::services::geo::{is_coincident, leg_minutes, road_distance, round_km, travel_time_minutes};
use crate::services::retry::RetryPolicy;
use crate::services::routing::{RouteGeometry, RoutingService};
use crate::types::Coordinates;

/// Travel estimate for one leg
#[derive(Debug, Clone, PartialEq)]
pub struct LegEstimate {
    pub minutes: u32,
    pub km: f64,
    /// Computed without the routing backend
    pub approximate: bool,
    pub geometry: RouteGeometry,
}

/// Minutes and km for one matrix cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixCell {
    pub minutes: u32,
    pub km: f64,
}

/// Travel matrix over origin + stops; index 0 is the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelMatrix {
    cells: Vec<Vec<Option<MatrixCell>>>,
    /// Built entirely by the straight-line fallback
    pub approximate: bool,
}

impl TravelMatrix {
    pub fn new(cells: Vec<Vec<Option<MatrixCell>>>, approximate: bool) -> Self {
        Self { cells, approximate }
    }

    /// Estimate from location `from` to location `to`, `None` when unroutable
    pub fn get(&self, from: usize, to: usize) -> Option<MatrixCell> {
        self.cells.get(from)?.get(to).copied().flatten()
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }
}

/// Leg and matrix estimates backed by a [`RoutingService`]
pub struct TravelTimeEstimator {
    routing: Arc<dyn RoutingService>,
    retry: RetryPolicy,
    fallback_speed_kmh: f64,
}

impl TravelTimeEstimator {
    pub fn new(routing: Arc<dyn RoutingService>, retry: RetryPolicy, fallback_speed_kmh: f64) -> Self {
        Self {
            routing,
            retry,
            fallback_speed_kmh,
        }
    }

    /// Straight-line estimate: haversine × road coefficient at the fallback speed
    pub fn fallback_estimate(&self, from: &Coordinates, to: &Coordinates) -> LegEstimate {
        let coincident = is_coincident(from, to);
        let seconds = travel_time_minutes(from, to, self.fallback_speed_kmh) * 60.0;

        LegEstimate {
            minutes: leg_minutes(seconds, coincident),
            km: if coincident { 0.0 } else { round_km(road_distance(from, to)) },
            approximate: true,
            geometry: if coincident {
                RouteGeometry::empty()
            } else {
                RouteGeometry::from_coordinates(&[*from, *to])
            },
        }
    }

    fn fallback_cell(&self, from: &Coordinates, to: &Coordinates) -> MatrixCell {
        let estimate = self.fallback_estimate(from, to);
        MatrixCell {
            minutes: estimate.minutes,
            km: estimate.km,
        }
    }

    /// Estimate one leg; never fails
    pub async fn estimate(&self, from: &Coordinates, to: &Coordinates, consider_traffic: bool) -> LegEstimate {
        if is_coincident(from, to) {
            return LegEstimate {
                minutes: 0,
                km: 0.0,
                approximate: false,
                geometry: RouteGeometry::empty(),
            };
        }

        let routing = &self.routing;
        let outcome = self
            .retry
            .run(
                "route leg",
                move || routing.route_leg(from, to, consider_traffic),
                RoutingError::is_transient,
            )
            .await;

        match outcome {
            Ok(leg) => LegEstimate {
                minutes: leg_minutes(leg.duration_seconds, false),
                km: round_km(leg.distance_km),
                approximate: false,
                geometry: leg.geometry,
            },
            Err(e) => {
                warn!(
                    "{} could not route ({:.5},{:.5}) -> ({:.5},{:.5}): {}; using straight-line estimate",
                    self.routing.name(), from.lat, from.lng, to.lat, to.lng, e
                );
                self.fallback_estimate(from, to)
            }
        }
    }

    /// Estimate consecutive legs along `path` with at most `max_concurrency`
    /// backend calls in flight. Results follow path order.
    pub async fn estimate_path(
        &self,
        path: &[Coordinates],
        consider_traffic: bool,
        max_concurrency: usize,
    ) -> Vec<LegEstimate> {
        let legs: Vec<(Coordinates, Coordinates)> = path.windows(2).map(|w| (w[0], w[1])).collect();

        let this = self;
        stream::iter(legs)
            .map(move |(from, to)| async move { this.estimate(&from, &to, consider_traffic).await })
            .buffered(max_concurrency.max(1))
            .collect()
            .await
    }

    /// Full matrix over `points`; falls back to straight-line for every cell
    /// when the backend fails after retries.
    pub async fn estimate_matrix(&self, points: &[Coordinates], consider_traffic: bool) -> TravelMatrix {
        let n = points.len();
        let routing = &self.routing;

        let outcome = self
            .retry
            .run(
                "travel matrix",
                move || routing.get_matrices(points, consider_traffic),
                RoutingError::is_transient,
            )
            .await;

        let matrices = match outcome {
            Ok(m) if m.size == n && m.is_square() => m,
            Ok(m) => {
                warn!(
                    "{} returned a {}x{} matrix for {} points; using straight-line estimates",
                    self.routing.name(), m.size, m.size, n
                );
                return self.fallback_matrix(points);
            }
            Err(e) => {
                warn!("{} matrix failed: {}; using straight-line estimates", self.routing.name(), e);
                return self.fallback_matrix(points);
            }
        };

        let mut cells = vec![vec![None; n]; n];
        for i in 0..n {
            for j in 0..n {
                cells[i][j] = if is_coincident(&points[i], &points[j]) {
                    Some(MatrixCell { minutes: 0, km: 0.0 })
                } else {
                    matrices.duration(i, j).zip(matrices.distance(i, j)).map(|(seconds, meters)| MatrixCell {
                        minutes: leg_minutes(seconds as f64, false),
                        km: round_km(meters as f64 / 1000.0),
                    })
                };
            }
        }

        debug!("Travel matrix {}x{} from {}", n, n, self.routing.name());
        TravelMatrix::new(cells, false)
    }

    fn fallback_matrix(&self, points: &[Coordinates]) -> TravelMatrix {
        let cells = points
            .iter()
            .map(|from| points.iter().map(|to| Some(self.fallback_cell(from, to))).collect())
            .collect();
        TravelMatrix::new(cells, true)
    }
}
