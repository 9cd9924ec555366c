//! Nearest-next visiting order
//!
//! Starting at the origin, repeatedly move to the unvisited stop with the
//! fewest estimated travel minutes. Ties go to the stop given first by the
//! caller. Pinned stops keep their input position and the greedy fills the
//! gaps around them.

use tracing::debug;

use crate::services::estimator::{TravelMatrix, TravelTimeEstimator};
use crate::services::geo::haversine_distance;
use crate::types::{Coordinates, Point, Stop};

/// Stops in visiting order
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedStops {
    pub stops: Vec<Stop>,
    /// The travel matrix came from the straight-line fallback
    pub matrix_approximate: bool,
    /// Picks made by straight-line distance because no candidate was routable
    pub straight_line_picks: usize,
}

pub struct StopSequencer<'a> {
    estimator: &'a TravelTimeEstimator,
}

impl<'a> StopSequencer<'a> {
    pub fn new(estimator: &'a TravelTimeEstimator) -> Self {
        Self { estimator }
    }

    /// Order `stops` for a tour starting at `origin`
    pub async fn sequence(&self, origin: &Point, stops: &[Stop], consider_traffic: bool) -> SequencedStops {
        if stops.len() < 2 {
            return SequencedStops {
                stops: stops.to_vec(),
                matrix_approximate: false,
                straight_line_picks: 0,
            };
        }

        let mut points = Vec::with_capacity(stops.len() + 1);
        points.push(origin.coordinates());
        points.extend(stops.iter().map(Stop::coordinates));

        let matrix = self.estimator.estimate_matrix(&points, consider_traffic).await;
        let (order, straight_line_picks) = order_by_matrix(&origin.coordinates(), stops, &matrix);

        debug!(
            "Sequenced {} stops ({} straight-line picks, approximate matrix: {})",
            stops.len(),
            straight_line_picks,
            matrix.approximate
        );

        SequencedStops {
            stops: order.into_iter().map(|i| stops[i].clone()).collect(),
            matrix_approximate: matrix.approximate,
            straight_line_picks,
        }
    }
}

/// Greedy order over `stops` using `matrix` (index 0 = origin, `i + 1` = `stops[i]`).
///
/// Returns indices into `stops` and the number of straight-line picks.
pub fn order_by_matrix(origin: &Coordinates, stops: &[Stop], matrix: &TravelMatrix) -> (Vec<usize>, usize) {
    let n = stops.len();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut straight_line_picks = 0;

    // Matrix index and coordinates of the current position
    let mut current = 0;
    let mut here = *origin;

    for position in 0..n {
        let next = if stops[position].pinned {
            position
        } else {
            let candidates: Vec<usize> = (0..n).filter(|&i| !visited[i] && !stops[i].pinned).collect();
            match nearest_by_matrix(current, &candidates, stops, matrix) {
                Some(i) => i,
                None => {
                    straight_line_picks += 1;
                    nearest_by_distance(&here, &candidates, stops)
                }
            }
        };

        visited[next] = true;
        order.push(next);
        current = next + 1;
        here = stops[next].coordinates();
    }

    (order, straight_line_picks)
}

fn nearest_by_matrix(current: usize, candidates: &[usize], stops: &[Stop], matrix: &TravelMatrix) -> Option<usize> {
    candidates
        .iter()
        .filter_map(|&i| matrix.get(current, i + 1).map(|cell| (cell.minutes, stops[i].input_index, i)))
        .min()
        .map(|(_, _, i)| i)
}

fn nearest_by_distance(here: &Coordinates, candidates: &[usize], stops: &[Stop]) -> usize {
    let mut best = candidates[0];
    let mut best_km = f64::INFINITY;
    for &i in candidates {
        let km = haversine_distance(here, &stops[i].coordinates());
        let closer = km < best_km || (km == best_km && stops[i].input_index < stops[best].input_index);
        if closer {
            best = i;
            best_km = km;
        }
    }
    best
}
