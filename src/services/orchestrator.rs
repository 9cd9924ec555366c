//! Route optimization pipeline
//!
//! validate → resolve addresses → sequence → estimate final legs → schedule.
//! Provider failures degrade the result (warnings, approximate legs); only
//! validation failures and cancellation end the call with an error.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::PlannerSettings;
use crate::error::OptimizeError;
use crate::services::estimator::TravelTimeEstimator;
use crate::services::geocoding::{Geocoder, GeocodingResolver};
use crate::services::retry::RetryPolicy;
use crate::services::routing::RoutingService;
use crate::services::schedule::ScheduleBuilder;
use crate::services::sequencer::StopSequencer;
use crate::types::{
    OptimizationResult, OptimizeRouteRequest, PlaceRequest, Point, RouteWarning, ScheduleConfig,
    Stop, StopRequest, WARNING_GEOCODE_FAILED, WARNING_GEOCODE_FALLBACK, WARNING_ROUTING_FALLBACK,
    WARNING_SEQUENCING_FALLBACK,
};

/// Drives one optimize call end to end
pub struct OptimizationOrchestrator {
    geocoder: Arc<dyn Geocoder>,
    routing: Arc<dyn RoutingService>,
    settings: PlannerSettings,
}

impl OptimizationOrchestrator {
    pub fn new(geocoder: Arc<dyn Geocoder>, routing: Arc<dyn RoutingService>, settings: PlannerSettings) -> Self {
        Self {
            geocoder,
            routing,
            settings,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.settings.max_retries, self.settings.retry_base_delay)
    }

    /// Plan a route for `request`.
    ///
    /// Returns `Cancelled` as soon as `cancel` fires or the request deadline
    /// elapses; in-flight provider calls are dropped.
    pub async fn optimize(
        &self,
        request: &OptimizeRouteRequest,
        cancel: &CancellationToken,
    ) -> Result<OptimizationResult, OptimizeError> {
        let start_date_time = validate(request)?;

        if cancel.is_cancelled() {
            return Err(OptimizeError::Cancelled);
        }

        let deadline = async {
            match request.deadline_ms {
                Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Route optimization cancelled");
                Err(OptimizeError::Cancelled)
            }
            _ = deadline => {
                warn!("Route optimization exceeded its {} ms deadline", request.deadline_ms.unwrap_or_default());
                Err(OptimizeError::Cancelled)
            }
            result = self.run(request, start_date_time) => result,
        }
    }

    async fn run(
        &self,
        request: &OptimizeRouteRequest,
        start_date_time: NaiveDateTime,
    ) -> Result<OptimizationResult, OptimizeError> {
        let started = Instant::now();
        info!("Optimizing route: {} stops", request.stops.len());

        let retry = self.retry_policy();
        let resolver = GeocodingResolver::new(self.geocoder.clone(), retry, self.settings.max_concurrency);
        let estimator = TravelTimeEstimator::new(self.routing.clone(), retry, self.settings.fallback_speed_kmh);

        let start_point = resolve_origin(&request.origin, &resolver).await?;
        let (stops, mut warnings) = resolve_stops(&request.stops, &resolver).await;

        let config = ScheduleConfig {
            start_point,
            start_date_time,
            travel_buffer_minutes: request.travel_buffer_minutes,
            stop_buffer_minutes: request.stop_buffer_minutes,
            consider_traffic: request.consider_traffic,
            max_return_time: request.max_return_time,
        };

        if stops.is_empty() {
            warn!("No stops left to schedule after geocoding");
            return Ok(OptimizationResult::empty(start_date_time, warnings));
        }

        let sequenced = StopSequencer::new(&estimator)
            .sequence(&config.start_point, &stops, config.consider_traffic)
            .await;
        if sequenced.matrix_approximate {
            warnings.push(RouteWarning::new(
                None,
                WARNING_SEQUENCING_FALLBACK,
                "Routing backend unavailable; visiting order based on straight-line distance",
            ));
        } else if sequenced.straight_line_picks > 0 {
            warnings.push(RouteWarning::new(
                None,
                WARNING_SEQUENCING_FALLBACK,
                format!(
                    "{} stop(s) ordered by straight-line distance because no road route was found",
                    sequenced.straight_line_picks
                ),
            ));
        }

        let mut path = Vec::with_capacity(sequenced.stops.len() + 1);
        path.push(config.start_point.coordinates());
        path.extend(sequenced.stops.iter().map(Stop::coordinates));
        let legs = estimator
            .estimate_path(&path, config.consider_traffic, self.settings.max_concurrency)
            .await;

        let mut result = ScheduleBuilder::build(&sequenced.stops, &config, &legs);

        for stop in result.ordered_stops.iter().filter(|s| s.approximate) {
            warnings.push(RouteWarning::new(
                Some(&stop.id),
                WARNING_ROUTING_FALLBACK,
                "Travel to this stop estimated from straight-line distance",
            ));
        }
        result.degraded = result.degraded || sequenced.matrix_approximate;
        result.warnings = warnings;

        info!(
            "Route optimized: {} stops, {:.2} km, {} min, {} conflicts, degraded: {} in {:?}",
            result.ordered_stops.len(),
            result.total_distance_km,
            result.total_duration_minutes,
            result.conflicts.len(),
            result.degraded,
            started.elapsed()
        );

        Ok(result)
    }
}

// ==========================================================================
// Validation
// ==========================================================================

/// Reject malformed requests before any provider is called
fn validate(request: &OptimizeRouteRequest) -> Result<NaiveDateTime, OptimizeError> {
    let start_date_time = request
        .start_date_time
        .ok_or_else(|| OptimizeError::validation("startDateTime is required"))?;

    validate_place("origin", &request.origin)?;

    if request.stops.is_empty() {
        return Err(OptimizeError::validation("at least one stop is required"));
    }

    let mut ids = HashSet::new();
    for (index, stop) in request.stops.iter().enumerate() {
        let id = stop.id.trim();
        if id.is_empty() {
            return Err(OptimizeError::validation(format!("stop at index {} has no id", index)));
        }
        if !ids.insert(id) {
            return Err(OptimizeError::validation(format!("duplicate stop id '{}'", id)));
        }
        match stop.coordinates() {
            Some(c) if !c.is_valid() => {
                return Err(OptimizeError::validation(format!(
                    "stop '{}' has invalid coordinates ({}, {})",
                    id, c.lat, c.lng
                )));
            }
            None if stop.address_text().is_none() => {
                return Err(OptimizeError::validation(format!(
                    "stop '{}' has neither coordinates nor an address",
                    id
                )));
            }
            _ => {}
        }
    }

    Ok(start_date_time)
}

fn validate_place(name: &str, place: &PlaceRequest) -> Result<(), OptimizeError> {
    match place.coordinates() {
        Some(c) if !c.is_valid() => Err(OptimizeError::validation(format!(
            "{} has invalid coordinates ({}, {})",
            name, c.lat, c.lng
        ))),
        Some(_) => Ok(()),
        None if place.address_text().is_some() => Ok(()),
        None => Err(OptimizeError::validation(format!(
            "{} needs coordinates or an address",
            name
        ))),
    }
}

// ==========================================================================
// Address resolution
// ==========================================================================

async fn resolve_origin(origin: &PlaceRequest, resolver: &GeocodingResolver) -> Result<Point, OptimizeError> {
    let address = origin.address_text().map(str::to_string);
    if let Some(coordinates) = origin.coordinates() {
        return Ok(Point::new(coordinates, address));
    }

    let text = address.unwrap_or_default();
    resolver
        .resolve(&text)
        .await
        .map(|resolved| Point::new(resolved.coordinates(), Some(text.clone())))
        .map_err(|e| OptimizeError::validation(format!("origin '{}' could not be resolved: {}", text, e)))
}

/// Build engine stops, geocoding those without usable coordinates.
///
/// Stops that cannot be placed are dropped with a warning.
async fn resolve_stops(requests: &[StopRequest], resolver: &GeocodingResolver) -> (Vec<Stop>, Vec<RouteWarning>) {
    let pending: Vec<(usize, String)> = requests
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.has_known_coordinates())
        .filter_map(|(i, r)| r.address_text().map(|a| (i, a.to_string())))
        .collect();

    let addresses: Vec<String> = pending.iter().map(|(_, a)| a.clone()).collect();
    let mut resolved: Vec<Option<Result<Point, _>>> = vec![None; requests.len()];
    for ((index, _), outcome) in pending.iter().zip(resolver.resolve_all(&addresses).await) {
        resolved[*index] = Some(outcome);
    }

    let mut stops = Vec::with_capacity(requests.len());
    let mut warnings = Vec::new();

    for (index, (request, outcome)) in requests.iter().zip(resolved).enumerate() {
        let address = request.address_text().unwrap_or_default();
        let placed = match outcome {
            // Nothing to geocode: take the coordinates as given
            None => request.coordinates().map(|c| (c, request.has_known_coordinates())),
            Some(Ok(point)) => Some((point.coordinates(), false)),
            Some(Err(e)) => match request.coordinates() {
                Some(c) => {
                    warnings.push(RouteWarning::new(
                        Some(&request.id),
                        WARNING_GEOCODE_FALLBACK,
                        format!("Could not geocode '{}' ({}); using supplied coordinates", address, e),
                    ));
                    Some((c, false))
                }
                None => {
                    warnings.push(RouteWarning::new(
                        Some(&request.id),
                        WARNING_GEOCODE_FAILED,
                        format!("Could not geocode '{}' ({}); stop skipped", address, e),
                    ));
                    None
                }
            },
        };

        if let Some((coordinates, coordinates_known)) = placed {
            stops.push(to_stop(request, index, coordinates, coordinates_known));
        }
    }

    (stops, warnings)
}

fn to_stop(request: &StopRequest, index: usize, coordinates: crate::types::Coordinates, coordinates_known: bool) -> Stop {
    let address = request.address_text().map(str::to_string);
    let label = match request.label.trim() {
        "" => address.clone().unwrap_or_else(|| request.id.trim().to_string()),
        label => label.to_string(),
    };

    Stop {
        id: request.id.trim().to_string(),
        label,
        point: Point::new(coordinates, address),
        service_duration_minutes: request.service_duration_minutes,
        external_ref: request.external_ref.clone(),
        coordinates_known,
        expected_by: request.expected_by,
        pinned: request.pinned,
        input_index: index,
    }
}
