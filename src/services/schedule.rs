//! Forward schedule computation for an ordered route.
//!
//! Walks the stops in visiting order from the start point and start time,
//! applying travel buffer, stop buffer and service duration per stop. It does
//! NOT re-order stops and never waits: desired times only produce conflicts.

use chrono::{Duration, NaiveDateTime};

use crate::services::estimator::LegEstimate;
use crate::services::geo::round_km;
use crate::services::routing::RouteGeometry;
use crate::types::{OptimizationResult, OptimizedStop, RouteSummary, ScheduleConfig, Stop};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn add_minutes(time: NaiveDateTime, minutes: u32) -> NaiveDateTime {
    time.checked_add_signed(Duration::minutes(i64::from(minutes)))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Whole minutes (rounded up) by which `actual` is past `limit`
fn overage_minutes(actual: NaiveDateTime, limit: NaiveDateTime) -> u32 {
    let seconds = (actual - limit).num_seconds();
    if seconds <= 0 {
        return 0;
    }
    u32::try_from((seconds + 59) / 60).unwrap_or(u32::MAX)
}

fn hours_one_decimal(minutes: u32) -> f64 {
    (f64::from(minutes) / 6.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Core computation
// ---------------------------------------------------------------------------

pub struct ScheduleBuilder;

impl ScheduleBuilder {
    /// Compute ETAs, conflicts and totals.
    ///
    /// `legs[i]` is the inbound leg of `ordered[i]`; the first one starts at
    /// `config.start_point`. Missing legs count as coincident.
    pub fn build(ordered: &[Stop], config: &ScheduleConfig, legs: &[LegEstimate]) -> OptimizationResult {
        if ordered.is_empty() {
            return OptimizationResult::empty(config.start_date_time, vec![]);
        }

        let n = ordered.len();
        let mut result_stops: Vec<OptimizedStop> = Vec::with_capacity(n);
        let mut conflicts = Vec::new();
        let mut return_conflict = false;
        let mut geometry = RouteGeometry::empty();

        let mut cursor = config.start_date_time;
        let mut total_km = 0.0;
        let mut total_minutes: u32 = 0;

        for (i, stop) in ordered.iter().enumerate() {
            let order = (i + 1) as u32;
            let (travel_min, km, approximate) = legs
                .get(i)
                .map(|leg| (leg.minutes, leg.km, leg.approximate))
                .unwrap_or((0, 0.0, false));
            if let Some(leg) = legs.get(i) {
                geometry.append(&leg.geometry);
            }

            let arrival = add_minutes(cursor, travel_min.saturating_add(config.travel_buffer_minutes));
            let service_start = add_minutes(arrival, config.stop_buffer_minutes);
            let service_end = add_minutes(service_start, stop.service_duration_minutes);

            // Desired completion time of this stop
            let mut delay = 0;
            if let Some(expected_by) = stop.expected_by {
                let late = overage_minutes(service_end, expected_by);
                if late > 0 {
                    conflicts.push(format!(
                        "Stop {} ({}): service ends {}, expected by {}, {} min late",
                        order,
                        stop.label,
                        service_end.format("%H:%M"),
                        expected_by.format("%H:%M"),
                        late
                    ));
                    delay = delay.max(late);
                }
            }

            // Return limit applies to the end of the last visit
            if i + 1 == n {
                if let Some(limit) = config.max_return_time {
                    let late = overage_minutes(service_end, limit);
                    if late > 0 {
                        conflicts.push(format!(
                            "Return limit exceeded: last visit ends {}, limit {}, {} min late",
                            service_end.format("%H:%M"),
                            limit.format("%H:%M"),
                            late
                        ));
                        return_conflict = true;
                        delay = delay.max(late);
                    }
                }
            }

            result_stops.push(OptimizedStop {
                id: stop.id.clone(),
                order,
                label: stop.label.clone(),
                lat: stop.point.lat,
                lng: stop.point.lng,
                address: stop.point.address.clone(),
                service_duration_minutes: stop.service_duration_minutes,
                external_ref: stop.external_ref.clone(),
                expected_by: stop.expected_by,
                eta_arrival: arrival,
                eta_service_start: service_start,
                eta_service_end: service_end,
                travel_minutes_from_previous: travel_min,
                distance_km_from_previous: km,
                conflict: delay > 0,
                delay_minutes: delay,
                approximate,
            });

            total_km += km;
            total_minutes = total_minutes
                .saturating_add(travel_min)
                .saturating_add(config.travel_buffer_minutes)
                .saturating_add(config.stop_buffer_minutes)
                .saturating_add(stop.service_duration_minutes);
            cursor = service_end;
        }

        let degraded = result_stops.iter().any(|s| s.approximate);

        OptimizationResult {
            summary: RouteSummary {
                total_stops: n,
                start_time: config.start_date_time,
                end_time: cursor,
                total_duration_hours: hours_one_decimal(total_minutes),
            },
            ordered_stops: result_stops,
            total_distance_km: round_km(total_km),
            total_duration_minutes: total_minutes,
            conflicts,
            return_conflict,
            degraded,
            warnings: vec![],
            geometry: geometry.coordinates,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
