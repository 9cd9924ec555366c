//! Business logic services

pub mod cancellation;
pub mod estimator;
pub mod geo;
pub mod geocoding;
pub mod nominatim;
pub mod orchestrator;
pub mod planner;
pub mod retry;
pub mod routing;
pub mod schedule;
pub mod sequencer;

#[cfg(test)]
pub mod testing;
