//! Itinerary planner: route sequencing and arrival-time scheduling for
//! field-visit plans.
//!
//! The engine entry point is [`services::orchestrator::OptimizationOrchestrator`];
//! [`services::planner::RoutePlanner`] adds cancellation by plan id, and
//! [`handlers`] exposes it over NATS.

pub mod config;
pub mod defaults;
pub mod error;
pub mod handlers;
pub mod services;
pub mod types;

pub use error::{GeocodeError, OptimizeError, RoutingError};
pub use services::orchestrator::OptimizationOrchestrator;
pub use services::planner::RoutePlanner;
