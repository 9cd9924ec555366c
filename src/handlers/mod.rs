//! NATS message handlers

pub mod ping;
pub mod route;

use std::sync::Arc;
use anyhow::Result;
use async_nats::Client;
use tracing::{info, error};
use tokio::select;

use crate::config::Config;
use crate::services::geocoding::{create_geocoder, Geocoder};
use crate::services::orchestrator::OptimizationOrchestrator;
use crate::services::planner::RoutePlanner;
use crate::services::routing::{RoutingService, create_routing_service_with_fallback};

use self::ping::ProviderInfo;

pub const SUBJECT_PING: &str = "itinerary.ping";
pub const SUBJECT_ROUTE_OPTIMIZE: &str = "itinerary.route.optimize";
pub const SUBJECT_ROUTE_CANCEL: &str = "itinerary.route.cancel";

/// Create the shared providers and a planner on top of them
pub async fn create_planner(config: &Config) -> Result<(RoutePlanner, ProviderInfo)> {
    let geocoder: Arc<dyn Geocoder> = Arc::from(create_geocoder(&config.geocoder_backend, &config.nominatim_url)?);
    info!("Geocoder initialized: {}", geocoder.name());

    // Routing service with automatic Valhalla detection
    let routing_service: Arc<dyn RoutingService> = Arc::from(
        create_routing_service_with_fallback(config.valhalla_url.clone()).await
    );
    info!("Routing service initialized: {}", routing_service.name());

    let providers = ProviderInfo {
        geocoder: geocoder.name().to_string(),
        routing: routing_service.name().to_string(),
    };
    let orchestrator = OptimizationOrchestrator::new(geocoder, routing_service, config.planner.clone());

    Ok((RoutePlanner::new(Arc::new(orchestrator)), providers))
}

/// Start all message handlers
pub async fn start_handlers(client: Client, config: &Config) -> Result<()> {
    info!("Starting message handlers...");

    let (planner, providers) = create_planner(config).await?;
    let planner = Arc::new(planner);

    // Subscribe to all subjects
    let ping_sub = client.subscribe(SUBJECT_PING).await?;
    let optimize_sub = client.subscribe(SUBJECT_ROUTE_OPTIMIZE).await?;
    let cancel_sub = client.subscribe(SUBJECT_ROUTE_CANCEL).await?;

    info!("Subscribed to NATS subjects");

    let ping_handle = tokio::spawn(ping::handle_ping(client.clone(), ping_sub, providers));
    let optimize_handle = tokio::spawn(route::handle_optimize(client.clone(), optimize_sub, planner.clone()));
    let cancel_handle = tokio::spawn(route::handle_cancel(client, cancel_sub, planner));

    info!("All handlers started");

    // Any handler finishing means the subscription closed
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = optimize_handle => {
            error!("Route optimize handler finished: {:?}", result);
        }
        result = cancel_handle => {
            error!("Route cancel handler finished: {:?}", result);
        }
    }

    Ok(())
}
