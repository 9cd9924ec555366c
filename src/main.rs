//! Itinerary Planner worker - route sequencing and scheduling over NATS
//!
//! `serve` (default) connects to NATS and answers optimize/cancel requests.
//! `optimize` plans a single request from a JSON file and prints the result.

mod cli;

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use uuid::Uuid;

use itinerary_planner::config::Config;
use itinerary_planner::handlers;
use itinerary_planner::services::geocoding::MockGeocoder;
use itinerary_planner::services::routing::MockRoutingService;
use itinerary_planner::types::OptimizeRouteRequest;
use itinerary_planner::{OptimizationOrchestrator, RoutePlanner};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs directory - use LOGS_DIR env var or default to ../logs
    let logs_dir = std::env::var("LOGS_DIR")
        .unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &logs_dir,
        "itinerary-planner.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Console logs go to stderr; stdout carries `optimize` output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,itinerary_planner=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))  // file
        .init();

    let config = Config::from_env()?;
    info!("Configuration loaded");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Optimize { input, offline } => optimize_once(config, &input, offline).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Itinerary Planner worker...");

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (std::env::var("NATS_USER"), std::env::var("NATS_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    let handler_result = handlers::start_handlers(nats_client, &config).await;

    if let Err(e) = handler_result {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}

async fn optimize_once(config: Config, input: &Path, offline: bool) -> Result<()> {
    let raw = if input == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read request from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?
    };
    let request: OptimizeRouteRequest = serde_json::from_str(&raw).context("Invalid optimize request")?;

    let planner = if offline {
        info!("Offline mode: mock geocoder and mock routing");
        let orchestrator = OptimizationOrchestrator::new(
            Arc::new(MockGeocoder::new()),
            Arc::new(MockRoutingService::new()),
            config.planner.clone(),
        );
        RoutePlanner::new(Arc::new(orchestrator))
    } else {
        handlers::create_planner(&config).await?.0
    };

    // Ctrl-C cancels the plan instead of killing the process mid-write
    let plan_id = Uuid::new_v4();
    let canceller = planner.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel(plan_id);
        }
    });

    let result = planner.optimize_route(plan_id, &request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
