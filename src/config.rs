//! Configuration management

use std::time::Duration;

use anyhow::{self, Context, Result};

use crate::defaults::{
    DEFAULT_FALLBACK_SPEED_KMH, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_BASE_MS, MAX_CONCURRENCY_LIMIT,
};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// Nominatim API URL (for geocoding)
    pub nominatim_url: String,

    /// Geocoder backend: "mock" or "nominatim"
    pub geocoder_backend: String,

    /// Valhalla routing engine URL (optional, falls back to mock if unavailable)
    pub valhalla_url: Option<String>,

    /// Optimization pipeline tuning
    pub planner: PlannerSettings,
}

/// Tuning knobs for the optimize pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSettings {
    /// Outbound provider calls in flight per optimize call (1..=8)
    pub max_concurrency: usize,
    /// Retries after a transient provider failure (0..=2)
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    pub retry_base_delay: Duration,
    /// Speed used when a leg falls back to straight-line distance
    pub fallback_speed_kmh: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            fallback_speed_kmh: DEFAULT_FALLBACK_SPEED_KMH,
        }
    }
}

impl PlannerSettings {
    /// Load from `PLANNER_*` / `FALLBACK_*` variables, clamping to safe ranges
    pub fn from_env() -> Result<Self> {
        let max_concurrency = parse_env("PLANNER_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)?
            .clamp(1, MAX_CONCURRENCY_LIMIT);
        let max_retries = parse_env("PLANNER_MAX_RETRIES", DEFAULT_MAX_RETRIES)?
            .min(DEFAULT_MAX_RETRIES);
        let retry_base_ms = parse_env("PLANNER_RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS)?;
        let fallback_speed_kmh = parse_env("FALLBACK_AVERAGE_SPEED_KMH", DEFAULT_FALLBACK_SPEED_KMH)?;

        if !(fallback_speed_kmh.is_finite() && fallback_speed_kmh > 0.0) {
            anyhow::bail!(
                "FALLBACK_AVERAGE_SPEED_KMH must be a positive number (current: {})",
                fallback_speed_kmh
            );
        }

        Ok(Self {
            max_concurrency,
            max_retries,
            retry_base_delay: Duration::from_millis(retry_base_ms),
            fallback_speed_kmh,
        })
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let nats_url = std::env::var("NATS_URL")
            .unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let nominatim_url = std::env::var("NOMINATIM_URL")
            .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string());

        let geocoder_backend = std::env::var("GEOCODER_BACKEND")
            .unwrap_or_else(|_| "mock".to_string());

        let valhalla_url = std::env::var("VALHALLA_URL").ok().filter(|u| !u.is_empty());

        let planner = PlannerSettings::from_env()?;

        Ok(Self {
            nats_url,
            nominatim_url,
            geocoder_backend,
            valhalla_url,
            planner,
        })
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, raw)),
        _ => Ok(default),
    }
}
