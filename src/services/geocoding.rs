//! Geocoding abstraction layer with safety features
//!
//! This module provides a safe geocoding architecture that:
//! - Never risks getting blocked by external services
//! - Uses MockGeocoder for tests (deterministic, no network)
//! - Uses RateLimitedNominatimGeocoder for production (strict rate limiting)
//! - Resolves each distinct address at most once per optimize call
//!
//! Configuration via GEOCODER_BACKEND env variable:
//! - "mock" → MockGeocoder (tests, development)
//! - "nominatim" → RateLimitedNominatimGeocoder (production)

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::error::GeocodeError;
use crate::services::geo::haversine_distance;
use crate::services::nominatim::GeocodeCandidate;
use crate::services::retry::RetryPolicy;
use crate::types::{Coordinates, Point};

/// Geocoder trait - abstraction for all geocoding implementations
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Geocode a free-text address to coordinates
    async fn geocode(&self, address: &str) -> Result<GeocodingResult, GeocodeError>;

    /// Get the name of this geocoder implementation
    fn name(&self) -> &'static str;
}

/// Result of geocoding operation
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodingResult {
    /// Latitude and longitude
    pub coordinates: Coordinates,
    /// Confidence score 0.0-1.0
    pub confidence: f64,
    /// Display name returned by geocoder
    pub display_name: String,
}

/// Candidates whose importance is this close to the best one compete with it
const AMBIGUITY_IMPORTANCE_MARGIN: f64 = 0.05;

/// Competing candidates closer than this describe the same place
const AMBIGUITY_DISTANCE_KM: f64 = 1.0;

/// Importance assumed when the provider does not report one
const DEFAULT_IMPORTANCE: f64 = 0.8;

/// Pick the best candidate, or report the search as ambiguous.
///
/// Ambiguous means another candidate scores within
/// `AMBIGUITY_IMPORTANCE_MARGIN` of the best and lies more than
/// `AMBIGUITY_DISTANCE_KM` away from it.
pub fn select_candidate(candidates: &[GeocodeCandidate]) -> Result<GeocodingResult, GeocodeError> {
    let importance = |c: &GeocodeCandidate| c.importance.unwrap_or(DEFAULT_IMPORTANCE);

    // First candidate wins ties: providers return them ranked
    let best = candidates
        .iter()
        .reduce(|best, c| if importance(c) > importance(best) { c } else { best })
        .ok_or(GeocodeError::NotFound)?;

    let rivals = candidates
        .iter()
        .filter(|c| !std::ptr::eq(*c, best))
        .filter(|c| importance(best) - importance(c) <= AMBIGUITY_IMPORTANCE_MARGIN)
        .filter(|c| haversine_distance(&best.coordinates, &c.coordinates) > AMBIGUITY_DISTANCE_KM)
        .count();

    if rivals > 0 {
        return Err(GeocodeError::Ambiguous { candidates: rivals + 1 });
    }

    Ok(GeocodingResult {
        coordinates: best.coordinates,
        confidence: importance(best).clamp(0.0, 1.0),
        display_name: best.display_name.clone(),
    })
}

/// Cache key: trimmed, lower-cased, inner whitespace collapsed
pub fn normalize_address(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{ScriptedGeocoder, StaggeredGeocoder};
    use std::time::Duration;

    fn candidate(lat: f64, lng: f64, importance: Option<f64>) -> GeocodeCandidate {
        GeocodeCandidate {
            coordinates: Coordinates { lat, lng },
            importance,
            display_name: format!("{:.4}, {:.4}", lat, lng),
        }
    }

    // ==========================================================================
    // MockGeocoder
    // ==========================================================================

    #[tokio::test]
    async fn mock_geocoder_returns_coordinates_for_any_address() {
        let geocoder = MockGeocoder::new();

        let result = geocoder.geocode("Václavské náměstí 1, 110 00 Praha").await;

        assert!(result.is_ok(), "MockGeocoder should always return coordinates");
    }

    #[tokio::test]
    async fn mock_geocoder_returns_deterministic_coordinates() {
        let geocoder = MockGeocoder::new();

        let a = geocoder.geocode("Náměstí Svobody 1, Brno").await.unwrap();
        let b = geocoder.geocode("Náměstí Svobody 1, Brno").await.unwrap();

        assert_eq!(a.coordinates, b.coordinates);
    }

    #[tokio::test]
    async fn mock_geocoder_returns_different_coordinates_for_different_addresses() {
        let geocoder = MockGeocoder::new();

        let a = geocoder.geocode("Náměstí Svobody 1, Brno").await.unwrap();
        let b = geocoder.geocode("Masarykova 10, Olomouc").await.unwrap();

        assert_ne!(a.coordinates, b.coordinates);
    }

    #[tokio::test]
    async fn mock_geocoder_returns_coordinates_within_czech_republic() {
        let geocoder = MockGeocoder::new();

        for address in ["Praha", "Brno", "Ostrava", "Plzeň", "Liberec"] {
            let result = geocoder.geocode(address).await.unwrap();
            assert!((49.0..=50.5).contains(&result.coordinates.lat));
            assert!((13.0..=17.5).contains(&result.coordinates.lng));
        }
    }

    #[tokio::test]
    async fn mock_geocoder_rejects_blank_address() {
        let geocoder = MockGeocoder::new();
        assert_eq!(geocoder.geocode("   ").await, Err(GeocodeError::EmptyAddress));
    }

    // ==========================================================================
    // Candidate selection
    // ==========================================================================

    #[test]
    fn select_candidate_empty_is_not_found() {
        assert_eq!(select_candidate(&[]), Err(GeocodeError::NotFound));
    }

    #[test]
    fn select_candidate_prefers_highest_importance() {
        let candidates = vec![
            candidate(50.0, 14.0, Some(0.3)),
            candidate(49.2, 16.6, Some(0.9)),
        ];

        let result = select_candidate(&candidates).unwrap();
        assert_eq!(result.coordinates, Coordinates { lat: 49.2, lng: 16.6 });
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn select_candidate_close_rivals_are_not_ambiguous() {
        // Same street, two house entrances 100 m apart
        let candidates = vec![
            candidate(50.0800, 14.4300, Some(0.6)),
            candidate(50.0809, 14.4300, Some(0.6)),
        ];

        assert!(select_candidate(&candidates).is_ok());
    }

    #[test]
    fn select_candidate_distant_equal_rivals_are_ambiguous() {
        // "Nádražní 1" exists in many towns
        let candidates = vec![
            candidate(50.0755, 14.4378, Some(0.5)),
            candidate(49.1951, 16.6068, Some(0.48)),
            candidate(49.8209, 18.2625, Some(0.2)),
        ];

        assert_eq!(select_candidate(&candidates), Err(GeocodeError::Ambiguous { candidates: 2 }));
    }

    #[test]
    fn normalize_address_collapses_case_and_whitespace() {
        assert_eq!(normalize_address("  Náměstí   Svobody 1,\tBrno "), "náměstí svobody 1, brno");
        assert_eq!(normalize_address("PRAHA"), normalize_address("praha"));
        assert_eq!(normalize_address("   "), "");
    }

    // ==========================================================================
    // RateLimiter / CircuitBreaker
    // ==========================================================================

    #[tokio::test]
    async fn rate_limiter_enforces_minimum_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(100));

        let start = std::time::Instant::now();
        limiter.wait().await;
        limiter.wait().await;

        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn circuit_breaker_starts_closed() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(!cb.is_open());
    }

    #[test]
    fn circuit_breaker_opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));

        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());

        cb.record_failure();
        assert!(cb.is_open());
    }

    #[test]
    fn circuit_breaker_resets_on_success() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60));

        cb.record_failure();
        cb.record_success();
        cb.record_failure();

        assert!(!cb.is_open());
    }

    #[tokio::test]
    async fn circuit_breaker_closes_after_recovery_time() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(50));

        cb.record_failure();
        assert!(cb.is_open());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!cb.is_open());
    }

    #[tokio::test]
    async fn rate_limited_nominatim_geocoder_rejects_when_circuit_breaker_open() {
        let geocoder = RateLimitedNominatimGeocoder::with_config(
            "http://localhost:1",
            Duration::from_millis(0),
            1,
            Duration::from_secs(300),
        )
        .unwrap();
        geocoder.circuit_breaker.record_failure();

        let result = geocoder.geocode("Praha").await;

        match result {
            Err(GeocodeError::ProviderUnavailable(reason)) => assert!(reason.contains("circuit breaker")),
            other => panic!("expected ProviderUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn rate_limited_nominatim_geocoder_has_correct_name() {
        let geocoder = RateLimitedNominatimGeocoder::with_config(
            "http://localhost:8080",
            Duration::from_millis(0),
            3,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(geocoder.name(), "nominatim");
    }

    #[test]
    fn geocoder_factory_defaults_to_mock_for_unknown_backend() {
        let geocoder = create_geocoder("carrier-pigeon", "http://localhost:8080").unwrap();
        assert_eq!(geocoder.name(), "mock");
    }

    // ==========================================================================
    // GeocodingResolver
    // ==========================================================================

    fn resolver_for(geocoder: Arc<ScriptedGeocoder>) -> GeocodingResolver {
        GeocodingResolver::new(geocoder, RetryPolicy::new(2, Duration::ZERO), 4)
    }

    #[tokio::test]
    async fn resolver_rejects_empty_address_without_calling_provider() {
        let geocoder = Arc::new(ScriptedGeocoder::new());
        let resolver = resolver_for(geocoder.clone());

        assert_eq!(resolver.resolve("  ").await, Err(GeocodeError::EmptyAddress));
        assert_eq!(geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn resolver_caches_by_normalized_address() {
        let geocoder = Arc::new(
            ScriptedGeocoder::new().with_address("Masarykova 10, Olomouc", Coordinates::new(49.59, 17.25)),
        );
        let resolver = resolver_for(geocoder.clone());

        let first = resolver.resolve("Masarykova 10, Olomouc").await.unwrap();
        let second = resolver.resolve("  masarykova 10,   OLOMOUC ").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(geocoder.calls(), 1);
    }

    #[tokio::test]
    async fn resolver_retries_provider_outage() {
        let geocoder = Arc::new(
            ScriptedGeocoder::new()
                .with_address("Praha", Coordinates::new(50.08, 14.43))
                .failing_first(2),
        );
        let resolver = resolver_for(geocoder.clone());

        let point = resolver.resolve("Praha").await.unwrap();

        assert_eq!(point.coordinates(), Coordinates::new(50.08, 14.43));
        assert_eq!(geocoder.calls(), 3);
    }

    #[tokio::test]
    async fn resolver_gives_up_after_bounded_retries() {
        let geocoder = Arc::new(ScriptedGeocoder::new().failing_first(10));
        let resolver = resolver_for(geocoder.clone());

        let result = resolver.resolve("Praha").await;

        assert!(matches!(result, Err(GeocodeError::ProviderUnavailable(_))));
        assert_eq!(geocoder.calls(), 3);
    }

    #[tokio::test]
    async fn resolver_does_not_retry_not_found() {
        let geocoder = Arc::new(ScriptedGeocoder::new());
        let resolver = resolver_for(geocoder.clone());

        assert_eq!(resolver.resolve("Nowhere 1").await, Err(GeocodeError::NotFound));
        assert_eq!(geocoder.calls(), 1);
    }

    #[tokio::test]
    async fn resolve_all_keeps_input_order_and_deduplicates() {
        let geocoder = Arc::new(
            ScriptedGeocoder::new()
                .with_address("Praha", Coordinates::new(50.08, 14.43))
                .with_address("Brno", Coordinates::new(49.19, 16.61)),
        );
        let resolver = resolver_for(geocoder.clone());

        let addresses = vec![
            "Brno".to_string(),
            "Praha".to_string(),
            "Nowhere".to_string(),
            "BRNO".to_string(),
        ];
        let results = resolver.resolve_all(&addresses).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap().coordinates(), Coordinates::new(49.19, 16.61));
        assert_eq!(results[1].as_ref().unwrap().coordinates(), Coordinates::new(50.08, 14.43));
        assert_eq!(results[2], Err(GeocodeError::NotFound));
        assert_eq!(results[3], results[0]);
        assert_eq!(geocoder.calls(), 3);
    }

    #[tokio::test]
    async fn resolve_all_bounds_concurrency_and_ignores_completion_order() {
        let towns = [
            ("Plzeň", Coordinates::new(49.74, 13.37), 90),
            ("Brno", Coordinates::new(49.19, 16.61), 60),
            ("Ostrava", Coordinates::new(49.82, 18.26), 40),
            ("Liberec", Coordinates::new(50.77, 15.06), 20),
            ("Olomouc", Coordinates::new(49.59, 17.25), 5),
        ];
        let geocoder = towns
            .iter()
            .fold(StaggeredGeocoder::new(), |g, (name, coordinates, ms)| {
                g.with_address(name, *coordinates, Duration::from_millis(*ms))
            });
        let geocoder = Arc::new(geocoder);
        let resolver = GeocodingResolver::new(geocoder.clone(), RetryPolicy::new(0, Duration::ZERO), 2);

        let addresses: Vec<String> = towns.iter().map(|(name, _, _)| name.to_string()).collect();
        let results = resolver.resolve_all(&addresses).await;

        for (result, (_, coordinates, _)) in results.iter().zip(towns.iter()) {
            assert_eq!(result.as_ref().unwrap().coordinates(), *coordinates);
        }
        assert_eq!(geocoder.in_flight.peak(), 2);
    }

    #[tokio::test]
    async fn resolve_all_can_run_on_a_spawned_task() {
        let geocoder = Arc::new(ScriptedGeocoder::new().with_address("Praha", Coordinates::new(50.08, 14.43)));
        let resolver = Arc::new(resolver_for(geocoder));

        let addresses = vec!["Praha".to_string(), "praha ".to_string()];
        let results = tokio::spawn(async move { resolver.resolve_all(&addresses).await })
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0], results[1]);
    }
}

// ==========================================================================
// MockGeocoder Implementation
// ==========================================================================

/// Mock geocoder for testing - returns deterministic fake coordinates
pub struct MockGeocoder;

impl MockGeocoder {
    pub fn new() -> Self {
        Self
    }

    /// Generate deterministic coordinates from the normalized address hash.
    /// Coordinates are guaranteed to be within Czech Republic with safety margin
    fn hash_to_coordinates(address: &str) -> Coordinates {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        normalize_address(address).hash(&mut hasher);
        let hash = hasher.finish();

        // Czech Republic INNER bounds with safety margin (away from borders)
        const LAT_MIN: f64 = 49.0;
        const LAT_MAX: f64 = 50.5;
        const LNG_MIN: f64 = 13.0;
        const LNG_MAX: f64 = 17.5;

        // Use different parts of the hash for lat and lng
        let lat_normalized = ((hash >> 32) as f64) / (u32::MAX as f64);
        let lng_normalized = ((hash & 0xFFFFFFFF) as f64) / (u32::MAX as f64);

        Coordinates {
            lat: LAT_MIN + (lat_normalized * (LAT_MAX - LAT_MIN)),
            lng: LNG_MIN + (lng_normalized * (LNG_MAX - LNG_MIN)),
        }
    }
}

impl Default for MockGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeocodingResult, GeocodeError> {
        if address.trim().is_empty() {
            return Err(GeocodeError::EmptyAddress);
        }

        Ok(GeocodingResult {
            coordinates: Self::hash_to_coordinates(address),
            confidence: 0.95, // Mock always has high confidence
            display_name: address.trim().to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ==========================================================================
// RateLimiter Implementation
// ==========================================================================

use tokio::sync::Mutex;
use std::time::{Duration, Instant};

/// Rate limiter that enforces minimum interval between calls
pub struct RateLimiter {
    last_call: Arc<Mutex<Option<Instant>>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_call: Arc::new(Mutex::new(None)),
            min_interval,
        }
    }

    /// Wait until it's safe to make another call
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                // Sleep while holding the lock so concurrent callers queue up
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        *last = Some(Instant::now());
    }
}

// ==========================================================================
// CircuitBreaker Implementation
// ==========================================================================

use std::sync::atomic::{AtomicU32, Ordering};

/// Circuit breaker to prevent hammering a failing service
pub struct CircuitBreaker {
    failure_count: AtomicU32,
    threshold: u32,
    last_failure: parking_lot::Mutex<Option<Instant>>,
    recovery_time: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, recovery_time: Duration) -> Self {
        Self {
            failure_count: AtomicU32::new(0),
            threshold,
            last_failure: parking_lot::Mutex::new(None),
            recovery_time,
        }
    }

    /// Check if circuit is open (blocking calls)
    pub fn is_open(&self) -> bool {
        if self.failure_count.load(Ordering::Relaxed) < self.threshold {
            return false;
        }
        match *self.last_failure.lock() {
            // Recovery time passed: allow a probe (half-open)
            Some(last_time) => last_time.elapsed() < self.recovery_time,
            None => true,
        }
    }

    /// Record a failure
    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        *self.last_failure.lock() = Some(Instant::now());
    }

    /// Record a success (resets failure count)
    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
    }
}

// ==========================================================================
// RateLimitedNominatimGeocoder Implementation
// ==========================================================================

use crate::services::nominatim::NominatimClient;

/// Default rate limit interval (1.5 seconds - Nominatim allows 1 req/s)
const DEFAULT_RATE_LIMIT_MS: u64 = 1500;

/// Default circuit breaker threshold (3 failures)
const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: u32 = 3;

/// Default circuit breaker recovery time (5 minutes)
const DEFAULT_CIRCUIT_BREAKER_RECOVERY_SECS: u64 = 300;

/// Rate-limited Nominatim geocoder with circuit breaker protection
///
/// This geocoder wraps the NominatimClient with:
/// - Rate limiting: enforces minimum interval between requests
/// - Circuit breaker: stops requests after repeated failures
pub struct RateLimitedNominatimGeocoder {
    client: NominatimClient,
    rate_limiter: RateLimiter,
    /// Circuit breaker - pub(crate) for testing
    pub(crate) circuit_breaker: CircuitBreaker,
}

impl RateLimitedNominatimGeocoder {
    /// Create with custom configuration
    pub fn with_config(
        base_url: &str,
        rate_limit_interval: Duration,
        circuit_breaker_threshold: u32,
        circuit_breaker_recovery: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: NominatimClient::new(base_url)?,
            rate_limiter: RateLimiter::new(rate_limit_interval),
            circuit_breaker: CircuitBreaker::new(circuit_breaker_threshold, circuit_breaker_recovery),
        })
    }

    /// Create from environment variables, using `base_url` for the API
    pub fn from_env(base_url: &str) -> Result<Self> {
        let rate_limit_ms = std::env::var("NOMINATIM_RATE_LIMIT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_MS);

        let cb_threshold = std::env::var("NOMINATIM_CB_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CIRCUIT_BREAKER_THRESHOLD);

        let cb_recovery_secs = std::env::var("NOMINATIM_CB_RECOVERY_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CIRCUIT_BREAKER_RECOVERY_SECS);

        Self::with_config(
            base_url,
            Duration::from_millis(rate_limit_ms),
            cb_threshold,
            Duration::from_secs(cb_recovery_secs),
        )
    }
}

#[async_trait]
impl Geocoder for RateLimitedNominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeocodingResult, GeocodeError> {
        if address.trim().is_empty() {
            return Err(GeocodeError::EmptyAddress);
        }

        // Check circuit breaker first
        if self.circuit_breaker.is_open() {
            warn!("Circuit breaker is open, rejecting geocoding request");
            return Err(GeocodeError::ProviderUnavailable(
                "geocoding temporarily disabled (circuit breaker open)".to_string(),
            ));
        }

        // Wait for rate limiter
        self.rate_limiter.wait().await;

        match self.client.search(address.trim()).await {
            Ok(candidates) => {
                // An unknown or ambiguous address is not a provider failure
                self.circuit_breaker.record_success();
                select_candidate(&candidates)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                tracing::error!("Geocoding failed: {}", e);
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "nominatim"
    }
}

// ==========================================================================
// Factory function
// ==========================================================================

/// Create geocoder based on backend name ("mock" or "nominatim")
///
/// # Environment Variables (nominatim backend)
///
/// - `NOMINATIM_RATE_LIMIT_MS`: Minimum interval between requests (default: 1500)
/// - `NOMINATIM_CB_THRESHOLD`: Circuit breaker failure threshold (default: 3)
/// - `NOMINATIM_CB_RECOVERY_SECS`: Circuit breaker recovery time (default: 300)
pub fn create_geocoder(backend: &str, nominatim_url: &str) -> Result<Box<dyn Geocoder>> {
    match backend {
        "mock" => {
            tracing::info!("Using MockGeocoder");
            Ok(Box::new(MockGeocoder::new()))
        }
        "nominatim" => {
            tracing::info!("Using RateLimitedNominatimGeocoder at {}", nominatim_url);
            Ok(Box::new(RateLimitedNominatimGeocoder::from_env(nominatim_url)?))
        }
        _ => {
            warn!("Unknown GEOCODER_BACKEND '{}', using mock", backend);
            Ok(Box::new(MockGeocoder::new()))
        }
    }
}

// ==========================================================================
// GeocodingResolver
// ==========================================================================

/// Request-scoped address resolver.
///
/// Wraps a shared [`Geocoder`] with bounded retries, a bounded fan-out and a
/// cache keyed by normalized address. Create one per optimize call.
pub struct GeocodingResolver {
    geocoder: Arc<dyn Geocoder>,
    retry: RetryPolicy,
    max_concurrency: usize,
    cache: parking_lot::Mutex<HashMap<String, Result<Point, GeocodeError>>>,
}

impl GeocodingResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, retry: RetryPolicy, max_concurrency: usize) -> Self {
        Self {
            geocoder,
            retry,
            max_concurrency: max_concurrency.max(1),
            cache: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Resolve one address to a point
    pub async fn resolve(&self, address: &str) -> Result<Point, GeocodeError> {
        let key = normalize_address(address);
        if key.is_empty() {
            return Err(GeocodeError::EmptyAddress);
        }

        if let Some(cached) = self.cache.lock().get(&key) {
            debug!("Geocode cache hit for '{}'", key);
            return cached.clone();
        }

        let geocoder = &self.geocoder;
        let query = address.trim();
        let result = self
            .retry
            .run("geocode", move || geocoder.geocode(query), GeocodeError::is_transient)
            .await
            .map(|r| Point::new(r.coordinates, Some(r.display_name)));

        if let Err(e) = &result {
            debug!("Could not geocode '{}': {}", query, e);
        }

        self.cache.lock().insert(key, result.clone());
        result
    }

    /// Resolve many addresses concurrently; results follow input order.
    ///
    /// Each distinct normalized address is looked up once.
    pub async fn resolve_all(&self, addresses: &[String]) -> Vec<Result<Point, GeocodeError>> {
        // Owned pairs keep the future `Send` for `tokio::spawn`
        let mut unique: Vec<(String, String)> = Vec::new();
        for address in addresses {
            let key = normalize_address(address);
            if !unique.iter().any(|(k, _)| *k == key) {
                unique.push((key, address.clone()));
            }
        }

        let this = self;
        let resolved: HashMap<String, Result<Point, GeocodeError>> = stream::iter(unique)
            .map(|(key, address)| async move {
                let result = this.resolve(&address).await;
                (key, result)
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        addresses
            .iter()
            .map(|address| {
                resolved
                    .get(&normalize_address(address))
                    .cloned()
                    .unwrap_or(Err(GeocodeError::EmptyAddress))
            })
            .collect()
    }
}
