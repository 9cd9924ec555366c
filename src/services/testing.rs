//! Deterministic provider doubles for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{GeocodeError, RoutingError};
use crate::services::geocoding::{normalize_address, Geocoder, GeocodingResult};
use crate::services::routing::{DistanceTimeMatrices, LegRoute, MockRoutingService, RoutingService};
use crate::types::Coordinates;

/// Geocoder answering from a fixed address book
pub struct ScriptedGeocoder {
    book: HashMap<String, Result<Coordinates, GeocodeError>>,
    outages_left: AtomicU32,
    calls: AtomicU32,
}

impl ScriptedGeocoder {
    pub fn new() -> Self {
        Self {
            book: HashMap::new(),
            outages_left: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_address(mut self, address: &str, coordinates: Coordinates) -> Self {
        self.book.insert(normalize_address(address), Ok(coordinates));
        self
    }

    pub fn with_error(mut self, address: &str, error: GeocodeError) -> Self {
        self.book.insert(normalize_address(address), Err(error));
        self
    }

    /// The first `n` calls fail with `ProviderUnavailable`
    pub fn failing_first(self, n: u32) -> Self {
        self.outages_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for ScriptedGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeocodingResult, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let outage = self
            .outages_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if outage {
            return Err(GeocodeError::ProviderUnavailable("scripted outage".to_string()));
        }

        match self.book.get(&normalize_address(address)) {
            Some(Ok(coordinates)) => Ok(GeocodingResult {
                coordinates: *coordinates,
                confidence: 1.0,
                display_name: address.trim().to_string(),
            }),
            Some(Err(e)) => Err(e.clone()),
            None => Err(GeocodeError::NotFound),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Routing backend that is never reachable
pub struct UnreachableRoutingService {
    leg_calls: AtomicU32,
    matrix_calls: AtomicU32,
}

impl UnreachableRoutingService {
    pub fn new() -> Self {
        Self {
            leg_calls: AtomicU32::new(0),
            matrix_calls: AtomicU32::new(0),
        }
    }

    pub fn leg_calls(&self) -> u32 {
        self.leg_calls.load(Ordering::SeqCst)
    }

    pub fn matrix_calls(&self) -> u32 {
        self.matrix_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoutingService for UnreachableRoutingService {
    async fn get_matrices(&self, _: &[Coordinates], _: bool) -> Result<DistanceTimeMatrices, RoutingError> {
        self.matrix_calls.fetch_add(1, Ordering::SeqCst);
        Err(RoutingError::Unreachable("connection refused".to_string()))
    }

    async fn route_leg(&self, _: &Coordinates, _: &Coordinates, _: bool) -> Result<LegRoute, RoutingError> {
        self.leg_calls.fetch_add(1, Ordering::SeqCst);
        Err(RoutingError::Unreachable("connection refused".to_string()))
    }

    fn name(&self) -> &str {
        "Unreachable"
    }
}

/// Mock routing whose first `n` calls fail with HTTP 503
pub struct FlakyRoutingService {
    inner: MockRoutingService,
    failures_left: AtomicU32,
}

impl FlakyRoutingService {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: MockRoutingService::new(),
            failures_left: AtomicU32::new(failures),
        }
    }

    fn fail_now(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn outage() -> RoutingError {
        RoutingError::Status {
            status: 503,
            body: "busy".to_string(),
        }
    }
}

#[async_trait]
impl RoutingService for FlakyRoutingService {
    async fn get_matrices(&self, locations: &[Coordinates], traffic: bool) -> Result<DistanceTimeMatrices, RoutingError> {
        if self.fail_now() {
            return Err(Self::outage());
        }
        self.inner.get_matrices(locations, traffic).await
    }

    async fn route_leg(&self, from: &Coordinates, to: &Coordinates, traffic: bool) -> Result<LegRoute, RoutingError> {
        if self.fail_now() {
            return Err(Self::outage());
        }
        self.inner.route_leg(from, to, traffic).await
    }

    fn name(&self) -> &str {
        "Flaky"
    }
}

/// Routes single legs but reports no route for any matrix pair
pub struct NoMatrixRoutesService {
    inner: MockRoutingService,
}

impl NoMatrixRoutesService {
    pub fn new() -> Self {
        Self { inner: MockRoutingService::new() }
    }
}

#[async_trait]
impl RoutingService for NoMatrixRoutesService {
    async fn get_matrices(&self, locations: &[Coordinates], _: bool) -> Result<DistanceTimeMatrices, RoutingError> {
        let n = locations.len();
        let diagonal = |i: usize, j: usize| if i == j { Some(0) } else { None };
        Ok(DistanceTimeMatrices {
            distances: (0..n).map(|i| (0..n).map(|j| diagonal(i, j)).collect()).collect(),
            durations: (0..n).map(|i| (0..n).map(|j| diagonal(i, j)).collect()).collect(),
            size: n,
        })
    }

    async fn route_leg(&self, from: &Coordinates, to: &Coordinates, traffic: bool) -> Result<LegRoute, RoutingError> {
        self.inner.route_leg(from, to, traffic).await
    }

    fn name(&self) -> &str {
        "NoMatrixRoutes"
    }
}

/// Mock routing that takes `delay` to answer anything
pub struct SlowRoutingService {
    inner: MockRoutingService,
    delay: Duration,
}

impl SlowRoutingService {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MockRoutingService::new(),
            delay,
        }
    }
}

#[async_trait]
impl RoutingService for SlowRoutingService {
    async fn get_matrices(&self, locations: &[Coordinates], traffic: bool) -> Result<DistanceTimeMatrices, RoutingError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_matrices(locations, traffic).await
    }

    async fn route_leg(&self, from: &Coordinates, to: &Coordinates, traffic: bool) -> Result<LegRoute, RoutingError> {
        tokio::time::sleep(self.delay).await;
        self.inner.route_leg(from, to, traffic).await
    }

    fn name(&self) -> &str {
        "Slow"
    }
}

/// Counts concurrent calls and remembers the peak
#[derive(Default)]
pub struct InFlight {
    current: AtomicU32,
    peak: AtomicU32,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> u32 {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Mock routing whose leg latency depends on the destination, so later legs
/// can finish before earlier ones
pub struct StaggeredRoutingService {
    inner: MockRoutingService,
    delay_for: fn(&Coordinates) -> Duration,
    pub in_flight: InFlight,
}

impl StaggeredRoutingService {
    pub fn new(delay_for: fn(&Coordinates) -> Duration) -> Self {
        Self {
            inner: MockRoutingService::new(),
            delay_for,
            in_flight: InFlight::default(),
        }
    }
}

#[async_trait]
impl RoutingService for StaggeredRoutingService {
    async fn get_matrices(&self, locations: &[Coordinates], traffic: bool) -> Result<DistanceTimeMatrices, RoutingError> {
        self.inner.get_matrices(locations, traffic).await
    }

    async fn route_leg(&self, from: &Coordinates, to: &Coordinates, traffic: bool) -> Result<LegRoute, RoutingError> {
        self.in_flight.enter();
        tokio::time::sleep((self.delay_for)(to)).await;
        self.in_flight.leave();
        self.inner.route_leg(from, to, traffic).await
    }

    fn name(&self) -> &str {
        "Staggered"
    }
}

/// Geocoder with a per-address latency
pub struct StaggeredGeocoder {
    book: HashMap<String, (Coordinates, Duration)>,
    pub in_flight: InFlight,
}

impl StaggeredGeocoder {
    pub fn new() -> Self {
        Self {
            book: HashMap::new(),
            in_flight: InFlight::default(),
        }
    }

    pub fn with_address(mut self, address: &str, coordinates: Coordinates, delay: Duration) -> Self {
        self.book.insert(normalize_address(address), (coordinates, delay));
        self
    }
}

#[async_trait]
impl Geocoder for StaggeredGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeocodingResult, GeocodeError> {
        let (coordinates, delay) = *self.book.get(&normalize_address(address)).ok_or(GeocodeError::NotFound)?;

        self.in_flight.enter();
        tokio::time::sleep(delay).await;
        self.in_flight.leave();

        Ok(GeocodingResult {
            coordinates,
            confidence: 1.0,
            display_name: address.trim().to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "staggered"
    }
}
