/// Extra minutes added to every travel leg
pub const DEFAULT_TRAVEL_BUFFER_MINUTES: u32 = 10;

/// Extra minutes between arrival and start of service
pub const DEFAULT_STOP_BUFFER_MINUTES: u32 = 5;

/// Outbound provider calls in flight per optimize call
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const MAX_CONCURRENCY_LIMIT: usize = 8;

/// Retries after the first failed provider call
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BASE_MS: u64 = 250;

/// Speed assumed by the straight-line fallback
pub const DEFAULT_FALLBACK_SPEED_KMH: f64 = 40.0;
