//! Error taxonomy for route optimization
//!
//! Only [`OptimizeError`] ever escapes an optimize call. Geocoding and
//! routing failures are absorbed by the pipeline and expressed as warnings
//! or approximate legs.

use thiserror::Error;

/// Terminal errors of an optimize call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptimizeError {
    /// Malformed or incomplete request; nothing was attempted
    #[error("invalid request: {0}")]
    Validation(String),

    /// Caller cancelled the plan or its deadline elapsed
    #[error("route optimization was cancelled")]
    Cancelled,
}

impl OptimizeError {
    pub fn validation(message: impl Into<String>) -> Self {
        OptimizeError::Validation(message.into())
    }

    /// Wire error code for `ErrorResponse`
    pub const fn code(&self) -> &'static str {
        match self {
            OptimizeError::Validation(_) => "VALIDATION_ERROR",
            OptimizeError::Cancelled => "CANCELLED",
        }
    }
}

/// Per-address geocoding failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeError {
    #[error("address is empty")]
    EmptyAddress,

    #[error("address not found")]
    NotFound,

    #[error("address is ambiguous ({candidates} plausible matches)")]
    Ambiguous { candidates: usize },

    #[error("geocoding provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl GeocodeError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, GeocodeError::ProviderUnavailable(_))
    }
}

/// Per-leg routing provider failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("routing provider unreachable: {0}")]
    Unreachable(String),

    #[error("routing provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no route found between the requested points")]
    NoRoute,

    #[error("invalid routing response: {0}")]
    InvalidResponse(String),
}

impl RoutingError {
    /// Network failures, rate limiting and server errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            RoutingError::Unreachable(_) => true,
            RoutingError::Status { status, .. } => *status == 429 || *status >= 500,
            RoutingError::NoRoute | RoutingError::InvalidResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for RoutingError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RoutingError::InvalidResponse(e.to_string())
        } else {
            RoutingError::Unreachable(e.to_string())
        }
    }
}
