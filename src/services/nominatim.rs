//! Nominatim geocoding client

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::error::GeocodeError;
use crate::types::Coordinates;

/// Candidates requested per search; enough to detect ambiguity
pub const SEARCH_LIMIT: usize = 3;

/// Nominatim API response
#[derive(Debug, Deserialize)]
pub struct NominatimResult {
    pub lat: String,
    pub lon: String,
    pub display_name: String,
    #[serde(default)]
    pub importance: Option<f64>,
}

/// A parsed search hit
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeCandidate {
    pub coordinates: Coordinates,
    pub importance: Option<f64>,
    pub display_name: String,
}

impl TryFrom<NominatimResult> for GeocodeCandidate {
    type Error = anyhow::Error;

    fn try_from(result: NominatimResult) -> Result<Self> {
        let lat: f64 = result.lat.parse().context("Invalid latitude")?;
        let lng: f64 = result.lon.parse().context("Invalid longitude")?;
        Ok(Self {
            coordinates: Coordinates { lat, lng },
            importance: result.importance,
            display_name: result.display_name,
        })
    }
}

/// Nominatim geocoding client
pub struct NominatimClient {
    base_url: String,
    client: reqwest::Client,
}

impl NominatimClient {
    /// Create a new client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("ItineraryPlanner/0.1")
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn search_url(&self, address: &str) -> String {
        format!(
            "{}/search?q={}&format=json&limit={}",
            self.base_url,
            urlencoding::encode(address),
            SEARCH_LIMIT
        )
    }

    /// Free-text search. An empty list means nothing matched.
    pub async fn search(&self, address: &str) -> Result<Vec<GeocodeCandidate>, GeocodeError> {
        let url = self.search_url(address);

        let response = self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeocodeError::ProviderUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::ProviderUnavailable(format!("Nominatim returned {}", status)));
        }

        let results: Vec<NominatimResult> = response
            .json()
            .await
            .map_err(|e| GeocodeError::ProviderUnavailable(format!("unreadable response: {}", e)))?;

        debug!("Nominatim returned {} candidates", results.len());

        // Unparseable rows are skipped rather than failing the lookup
        Ok(results
            .into_iter()
            .filter_map(|r| GeocodeCandidate::try_from(r).ok())
            .collect())
    }
}
