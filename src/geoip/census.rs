//! FCC census area API client
//!
//! Refines coarse GeoIP results for US addresses into named state/county
//! subdivisions (FIPS-coded regions). Remote calls carry a per-request
//! timeout and a capped exponential backoff with a bounded attempt count; the
//! caller keeps the offline-only result when refinement fails.

use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use super::ResolveError;
use crate::config::CensusConfig;

const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// One census area record as returned by the API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CensusArea {
    #[serde(default)]
    pub county_fips: String,
    #[serde(default)]
    pub county_name: String,
    #[serde(default)]
    pub state_fips: String,
    #[serde(default)]
    pub state_code: String,
    #[serde(default)]
    pub state_name: String,
}

impl CensusArea {
    /// Subdivision names, coarse to fine.
    pub fn subdivisions(&self) -> Vec<String> {
        [&self.state_name, &self.county_name]
            .into_iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct CensusResponse {
    #[serde(default)]
    results: Vec<CensusArea>,
}

pub struct CensusClient {
    http: reqwest::Client,
    endpoint: String,
    max_retries: usize,
    backoff_base_ms: u64,
}

impl CensusClient {
    pub fn new(config: &CensusConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
        })
    }

    /// Look up the census area containing the given coordinates.
    ///
    /// `Ok(None)` means the API answered but has no area for the point (e.g.
    /// offshore coordinates); errors mean the bounded retries ran out.
    pub async fn area(&self, lat: f64, lon: f64) -> Result<Option<CensusArea>, ResolveError> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.backoff_base_ms)
            .max_delay(MAX_BACKOFF)
            .map(jitter)
            .take(self.max_retries);

        let response = Retry::spawn(strategy, || self.fetch(lat, lon))
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResolveError::Timeout
                } else {
                    ResolveError::Exhausted(e.to_string())
                }
            })?;

        Ok(response.results.into_iter().next())
    }

    async fn fetch(&self, lat: f64, lon: f64) -> Result<CensusResponse, reqwest::Error> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("lat", lat), ("lon", lon)])
            .query(&[("format", "json")])
            .send()
            .await?;
        response.error_for_status()?.json::<CensusResponse>().await
    }
}
