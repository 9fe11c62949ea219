//! IP geolocation resolution with an instance-owned memo cache
//!
//! The resolver is injected into the aggregator behind the [`GeoResolve`]
//! trait so tests can substitute canned lookups. Every unique address is
//! resolved at most once per run; results are shared via `Arc` across all
//! attempts from the same address.

pub mod census;
pub mod db;

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use cached::{Cached, UnboundCache};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{CensusConfig, GeoIpConfig};
use crate::records::GeoLookup;
use census::CensusClient;
use db::{is_private_ip, GeoDb};

/// Resolution failures. None of these fail the run: malformed addresses and
/// exhausted remote lookups collapse to the unresolved sentinel.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("malformed IP address: {0}")]
    MalformedAddress(String),
    #[error("remote lookup timed out")]
    Timeout,
    #[error("remote lookup retries exhausted: {0}")]
    Exhausted(String),
}

/// Capability interface for mapping an IP address to geo metadata.
#[async_trait]
pub trait GeoResolve: Send {
    /// Resolve an address to shared geo metadata. Unresolvable input
    /// (malformed, private range, no coverage) yields the empty sentinel.
    async fn resolve(&mut self, ip: &str) -> Arc<GeoLookup>;
}

/// Production resolver: offline MaxMind database, optional census
/// refinement, memoized per normalized address.
pub struct CachingResolver {
    db: GeoDb,
    census: Option<CensusClient>,
    cache: UnboundCache<String, Arc<GeoLookup>>,
    /// Entries resolved during this run, pending persistence.
    fresh: Vec<(String, Arc<GeoLookup>)>,
    lookups: u64,
    unresolved: Arc<GeoLookup>,
}

impl CachingResolver {
    pub fn new(geoip: &GeoIpConfig, census: &CensusConfig) -> Result<Self> {
        let census_client = if census.enabled {
            Some(CensusClient::new(census)?)
        } else {
            None
        };
        Ok(Self {
            db: GeoDb::open(&geoip.database),
            census: census_client,
            cache: UnboundCache::new(),
            fresh: Vec::new(),
            lookups: 0,
            unresolved: Arc::new(GeoLookup::default()),
        })
    }

    /// True when the offline database loaded.
    pub fn offline_available(&self) -> bool {
        self.db.is_available()
    }

    /// Pre-populate the cache with entries persisted by earlier runs.
    pub fn warm(&mut self, entries: Vec<(String, GeoLookup)>) {
        for (ip, geo) in entries {
            self.cache.cache_set(ip, Arc::new(geo));
        }
    }

    /// Entries resolved during this run, drained for persistence.
    pub fn take_fresh(&mut self) -> Vec<(String, Arc<GeoLookup>)> {
        std::mem::take(&mut self.fresh)
    }

    /// Number of underlying database/API resolutions performed this run.
    pub fn lookup_count(&self) -> u64 {
        self.lookups
    }

    pub fn cached_ips(&self) -> usize {
        self.cache.cache_size()
    }

    async fn resolve_uncached(&mut self, addr: IpAddr) -> GeoLookup {
        self.lookups += 1;
        let mut geo = self.db.lookup(addr).unwrap_or_default();

        if let Some(census) = &self.census {
            // Refinement only makes sense for US results with coordinates.
            if geo.country_iso_code == "US" && (geo.latitude != 0.0 || geo.longitude != 0.0) {
                match census.area(geo.latitude, geo.longitude).await {
                    Ok(Some(area)) => geo.subdivisions = area.subdivisions(),
                    Ok(None) => debug!(address = %addr, "no census area for coordinates"),
                    Err(e) => {
                        warn!(address = %addr, error = %e, "census refinement failed, keeping offline result")
                    }
                }
            }
        }

        geo
    }
}

#[async_trait]
impl GeoResolve for CachingResolver {
    async fn resolve(&mut self, ip: &str) -> Arc<GeoLookup> {
        let addr: IpAddr = match ip.trim().parse() {
            Ok(addr) => addr,
            Err(_) => {
                debug!(error = %ResolveError::MalformedAddress(ip.to_string()), "skipping geolocation");
                return self.unresolved.clone();
            }
        };

        // Private/reserved ranges short-circuit before any cache or lookup.
        if is_private_ip(&addr) {
            return self.unresolved.clone();
        }

        let key = addr.to_string();
        if let Some(hit) = self.cache.cache_get(&key) {
            return hit.clone();
        }

        let geo = Arc::new(self.resolve_uncached(addr).await);
        self.cache.cache_set(key.clone(), geo.clone());
        self.fresh.push((key, geo.clone()));
        geo
    }
}
