//! Offline GeoIP lookups using a MaxMind GeoLite2 City database

use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use tracing::{info, warn};

use crate::records::GeoLookup;

/// GeoIP reader wrapper. A missing or unreadable database disables offline
/// lookups instead of failing the run.
pub struct GeoDb {
    reader: Option<Reader<Vec<u8>>>,
}

impl GeoDb {
    /// Create a new GeoDb instance, loading the database if available
    pub fn open(database_path: &str) -> Self {
        let path = Path::new(database_path);

        if !path.exists() {
            warn!("GeoIP database not found at: {}", database_path);
            warn!(
                "Download GeoLite2-City.mmdb from MaxMind and place it at: {}",
                database_path
            );
            return Self { reader: None };
        }

        match Reader::open_readfile(path) {
            Ok(reader) => {
                info!("GeoIP database loaded: {}", database_path);
                Self {
                    reader: Some(reader),
                }
            }
            Err(e) => {
                warn!("Failed to load GeoIP database: {}", e);
                Self { reader: None }
            }
        }
    }

    /// Check if the GeoIP database is loaded
    pub fn is_available(&self) -> bool {
        self.reader.is_some()
    }

    /// Look up an address and return its geo metadata, or `None` when the
    /// database is unavailable or has no record for the address.
    pub fn lookup(&self, addr: IpAddr) -> Option<GeoLookup> {
        let reader = self.reader.as_ref()?;

        let result = reader.lookup(addr).ok()?;
        if !result.has_data() {
            return None;
        }
        let city: geoip2::City = match result.decode() {
            Ok(Some(city)) => city,
            _ => return None,
        };

        Some(GeoLookup {
            latitude: city.location.latitude.unwrap_or_default(),
            longitude: city.location.longitude.unwrap_or_default(),
            continent: city
                .continent
                .names
                .english
                .or(city.continent.code)
                .unwrap_or_default()
                .to_string(),
            country_iso_code: city.country.iso_code.unwrap_or_default().to_string(),
            country_name: city.country.names.english.unwrap_or_default().to_string(),
            subdivisions: city
                .subdivisions
                .iter()
                .filter_map(|s| s.names.english.map(str::to_string))
                .collect(),
            timezone: city.location.time_zone.unwrap_or_default().to_string(),
            postal_code: city.postal.code.unwrap_or_default().to_string(),
            city: city.city.names.english.unwrap_or_default().to_string(),
        })
    }
}

/// Check if an IP address is private/reserved/local. These ranges carry no
/// geographic meaning and must never reach a database or API lookup.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private()
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_documentation()
                || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            let segments = ipv6.segments();
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                // unique local fc00::/7
                || (segments[0] & 0xfe00) == 0xfc00
                // link local fe80::/10
                || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}
