//! Record types shared across the pipeline

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geographic metadata for a source IP address.
///
/// All string fields default to the empty string and both coordinates default
/// to 0.0 when a lookup fails or is skipped; consumers treat the default value
/// as "unknown". One `GeoLookup` is shared (via `Arc`) by every attempt
/// originating from the same address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLookup {
    pub latitude: f64,
    pub longitude: f64,
    pub continent: String,
    pub country_iso_code: String,
    pub country_name: String,
    /// Administrative subdivisions, coarse to fine (e.g. state, county).
    pub subdivisions: Vec<String>,
    pub timezone: String,
    pub postal_code: String,
    pub city: String,
}

impl GeoLookup {
    /// True when every field still holds its default value.
    pub fn is_unresolved(&self) -> bool {
        *self == GeoLookup::default()
    }
}

/// One inbound SSH authentication event, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginAttempt {
    #[serde(with = "epoch_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub valid_login_attempt: bool,
    pub username_is_valid: bool,
    /// Attacker-controlled; may be empty and may contain spaces.
    pub username: String,
    pub ip_address: String,
    /// 0 when the source line carried no port.
    pub port: u16,
    pub geo: Arc<GeoLookup>,
}

/// Ordered collection of attempts; insertion order matches the source file.
#[derive(Debug, Default, PartialEq)]
pub struct LogCollection {
    pub attempts: Vec<LoginAttempt>,
}

impl LogCollection {
    pub fn push(&mut self, attempt: LoginAttempt) {
        self.attempts.push(attempt);
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LoginAttempt> {
        self.attempts.iter()
    }
}

/// Serializes timestamps as `{"secs": .., "nanos": ..}` since the Unix epoch,
/// UTC-normalized, so no precision is lost across the persistence boundary.
pub mod epoch_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Epoch {
        secs: i64,
        nanos: u32,
    }

    pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Epoch {
            secs: timestamp.timestamp(),
            nanos: timestamp.timestamp_subsec_nanos(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let epoch = Epoch::deserialize(deserializer)?;
        DateTime::from_timestamp(epoch.secs, epoch.nanos)
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}
