//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub geoip: GeoIpConfig,
    pub census: CensusConfig,
    pub database: DatabaseConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeoIpConfig {
    /// Path to a GeoLite2-City.mmdb file.
    pub database: String,
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            database: "GeoLite2-City.mmdb".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CensusConfig {
    /// Refine US results into state/county subdivisions via the census API.
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Retries after the first attempt; on exhaustion the offline-only
    /// result is kept.
    pub max_retries: usize,
    pub backoff_base_ms: u64,
}

impl Default for CensusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://geo.fcc.gov/api/census/area".to_string(),
            timeout_secs: 8,
            max_retries: 3,
            backoff_base_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file holding the attempts table and the persisted geo cache.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sshgeo.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Optional JSONL dataset export path.
    pub dataset: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit file, or from `config.toml` when
    /// present, with `SSHGEO_*` environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let builder = match path {
            Some(p) => config::Config::builder().add_source(config::File::from(p.to_path_buf())),
            None => config::Config::builder()
                .add_source(config::File::with_name("config.toml").required(false)),
        };

        let settings = builder
            .add_source(config::Environment::with_prefix("SSHGEO").separator("__"))
            .build()?;
        let config: Config = settings.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.geoip.database.is_empty() {
            anyhow::bail!("GeoIP database path cannot be empty");
        }

        if self.census.enabled {
            if self.census.endpoint.is_empty() {
                anyhow::bail!("Census endpoint cannot be empty when census refinement is enabled");
            }
            if self.census.timeout_secs == 0 {
                anyhow::bail!("Census timeout must be at least 1 second");
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid logging level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.census.enabled);
        assert_eq!(config.database.url, "sshgeo.db");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn rejects_bad_logging_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_database_url() {
        let mut config = Config::default();
        config.database.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_census_timeout_when_enabled() {
        let mut config = Config::default();
        config.census.enabled = true;
        config.census.timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
