//! Database module
//!
//! SQLite persistence for the enriched dataset and the geo cache. The
//! attempts table flattens each record's geolocation into columns so
//! downstream tools can query it without re-parsing anything.

mod schema;

use anyhow::Result;
use chrono::DateTime;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::records::{GeoLookup, LogCollection, LoginAttempt};

// Rows per insert transaction
const INSERT_BATCH_SIZE: usize = 100;

#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.url)).await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        // Enable WAL mode for better concurrency
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        for statement in [
            schema::CREATE_ATTEMPTS_TABLE,
            schema::CREATE_GEO_CACHE_TABLE,
            schema::CREATE_INDEX_TS,
            schema::CREATE_INDEX_IP,
            schema::CREATE_INDEX_COUNTRY,
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert a whole collection, batched into transactions.
    pub async fn insert_attempts(&self, collection: &LogCollection) -> Result<()> {
        for chunk in collection.attempts.chunks(INSERT_BATCH_SIZE) {
            let mut tx = self.pool.begin().await?;
            for attempt in chunk {
                let subdivisions = serde_json::to_string(&attempt.geo.subdivisions)?;
                sqlx::query(
                    r#"
                    INSERT INTO login_attempts
                        (ts_secs, ts_nanos, valid_login_attempt, username_is_valid, username, ip, port,
                         latitude, longitude, continent, country_iso_code, country_name, subdivisions,
                         timezone, postal_code, city)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(attempt.timestamp.timestamp())
                .bind(attempt.timestamp.timestamp_subsec_nanos() as i64)
                .bind(attempt.valid_login_attempt)
                .bind(attempt.username_is_valid)
                .bind(&attempt.username)
                .bind(&attempt.ip_address)
                .bind(attempt.port as i32)
                .bind(attempt.geo.latitude)
                .bind(attempt.geo.longitude)
                .bind(&attempt.geo.continent)
                .bind(&attempt.geo.country_iso_code)
                .bind(&attempt.geo.country_name)
                .bind(&subdivisions)
                .bind(&attempt.geo.timezone)
                .bind(&attempt.geo.postal_code)
                .bind(&attempt.geo.city)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }
        Ok(())
    }

    /// Reload the full dataset in insertion order (the materializer path).
    pub async fn load_attempts(&self) -> Result<LogCollection> {
        type Row = (
            i64,
            i64,
            bool,
            bool,
            String,
            String,
            i32,
            f64,
            f64,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
        );
        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT ts_secs, ts_nanos, valid_login_attempt, username_is_valid, username, ip, port,
                   latitude, longitude, continent, country_iso_code, country_name, subdivisions,
                   timezone, postal_code, city
            FROM login_attempts
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut collection = LogCollection::default();
        for (
            ts_secs,
            ts_nanos,
            valid_login_attempt,
            username_is_valid,
            username,
            ip,
            port,
            latitude,
            longitude,
            continent,
            country_iso_code,
            country_name,
            subdivisions,
            timezone,
            postal_code,
            city,
        ) in rows
        {
            collection.push(LoginAttempt {
                timestamp: DateTime::from_timestamp(ts_secs, ts_nanos as u32).unwrap_or_default(),
                valid_login_attempt,
                username_is_valid,
                username,
                ip_address: ip,
                port: port as u16,
                geo: Arc::new(GeoLookup {
                    latitude,
                    longitude,
                    continent,
                    country_iso_code,
                    country_name,
                    subdivisions: serde_json::from_str(&subdivisions).unwrap_or_default(),
                    timezone,
                    postal_code,
                    city,
                }),
            });
        }
        Ok(collection)
    }

    pub async fn count_attempts(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM login_attempts")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Load the persisted resolver cache from earlier runs.
    pub async fn load_geo_cache(&self) -> Result<Vec<(String, GeoLookup)>> {
        type Row = (
            String,
            f64,
            f64,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
        );
        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT ip, latitude, longitude, continent, country_iso_code, country_name,
                   subdivisions, timezone, postal_code, city
            FROM geo_cache
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    ip,
                    latitude,
                    longitude,
                    continent,
                    country_iso_code,
                    country_name,
                    subdivisions,
                    timezone,
                    postal_code,
                    city,
                )| {
                    (
                        ip,
                        GeoLookup {
                            latitude,
                            longitude,
                            continent,
                            country_iso_code,
                            country_name,
                            subdivisions: serde_json::from_str(&subdivisions).unwrap_or_default(),
                            timezone,
                            postal_code,
                            city,
                        },
                    )
                },
            )
            .collect())
    }

    /// Upsert freshly resolved cache entries.
    pub async fn save_geo_cache(&self, entries: &[(String, Arc<GeoLookup>)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (ip, geo) in entries {
            let subdivisions = serde_json::to_string(&geo.subdivisions)?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO geo_cache
                    (ip, latitude, longitude, continent, country_iso_code, country_name,
                     subdivisions, timezone, postal_code, city)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(ip)
            .bind(geo.latitude)
            .bind(geo.longitude)
            .bind(&geo.continent)
            .bind(&geo.country_iso_code)
            .bind(&geo.country_name)
            .bind(&subdivisions)
            .bind(&geo.timezone)
            .bind(&geo.postal_code)
            .bind(&geo.city)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
