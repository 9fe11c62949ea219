//! Database schema definitions

pub const CREATE_ATTEMPTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS login_attempts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts_secs BIGINT NOT NULL,
    ts_nanos INTEGER NOT NULL DEFAULT 0,
    valid_login_attempt BOOLEAN NOT NULL,
    username_is_valid BOOLEAN NOT NULL,
    username TEXT NOT NULL,
    ip TEXT NOT NULL,
    port INTEGER NOT NULL DEFAULT 0,
    latitude REAL NOT NULL DEFAULT 0,
    longitude REAL NOT NULL DEFAULT 0,
    continent TEXT NOT NULL DEFAULT '',
    country_iso_code TEXT NOT NULL DEFAULT '',
    country_name TEXT NOT NULL DEFAULT '',
    subdivisions TEXT NOT NULL DEFAULT '[]',  -- JSON: ["California", "San Francisco"]
    timezone TEXT NOT NULL DEFAULT '',
    postal_code TEXT NOT NULL DEFAULT '',
    city TEXT NOT NULL DEFAULT ''
)
"#;

// Resolver cache persisted across runs, keyed by normalized address text
pub const CREATE_GEO_CACHE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS geo_cache (
    ip TEXT PRIMARY KEY,
    latitude REAL NOT NULL DEFAULT 0,
    longitude REAL NOT NULL DEFAULT 0,
    continent TEXT NOT NULL DEFAULT '',
    country_iso_code TEXT NOT NULL DEFAULT '',
    country_name TEXT NOT NULL DEFAULT '',
    subdivisions TEXT NOT NULL DEFAULT '[]',
    timezone TEXT NOT NULL DEFAULT '',
    postal_code TEXT NOT NULL DEFAULT '',
    city TEXT NOT NULL DEFAULT ''
)
"#;

// For time-range queries
pub const CREATE_INDEX_TS: &str =
    "CREATE INDEX IF NOT EXISTS idx_attempts_ts ON login_attempts(ts_secs)";

// For per-source aggregation
pub const CREATE_INDEX_IP: &str =
    "CREATE INDEX IF NOT EXISTS idx_attempts_ip ON login_attempts(ip)";

// For attack-geography aggregation
pub const CREATE_INDEX_COUNTRY: &str =
    "CREATE INDEX IF NOT EXISTS idx_attempts_country ON login_attempts(country_iso_code)";
