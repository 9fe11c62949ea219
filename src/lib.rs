//! sshgeo library: SSH auth-log parsing and geolocation enrichment
//!
//! Turns an sshd authentication log into an ordered, geolocated dataset:
//! each line is classified into a typed login-attempt event, every unique
//! source address is resolved at most once through a memoizing GeoIP
//! resolver, and the result persists as SQLite tables and/or JSON Lines for
//! downstream tabular analysis.

pub mod config;
pub mod dataset;
pub mod db;
pub mod geoip;
pub mod parser;
pub mod pipeline;
pub mod records;

// Re-export public API
pub use config::Config;
pub use pipeline::{aggregate, AggregateOutput, RunSummary};
pub use records::{GeoLookup, LogCollection, LoginAttempt};
