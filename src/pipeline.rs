//! Log aggregation pipeline
//!
//! Streams the input file line by line, classifies each line, resolves
//! geolocation through the injected resolver, and assembles the collection
//! in file order together with summary counters. The aggregator itself
//! performs no database or network calls.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::geoip::GeoResolve;
use crate::parser::{Classifier, YearInference};
use crate::records::{LogCollection, LoginAttempt};

/// Counters reported after every run so dropped lines and unresolved
/// addresses are never silent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub lines_read: u64,
    pub lines_parsed: u64,
    pub lines_dropped: u64,
    pub unique_ips: u64,
    pub unresolved_ips: u64,
}

#[derive(Debug)]
pub struct AggregateOutput {
    pub collection: LogCollection,
    pub summary: RunSummary,
}

/// Run the full aggregation pass over one auth log.
///
/// Failure to open or read the input is fatal; unparseable lines are counted
/// and skipped.
pub async fn aggregate<R>(
    path: &Path,
    resolver: &mut R,
    year_override: Option<i32>,
) -> Result<AggregateOutput>
where
    R: GeoResolve + ?Sized,
{
    let classifier = Classifier::new();
    let mut years = YearInference::new(base_year(path, year_override).await);

    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let mut collection = LogCollection::default();
    let mut summary = RunSummary::default();
    let mut seen_ips: HashSet<String> = HashSet::new();
    let mut unresolved_ips: HashSet<String> = HashSet::new();

    while let Some(line) = lines
        .next_line()
        .await
        .with_context(|| format!("failed to read from log file {}", path.display()))?
    {
        summary.lines_read += 1;

        let Some(parsed) = classifier.parse(&line) else {
            summary.lines_dropped += 1;
            continue;
        };
        let Some(fields) = parsed.event.attempt_fields() else {
            summary.lines_dropped += 1;
            continue;
        };
        let Some(timestamp) = years.resolve(&parsed.timestamp) else {
            debug!(line = %line, "dropping line with unparseable timestamp");
            summary.lines_dropped += 1;
            continue;
        };

        let geo = resolver.resolve(&fields.ip).await;
        seen_ips.insert(fields.ip.clone());
        if geo.is_unresolved() {
            unresolved_ips.insert(fields.ip.clone());
        }

        collection.push(LoginAttempt {
            timestamp,
            valid_login_attempt: fields.valid_login_attempt,
            username_is_valid: fields.username_is_valid,
            username: fields.username,
            ip_address: fields.ip,
            port: fields.port,
            geo,
        });
        summary.lines_parsed += 1;
    }

    summary.unique_ips = seen_ips.len() as u64;
    summary.unresolved_ips = unresolved_ips.len() as u64;

    info!(
        read = summary.lines_read,
        parsed = summary.lines_parsed,
        dropped = summary.lines_dropped,
        unique_ips = summary.unique_ips,
        unresolved_ips = summary.unresolved_ips,
        "aggregation complete"
    );

    Ok(AggregateOutput {
        collection,
        summary,
    })
}

/// Base year for syslog timestamps: explicit override, else the input file's
/// mtime year, else the current year.
async fn base_year(path: &Path, year_override: Option<i32>) -> i32 {
    if let Some(year) = year_override {
        return year;
    }
    match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => DateTime::<Utc>::from(modified).year(),
        Err(e) => {
            warn!(error = %e, "cannot read log file mtime, assuming the current year");
            Utc::now().year()
        }
    }
}
