//! JSON Lines serialization of a log collection
//!
//! The language-agnostic export form downstream notebooks and dashboards
//! consume: one JSON object per attempt with its geolocation embedded.
//! Fields serialize in declaration order, so equal collections produce
//! byte-identical files.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::records::{LogCollection, LoginAttempt};

pub async fn write_jsonl(path: &Path, collection: &LogCollection) -> Result<()> {
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("failed to create dataset file {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for attempt in collection.iter() {
        let mut line = serde_json::to_vec(attempt)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Materialize a previously exported dataset.
pub async fn read_jsonl(path: &Path) -> Result<LogCollection> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open dataset file {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let mut collection = LogCollection::default();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let attempt: LoginAttempt = serde_json::from_str(&line)
            .with_context(|| format!("invalid record on line {line_no} of {}", path.display()))?;
        collection.push(attempt);
    }
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::GeoLookup;
    use chrono::DateTime;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn collection() -> LogCollection {
        let geo = Arc::new(GeoLookup {
            latitude: 48.85,
            longitude: 2.35,
            continent: "Europe".to_string(),
            country_iso_code: "FR".to_string(),
            country_name: "France".to_string(),
            subdivisions: vec!["Ile-de-France".to_string(), "Paris".to_string()],
            timezone: "Europe/Paris".to_string(),
            postal_code: "75001".to_string(),
            city: "Paris".to_string(),
        });
        let mut collection = LogCollection::default();
        for (i, user) in ["admin", "root", ""].iter().enumerate() {
            collection.push(LoginAttempt {
                timestamp: DateTime::from_timestamp(1_641_784_462 + i as i64, 42).unwrap(),
                valid_login_attempt: false,
                username_is_valid: false,
                username: user.to_string(),
                ip_address: "203.0.113.5".to_string(),
                port: 54321,
                geo: geo.clone(),
            });
        }
        collection
    }

    #[tokio::test]
    async fn jsonl_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("attempts.jsonl");
        let original = collection();

        write_jsonl(&path, &original).await.unwrap();
        let loaded = read_jsonl(&path).await.unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn identical_collections_serialize_to_identical_bytes() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.jsonl");
        let second = dir.path().join("b.jsonl");
        let original = collection();

        write_jsonl(&first, &original).await.unwrap();
        write_jsonl(&second, &original).await.unwrap();

        let a = std::fs::read(&first).unwrap();
        let b = std::fs::read(&second).unwrap();
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn empty_collection_writes_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.jsonl");
        write_jsonl(&path, &LogCollection::default()).await.unwrap();
        let loaded = read_jsonl(&path).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let err = read_jsonl(Path::new("/nonexistent/attempts.jsonl"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/attempts.jsonl"));
    }
}
