//! File-backed source adapter
//!
//! Reads a JSON array exported by an external scraper. Field names follow the
//! scrapers' spreadsheet headings (`SKU`, `Name`, `Brand`, ...) but lowercase
//! variants are accepted too, as are numbers where text is expected.

use crate::error::SourceError;
use crate::services::identifiers::normalize_identifier;
use crate::types::{RawObservation, SourceAdapter};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ExportRecord {
    #[serde(
        alias = "SKU",
        alias = "sku",
        alias = "Identifier",
        alias = "UPC",
        alias = "upc",
        deserialize_with = "lenient_string"
    )]
    identifier: String,
    #[serde(default, alias = "Name", deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, alias = "Brand", deserialize_with = "lenient_string")]
    brand: String,
    #[serde(default, alias = "Weight", deserialize_with = "lenient_string")]
    weight: String,
    #[serde(default, alias = "Price", deserialize_with = "lenient_string")]
    price: String,
    #[serde(
        default,
        alias = "Images",
        alias = "image_references",
        deserialize_with = "lenient_list"
    )]
    images: Vec<String>,
    #[serde(
        default,
        alias = "CrossSell",
        alias = "cross_sell",
        alias = "Cross Sell",
        deserialize_with = "lenient_list"
    )]
    cross_sell: Vec<String>,
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(&Value::deserialize(deserializer)?))
}

/// Array of values, or one string separated by `,` or `|`
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = match Value::deserialize(deserializer)? {
        Value::Array(items) => items.iter().map(value_to_string).collect(),
        Value::String(s) => s.split([',', '|']).map(|v| v.trim().to_string()).collect(),
        Value::Null => Vec::new(),
        other => vec![value_to_string(&other)],
    };
    Ok(values.into_iter().filter(|v| !v.is_empty()).collect())
}

/// Source adapter over a scraper's JSON export
pub struct JsonFileSource {
    name: String,
    path: PathBuf,
    records: RwLock<HashMap<String, Vec<RawObservation>>>,
}

impl JsonFileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Source name derived from the file stem (`chewy.json` → `chewy`)
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "json".to_string());
        Self::new(name, path)
    }

    fn parse(&self, content: &str) -> Result<HashMap<String, Vec<RawObservation>>, SourceError> {
        let records: Vec<ExportRecord> = serde_json::from_str(content).map_err(|e| {
            SourceError::Unavailable(format!("{}: invalid export: {}", self.path.display(), e))
        })?;

        let mut by_identifier: HashMap<String, Vec<RawObservation>> = HashMap::new();
        for record in records {
            let identifier = normalize_identifier(&record.identifier);
            if identifier.is_empty() {
                continue;
            }
            let mut obs = RawObservation::new(identifier.clone(), self.name.clone(), record.name)
                .with_weight(record.weight)
                .with_price(record.price)
                .with_images(record.images)
                .with_cross_sell(record.cross_sell);
            if !record.brand.is_empty() {
                obs = obs.with_brand(record.brand);
            }
            by_identifier.entry(identifier).or_default().push(obs);
        }
        Ok(by_identifier)
    }
}

#[async_trait::async_trait]
impl SourceAdapter for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin_round(&self, identifiers: &[String]) -> Result<(), SourceError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SourceError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let parsed = self.parse(&content)?;
        info!(
            source = %self.name,
            records = parsed.len(),
            requested = identifiers.len(),
            "Loaded scraper export"
        );
        *self.records.write().await = parsed;
        Ok(())
    }

    async fn fetch(&self, identifier: &str) -> Result<Vec<RawObservation>, SourceError> {
        let found = self
            .records
            .read()
            .await
            .get(identifier)
            .cloned()
            .unwrap_or_default();
        debug!(source = %self.name, identifier, found = found.len(), "Fetched");
        Ok(found)
    }

    async fn end_round(&self) {
        self.records.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_export_with_mixed_headings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chewy.json");
        std::fs::write(
            &path,
            r#"[
                {"SKU": "0355-8549-9741", "Name": "Kong Classic", "Brand": "KONG",
                 "Weight": 0.5, "Price": "12.99", "Images": "a.jpg, b.jpg",
                 "CrossSell": ["012345678905"]},
                {"identifier": "012345678905", "name": "Rope Toy", "images": ["c.jpg"]}
            ]"#,
        )
        .unwrap();

        let source = JsonFileSource::from_path(&path);
        assert_eq!(source.name(), "chewy");
        source
            .begin_round(&["035585499741".to_string()])
            .await
            .unwrap();

        let found = source.fetch("035585499741").await.unwrap();
        assert_eq!(found.len(), 1);
        let obs = &found[0];
        assert_eq!(obs.source, "chewy");
        assert_eq!(obs.name, "Kong Classic");
        assert_eq!(obs.brand.as_deref(), Some("KONG"));
        assert_eq!(obs.weight, "0.5");
        assert_eq!(obs.image_references, vec!["a.jpg".to_string(), "b.jpg".to_string()]);
        assert_eq!(obs.cross_sell, vec!["012345678905".to_string()]);

        let second = source.fetch("012345678905").await.unwrap();
        assert_eq!(second[0].brand, None);

        assert!(source.fetch("999999999999").await.unwrap().is_empty());
        source.end_round().await;
        assert!(source.fetch("035585499741").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let source = JsonFileSource::new("petco", dir.path().join("missing.json"));
        assert!(matches!(
            source.begin_round(&[]).await,
            Err(SourceError::Unavailable(_))
        ));
    }
}
