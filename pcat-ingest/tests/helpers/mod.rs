//! Shared fixtures for pcat-ingest integration tests

#![allow(dead_code)]

use pcat_ingest::db::{init_tables, ProductStore};
use pcat_ingest::error::SourceError;
use pcat_ingest::types::{ClassificationResult, HistoricalItem, RawObservation, SourceAdapter};
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub const KONG_ID: &str = "035585499741";
pub const ROPE_ID: &str = "012345678905";

/// Product store over a private in-memory database
pub async fn memory_store() -> ProductStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    init_tables(&pool).await.expect("Failed to create tables");
    ProductStore::new(pool)
}

pub fn dog_food_result() -> ClassificationResult {
    ClassificationResult::new("Dog Food", "Dry Dog Food", "Dog Food Shop All")
}

pub fn historical(name: &str, brand: &str, category: &str, product_type: &str, pages: &str) -> HistoricalItem {
    HistoricalItem {
        identifier: String::new(),
        name: name.to_string(),
        brand: brand.to_string(),
        category: category.to_string(),
        product_type: product_type.to_string(),
        product_on_pages: pages.to_string(),
    }
}

/// In-memory source adapter with scripted failures
#[derive(Default)]
pub struct StaticSource {
    name: String,
    records: HashMap<String, Vec<RawObservation>>,
    unavailable: bool,
    fail_every_fetch: bool,
    /// Fire this token while fetching the given identifier
    cancel_on: Option<(String, CancellationToken)>,
    fetched: Mutex<Vec<String>>,
    rounds: AtomicUsize,
}

impl StaticSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_product(mut self, identifier: &str, name: &str, brand: &str) -> Self {
        let mut obs = RawObservation::new(identifier, self.name.clone(), name)
            .with_images([format!("{}-{}.jpg", self.name, identifier)]);
        if !brand.is_empty() {
            obs = obs.with_brand(brand);
        }
        self.records.entry(identifier.to_string()).or_default().push(obs);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn failing_fetches(mut self) -> Self {
        self.fail_every_fetch = true;
        self
    }

    pub fn cancelling_on(mut self, identifier: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((identifier.to_string(), token));
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn rounds(&self) -> usize {
        self.rounds.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SourceAdapter for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin_round(&self, _identifiers: &[String]) -> Result<(), SourceError> {
        self.rounds.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(SourceError::Unavailable(format!("{} is down", self.name)));
        }
        Ok(())
    }

    async fn fetch(&self, identifier: &str) -> Result<Vec<RawObservation>, SourceError> {
        self.fetched.lock().unwrap().push(identifier.to_string());
        if let Some((target, token)) = &self.cancel_on {
            if target == identifier {
                token.cancel();
            }
        }
        if self.fail_every_fetch {
            return Err(SourceError::Transient(format!("{} timed out", identifier)));
        }
        Ok(self.records.get(identifier).cloned().unwrap_or_default())
    }
}
