//! Deterministic classifier with canned answers
//!
//! Answers are keyed by cache key (`brand|name` or `name`). Unknown products get an
//! empty result. Every product sent to it is recorded, so callers can check how
//! often a product actually reached the classifier.

use super::{Classifier, ClassifierKind};
use crate::error::ClassifierError;
use crate::models::Taxonomy;
use crate::types::{ClassificationResult, ProductDescriptor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MockClassifier {
    responses: HashMap<String, ClassificationResult>,
    /// Batch answers omit these keys entirely
    omitted: Vec<String>,
    failing: bool,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned answer for `key`
    pub fn with_response(mut self, key: impl Into<String>, result: ClassificationResult) -> Self {
        self.responses.insert(key.into(), result);
        self
    }

    /// Leave `key` out of batch answers, as a service skipping an index would
    pub fn omitting(mut self, key: impl Into<String>) -> Self {
        self.omitted.push(key.into());
        self
    }

    /// Every request fails with a service error
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Number of requests made (a batch counts once)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Cache keys of every product sent, in order
    pub fn requested_keys(&self) -> Vec<String> {
        self.requested
            .lock()
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }

    fn record(&self, products: &[ProductDescriptor]) -> Result<(), ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut keys) = self.requested.lock() {
            keys.extend(products.iter().map(ProductDescriptor::cache_key));
        }
        if self.failing {
            return Err(ClassifierError::Service("mock classifier unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Classifier for MockClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Mock
    }

    async fn classify_one(
        &self,
        product: &ProductDescriptor,
        _taxonomy: &Taxonomy,
    ) -> Result<ClassificationResult, ClassifierError> {
        self.record(std::slice::from_ref(product))?;
        Ok(self
            .responses
            .get(&product.cache_key())
            .cloned()
            .unwrap_or_default())
    }

    async fn classify_batch(
        &self,
        products: &[ProductDescriptor],
        _taxonomy: &Taxonomy,
    ) -> Result<Vec<Option<ClassificationResult>>, ClassifierError> {
        self.record(products)?;
        Ok(products
            .iter()
            .map(|p| {
                let key = p.cache_key();
                if self.omitted.contains(&key) {
                    None
                } else {
                    self.responses.get(&key).cloned()
                }
            })
            .collect())
    }
}
