//! Taxonomy classification
//!
//! The pipeline tries, in order: cache → AI classifier (confidence gated) →
//! fuzzy match against previously classified products → same-kind default →
//! empty. The AI classifier is one of a closed set of implementations behind
//! the `Classifier` trait.

pub mod cache;
pub mod defaults;
pub mod fuzzy;
pub mod gate;
pub mod llm_client;
pub mod mock;
pub mod pipeline;
pub mod prompt;
pub mod response;

pub use cache::ClassificationCache;
pub use defaults::DefaultDeriver;
pub use fuzzy::{FuzzyMatch, FuzzyMatcher, FuzzyOutcome};
pub use gate::ConfidenceGate;
pub use llm_client::{LlmBackend, LlmClassifier, OllamaBackend, OpenAiBackend};
pub use mock::MockClassifier;
pub use pipeline::ClassificationPipeline;

use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::models::Taxonomy;
use crate::types::{ClassificationResult, ProductDescriptor};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Available AI classifier implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    /// Remote OpenAI-compatible chat completions service
    Llm,
    /// Local Ollama instance
    LocalLlm,
    /// Canned answers, no network
    Mock,
}

impl ClassifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierKind::Llm => "llm",
            ClassifierKind::LocalLlm => "local_llm",
            ClassifierKind::Mock => "mock",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "llm" => Ok(ClassifierKind::Llm),
            "local_llm" | "ollama" => Ok(ClassifierKind::LocalLlm),
            "mock" => Ok(ClassifierKind::Mock),
            other => Err(format!(
                "Unknown classifier kind '{}' (expected llm, local_llm or mock)",
                other
            )),
        }
    }
}

/// AI classifier contract
///
/// An empty `ClassificationResult` means the service had no answer; the pipeline
/// treats it like a failure and moves on to the next tier.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    fn kind(&self) -> ClassifierKind;

    async fn classify_one(
        &self,
        product: &ProductDescriptor,
        taxonomy: &Taxonomy,
    ) -> Result<ClassificationResult, ClassifierError>;

    /// One combined request for several products
    ///
    /// Returns exactly `products.len()` slots in input order; `None` where the
    /// service gave no answer for that product.
    async fn classify_batch(
        &self,
        products: &[ProductDescriptor],
        taxonomy: &Taxonomy,
    ) -> Result<Vec<Option<ClassificationResult>>, ClassifierError>;
}

/// Build the configured classifier
pub fn build_classifier(config: &ClassifierConfig) -> Result<Arc<dyn Classifier>, ClassifierError> {
    match config.kind {
        ClassifierKind::Llm => {
            let backend = OpenAiBackend::new(config)?;
            Ok(Arc::new(LlmClassifier::new(backend, ClassifierKind::Llm, config)))
        }
        ClassifierKind::LocalLlm => {
            let backend = OllamaBackend::new(config)?;
            Ok(Arc::new(LlmClassifier::new(
                backend,
                ClassifierKind::LocalLlm,
                config,
            )))
        }
        ClassifierKind::Mock => Ok(Arc::new(MockClassifier::new())),
    }
}
