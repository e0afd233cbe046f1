//! pcat-ingest configuration
//!
//! Turns the bootstrap `TomlConfig` (plus environment) into the typed settings the
//! pipeline and controller are constructed with. Built once at startup.

use crate::classification::ClassifierKind;
use crate::services::similarity::KindLexicon;
use crate::utils::RetryPolicy;
use pcat_common::config::TomlConfig;
use pcat_common::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the remote classifier API key
pub const CLASSIFIER_API_KEY_ENV_VAR: &str = "PCAT_CLASSIFIER_API_KEY";

/// Resolve the classifier API key
///
/// **Priority:** ENV → TOML
pub fn resolve_classifier_api_key(toml_config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(CLASSIFIER_API_KEY_ENV_VAR)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .classifier
        .api_key
        .clone()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("Classifier API key found in environment and TOML. Using environment.");
    }

    if let Some(key) = env_key {
        info!("Classifier API key loaded from environment variable");
        return Some(key);
    }
    if let Some(key) = toml_key {
        info!("Classifier API key loaded from TOML config");
        return Some(key);
    }
    None
}

fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// AI classifier connection settings
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub kind: ClassifierKind,
    /// Base URL; each backend has its own default
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub requests_per_second: u32,
    pub retry: RetryPolicy,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::Llm,
            endpoint: None,
            model: None,
            api_key: None,
            timeout: Duration::from_secs(60),
            requests_per_second: 2,
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything the classification pipeline needs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub classifier: ClassifierConfig,
    pub batch_size: usize,
    pub min_batch_size: usize,
    pub fuzzy_threshold: f64,
    pub similar_min: f64,
    pub similar_max: f64,
    pub top_k: usize,
    pub vote_pool: usize,
    pub gate_threshold: f64,
    pub lexicon: KindLexicon,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            batch_size: 10,
            min_batch_size: 3,
            fuzzy_threshold: 75.0,
            similar_min: 85.0,
            similar_max: 95.0,
            top_k: 5,
            vote_pool: 3,
            gate_threshold: 0.5,
            lexicon: KindLexicon::default(),
        }
    }
}

impl PipelineConfig {
    /// Build from TOML, resolving the API key from the environment first
    pub fn from_toml(toml_config: &TomlConfig) -> Result<Self> {
        let section = &toml_config.classifier;
        let kind: ClassifierKind = section.kind.parse().map_err(Error::Config)?;

        let matching = &toml_config.matching;
        if matching.similar_min > matching.similar_max {
            return Err(Error::Config(format!(
                "matching.similar_min ({:.1}) exceeds matching.similar_max ({:.1})",
                matching.similar_min, matching.similar_max
            )));
        }

        let classifier = ClassifierConfig {
            kind,
            endpoint: section.endpoint.clone(),
            model: section.model.clone(),
            api_key: resolve_classifier_api_key(toml_config),
            timeout: Duration::from_secs(section.timeout_secs.max(1)),
            requests_per_second: section.requests_per_second.max(1),
            retry: RetryPolicy::new(
                section.max_attempts,
                Duration::from_millis(section.base_delay_ms),
                Duration::from_millis(section.max_delay_ms),
            ),
        };

        Ok(Self {
            classifier,
            batch_size: section.batch_size.max(1),
            min_batch_size: section.min_batch_size,
            fuzzy_threshold: matching.fuzzy_threshold,
            similar_min: matching.similar_min,
            similar_max: matching.similar_max,
            top_k: matching.top_k.max(1),
            vote_pool: matching.vote_pool.max(1),
            gate_threshold: matching.gate_threshold,
            lexicon: KindLexicon::default(),
        })
    }
}

/// Orchestration settings
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub identifier_lengths: Vec<usize>,
    pub source_order: Vec<String>,
    pub run_remaining: bool,
    pub remove_processed: bool,
    pub source_priority: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            identifier_lengths: vec![12, 13],
            source_order: Vec::new(),
            run_remaining: true,
            remove_processed: false,
            source_priority: Vec::new(),
        }
    }
}

impl BatchConfig {
    pub fn from_toml(toml_config: &TomlConfig) -> Self {
        let section = &toml_config.batch;
        Self {
            identifier_lengths: section.identifier_lengths.clone(),
            source_order: section.source_order.clone(),
            run_remaining: section.run_remaining,
            remove_processed: section.remove_processed,
            source_priority: section.source_priority.clone(),
        }
    }
}
