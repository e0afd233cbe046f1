//! Classification pipeline
//!
//! **Per product:**
//! 1. Cache (on-disk results and this process's earlier decisions)
//! 2. AI classifier; a non-empty answer must pass the confidence gate
//! 3. Fuzzy match against the historical corpus
//! 4. Same-kind default
//! 5. Empty result
//!
//! Accepted results are written to the cache immediately. Every final result,
//! including an empty one, is remembered for the rest of the process so a product
//! never reaches the external classifier twice.
//!
//! **Batch mode:** cache hits are resolved first; the remaining distinct products
//! go to the classifier in chunks of `batch_size`, with a short trailing chunk
//! folded into the previous one. Each product then continues down the cascade on
//! its own.

use super::{
    ClassificationCache, Classifier, ConfidenceGate, DefaultDeriver, FuzzyMatcher,
};
use crate::config::PipelineConfig;
use crate::models::Taxonomy;
use crate::services::similarity::SimilarityScorer;
use crate::types::{
    ClassificationOutcome, ClassificationResult, ClassificationTier, HistoricalItem,
    ProductDescriptor,
};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Split `len` items into request chunks
///
/// Chunks hold `batch_size` items; a trailing chunk smaller than `min_batch_size`
/// is merged into the one before it.
pub fn chunk_plan(len: usize, batch_size: usize, min_batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    let mut chunks: Vec<Range<usize>> = (0..len)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(len))
        .collect();

    if chunks.len() > 1 {
        let last_len = chunks.last().map(|c| c.len()).unwrap_or(0);
        if last_len < min_batch_size {
            if let Some(last) = chunks.pop() {
                if let Some(prev) = chunks.last_mut() {
                    prev.end = last.end;
                }
            }
        }
    }
    chunks
}

pub struct ClassificationPipeline {
    classifier: Arc<dyn Classifier>,
    cache: ClassificationCache,
    memo: HashMap<String, ClassificationOutcome>,
    gate: ConfidenceGate,
    fuzzy: FuzzyMatcher,
    defaults: DefaultDeriver,
    taxonomy: Taxonomy,
    corpus: Vec<HistoricalItem>,
    batch_size: usize,
    min_batch_size: usize,
}

impl ClassificationPipeline {
    pub fn new(
        config: &PipelineConfig,
        classifier: Arc<dyn Classifier>,
        cache: ClassificationCache,
        taxonomy: Taxonomy,
        corpus: Vec<HistoricalItem>,
    ) -> Self {
        let scorer = SimilarityScorer::new(config.lexicon.clone());
        info!(
            classifier = %classifier.kind(),
            cached = cache.len(),
            corpus = corpus.len(),
            "Classification pipeline ready"
        );
        Self {
            classifier,
            cache,
            memo: HashMap::new(),
            gate: ConfidenceGate::new(config.lexicon.clone(), config.gate_threshold),
            fuzzy: FuzzyMatcher::new(
                scorer.clone(),
                config.fuzzy_threshold,
                config.top_k,
                config.vote_pool,
            ),
            defaults: DefaultDeriver::new(
                scorer,
                config.similar_min,
                config.similar_max,
                config.top_k,
            ),
            taxonomy,
            corpus,
            batch_size: config.batch_size,
            min_batch_size: config.min_batch_size,
        }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn corpus(&self) -> &[HistoricalItem] {
        &self.corpus
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }

    /// Classify one product
    pub async fn classify_one(&mut self, product: &ProductDescriptor) -> ClassificationOutcome {
        let key = product.cache_key();
        if key.is_empty() {
            return ClassificationOutcome::empty();
        }
        if let Some(hit) = self.lookup(&key) {
            return hit;
        }

        let ai = match self.classifier.classify_one(product, &self.taxonomy).await {
            Ok(result) if !result.is_empty() => Some(result),
            Ok(_) => {
                debug!(key = %key, "Classifier returned no facets");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Classifier failed, falling back");
                None
            }
        };

        self.resolve(&key, product, ai)
    }

    /// Classify many products; returns exactly one outcome per input, in order
    pub async fn classify_batch(
        &mut self,
        products: &[ProductDescriptor],
    ) -> Vec<ClassificationOutcome> {
        let mut outcomes: Vec<Option<ClassificationOutcome>> = vec![None; products.len()];

        // Distinct uncached products, with every input position they occupy
        let mut pending: Vec<(String, &ProductDescriptor, Vec<usize>)> = Vec::new();
        let mut pending_index: HashMap<String, usize> = HashMap::new();

        for (i, product) in products.iter().enumerate() {
            let key = product.cache_key();
            if key.is_empty() {
                outcomes[i] = Some(ClassificationOutcome::empty());
                continue;
            }
            if let Some(hit) = self.lookup(&key) {
                outcomes[i] = Some(hit);
                continue;
            }
            match pending_index.get(&key) {
                Some(&slot) => pending[slot].2.push(i),
                None => {
                    pending_index.insert(key.clone(), pending.len());
                    pending.push((key, product, vec![i]));
                }
            }
        }

        info!(
            total = products.len(),
            cached = products.len() - pending.iter().map(|p| p.2.len()).sum::<usize>(),
            pending = pending.len(),
            "Classifying batch"
        );

        let descriptors: Vec<ProductDescriptor> =
            pending.iter().map(|(_, p, _)| (*p).clone()).collect();
        let mut ai_results: Vec<Option<ClassificationResult>> = vec![None; descriptors.len()];

        for chunk in chunk_plan(descriptors.len(), self.batch_size, self.min_batch_size) {
            let slice = &descriptors[chunk.clone()];
            match self.classifier.classify_batch(slice, &self.taxonomy).await {
                Ok(answers) => {
                    for (offset, answer) in answers.into_iter().take(slice.len()).enumerate() {
                        ai_results[chunk.start + offset] = answer.filter(|r| !r.is_empty());
                    }
                }
                Err(e) => {
                    warn!(
                        chunk_start = chunk.start,
                        chunk_len = slice.len(),
                        error = %e,
                        "Batch classification failed, falling back per item"
                    );
                }
            }
        }

        for ((key, product, positions), ai) in pending.into_iter().zip(ai_results) {
            let outcome = self.resolve(&key, product, ai);
            for position in positions {
                outcomes[position] = Some(outcome.clone());
            }
        }

        outcomes
            .into_iter()
            .map(|o| o.unwrap_or_else(ClassificationOutcome::empty))
            .collect()
    }

    fn lookup(&self, key: &str) -> Option<ClassificationOutcome> {
        if let Some(result) = self.cache.get(key) {
            debug!(key = %key, "Cache hit");
            return Some(ClassificationOutcome::new(
                result.clone(),
                ClassificationTier::Cache,
                1.0,
            ));
        }
        self.memo.get(key).cloned()
    }

    /// Walk the remaining tiers after the AI attempt and record the decision
    fn resolve(
        &mut self,
        key: &str,
        product: &ProductDescriptor,
        ai: Option<ClassificationResult>,
    ) -> ClassificationOutcome {
        let outcome = self.decide(product, ai);

        if outcome.tier != ClassificationTier::Empty {
            self.cache.insert(key, outcome.result.clone());
        }
        self.memo.insert(key.to_string(), outcome.clone());

        debug!(
            key = %key,
            tier = outcome.tier.as_str(),
            category = %outcome.result.category,
            "Classified"
        );
        outcome
    }

    fn decide(
        &self,
        product: &ProductDescriptor,
        ai: Option<ClassificationResult>,
    ) -> ClassificationOutcome {
        if let Some(result) = ai {
            let confidence = self.gate.assess(&product.name, &result);
            if self.gate.accepts(confidence) {
                return ClassificationOutcome::new(result, ClassificationTier::Ai, confidence);
            }
            info!(
                name = %product.name,
                category = %result.category,
                confidence,
                "AI category rejected by confidence gate"
            );
        }

        let fuzzy = self.fuzzy.classify(product, &self.corpus);
        if !fuzzy.result.is_empty() {
            let confidence = fuzzy.matches.first().map(|m| m.score / 100.0).unwrap_or(0.0);
            return ClassificationOutcome::new(fuzzy.result, ClassificationTier::Fuzzy, confidence);
        }

        if let Some((result, best)) = self.defaults.derive(product, &self.corpus) {
            return ClassificationOutcome::new(result, ClassificationTier::Default, best / 100.0);
        }

        ClassificationOutcome::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_plan_exact_multiple() {
        assert_eq!(chunk_plan(20, 10, 3), vec![0..10, 10..20]);
    }

    #[test]
    fn test_chunk_plan_merges_small_tail() {
        assert_eq!(chunk_plan(21, 10, 3), vec![0..10, 10..21]);
        assert_eq!(chunk_plan(22, 10, 3), vec![0..10, 10..22]);
    }

    #[test]
    fn test_chunk_plan_keeps_large_enough_tail() {
        assert_eq!(chunk_plan(23, 10, 3), vec![0..10, 10..20, 20..23]);
    }

    #[test]
    fn test_chunk_plan_small_input_is_single_chunk() {
        assert_eq!(chunk_plan(2, 10, 3), vec![0..2]);
        assert!(chunk_plan(0, 10, 3).is_empty());
    }
}
