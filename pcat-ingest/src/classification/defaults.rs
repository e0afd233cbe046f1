//! Default tier
//!
//! Last resort before giving up: borrow facets from close, same-kind neighbours.
//!
//! The kind vocabulary comes from the corpus itself, as the leading kind of each
//! category name: a lexicon kind when one opens the name ("Small Animal Supplies"
//! → "small animal"), otherwise the leading word ("Dog Food" → "dog"). A
//! product's kinds are the vocabulary entries its name mentions, directly or
//! through the kind lexicon ("puppy" → "dog", "hamster" → "small animal").
//! Only corpus items whose category starts with one of those kinds are considered,
//! and only scores in `[similar_min, similar_max)` count.

use super::fuzzy::{most_frequent, ranked_by_frequency};
use crate::services::similarity::{contains_tokens, normalize, KindLexicon, SimilarityScorer};
use crate::types::{split_facet, ClassificationResult, HistoricalItem, ProductDescriptor, FACET_DELIMITER};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

const PAGE_VOTES: usize = 3;

/// Leading lexicon kind of a category name, else its lowercased leading word
fn category_kind(lexicon: &KindLexicon, category: &str) -> Option<String> {
    let normalized = normalize(category);
    match lexicon.leading_kind(&normalized) {
        Some(kind) => Some(kind.to_string()),
        None => normalized.split_whitespace().next().map(str::to_string),
    }
}

/// Kind vocabulary discovered from corpus category names
pub fn kind_vocabulary(lexicon: &KindLexicon, corpus: &[HistoricalItem]) -> BTreeSet<String> {
    corpus
        .iter()
        .filter_map(|item| category_kind(lexicon, &item.category))
        .collect()
}

#[derive(Debug, Clone)]
pub struct DefaultDeriver {
    scorer: SimilarityScorer,
    similar_min: f64,
    similar_max: f64,
    top_k: usize,
}

impl DefaultDeriver {
    pub fn new(scorer: SimilarityScorer, similar_min: f64, similar_max: f64, top_k: usize) -> Self {
        Self {
            scorer,
            similar_min,
            similar_max,
            top_k,
        }
    }

    /// Kinds of `name` within `vocabulary`
    pub fn product_kinds(&self, name: &str, vocabulary: &BTreeSet<String>) -> BTreeSet<String> {
        let normalized = normalize(name);
        let mut kinds: BTreeSet<String> = vocabulary
            .iter()
            .filter(|kind| contains_tokens(&normalized, kind))
            .cloned()
            .collect();
        kinds.extend(
            self.scorer
                .lexicon()
                .kinds_in(&normalized)
                .into_iter()
                .filter(|kind| vocabulary.contains(kind)),
        );
        kinds
    }

    /// Facets voted by same-kind neighbours, or `None` when nothing qualifies
    pub fn derive(
        &self,
        product: &ProductDescriptor,
        corpus: &[HistoricalItem],
    ) -> Option<(ClassificationResult, f64)> {
        let lexicon = self.scorer.lexicon();
        let vocabulary = kind_vocabulary(lexicon, corpus);
        let kinds = self.product_kinds(&product.name, &vocabulary);
        if kinds.is_empty() {
            debug!(name = %product.name, "Default tier: no kind in product name");
            return None;
        }

        let profile = self.scorer.profile(&product.name, &product.brand);
        let mut neighbours: Vec<(&HistoricalItem, f64)> = corpus
            .iter()
            .filter(|item| {
                category_kind(lexicon, &item.category)
                    .map(|k| kinds.contains(&k))
                    .unwrap_or(false)
            })
            .map(|item| {
                let other = self.scorer.profile(&item.name, &item.brand);
                (item, self.scorer.score_profiles(&profile, &other))
            })
            .filter(|(_, score)| *score >= self.similar_min && *score < self.similar_max)
            .collect();

        neighbours.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        neighbours.truncate(self.top_k);

        let Some(best) = neighbours.first().map(|(_, score)| *score) else {
            debug!(name = %product.name, "Default tier: no neighbour in range");
            return None;
        };

        let category = most_frequent(neighbours.iter().map(|(item, _)| item.category.trim()))
            .unwrap_or_default();
        let product_type = most_frequent(
            neighbours
                .iter()
                .flat_map(|(item, _)| split_facet(&item.product_type)),
        )
        .unwrap_or_default();
        let pages = ranked_by_frequency(
            neighbours
                .iter()
                .flat_map(|(item, _)| split_facet(&item.product_on_pages)),
        )
        .into_iter()
        .take(PAGE_VOTES)
        .map(|(page, _)| page)
        .collect::<Vec<_>>()
        .join(&FACET_DELIMITER.to_string());

        let result = ClassificationResult::new(category, product_type, pages);
        if result.is_empty() {
            return None;
        }

        debug!(
            name = %product.name,
            neighbours = neighbours.len(),
            category = %result.category,
            "Default tier"
        );
        Some((result, best))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, brand: &str, category: &str, types: &str, pages: &str) -> HistoricalItem {
        HistoricalItem {
            identifier: String::new(),
            name: name.to_string(),
            brand: brand.to_string(),
            category: category.to_string(),
            product_type: types.to_string(),
            product_on_pages: pages.to_string(),
        }
    }

    fn deriver() -> DefaultDeriver {
        DefaultDeriver::new(SimilarityScorer::default(), 85.0, 95.0, 5)
    }

    #[test]
    fn test_vocabulary_is_leading_category_word() {
        let corpus = vec![
            item("a", "", "Dog Food", "", ""),
            item("b", "", "Cat Litter", "", ""),
            item("c", "", "", "", ""),
        ];
        let vocab: Vec<String> = kind_vocabulary(&KindLexicon::default(), &corpus)
            .into_iter()
            .collect();
        assert_eq!(vocab, vec!["cat".to_string(), "dog".to_string()]);
    }

    #[test]
    fn test_product_kinds_use_lexicon() {
        let vocab: BTreeSet<String> = ["dog".to_string(), "cat".to_string()].into_iter().collect();
        let kinds = deriver().product_kinds("Puppy Training Pads", &vocab);
        assert_eq!(kinds.into_iter().collect::<Vec<_>>(), vec!["dog".to_string()]);
    }

    #[test]
    fn test_no_kind_means_no_default() {
        let corpus = vec![item("Dog Bed", "Acme", "Dog Supplies", "Beds", "")];
        assert!(deriver()
            .derive(&ProductDescriptor::new("Stainless Bowl", "Acme"), &corpus)
            .is_none());
    }

    #[test]
    fn test_same_kind_neighbours_vote() {
        let corpus = vec![
            item("Dog Bed Large", "Kong Company", "Dog Supplies", "Beds", "Dog Supplies Shop All|Deals"),
            item("Dog Bed Small", "Kong Company", "Dog Supplies", "Beds|Crates", "Dog Supplies Shop All"),
            item("Cat Bed Large", "Kong Company", "Cat Supplies", "Beds", "Cat Supplies Shop All"),
            // Identical product scores 100, outside the default range
            item("Dog Bed", "Kong", "Dog Toys", "Chew Toys", "Dog Toys Shop All"),
        ];

        let product = ProductDescriptor::new("Dog Bed", "Kong");
        let scorer = SimilarityScorer::default();
        let score = scorer.score("Dog Bed", "Kong", "Dog Bed Large", "Kong Company");
        assert!((85.0..95.0).contains(&score), "score {}", score);

        let (result, best) = deriver().derive(&product, &corpus).unwrap();
        assert_eq!(result.category, "Dog Supplies");
        assert_eq!(result.product_type, "Beds");
        assert_eq!(result.product_on_pages, "Dog Supplies Shop All|Deals");
        assert!((best - score).abs() < 1e-9);
    }

    #[test]
    fn test_multi_word_kind_from_category() {
        let lexicon = KindLexicon::default();
        let corpus = vec![
            item("Hamster Cage", "Kaytee", "Small Animal Supplies", "Cages", ""),
            item("Dog Bed", "Acme", "Dog Supplies", "Beds", ""),
        ];
        let vocab = kind_vocabulary(&lexicon, &corpus);
        assert!(vocab.contains("small animal"));
        assert!(!vocab.contains("small"));

        let kinds = deriver().product_kinds("Hamster Wheel", &vocab);
        assert_eq!(kinds.into_iter().collect::<Vec<_>>(), vec!["small animal".to_string()]);
        let kinds = deriver().product_kinds("Small Animal Bedding", &vocab);
        assert_eq!(kinds.into_iter().collect::<Vec<_>>(), vec!["small animal".to_string()]);
    }

    #[test]
    fn test_small_animal_neighbours_vote() {
        let corpus = vec![
            item(
                "Hamster Cage Large",
                "Kaytee Pet Company",
                "Small Animal Supplies",
                "Cages",
                "Small Animal Shop All",
            ),
            item("Dog Cage Large", "Kaytee Pet Company", "Dog Supplies", "Crates", "Dog Shop All"),
        ];
        let scorer = SimilarityScorer::default();
        let score = scorer.score("Hamster Cage", "Kaytee", "Hamster Cage Large", "Kaytee Pet Company");
        assert!((85.0..95.0).contains(&score), "score {}", score);

        let (result, _) = deriver()
            .derive(&ProductDescriptor::new("Hamster Cage", "Kaytee"), &corpus)
            .unwrap();
        assert_eq!(result.category, "Small Animal Supplies");
        assert_eq!(result.product_type, "Cages");
        assert_eq!(result.product_on_pages, "Small Animal Shop All");
    }
}
