//! Fuzzy tier
//!
//! Finds previously classified products that look like the new one and lets the
//! best of them vote on each facet.
//!
//! **Algorithm:**
//! 1. Score every corpus item against the product
//! 2. Keep items scoring strictly above the threshold, best first, at most `top_k`
//! 3. For each facet, split the `|`-joined values of the first `vote_pool` matches
//!    and take the most frequent individual value (ties: first seen)

use crate::services::similarity::SimilarityScorer;
use crate::types::{split_facet, ClassificationResult, HistoricalItem, ProductDescriptor};
use std::cmp::Ordering;
use tracing::debug;

/// One corpus item that cleared the threshold
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    pub item: HistoricalItem,
    pub score: f64,
}

/// Fuzzy tier answer plus the evidence behind it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FuzzyOutcome {
    pub result: ClassificationResult,
    pub matches: Vec<FuzzyMatch>,
}

#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    scorer: SimilarityScorer,
    threshold: f64,
    top_k: usize,
    vote_pool: usize,
}

impl FuzzyMatcher {
    pub fn new(scorer: SimilarityScorer, threshold: f64, top_k: usize, vote_pool: usize) -> Self {
        Self {
            scorer,
            threshold,
            top_k,
            vote_pool,
        }
    }

    /// Best corpus matches above the threshold
    pub fn find_matches(
        &self,
        product: &ProductDescriptor,
        corpus: &[HistoricalItem],
    ) -> Vec<FuzzyMatch> {
        let profile = self.scorer.profile(&product.name, &product.brand);

        let mut scored: Vec<(usize, f64)> = corpus
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let other = self.scorer.profile(&item.name, &item.brand);
                (i, self.scorer.score_profiles(&profile, &other))
            })
            .filter(|(_, score)| *score > self.threshold)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(self.top_k);

        scored
            .into_iter()
            .map(|(i, score)| FuzzyMatch {
                item: corpus[i].clone(),
                score,
            })
            .collect()
    }

    /// Vote facets from the best matches
    pub fn classify(&self, product: &ProductDescriptor, corpus: &[HistoricalItem]) -> FuzzyOutcome {
        let matches = self.find_matches(product, corpus);
        let voters = &matches[..matches.len().min(self.vote_pool)];

        let result = ClassificationResult::new(
            most_frequent(voters.iter().flat_map(|m| split_facet(&m.item.category)))
                .unwrap_or_default(),
            most_frequent(voters.iter().flat_map(|m| split_facet(&m.item.product_type)))
                .unwrap_or_default(),
            most_frequent(voters.iter().flat_map(|m| split_facet(&m.item.product_on_pages)))
                .unwrap_or_default(),
        );

        debug!(
            name = %product.name,
            matches = matches.len(),
            category = %result.category,
            "Fuzzy tier"
        );

        FuzzyOutcome { result, matches }
    }
}

/// Values ordered by frequency (descending), ties in first-seen order
pub(crate) fn ranked_by_frequency<'a, I>(values: I) -> Vec<(&'a str, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: Vec<(&'a str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    // Stable sort keeps first-seen order among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Most frequent value, ties broken by first appearance
pub(crate) fn most_frequent<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    ranked_by_frequency(values)
        .first()
        .map(|(v, _)| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, brand: &str, category: &str, types: &str, pages: &str) -> HistoricalItem {
        HistoricalItem {
            identifier: format!("{:012}", name.len()),
            name: name.to_string(),
            brand: brand.to_string(),
            category: category.to_string(),
            product_type: types.to_string(),
            product_on_pages: pages.to_string(),
        }
    }

    fn matcher() -> FuzzyMatcher {
        FuzzyMatcher::new(SimilarityScorer::default(), 75.0, 5, 3)
    }

    #[test]
    fn test_most_frequent_tie_goes_to_first_seen() {
        assert_eq!(most_frequent(["b", "a", "a", "b"]), Some("b".to_string()));
        assert_eq!(most_frequent(["c", "a", "a"]), Some("a".to_string()));
        assert_eq!(most_frequent(Vec::<&str>::new()), None);
    }

    #[test]
    fn test_votes_split_multi_valued_facets() {
        let corpus = vec![
            item("Kitten Chow Original", "Purina", "Cat Food", "Dry Cat Food|Kitten Food", "Cat Food Shop All"),
            item("Kitten Chow Nurture", "Purina", "Cat Food", "Kitten Food", "Cat Food Shop All|Deals"),
        ];

        let outcome = matcher().classify(&ProductDescriptor::new("Kitten Chow", "Purina"), &corpus);
        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.result.category, "Cat Food");
        assert_eq!(outcome.result.product_type, "Kitten Food");
        assert_eq!(outcome.result.product_on_pages, "Cat Food Shop All");
    }

    #[test]
    fn test_nothing_above_threshold_is_empty() {
        let corpus = vec![item(
            "Aquarium Gravel Blue",
            "Tetra",
            "Fish Supplies",
            "Aquariums",
            "Fish Shop All",
        )];

        let outcome = matcher().classify(&ProductDescriptor::new("Rawhide Bones", "Acme"), &corpus);
        assert!(outcome.matches.is_empty());
        assert!(outcome.result.is_empty());
    }

    #[test]
    fn test_matches_sorted_and_capped() {
        let corpus: Vec<HistoricalItem> = (0..8)
            .map(|i| item(&format!("Kong Classic Dog Toy {}", i), "Kong", "Dog Toys", "Chew Toys", ""))
            .chain(std::iter::once(item("Kong Classic Dog Toy", "Kong", "Dog Toys", "Fetch Toys", "")))
            .collect();

        let matches = matcher().find_matches(&ProductDescriptor::new("Kong Classic Dog Toy", "Kong"), &corpus);
        assert_eq!(matches.len(), 5);
        assert!(matches.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
