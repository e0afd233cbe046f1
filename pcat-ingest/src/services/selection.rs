//! Candidate selection
//!
//! Picks one value per field from a candidate set. Reviewing candidates by hand
//! happens outside this crate; `SourcePrioritySelector` is the unattended rule
//! that lets a batch run end to end.

use crate::types::{CandidateSet, FinalizedProduct};
use std::collections::BTreeMap;

/// Chooses finalized field values from a candidate set
pub trait CandidateSelector: Send + Sync {
    /// Finalized product with empty taxonomy facets
    fn select(&self, candidates: &CandidateSet) -> FinalizedProduct;
}

/// Prefer sources in a fixed order
///
/// Each field takes the value of the first listed source that has one. Sources
/// not listed are consulted afterwards in name order.
#[derive(Debug, Clone, Default)]
pub struct SourcePrioritySelector {
    priority: Vec<String>,
}

impl SourcePrioritySelector {
    pub fn new(priority: Vec<String>) -> Self {
        Self { priority }
    }

    fn pick<'a, V>(&self, values: &'a BTreeMap<String, V>) -> Option<&'a V> {
        self.priority
            .iter()
            .find_map(|source| values.get(source))
            .or_else(|| values.values().next())
    }

    fn pick_string(&self, values: &BTreeMap<String, String>) -> String {
        self.pick(values).cloned().unwrap_or_default()
    }

    fn pick_list(&self, values: &BTreeMap<String, Vec<String>>) -> Vec<String> {
        let non_empty: BTreeMap<String, Vec<String>> = values
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(source, list)| (source.clone(), list.clone()))
            .collect();
        self.pick(&non_empty).cloned().unwrap_or_default()
    }
}

impl CandidateSelector for SourcePrioritySelector {
    fn select(&self, candidates: &CandidateSet) -> FinalizedProduct {
        FinalizedProduct {
            identifier: candidates.identifier.clone(),
            name: self.pick_string(&candidates.name),
            brand: self.pick_string(&candidates.brand),
            weight: self.pick_string(&candidates.weight),
            price: self.pick_string(&candidates.price),
            images: self.pick_list(&candidates.images),
            cross_sell: self.pick_list(&candidates.cross_sell),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> CandidateSet {
        let mut set = CandidateSet::new("035585499741");
        set.name.insert("chewy".into(), "Kong Classic Dog Toy".into());
        set.name.insert("petco".into(), "KONG Classic".into());
        set.brand.insert("petco".into(), "KONG".into());
        set.weight.insert("chewy".into(), "0.5 lb".into());
        set.images.insert("chewy".into(), vec!["c1.jpg".into()]);
        set.images.insert("petco".into(), vec!["p1.jpg".into(), "p2.jpg".into()]);
        set
    }

    #[test]
    fn test_priority_order_wins() {
        let selector = SourcePrioritySelector::new(vec!["petco".into(), "chewy".into()]);
        let product = selector.select(&candidates());
        assert_eq!(product.identifier, "035585499741");
        assert_eq!(product.name, "KONG Classic");
        assert_eq!(product.brand, "KONG");
        // petco has no weight, fall through to chewy
        assert_eq!(product.weight, "0.5 lb");
        assert_eq!(product.images, vec!["p1.jpg".to_string(), "p2.jpg".to_string()]);
        assert!(product.category.is_empty());
        assert!(!product.special_order && !product.disabled);
    }

    #[test]
    fn test_unlisted_sources_in_name_order() {
        let selector = SourcePrioritySelector::default();
        let product = selector.select(&candidates());
        assert_eq!(product.name, "Kong Classic Dog Toy");
        assert_eq!(product.images, vec!["c1.jpg".to_string()]);
        assert!(product.price.is_empty());
        assert!(product.cross_sell.is_empty());
    }
}
