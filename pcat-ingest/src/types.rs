//! Core types and trait definitions for pcat-ingest
//!
//! Data moves through the batch in this order:
//! - `RawObservation`: one source's view of one identifier
//! - `CandidateSet`: all sources' values per field, keyed by source name
//! - `FinalizedProduct`: one chosen value per field plus taxonomy facets

use crate::error::SourceError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Delimiter joining multi-valued facets (`product_type`, `product_on_pages`)
pub const FACET_DELIMITER: char = '|';

// ============================================================================
// Source observations
// ============================================================================

/// One source's view of one identifier
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawObservation {
    pub identifier: String,
    /// Source name that produced this observation
    pub source: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub weight: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub image_references: Vec<String>,
    #[serde(default)]
    pub cross_sell: Vec<String>,
}

impl RawObservation {
    pub fn new(identifier: impl Into<String>, source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            source: source.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_weight(mut self, weight: impl Into<String>) -> Self {
        self.weight = weight.into();
        self
    }

    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = price.into();
        self
    }

    pub fn with_images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_references = images.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cross_sell<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cross_sell = items.into_iter().map(Into::into).collect();
        self
    }
}

/// Source adapter contract
///
/// Adapters usually drive one shared browser or HTTP session, so the controller
/// calls them strictly sequentially: `begin_round` once with the whole list, then
/// `fetch` per identifier, then `end_round`. Retrying a single identifier is the
/// adapter's own concern.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source name used as the provenance key in candidate sets
    fn name(&self) -> &str;

    /// Source-specific identifier predicate
    fn accepts(&self, _identifier: &str) -> bool {
        true
    }

    /// Prepare for a round over `identifiers`
    ///
    /// An error here marks the whole source as unavailable for this batch.
    async fn begin_round(&self, _identifiers: &[String]) -> Result<(), SourceError> {
        Ok(())
    }

    /// Observations for one identifier; empty when the source does not carry it
    async fn fetch(&self, identifier: &str) -> Result<Vec<RawObservation>, SourceError>;

    /// Release round resources
    async fn end_round(&self) {}
}

// ============================================================================
// Candidate sets
// ============================================================================

/// Candidate set field names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateField {
    Name,
    Brand,
    Weight,
    Price,
    Images,
    CrossSell,
}

impl CandidateField {
    pub const ALL: [CandidateField; 6] = [
        CandidateField::Name,
        CandidateField::Brand,
        CandidateField::Weight,
        CandidateField::Price,
        CandidateField::Images,
        CandidateField::CrossSell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateField::Name => "name",
            CandidateField::Brand => "brand",
            CandidateField::Weight => "weight",
            CandidateField::Price => "price",
            CandidateField::Images => "images",
            CandidateField::CrossSell => "cross_sell",
        }
    }
}

/// Every source's observed values for one identifier
///
/// Each map is keyed by source name. Empty values never appear.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateSet {
    pub identifier: String,
    pub name: BTreeMap<String, String>,
    pub brand: BTreeMap<String, String>,
    pub weight: BTreeMap<String, String>,
    pub price: BTreeMap<String, String>,
    pub images: BTreeMap<String, Vec<String>>,
    pub cross_sell: BTreeMap<String, Vec<String>>,
}

impl CandidateSet {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    /// Scalar field map; `None` for list-valued fields
    pub fn scalar(&self, field: CandidateField) -> Option<&BTreeMap<String, String>> {
        match field {
            CandidateField::Name => Some(&self.name),
            CandidateField::Brand => Some(&self.brand),
            CandidateField::Weight => Some(&self.weight),
            CandidateField::Price => Some(&self.price),
            CandidateField::Images | CandidateField::CrossSell => None,
        }
    }

    /// List field map; `None` for scalar fields
    pub fn list(&self, field: CandidateField) -> Option<&BTreeMap<String, Vec<String>>> {
        match field {
            CandidateField::Images => Some(&self.images),
            CandidateField::CrossSell => Some(&self.cross_sell),
            _ => None,
        }
    }

    /// All sources contributing at least one value
    pub fn sources(&self) -> BTreeSet<String> {
        let mut sources = BTreeSet::new();
        for field in CandidateField::ALL {
            if let Some(map) = self.scalar(field) {
                sources.extend(map.keys().cloned());
            }
            if let Some(map) = self.list(field) {
                sources.extend(map.keys().cloned());
            }
        }
        sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources().is_empty()
    }
}

// ============================================================================
// Finalized products and classification
// ============================================================================

/// Record ready for classification and persistence
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinalizedProduct {
    pub identifier: String,
    pub name: String,
    pub brand: String,
    pub weight: String,
    pub price: String,
    pub images: Vec<String>,
    pub category: String,
    pub product_type: String,
    pub product_on_pages: String,
    pub special_order: bool,
    pub disabled: bool,
    pub cross_sell: Vec<String>,
}

impl FinalizedProduct {
    pub fn descriptor(&self) -> ProductDescriptor {
        ProductDescriptor::new(self.name.clone(), self.brand.clone())
    }

    pub fn apply_facets(&mut self, result: &ClassificationResult) {
        self.category = result.category.clone();
        self.product_type = result.product_type.clone();
        self.product_on_pages = result.product_on_pages.clone();
    }
}

/// What the classifiers see of a product
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProductDescriptor {
    pub name: String,
    #[serde(default)]
    pub brand: String,
}

impl ProductDescriptor {
    pub fn new(name: impl Into<String>, brand: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            brand: brand.into(),
        }
    }

    /// Cache key: `brand|name`, or just `name` when brand is empty
    pub fn cache_key(&self) -> String {
        let name = self.name.trim();
        let brand = self.brand.trim();
        if brand.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", brand, FACET_DELIMITER, name)
        }
    }
}

/// Taxonomy facets assigned to a product
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(default)]
    pub category: String,
    /// `|`-joined product types
    #[serde(default)]
    pub product_type: String,
    /// `|`-joined display pages
    #[serde(default)]
    pub product_on_pages: String,
}

impl ClassificationResult {
    pub fn new(
        category: impl Into<String>,
        product_type: impl Into<String>,
        product_on_pages: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            product_type: product_type.into(),
            product_on_pages: product_on_pages.into(),
        }
    }

    /// Result with all facets empty
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when no facet carries a value
    pub fn is_empty(&self) -> bool {
        self.category.trim().is_empty()
            && self.product_type.trim().is_empty()
            && self.product_on_pages.trim().is_empty()
    }
}

/// Which tier produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClassificationTier {
    Cache,
    Ai,
    Fuzzy,
    Default,
    Empty,
}

impl ClassificationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationTier::Cache => "CACHE",
            ClassificationTier::Ai => "AI",
            ClassificationTier::Fuzzy => "FUZZY",
            ClassificationTier::Default => "DEFAULT",
            ClassificationTier::Empty => "EMPTY",
        }
    }
}

/// Classification result with the tier that produced it
///
/// `confidence` is the gate signal for AI answers and 1.0 for cache hits; it is
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationOutcome {
    pub result: ClassificationResult,
    pub tier: ClassificationTier,
    pub confidence: f64,
}

impl ClassificationOutcome {
    pub fn new(result: ClassificationResult, tier: ClassificationTier, confidence: f64) -> Self {
        Self {
            result,
            tier,
            confidence,
        }
    }

    pub fn empty() -> Self {
        Self::new(ClassificationResult::empty(), ClassificationTier::Empty, 0.0)
    }
}

/// Previously classified product from the store
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoricalItem {
    pub identifier: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub product_type: String,
    pub product_on_pages: String,
}

/// Split a `|`-joined facet into trimmed, non-empty values
pub fn split_facet(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(FACET_DELIMITER)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_without_brand() {
        let d = ProductDescriptor::new("Premium Dog Food - Chicken Flavor", "");
        assert_eq!(d.cache_key(), "Premium Dog Food - Chicken Flavor");
    }

    #[test]
    fn test_cache_key_with_brand() {
        let d = ProductDescriptor::new("Kitten Chow", " Purina ");
        assert_eq!(d.cache_key(), "Purina|Kitten Chow");
    }

    #[test]
    fn test_split_facet_drops_blanks() {
        let values: Vec<&str> = split_facet(" Dry Dog Food || Treats |").collect();
        assert_eq!(values, vec!["Dry Dog Food", "Treats"]);
    }

    #[test]
    fn test_candidate_set_sources() {
        let mut set = CandidateSet::new("035585499741");
        set.name.insert("chewy".into(), "Dog Food".into());
        set.images.insert("petco".into(), vec!["a.jpg".into()]);
        let sources: Vec<String> = set.sources().into_iter().collect();
        assert_eq!(sources, vec!["chewy".to_string(), "petco".to_string()]);
        assert!(!set.is_empty());
        assert!(CandidateSet::new("x").is_empty());
    }

    #[test]
    fn test_result_emptiness() {
        assert!(ClassificationResult::empty().is_empty());
        assert!(!ClassificationResult::new("", "Treats", "").is_empty());
    }
}
