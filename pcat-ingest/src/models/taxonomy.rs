//! Product taxonomy
//!
//! Category → product types, plus the display page list. Loaded once at startup
//! from `taxonomy.toml`, or rebuilt bottom-up from what the store already holds.

use crate::db::ProductStore;
use crate::types::split_facet;
use pcat_common::config::write_atomically;
use pcat_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Facet values of one stored product, as used by a taxonomy refresh
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaxonomyRow {
    pub category: String,
    pub product_type: String,
    pub product_on_pages: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Taxonomy {
    /// Display pages, in order
    #[serde(default)]
    pub pages: Vec<String>,

    /// Category → ordered, de-duplicated product types
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
}

impl Taxonomy {
    /// Built-in pet-supply taxonomy used when no file is configured
    pub fn builtin() -> Self {
        let mut taxonomy = Taxonomy::default();
        let categories: [(&str, &[&str]); 10] = [
            ("Dog Food", &["Dry Dog Food", "Wet Dog Food", "Puppy Food"]),
            ("Dog Treats", &["Chews", "Biscuits", "Dental Treats", "Jerky Treats"]),
            ("Dog Toys", &["Chew Toys", "Plush Toys", "Fetch Toys"]),
            ("Dog Supplies", &["Beds", "Collars & Leashes", "Bowls", "Grooming"]),
            ("Cat Food", &["Dry Cat Food", "Wet Cat Food", "Kitten Food"]),
            ("Cat Litter", &["Clumping Litter", "Non-Clumping Litter", "Litter Boxes"]),
            ("Cat Supplies", &["Cat Toys", "Scratchers", "Cat Trees", "Grooming"]),
            ("Bird Supplies", &["Bird Food", "Cages", "Bird Toys"]),
            ("Fish Supplies", &["Fish Food", "Aquariums", "Filters"]),
            ("Small Animal Supplies", &["Small Animal Food", "Bedding", "Habitats"]),
        ];
        for (category, types) in categories {
            for product_type in types {
                taxonomy.insert_type(category, product_type);
            }
        }
        for page in [
            "Dog Food Shop All",
            "Dog Treats Shop All",
            "Dog Toys Shop All",
            "Dog Supplies Shop All",
            "Cat Food Shop All",
            "Cat Litter Shop All",
            "Cat Supplies Shop All",
            "Bird Shop All",
            "Fish Shop All",
            "Small Animal Shop All",
            "New Arrivals",
            "Deals",
        ] {
            taxonomy.insert_page(page);
        }
        taxonomy
    }

    /// Load from TOML, falling back to the built-in taxonomy when the file is missing
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("No taxonomy file configured, using built-in taxonomy");
            return Ok(Self::builtin());
        };
        if !path.exists() {
            warn!(
                path = %path.display(),
                "Taxonomy file not found, using built-in taxonomy"
            );
            return Ok(Self::builtin());
        }
        Self::load(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut parsed: Taxonomy = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        parsed.dedup();
        info!(
            path = %path.display(),
            categories = parsed.categories.len(),
            pages = parsed.pages.len(),
            "Loaded taxonomy"
        );
        Ok(parsed)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Serialize taxonomy failed: {}", e)))?;
        write_atomically(path, content.as_bytes())
    }

    /// Rebuild from stored products
    ///
    /// Rows lacking a category or product type are skipped. `|`-joined values are
    /// split; order is first-seen.
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a TaxonomyRow>,
    {
        let mut taxonomy = Taxonomy::default();
        for row in rows {
            let category = row.category.trim();
            if category.is_empty() || row.product_type.trim().is_empty() {
                continue;
            }
            for product_type in split_facet(&row.product_type) {
                taxonomy.insert_type(category, product_type);
            }
            for page in split_facet(&row.product_on_pages) {
                taxonomy.insert_page(page);
            }
        }
        taxonomy
    }

    /// Rebuild from the product store's classified rows
    pub async fn refresh_from_store(store: &ProductStore) -> Result<Self> {
        let rows = store.taxonomy_rows().await?;
        let taxonomy = Self::from_rows(&rows);
        info!(
            rows = rows.len(),
            categories = taxonomy.categories.len(),
            pages = taxonomy.pages.len(),
            "Taxonomy rebuilt from store"
        );
        Ok(taxonomy)
    }

    pub fn insert_type(&mut self, category: &str, product_type: &str) {
        let types = self.categories.entry(category.to_string()).or_default();
        if !types.iter().any(|t| t == product_type) {
            types.push(product_type.to_string());
        }
    }

    pub fn insert_page(&mut self, page: &str) {
        if !self.pages.iter().any(|p| p == page) {
            self.pages.push(page.to_string());
        }
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.pages.is_empty()
    }

    /// Compact JSON of the category → types map, for prompts
    pub fn categories_json(&self) -> String {
        serde_json::to_string(&self.categories).unwrap_or_else(|_| "{}".to_string())
    }

    /// Compact JSON of the page list, for prompts
    pub fn pages_json(&self) -> String {
        serde_json::to_string(&self.pages).unwrap_or_else(|_| "[]".to_string())
    }

    fn dedup(&mut self) {
        let categories = std::mem::take(&mut self.categories);
        for (category, types) in categories {
            self.categories.entry(category.clone()).or_default();
            for product_type in types {
                self.insert_type(&category, &product_type);
            }
        }
        let pages = std::mem::take(&mut self.pages);
        for page in pages {
            self.insert_page(&page);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_has_dog_food() {
        let taxonomy = Taxonomy::builtin();
        assert!(taxonomy.categories["Dog Food"].contains(&"Dry Dog Food".to_string()));
        assert!(taxonomy.pages.contains(&"Dog Food Shop All".to_string()));
    }

    #[test]
    fn test_from_rows_splits_and_dedups() {
        let rows = vec![
            TaxonomyRow {
                category: "Dog Food".into(),
                product_type: "Dry Dog Food|Puppy Food".into(),
                product_on_pages: "Dog Food Shop All|Deals".into(),
            },
            TaxonomyRow {
                category: "Dog Food".into(),
                product_type: "Dry Dog Food".into(),
                product_on_pages: "Deals".into(),
            },
            TaxonomyRow {
                category: "Cat Food".into(),
                product_type: "".into(),
                product_on_pages: "Ignored".into(),
            },
        ];

        let taxonomy = Taxonomy::from_rows(&rows);
        assert_eq!(taxonomy.categories.len(), 1);
        assert_eq!(
            taxonomy.categories["Dog Food"],
            vec!["Dry Dog Food".to_string(), "Puppy Food".to_string()]
        );
        assert_eq!(
            taxonomy.pages,
            vec!["Dog Food Shop All".to_string(), "Deals".to_string()]
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("taxonomy.toml");
        let taxonomy = Taxonomy::builtin();
        taxonomy.save(&path).unwrap();
        assert_eq!(Taxonomy::load(&path).unwrap(), taxonomy);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let taxonomy = Taxonomy::load_or_builtin(Some(&dir.path().join("none.toml"))).unwrap();
        assert_eq!(taxonomy, Taxonomy::builtin());
    }

    #[test]
    fn test_load_handwritten_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("taxonomy.toml");
        std::fs::write(
            &path,
            r#"
pages = ["Reptile Shop All", "Reptile Shop All"]

[categories]
"Reptile Supplies" = ["Heat Lamps", "Terrariums", "Heat Lamps"]
"#,
        )
        .unwrap();

        let taxonomy = Taxonomy::load(&path).unwrap();
        assert_eq!(taxonomy.pages, vec!["Reptile Shop All".to_string()]);
        assert_eq!(taxonomy.categories["Reptile Supplies"].len(), 2);
    }
}
