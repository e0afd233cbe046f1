//! Prompt construction for AI classifiers

use crate::models::Taxonomy;
use crate::types::ProductDescriptor;

pub const SYSTEM_PROMPT: &str = "You classify pet supply products into a fixed store taxonomy. \
Only use category, product type and page names that appear in the taxonomy you are given. \
Join multiple product types or pages with '|'. Respond with JSON only.";

fn describe(product: &ProductDescriptor) -> String {
    if product.brand.trim().is_empty() {
        format!("Name: {}", product.name.trim())
    } else {
        format!("Name: {}\nBrand: {}", product.name.trim(), product.brand.trim())
    }
}

fn taxonomy_block(taxonomy: &Taxonomy) -> String {
    format!(
        "Categories and their product types:\n{}\n\nDisplay pages:\n{}",
        taxonomy.categories_json(),
        taxonomy.pages_json()
    )
}

/// Prompt for one product
pub fn single_prompt(product: &ProductDescriptor, taxonomy: &Taxonomy) -> String {
    format!(
        "{}\n\nProduct:\n{}\n\nAnswer with one JSON object:\n\
         {{\"category\": \"...\", \"product_type\": \"...\", \"product_on_pages\": \"...\"}}",
        taxonomy_block(taxonomy),
        describe(product)
    )
}

/// Prompt for several products answered in one response
pub fn batch_prompt(products: &[ProductDescriptor], taxonomy: &Taxonomy) -> String {
    let listing = products
        .iter()
        .enumerate()
        .map(|(i, p)| format!("Product {}:\n{}", i + 1, describe(p)))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\n{}\n\nAnswer with one JSON object holding one entry per product, \
         using the product number as product_index:\n\
         {{\"classifications\": [{{\"product_index\": 1, \"category\": \"...\", \
         \"product_type\": \"...\", \"product_on_pages\": \"...\"}}]}}",
        taxonomy_block(taxonomy),
        listing
    )
}
