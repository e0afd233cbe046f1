//! Product store
//!
//! Finalized products keyed by identifier. The store is also the historical
//! corpus for the fuzzy and default tiers and the source of taxonomy refreshes.

use crate::models::TaxonomyRow;
use crate::types::{FinalizedProduct, HistoricalItem};
use crate::utils::{retry_with_backoff, RetryPolicy};
use pcat_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::time::Duration;

/// Lock contention is the only store error worth retrying
fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(e) => {
            let msg = e.to_string();
            msg.contains("database is locked") || msg.contains("database table is locked")
        }
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct ProductStore {
    pool: SqlitePool,
    lock_retry: RetryPolicy,
}

impl ProductStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            lock_retry: RetryPolicy::new(5, Duration::from_millis(50), Duration::from_millis(1000)),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Identifiers already in the store
    pub async fn existing_identifiers(&self) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT identifier FROM products")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    /// Products with a non-empty category or product type
    pub async fn historical_items(&self) -> Result<Vec<HistoricalItem>> {
        let rows = sqlx::query(
            r#"
            SELECT identifier, name, brand, category, product_type, product_on_pages
            FROM products
            WHERE TRIM(category) != '' OR TRIM(product_type) != ''
            ORDER BY identifier
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| HistoricalItem {
                identifier: row.get("identifier"),
                name: row.get("name"),
                brand: row.get("brand"),
                category: row.get("category"),
                product_type: row.get("product_type"),
                product_on_pages: row.get("product_on_pages"),
            })
            .collect())
    }

    /// Facets of every product with a category and a product type
    pub async fn taxonomy_rows(&self) -> Result<Vec<TaxonomyRow>> {
        let rows = sqlx::query(
            r#"
            SELECT category, product_type, product_on_pages
            FROM products
            WHERE TRIM(category) != '' AND TRIM(product_type) != ''
            ORDER BY identifier
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TaxonomyRow {
                category: row.get("category"),
                product_type: row.get("product_type"),
                product_on_pages: row.get("product_on_pages"),
            })
            .collect())
    }

    /// Insert or replace a product; `created_at` survives updates
    pub async fn upsert_product(&self, product: &FinalizedProduct) -> Result<()> {
        let images = serde_json::to_string(&product.images)
            .map_err(|e| Error::Internal(format!("Failed to serialize images: {}", e)))?;
        let cross_sell = serde_json::to_string(&product.cross_sell)
            .map_err(|e| Error::Internal(format!("Failed to serialize cross_sell: {}", e)))?;
        let now = chrono::Utc::now().to_rfc3339();

        retry_with_backoff("upsert_product", &self.lock_retry, is_lock_error, || async {
            sqlx::query(
                r#"
                INSERT INTO products (
                    identifier, name, brand, weight, price, images,
                    category, product_type, product_on_pages,
                    special_order, disabled, cross_sell, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(identifier) DO UPDATE SET
                    name = excluded.name,
                    brand = excluded.brand,
                    weight = excluded.weight,
                    price = excluded.price,
                    images = excluded.images,
                    category = excluded.category,
                    product_type = excluded.product_type,
                    product_on_pages = excluded.product_on_pages,
                    special_order = excluded.special_order,
                    disabled = excluded.disabled,
                    cross_sell = excluded.cross_sell,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&product.identifier)
            .bind(&product.name)
            .bind(&product.brand)
            .bind(&product.weight)
            .bind(&product.price)
            .bind(&images)
            .bind(&product.category)
            .bind(&product.product_type)
            .bind(&product.product_on_pages)
            .bind(product.special_order)
            .bind(product.disabled)
            .bind(&cross_sell)
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await
    }

    pub async fn get_product(&self, identifier: &str) -> Result<Option<FinalizedProduct>> {
        let row = sqlx::query(
            r#"
            SELECT identifier, name, brand, weight, price, images, category, product_type,
                   product_on_pages, special_order, disabled, cross_sell
            FROM products
            WHERE identifier = ?
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| product_from_row(&r)).transpose()
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

fn product_from_row(row: &SqliteRow) -> Result<FinalizedProduct> {
    let images: String = row.get("images");
    let cross_sell: String = row.get("cross_sell");
    Ok(FinalizedProduct {
        identifier: row.get("identifier"),
        name: row.get("name"),
        brand: row.get("brand"),
        weight: row.get("weight"),
        price: row.get("price"),
        images: serde_json::from_str(&images)
            .map_err(|e| Error::Internal(format!("Corrupt images column: {}", e)))?,
        category: row.get("category"),
        product_type: row.get("product_type"),
        product_on_pages: row.get("product_on_pages"),
        special_order: row.get("special_order"),
        disabled: row.get("disabled"),
        cross_sell: serde_json::from_str(&cross_sell)
            .map_err(|e| Error::Internal(format!("Corrupt cross_sell column: {}", e)))?,
    })
}
