//! # Product Catalog
//!
//! The catalog collaborator: product lookup by id and affiliate listings.
//! The consistency engine only reads `id`, `unit_price_cents` and
//! `is_active`; the rest is here so seeding and listings have a home.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use ecofraldas_core::validation::{validate_price_cents, validate_stock_quantity};
use ecofraldas_core::{Entity, NewProduct, Product, ValidationError};

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use crate::repository::stock;

/// Repository for catalog products.
///
/// ## Usage
/// ```rust,ignore
/// let catalog = db.catalog();
///
/// let product = catalog.insert(&new_product, 50).await?;
/// let same = catalog.get_by_id(&product.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductCatalog {
    pool: SqlitePool,
}

impl ProductCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        ProductCatalog { pool }
    }

    /// Registers a product and, when `initial_stock > 0`, its first stock
    /// entry. Both rows commit together.
    pub async fn insert(&self, new_product: &NewProduct, initial_stock: i64) -> DbResult<Product> {
        if new_product.name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "name".to_string(),
            }
            .into());
        }
        validate_price_cents(new_product.unit_price_cents)?;
        validate_stock_quantity(initial_stock)?;

        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: new_product.name.trim().to_string(),
            unit_price_cents: new_product.unit_price_cents,
            affiliate_id: new_product.affiliate_id.clone(),
            is_active: true,
            created_at: Utc::now(),
        };

        debug!(id = %product.id, name = %product.name, "Inserting product");

        let mut tx = begin_write(&self.pool).await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, name, unit_price_cents, affiliate_id, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.unit_price_cents)
        .bind(&product.affiliate_id)
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&mut *tx)
        .await?;

        if initial_stock > 0 {
            stock::add_stock_in(&mut tx, &product.id, initial_stock).await?;
        }

        tx.commit().await?;

        info!(id = %product.id, initial_stock, "Product registered");
        Ok(product)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        product_in(&mut conn, id).await
    }

    /// Products listed by an affiliate, newest first.
    pub async fn list_by_affiliate(&self, affiliate_id: &str) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, unit_price_cents, affiliate_id, is_active, created_at
            FROM products
            WHERE affiliate_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(affiliate_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Changes the catalog price. Lines already in a cart keep the price
    /// they were added at.
    pub async fn update_price(&self, id: &str, unit_price_cents: i64) -> DbResult<()> {
        validate_price_cents(unit_price_cents)?;

        let result = sqlx::query("UPDATE products SET unit_price_cents = ?2 WHERE id = ?1")
            .bind(id)
            .bind(unit_price_cents)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(Entity::Product, id));
        }

        debug!(id = %id, unit_price_cents, "Product price updated");
        Ok(())
    }

    /// Hides a product from new cart lines (or shows it again).
    pub async fn set_active(&self, id: &str, is_active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(is_active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(Entity::Product, id));
        }

        debug!(id = %id, is_active, "Product visibility changed");
        Ok(())
    }
}

pub(crate) async fn product_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(
        r#"
        SELECT id, name, unit_price_cents, affiliate_id, is_active, created_at
        FROM products
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(product)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_db;
    use ecofraldas_core::CoreError;

    fn diaper(affiliate: Option<&str>) -> NewProduct {
        NewProduct {
            name: "Fralda Ecológica Infantil P".to_string(),
            unit_price_cents: 8990,
            affiliate_id: affiliate.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_insert_with_initial_stock() {
        let db = test_db().await;
        let product = db.catalog().insert(&diaper(None), 50).await.unwrap();

        let fetched = db.catalog().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(fetched.unit_price_cents, 8990);
        assert!(fetched.is_active);
        assert_eq!(db.ledger().available_quantity(&product.id).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_insert_without_stock_creates_no_entry() {
        let db = test_db().await;
        let product = db.catalog().insert(&diaper(None), 0).await.unwrap();
        assert!(db.ledger().entries_for_product(&product.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_validation() {
        let db = test_db().await;
        let mut bad = diaper(None);
        bad.unit_price_cents = 0;
        assert!(matches!(
            db.catalog().insert(&bad, 1).await,
            Err(DbError::Domain(CoreError::Validation(_)))
        ));

        let mut unnamed = diaper(None);
        unnamed.name = "  ".to_string();
        assert!(db.catalog().insert(&unnamed, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_list_by_affiliate() {
        let db = test_db().await;
        let catalog = db.catalog();
        catalog.insert(&diaper(Some("aff-1")), 1).await.unwrap();
        catalog.insert(&diaper(Some("aff-1")), 1).await.unwrap();
        catalog.insert(&diaper(Some("aff-2")), 1).await.unwrap();

        assert_eq!(catalog.list_by_affiliate("aff-1").await.unwrap().len(), 2);
        assert_eq!(catalog.list_by_affiliate("aff-3").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_update_price_and_visibility() {
        let db = test_db().await;
        let catalog = db.catalog();
        let product = catalog.insert(&diaper(None), 1).await.unwrap();

        catalog.update_price(&product.id, 7990).await.unwrap();
        catalog.set_active(&product.id, false).await.unwrap();

        let fetched = catalog.get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(fetched.unit_price_cents, 7990);
        assert!(!fetched.is_active);

        assert!(catalog.update_price("ghost", 100).await.is_err());
    }
}
