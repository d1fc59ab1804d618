//! # Ownership Lookups
//!
//! Read-only answers to "who owns this?" for the authorization layer that
//! sits in front of the engine. The engine itself never consults them.
//!
//! ```text
//! caller (user_id, role) ──► OwnershipLookup::order_owner(order_id)
//!                                   │
//!                                   ▼
//!                      Some(client_id) == user_id ? proceed : 403
//! ```

use sqlx::SqlitePool;

use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct OwnershipLookup {
    pool: SqlitePool,
}

impl OwnershipLookup {
    pub fn new(pool: SqlitePool) -> Self {
        OwnershipLookup { pool }
    }

    /// Client that owns the order. `None` if the order does not exist.
    pub async fn order_owner(&self, order_id: &str) -> DbResult<Option<String>> {
        let owner = sqlx::query_scalar("SELECT client_id FROM orders WHERE id = ?1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(owner)
    }

    /// Client that owns the order the cart line belongs to.
    pub async fn line_owner(&self, line_id: &str) -> DbResult<Option<String>> {
        let owner = sqlx::query_scalar(
            r#"
            SELECT o.client_id
            FROM cart_lines l
            JOIN orders o ON o.id = l.order_id
            WHERE l.id = ?1
            "#,
        )
        .bind(line_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner)
    }

    /// Client that owns the checkout's order.
    pub async fn checkout_owner(&self, checkout_id: &str) -> DbResult<Option<String>> {
        let owner = sqlx::query_scalar(
            r#"
            SELECT o.client_id
            FROM checkouts c
            JOIN orders o ON o.id = c.order_id
            WHERE c.id = ?1
            "#,
        )
        .bind(checkout_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner)
    }

    /// Affiliate listing the product.
    ///
    /// Outer `None`: no such product. Inner `None`: a house product with no
    /// affiliate.
    pub async fn product_affiliate(&self, product_id: &str) -> DbResult<Option<Option<String>>> {
        let affiliate = sqlx::query_scalar("SELECT affiliate_id FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(affiliate)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
