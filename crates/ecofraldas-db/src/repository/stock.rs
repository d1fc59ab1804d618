//! # Inventory Ledger
//!
//! Authoritative stock quantity per product. Nothing else writes to
//! `stock_entries`.
//!
//! ## Reservation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    reserve(product, qty)                                │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    SELECT id, quantity FROM stock_entries                               │
//! │      WHERE product_id = ? ORDER BY created_at                           │
//! │    Σ quantity < qty ─────────────► InsufficientStock (no write)         │
//! │         │                                                               │
//! │         ▼  drain entries oldest first                                   │
//! │    UPDATE stock_entries SET quantity = quantity - take                  │
//! │      WHERE id = ? AND quantity >= take                                  │
//! │         │                                                               │
//! │         ├── 1 row  → next entry                                         │
//! │         └── 0 rows → ConsistencyViolation (someone got there first)     │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  The conditional UPDATE is the atomic check-and-decrement. A stale      │
//! │  snapshot surfaces as SQLITE_BUSY_SNAPSHOT (Conflict) or as 0 rows;     │
//! │  both roll back and re-run the whole operation.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Release puts quantity back on the product's first (oldest) entry.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use ecofraldas_core::validation::{validate_restock_quantity, validate_stock_quantity};
use ecofraldas_core::{CoreError, Entity, StockEntry};

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use crate::repository::catalog;
use crate::retry::{with_retry, RetryPolicy};

/// Stock store with atomic reserve / release.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl InventoryLedger {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        InventoryLedger { pool, retry }
    }

    /// Sum of all stock entries for the product. 0 when it has none.
    pub async fn available_quantity(&self, product_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        available_in(&mut conn, product_id).await
    }

    /// Takes `qty` units out of the ledger or fails with `InsufficientStock`
    /// without touching anything.
    pub async fn reserve(&self, product_id: &str, qty: i64) -> DbResult<()> {
        validate_restock_quantity(qty)?;

        with_retry(self.retry, "reserve", move || async move {
            let mut tx = begin_write(&self.pool).await?;
            reserve_in(&mut tx, product_id, qty).await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    /// Puts `qty` units back. Fails with `NotFound(StockEntry)` if the
    /// product was never stocked.
    pub async fn release(&self, product_id: &str, qty: i64) -> DbResult<()> {
        validate_restock_quantity(qty)?;

        with_retry(self.retry, "release", move || async move {
            let mut tx = begin_write(&self.pool).await?;
            release_in(&mut tx, product_id, qty).await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    /// Administrative overwrite of one entry. No reservation semantics.
    pub async fn set_quantity(&self, entry_id: &str, qty: i64) -> DbResult<StockEntry> {
        validate_stock_quantity(qty)?;

        with_retry(self.retry, "set_quantity", move || async move {
            let mut tx = begin_write(&self.pool).await?;

            let result = sqlx::query(
                "UPDATE stock_entries SET quantity = ?2, updated_at = ?3 WHERE id = ?1",
            )
            .bind(entry_id)
            .bind(qty)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::not_found(Entity::StockEntry, entry_id));
            }

            let entry = entry_in(&mut tx, entry_id)
                .await?
                .ok_or_else(|| DbError::not_found(Entity::StockEntry, entry_id))?;
            tx.commit().await?;

            info!(entry_id = %entry_id, quantity = qty, "Stock level overwritten");
            Ok(entry)
        })
        .await
    }

    /// Restocks a product, creating its first entry if it has none.
    ///
    /// Returns the new available quantity.
    pub async fn add_stock(&self, product_id: &str, qty: i64) -> DbResult<i64> {
        validate_restock_quantity(qty)?;

        with_retry(self.retry, "add_stock", move || async move {
            let mut tx = begin_write(&self.pool).await?;

            if catalog::product_in(&mut tx, product_id).await?.is_none() {
                return Err(DbError::not_found(Entity::Product, product_id));
            }

            add_stock_in(&mut tx, product_id, qty).await?;
            let available = available_in(&mut tx, product_id).await?;
            tx.commit().await?;

            Ok(available)
        })
        .await
    }

    /// All entries of a product, oldest first.
    pub async fn entries_for_product(&self, product_id: &str) -> DbResult<Vec<StockEntry>> {
        let entries = sqlx::query_as::<_, StockEntry>(
            r#"
            SELECT id, product_id, quantity, updated_at
            FROM stock_entries
            WHERE product_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Every stock entry of every product. Administrative listing.
    pub async fn list_all(&self) -> DbResult<Vec<StockEntry>> {
        let entries = sqlx::query_as::<_, StockEntry>(
            r#"
            SELECT id, product_id, quantity, updated_at
            FROM stock_entries
            ORDER BY product_id, created_at, rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn get_entry(&self, entry_id: &str) -> DbResult<Option<StockEntry>> {
        let mut conn = self.pool.acquire().await?;
        entry_in(&mut conn, entry_id).await
    }

    /// Deletes a stock entry outright.
    pub async fn remove_entry(&self, entry_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM stock_entries WHERE id = ?1")
            .bind(entry_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(Entity::StockEntry, entry_id));
        }

        info!(entry_id = %entry_id, "Stock entry removed");
        Ok(())
    }
}

// =============================================================================
// Connection-level operations
// =============================================================================
// Used by the cart, order and catalog components so the ledger write commits
// in the caller's transaction.

pub(crate) async fn available_in(conn: &mut SqliteConnection, product_id: &str) -> DbResult<i64> {
    let available: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0) FROM stock_entries WHERE product_id = ?1",
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(available)
}

pub(crate) async fn reserve_in(conn: &mut SqliteConnection, product_id: &str, qty: i64) -> DbResult<()> {
    let entries: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT id, quantity
        FROM stock_entries
        WHERE product_id = ?1 AND quantity > 0
        ORDER BY created_at, rowid
        "#,
    )
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await?;

    let available: i64 = entries.iter().map(|(_, on_hand)| on_hand).sum();
    if available < qty {
        return Err(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            requested: qty,
            available,
        }
        .into());
    }

    let now = Utc::now();
    let mut remaining = qty;

    for (entry_id, on_hand) in entries {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(on_hand);

        let result = sqlx::query(
            r#"
            UPDATE stock_entries
            SET quantity = quantity - ?2, updated_at = ?3
            WHERE id = ?1 AND quantity >= ?2
            "#,
        )
        .bind(&entry_id)
        .bind(take)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ConsistencyViolation(format!(
                "stock entry {} changed while reserving {} of product {}",
                entry_id, qty, product_id
            ))
            .into());
        }

        remaining -= take;
    }

    debug!(product_id = %product_id, quantity = qty, available_before = available, "Stock reserved");
    Ok(())
}

pub(crate) async fn release_in(conn: &mut SqliteConnection, product_id: &str, qty: i64) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE stock_entries
        SET quantity = quantity + ?2, updated_at = ?3
        WHERE id = (
            SELECT id FROM stock_entries
            WHERE product_id = ?1
            ORDER BY created_at, rowid
            LIMIT 1
        )
        "#,
    )
    .bind(product_id)
    .bind(qty)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found(Entity::StockEntry, product_id));
    }

    debug!(product_id = %product_id, quantity = qty, "Stock released");
    Ok(())
}

/// Adds to the product's first entry, or inserts one.
pub(crate) async fn add_stock_in(conn: &mut SqliteConnection, product_id: &str, qty: i64) -> DbResult<()> {
    match release_in(conn, product_id, qty).await {
        Err(DbError::Domain(CoreError::NotFound {
            entity: Entity::StockEntry,
            ..
        })) => {
            let id = Uuid::new_v4().to_string();
            let now = Utc::now();

            sqlx::query(
                r#"
                INSERT INTO stock_entries (id, product_id, quantity, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?4)
                "#,
            )
            .bind(&id)
            .bind(product_id)
            .bind(qty)
            .bind(now)
            .execute(&mut *conn)
            .await?;

            debug!(entry_id = %id, product_id = %product_id, quantity = qty, "Stock entry created");
            Ok(())
        }
        other => other,
    }
}

async fn entry_in(conn: &mut SqliteConnection, entry_id: &str) -> DbResult<Option<StockEntry>> {
    let entry = sqlx::query_as::<_, StockEntry>(
        "SELECT id, product_id, quantity, updated_at FROM stock_entries WHERE id = ?1",
    )
    .bind(entry_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(entry)
}

// =============================================================================
// Unit Tests
// =============================================================================
