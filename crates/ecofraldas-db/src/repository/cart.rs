//! # Cart Repository
//!
//! Line items of an order. Every line holds a reservation in the inventory
//! ledger for exactly its quantity.
//!
//! ## Line Mutation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   One transaction per mutation                          │
//! │                                                                         │
//! │  add_line(order, P, 20)      update_line(line, 25)    remove_line(line) │
//! │       │                           │                         │           │
//! │       ▼                           ▼                         ▼           │
//! │  order is OPEN? ─── no ──► InvalidState (nothing reserved or released)  │
//! │       │ yes                       │                         │           │
//! │       ▼                           ▼                         ▼           │
//! │  reserve(P, 20)            reserve(P, +5) or          release(P, qty)   │
//! │                            release(P, -delta)                           │
//! │       │                           │                         │           │
//! │       ▼                           ▼                         ▼           │
//! │  INSERT line               UPDATE line                DELETE line       │
//! │       │                           │                         │           │
//! │       └──────────────► recompute_total(order) ◄─────────────┘           │
//! │                               COMMIT                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use ecofraldas_core::validation::{validate_cart_size, validate_quantity};
use ecofraldas_core::{CartLine, CoreError, Entity, Order, PaymentType, MAX_CART_LINES};

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use crate::repository::{catalog, order, stock};
use crate::retry::{with_retry, RetryPolicy};

const LINE_COLUMNS: &str =
    "id, order_id, product_id, quantity, unit_price_cents, payment_type, created_at";

/// Repository for cart lines.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl CartRepository {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        CartRepository { pool, retry }
    }

    /// Reserves stock and adds a line at the product's current price.
    pub async fn add_line(
        &self,
        order_id: &str,
        product_id: &str,
        qty: i64,
        payment_type: PaymentType,
    ) -> DbResult<CartLine> {
        validate_quantity(qty)?;

        with_retry(self.retry, "add_line", move || async move {
            let mut tx = begin_write(&self.pool).await?;

            let order = order::require_order_in(&mut tx, order_id).await?;
            let line = add_line_in(&mut tx, &order, product_id, qty, payment_type).await?;

            tx.commit().await?;
            Ok(line)
        })
        .await
    }

    /// Changes a line's quantity, reserving or releasing the difference,
    /// and optionally its payment type.
    pub async fn update_line(
        &self,
        line_id: &str,
        new_qty: i64,
        payment_type: Option<PaymentType>,
    ) -> DbResult<CartLine> {
        validate_quantity(new_qty)?;

        with_retry(self.retry, "update_line", move || async move {
            let mut tx = begin_write(&self.pool).await?;

            let line = require_line_in(&mut tx, line_id).await?;
            let parent = order::require_order_in(&mut tx, &line.order_id).await?;
            ensure_mutable(&parent)?;

            let delta = new_qty - line.quantity;
            if delta > 0 {
                stock::reserve_in(&mut tx, &line.product_id, delta).await?;
            } else if delta < 0 {
                stock::release_in(&mut tx, &line.product_id, -delta).await?;
            }

            let result = sqlx::query(
                r#"
                UPDATE cart_lines
                SET quantity = ?2, payment_type = COALESCE(?3, payment_type)
                WHERE id = ?1 AND quantity = ?4
                "#,
            )
            .bind(line_id)
            .bind(new_qty)
            .bind(payment_type)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(CoreError::ConsistencyViolation(format!(
                    "cart line {} changed while being updated",
                    line_id
                ))
                .into());
            }

            order::recompute_total_in(&mut tx, &line.order_id).await?;

            let updated = require_line_in(&mut tx, line_id).await?;
            tx.commit().await?;

            debug!(line_id = %line_id, from = line.quantity, to = new_qty, "Cart line updated");
            Ok(updated)
        })
        .await
    }

    /// Releases a line's whole quantity and deletes it.
    pub async fn remove_line(&self, line_id: &str) -> DbResult<()> {
        with_retry(self.retry, "remove_line", move || async move {
            let mut tx = begin_write(&self.pool).await?;

            let line = require_line_in(&mut tx, line_id).await?;
            let parent = order::require_order_in(&mut tx, &line.order_id).await?;
            ensure_mutable(&parent)?;

            stock::release_in(&mut tx, &line.product_id, line.quantity).await?;

            let result = sqlx::query("DELETE FROM cart_lines WHERE id = ?1")
                .bind(line_id)
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() == 0 {
                return Err(CoreError::ConsistencyViolation(format!(
                    "cart line {} vanished while being removed",
                    line_id
                ))
                .into());
            }

            order::recompute_total_in(&mut tx, &line.order_id).await?;
            tx.commit().await?;

            debug!(line_id = %line_id, order_id = %line.order_id, quantity = line.quantity, "Cart line removed");
            Ok(())
        })
        .await
    }

    pub async fn lines_for_order(&self, order_id: &str) -> DbResult<Vec<CartLine>> {
        let mut conn = self.pool.acquire().await?;
        lines_in(&mut conn, order_id).await
    }

    pub async fn get_line(&self, line_id: &str) -> DbResult<Option<CartLine>> {
        let mut conn = self.pool.acquire().await?;
        line_in(&mut conn, line_id).await
    }

    /// Every cart line of every order. Administrative listing.
    pub async fn list_all(&self) -> DbResult<Vec<CartLine>> {
        let sql = format!("SELECT {LINE_COLUMNS} FROM cart_lines ORDER BY created_at, rowid");
        let lines = sqlx::query_as::<_, CartLine>(&sql).fetch_all(&self.pool).await?;

        Ok(lines)
    }

    /// Every line across all of a client's orders.
    pub async fn lines_for_client(&self, client_id: &str) -> DbResult<Vec<CartLine>> {
        let lines = sqlx::query_as::<_, CartLine>(
            r#"
            SELECT l.id, l.order_id, l.product_id, l.quantity, l.unit_price_cents,
                   l.payment_type, l.created_at
            FROM cart_lines l
            JOIN orders o ON o.id = l.order_id
            WHERE o.client_id = ?1
            ORDER BY l.created_at, l.rowid
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }
}

// =============================================================================
// Connection-level operations
// =============================================================================

fn ensure_mutable(order: &Order) -> DbResult<()> {
    if order.status.allows_cart_mutation() {
        Ok(())
    } else {
        Err(DbError::invalid_state(
            Entity::Order,
            &order.id,
            format!("cart can only change while OPEN (status is {})", order.status),
        ))
    }
}

/// Reserve, insert and recompute inside the caller's transaction.
pub(crate) async fn add_line_in(
    conn: &mut SqliteConnection,
    order: &Order,
    product_id: &str,
    qty: i64,
    payment_type: PaymentType,
) -> DbResult<CartLine> {
    validate_quantity(qty)?;
    ensure_mutable(order)?;

    let product = catalog::product_in(conn, product_id)
        .await?
        .ok_or_else(|| DbError::not_found(Entity::Product, product_id))?;
    if !product.is_active {
        return Err(DbError::invalid_state(
            Entity::Product,
            product_id,
            "product is not available for sale",
        ));
    }

    let current_lines: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cart_lines WHERE order_id = ?1")
        .bind(&order.id)
        .fetch_one(&mut *conn)
        .await?;
    validate_cart_size(current_lines as usize).map_err(|_| CoreError::CartTooLarge { max: MAX_CART_LINES })?;

    stock::reserve_in(conn, product_id, qty).await?;

    let line = CartLine {
        id: Uuid::new_v4().to_string(),
        order_id: order.id.clone(),
        product_id: product_id.to_string(),
        quantity: qty,
        unit_price_cents: product.unit_price_cents,
        payment_type,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO cart_lines (id, order_id, product_id, quantity, unit_price_cents, payment_type, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&line.id)
    .bind(&line.order_id)
    .bind(&line.product_id)
    .bind(line.quantity)
    .bind(line.unit_price_cents)
    .bind(line.payment_type)
    .bind(line.created_at)
    .execute(&mut *conn)
    .await?;

    order::recompute_total_in(conn, &order.id).await?;

    debug!(
        line_id = %line.id,
        order_id = %order.id,
        product_id = %product_id,
        quantity = qty,
        "Cart line added"
    );
    Ok(line)
}

/// Lines of an order in the order they were added.
pub(crate) async fn lines_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<CartLine>> {
    let sql = format!("SELECT {LINE_COLUMNS} FROM cart_lines WHERE order_id = ?1 ORDER BY created_at, rowid");
    let lines = sqlx::query_as::<_, CartLine>(&sql)
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(lines)
}

pub(crate) async fn line_in(conn: &mut SqliteConnection, line_id: &str) -> DbResult<Option<CartLine>> {
    let sql = format!("SELECT {LINE_COLUMNS} FROM cart_lines WHERE id = ?1");
    let line = sqlx::query_as::<_, CartLine>(&sql)
        .bind(line_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(line)
}

async fn require_line_in(conn: &mut SqliteConnection, line_id: &str) -> DbResult<CartLine> {
    line_in(conn, line_id)
        .await?
        .ok_or_else(|| DbError::not_found(Entity::CartLine, line_id))
}

// =============================================================================
// Unit Tests
// =============================================================================
