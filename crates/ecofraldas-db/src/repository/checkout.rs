//! # Checkout Repository
//!
//! One-shot conversion of an OPEN or PROCESSING order into a priced,
//! addressed, payment-tracked record, and the payment notifications that
//! finish the order.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  process(order, address, method)                                        │
//! │     ├── order already has a checkout?     → InvalidState                │
//! │     ├── status ∉ {OPEN, PROCESSING}?      → InvalidState                │
//! │     ├── snapshot total + every line (checkout_lines)                    │
//! │     ├── INSERT checkouts (order_id UNIQUE) ← loser of a race fails here │
//! │     └── order → AWAITING_PAYMENT                  (same transaction)    │
//! │                                                                         │
//! │  update_payment_status(checkout, status)                                │
//! │     ├── PENDING → PAID      ⇒ order → PAID                              │
//! │     └── PENDING → CANCELED  ⇒ order → CANCELED, stock given back        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use ecofraldas_core::totals::{snapshot_lines, verify_total};
use ecofraldas_core::validation::validate_shipping_address;
use ecofraldas_core::{
    Checkout, CheckoutLine, CoreError, Entity, OrderStatus, PaymentStatus, PaymentType,
};

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use crate::repository::{cart, order};
use crate::retry::{with_retry, RetryPolicy};

const CHECKOUT_COLUMNS: &str = "id, order_id, total_price_cents, payment_status, payment_method, \
                                shipping_address, created_at, updated_at";

/// Repository for checkouts.
#[derive(Debug, Clone)]
pub struct CheckoutRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl CheckoutRepository {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        CheckoutRepository { pool, retry }
    }

    /// Creates the order's checkout and moves the order to AWAITING_PAYMENT.
    pub async fn process(
        &self,
        order_id: &str,
        shipping_address: &str,
        payment_method: PaymentType,
    ) -> DbResult<Checkout> {
        validate_shipping_address(shipping_address)?;
        let shipping_address = shipping_address.trim();

        with_retry(self.retry, "process_checkout", move || async move {
            let mut tx = begin_write(&self.pool).await?;

            let parent = order::require_order_in(&mut tx, order_id).await?;

            if checkout_for_order_in(&mut tx, order_id).await?.is_some() {
                return Err(already_checked_out(order_id));
            }
            if !parent.status.allows_checkout() {
                return Err(DbError::invalid_state(
                    Entity::Order,
                    order_id,
                    format!("cannot check out an order in status {}", parent.status),
                ));
            }

            let lines = cart::lines_in(&mut tx, order_id).await?;
            if lines.is_empty() {
                return Err(DbError::invalid_state(
                    Entity::Order,
                    order_id,
                    "cannot check out an empty cart",
                ));
            }
            verify_total(order_id, parent.total_cents, &lines)?;

            let now = Utc::now();
            let id = Uuid::new_v4().to_string();
            let checkout = Checkout {
                id: id.clone(),
                order_id: order_id.to_string(),
                total_price_cents: parent.total_cents,
                payment_status: PaymentStatus::Pending,
                payment_method,
                shipping_address: shipping_address.to_string(),
                created_at: now,
                updated_at: now,
                lines: snapshot_lines(&id, &lines),
            };

            sqlx::query(
                r#"
                INSERT INTO checkouts (
                    id, order_id, total_price_cents, payment_status, payment_method,
                    shipping_address, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&checkout.id)
            .bind(&checkout.order_id)
            .bind(checkout.total_price_cents)
            .bind(checkout.payment_status)
            .bind(checkout.payment_method)
            .bind(&checkout.shipping_address)
            .bind(checkout.created_at)
            .bind(checkout.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { .. } => already_checked_out(order_id),
                other => other,
            })?;

            for (position, line) in checkout.lines.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO checkout_lines (checkout_id, position, product_id, quantity, unit_price_cents)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                )
                .bind(&line.checkout_id)
                .bind(position as i64)
                .bind(&line.product_id)
                .bind(line.quantity)
                .bind(line.unit_price_cents)
                .execute(&mut *tx)
                .await?;
            }

            order::transition_in(&mut tx, &parent, OrderStatus::AwaitingPayment).await?;

            tx.commit().await?;

            info!(
                checkout_id = %checkout.id,
                order_id = %order_id,
                total_cents = checkout.total_price_cents,
                lines = checkout.lines.len(),
                "Checkout created"
            );
            Ok(checkout)
        })
        .await
    }

    /// Applies a payment notification and drives the order accordingly.
    pub async fn update_payment_status(
        &self,
        checkout_id: &str,
        status: PaymentStatus,
    ) -> DbResult<Checkout> {
        with_retry(self.retry, "update_payment_status", move || async move {
            let mut tx = begin_write(&self.pool).await?;

            let current = require_checkout_in(&mut tx, checkout_id).await?;
            current.payment_status.ensure_transition(checkout_id, status)?;

            let result = sqlx::query(
                r#"
                UPDATE checkouts
                SET payment_status = ?2, updated_at = ?3
                WHERE id = ?1 AND payment_status = ?4
                "#,
            )
            .bind(checkout_id)
            .bind(status)
            .bind(Utc::now())
            .bind(current.payment_status)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(CoreError::ConsistencyViolation(format!(
                    "checkout {} left {} before it could move to {}",
                    checkout_id, current.payment_status, status
                ))
                .into());
            }

            if let Some(next) = status.order_status() {
                let parent = order::require_order_in(&mut tx, &current.order_id).await?;
                order::transition_in(&mut tx, &parent, next).await?;
            }

            let updated = load_in(&mut tx, checkout_id).await?;
            tx.commit().await?;

            info!(checkout_id = %checkout_id, payment_status = %status, "Payment status updated");
            Ok(updated)
        })
        .await
    }

    /// Changes the shipping address. No state transition.
    pub async fn update_shipping_address(&self, checkout_id: &str, address: &str) -> DbResult<Checkout> {
        validate_shipping_address(address)?;
        let address = address.trim();

        with_retry(self.retry, "update_shipping_address", move || async move {
            let mut tx = begin_write(&self.pool).await?;

            let result = sqlx::query(
                "UPDATE checkouts SET shipping_address = ?2, updated_at = ?3 WHERE id = ?1",
            )
            .bind(checkout_id)
            .bind(address)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::not_found(Entity::Checkout, checkout_id));
            }

            let updated = load_in(&mut tx, checkout_id).await?;
            tx.commit().await?;

            debug!(checkout_id = %checkout_id, "Shipping address updated");
            Ok(updated)
        })
        .await
    }

    /// Gets a checkout with its line snapshot.
    pub async fn get(&self, checkout_id: &str) -> DbResult<Option<Checkout>> {
        let mut conn = self.pool.acquire().await?;

        match checkout_row_in(&mut conn, checkout_id).await? {
            Some(mut checkout) => {
                checkout.lines = lines_in(&mut conn, checkout_id).await?;
                Ok(Some(checkout))
            }
            None => Ok(None),
        }
    }

    pub async fn get_by_order(&self, order_id: &str) -> DbResult<Option<Checkout>> {
        let mut conn = self.pool.acquire().await?;

        match checkout_for_order_in(&mut conn, order_id).await? {
            Some(mut checkout) => {
                checkout.lines = lines_in(&mut conn, &checkout.id).await?;
                Ok(Some(checkout))
            }
            None => Ok(None),
        }
    }

    /// All checkouts of a client's orders, newest first.
    pub async fn list_for_client(&self, client_id: &str) -> DbResult<Vec<Checkout>> {
        let mut conn = self.pool.acquire().await?;

        let mut checkouts = sqlx::query_as::<_, Checkout>(
            r#"
            SELECT c.id, c.order_id, c.total_price_cents, c.payment_status, c.payment_method,
                   c.shipping_address, c.created_at, c.updated_at
            FROM checkouts c
            JOIN orders o ON o.id = c.order_id
            WHERE o.client_id = ?1
            ORDER BY c.created_at DESC, c.rowid DESC
            "#,
        )
        .bind(client_id)
        .fetch_all(&mut *conn)
        .await?;

        attach_lines_in(&mut conn, &mut checkouts).await?;
        Ok(checkouts)
    }

    /// Checkouts that bought at least one product listed by the affiliate.
    ///
    /// Matches on the frozen checkout lines, so later cart edits on other
    /// orders do not move a checkout in or out of the list.
    pub async fn list_for_affiliate(&self, affiliate_id: &str) -> DbResult<Vec<Checkout>> {
        let mut conn = self.pool.acquire().await?;

        let mut checkouts = sqlx::query_as::<_, Checkout>(
            r#"
            SELECT c.id, c.order_id, c.total_price_cents, c.payment_status, c.payment_method,
                   c.shipping_address, c.created_at, c.updated_at
            FROM checkouts c
            WHERE EXISTS (
                SELECT 1
                FROM checkout_lines l
                JOIN products p ON p.id = l.product_id
                WHERE l.checkout_id = c.id AND p.affiliate_id = ?1
            )
            ORDER BY c.created_at DESC, c.rowid DESC
            "#,
        )
        .bind(affiliate_id)
        .fetch_all(&mut *conn)
        .await?;

        attach_lines_in(&mut conn, &mut checkouts).await?;
        Ok(checkouts)
    }

    /// Every checkout, newest first. Administrative listing.
    pub async fn list_all(&self) -> DbResult<Vec<Checkout>> {
        let mut conn = self.pool.acquire().await?;

        let sql = format!("SELECT {CHECKOUT_COLUMNS} FROM checkouts ORDER BY created_at DESC, rowid DESC");
        let mut checkouts = sqlx::query_as::<_, Checkout>(&sql)
            .fetch_all(&mut *conn)
            .await?;

        attach_lines_in(&mut conn, &mut checkouts).await?;
        Ok(checkouts)
    }
}

fn already_checked_out(order_id: &str) -> DbError {
    DbError::invalid_state(Entity::Order, order_id, "order already has a checkout")
}

// =============================================================================
// Connection-level operations
// =============================================================================

/// Cancels the order's checkout if it is still PENDING. No-op otherwise.
pub(crate) async fn cancel_pending_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE checkouts
        SET payment_status = ?2, updated_at = ?3
        WHERE order_id = ?1 AND payment_status = ?4
        "#,
    )
    .bind(order_id)
    .bind(PaymentStatus::Canceled)
    .bind(Utc::now())
    .bind(PaymentStatus::Pending)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() > 0 {
        debug!(order_id = %order_id, "Pending checkout canceled with its order");
    }
    Ok(())
}

async fn checkout_row_in(conn: &mut SqliteConnection, checkout_id: &str) -> DbResult<Option<Checkout>> {
    let sql = format!("SELECT {CHECKOUT_COLUMNS} FROM checkouts WHERE id = ?1");
    let checkout = sqlx::query_as::<_, Checkout>(&sql)
        .bind(checkout_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(checkout)
}

async fn checkout_for_order_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Option<Checkout>> {
    let sql = format!("SELECT {CHECKOUT_COLUMNS} FROM checkouts WHERE order_id = ?1");
    let checkout = sqlx::query_as::<_, Checkout>(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(checkout)
}

async fn require_checkout_in(conn: &mut SqliteConnection, checkout_id: &str) -> DbResult<Checkout> {
    checkout_row_in(conn, checkout_id)
        .await?
        .ok_or_else(|| DbError::not_found(Entity::Checkout, checkout_id))
}

async fn load_in(conn: &mut SqliteConnection, checkout_id: &str) -> DbResult<Checkout> {
    let mut checkout = require_checkout_in(conn, checkout_id).await?;
    checkout.lines = lines_in(conn, checkout_id).await?;
    Ok(checkout)
}

async fn attach_lines_in(conn: &mut SqliteConnection, checkouts: &mut [Checkout]) -> DbResult<()> {
    for checkout in checkouts {
        checkout.lines = lines_in(conn, &checkout.id).await?;
    }
    Ok(())
}

async fn lines_in(conn: &mut SqliteConnection, checkout_id: &str) -> DbResult<Vec<CheckoutLine>> {
    let lines = sqlx::query_as::<_, CheckoutLine>(
        r#"
        SELECT checkout_id, product_id, quantity, unit_price_cents
        FROM checkout_lines
        WHERE checkout_id = ?1
        ORDER BY position
        "#,
    )
    .bind(checkout_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(lines)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{file_db, remove_db_files, seed_affiliate_product, seed_client, seed_product, test_db};
    use crate::Database;

    /// Order with P1 qty 2 @ $10 and P2 qty 1 @ $5.
    async fn two_line_order(db: &Database) -> (String, String, String) {
        let client = seed_client(db).await;
        let p1 = seed_product(db, 1000, 10).await;
        let p2 = seed_product(db, 500, 10).await;
        let orders = db.orders();

        let order = orders.create_for_client(&client.id).await.unwrap();
        orders.add_product(&order.id, &p1.id, 2, PaymentType::Card).await.unwrap();
        orders.add_product(&order.id, &p2.id, 1, PaymentType::Card).await.unwrap();
        (order.id, p1.id, p2.id)
    }

    #[tokio::test]
    async fn test_process_scenario_b() {
        let db = test_db().await;
        let (order_id, p1, p2) = two_line_order(&db).await;

        let checkout = db
            .checkouts()
            .process(&order_id, "123 Main St", PaymentType::Card)
            .await
            .unwrap();

        assert_eq!(checkout.total_price_cents, 2500);
        assert_eq!(checkout.payment_status, PaymentStatus::Pending);
        assert_eq!(checkout.payment_method, PaymentType::Card);
        assert_eq!(checkout.shipping_address, "123 Main St");
        assert_eq!(checkout.lines.len(), 2);
        assert_eq!(checkout.lines[0].product_id, p1);
        assert_eq!(checkout.lines[0].quantity, 2);
        assert_eq!(checkout.lines[1].product_id, p2);

        let order = db.orders().get(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::AwaitingPayment);

        let stored = db.checkouts().get(&checkout.id).await.unwrap().unwrap();
        assert_eq!(stored.lines, checkout.lines);
    }

    #[tokio::test]
    async fn test_second_process_is_invalid_state() {
        let db = test_db().await;
        let (order_id, _, _) = two_line_order(&db).await;
        let checkouts = db.checkouts();

        checkouts.process(&order_id, "123 Main St", PaymentType::Card).await.unwrap();
        let err = checkouts
            .process(&order_id, "456 Other Ave", PaymentType::Pix)
            .await
            .unwrap_err();

        assert!(matches!(err.as_domain(), Some(CoreError::InvalidState { .. })));
        let checkout = checkouts.get_by_order(&order_id).await.unwrap().unwrap();
        assert_eq!(checkout.shipping_address, "123 Main St");
    }

    #[tokio::test]
    async fn test_process_from_processing() {
        let db = test_db().await;
        let (order_id, _, _) = two_line_order(&db).await;
        db.orders().set_status(&order_id, OrderStatus::Processing).await.unwrap();

        db.checkouts().process(&order_id, "123 Main St", PaymentType::Boleto).await.unwrap();
        let order = db.orders().get(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::AwaitingPayment);
    }

    #[tokio::test]
    async fn test_process_refuses_canceled_and_empty_orders() {
        let db = test_db().await;
        let client = seed_client(&db).await;
        let orders = db.orders();
        let checkouts = db.checkouts();

        let empty = orders.create_for_client(&client.id).await.unwrap();
        let err = checkouts.process(&empty.id, "123 Main St", PaymentType::Card).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidState { .. })));

        orders.set_status(&empty.id, OrderStatus::Canceled).await.unwrap();
        let err = checkouts.process(&empty.id, "123 Main St", PaymentType::Card).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidState { .. })));

        let err = checkouts.process("ghost", "123 Main St", PaymentType::Card).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::NotFound { entity: Entity::Order, .. })));
    }

    #[tokio::test]
    async fn test_process_validates_address() {
        let db = test_db().await;
        let (order_id, _, _) = two_line_order(&db).await;

        let err = db.checkouts().process(&order_id, "   ", PaymentType::Card).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
        let order = db.orders().get(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Open);
    }

    #[tokio::test]
    async fn test_payment_paid_scenario_e() {
        let db = test_db().await;
        let (order_id, p1, _) = two_line_order(&db).await;
        let checkouts = db.checkouts();

        let checkout = checkouts.process(&order_id, "123 Main St", PaymentType::Card).await.unwrap();
        let updated = checkouts
            .update_payment_status(&checkout.id, PaymentStatus::Paid)
            .await
            .unwrap();

        assert_eq!(updated.payment_status, PaymentStatus::Paid);
        let order = db.orders().get(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        // Reservation consumed, not returned.
        assert_eq!(db.ledger().available_quantity(&p1).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_payment_canceled_returns_stock() {
        let db = test_db().await;
        let (order_id, p1, p2) = two_line_order(&db).await;
        let checkouts = db.checkouts();

        let checkout = checkouts.process(&order_id, "123 Main St", PaymentType::Card).await.unwrap();
        checkouts
            .update_payment_status(&checkout.id, PaymentStatus::Canceled)
            .await
            .unwrap();

        let order = db.orders().get(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
        assert_eq!(db.ledger().available_quantity(&p1).await.unwrap(), 10);
        assert_eq!(db.ledger().available_quantity(&p2).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_payment_status_is_final() {
        let db = test_db().await;
        let (order_id, _, _) = two_line_order(&db).await;
        let checkouts = db.checkouts();

        let checkout = checkouts.process(&order_id, "123 Main St", PaymentType::Card).await.unwrap();
        let err = checkouts
            .update_payment_status(&checkout.id, PaymentStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidState { entity: Entity::Checkout, .. })));

        checkouts.update_payment_status(&checkout.id, PaymentStatus::Paid).await.unwrap();
        let err = checkouts
            .update_payment_status(&checkout.id, PaymentStatus::Canceled)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidState { .. })));

        let order = db.orders().get(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_canceling_order_cancels_pending_checkout() {
        let db = test_db().await;
        let (order_id, p1, _) = two_line_order(&db).await;

        let checkout = db.checkouts().process(&order_id, "123 Main St", PaymentType::Pix).await.unwrap();
        db.orders().set_status(&order_id, OrderStatus::Canceled).await.unwrap();

        let checkout = db.checkouts().get(&checkout.id).await.unwrap().unwrap();
        assert_eq!(checkout.payment_status, PaymentStatus::Canceled);
        assert_eq!(db.ledger().available_quantity(&p1).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_update_shipping_address() {
        let db = test_db().await;
        let (order_id, _, _) = two_line_order(&db).await;
        let checkouts = db.checkouts();

        let checkout = checkouts.process(&order_id, "123 Main St", PaymentType::Card).await.unwrap();
        let updated = checkouts
            .update_shipping_address(&checkout.id, "  Rua das Flores, 42  ")
            .await
            .unwrap();

        assert_eq!(updated.shipping_address, "Rua das Flores, 42");
        assert_eq!(updated.payment_status, PaymentStatus::Pending);
        assert!(matches!(
            checkouts.update_shipping_address("ghost", "x").await.unwrap_err().as_domain(),
            Some(CoreError::NotFound { entity: Entity::Checkout, .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_order_removes_checkout() {
        let db = test_db().await;
        let (order_id, p1, _) = two_line_order(&db).await;

        let checkout = db.checkouts().process(&order_id, "123 Main St", PaymentType::Card).await.unwrap();
        db.orders().delete(&order_id).await.unwrap();

        assert!(db.checkouts().get(&checkout.id).await.unwrap().is_none());
        // AWAITING_PAYMENT still held the reservation.
        assert_eq!(db.ledger().available_quantity(&p1).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_list_for_client() {
        let db = test_db().await;
        let client = seed_client(&db).await;
        let product = seed_product(&db, 1000, 10).await;
        let orders = db.orders();
        let checkouts = db.checkouts();

        for _ in 0..2 {
            let order = orders.create_for_client(&client.id).await.unwrap();
            orders.add_product(&order.id, &product.id, 1, PaymentType::Card).await.unwrap();
            checkouts.process(&order.id, "123 Main St", PaymentType::Card).await.unwrap();
        }

        let listed = checkouts.list_for_client(&client.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|c| c.lines.len() == 1));
        assert!(checkouts.list_for_client("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_for_affiliate_and_all() {
        let db = test_db().await;
        let client = seed_client(&db).await;
        let mine = seed_affiliate_product(&db, "aff-1", 1000, 10).await;
        let theirs = seed_affiliate_product(&db, "aff-2", 500, 10).await;
        let orders = db.orders();
        let checkouts = db.checkouts();

        let first = orders.create_for_client(&client.id).await.unwrap();
        orders.add_product(&first.id, &mine.id, 1, PaymentType::Card).await.unwrap();
        orders.add_product(&first.id, &theirs.id, 1, PaymentType::Card).await.unwrap();
        let mixed = checkouts.process(&first.id, "123 Main St", PaymentType::Card).await.unwrap();

        let second = orders.create_for_client(&client.id).await.unwrap();
        orders.add_product(&second.id, &theirs.id, 2, PaymentType::Pix).await.unwrap();
        let only_theirs = checkouts.process(&second.id, "456 Side St", PaymentType::Pix).await.unwrap();

        // An open cart with aff-1's product has no checkout yet.
        let third = orders.create_for_client(&client.id).await.unwrap();
        orders.add_product(&third.id, &mine.id, 1, PaymentType::Card).await.unwrap();

        let for_mine = checkouts.list_for_affiliate("aff-1").await.unwrap();
        assert_eq!(for_mine.len(), 1);
        assert_eq!(for_mine[0].id, mixed.id);
        assert_eq!(for_mine[0].lines.len(), 2);

        let for_theirs = checkouts.list_for_affiliate("aff-2").await.unwrap();
        assert_eq!(for_theirs.len(), 2);
        assert!(for_theirs.iter().any(|c| c.id == only_theirs.id));
        assert!(checkouts.list_for_affiliate("aff-9").await.unwrap().is_empty());

        let all = checkouts.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|c| !c.lines.is_empty()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_process_creates_one_checkout() {
        let (db, path) = file_db(4).await;
        let (order_id, _, _) = two_line_order(&db).await;

        let mut handles = Vec::new();
        for _ in 0..3 {
            let checkouts = db.checkouts();
            let id = order_id.clone();
            handles.push(tokio::spawn(async move {
                checkouts.process(&id, "123 Main St", PaymentType::Card).await
            }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(err) => assert!(matches!(err.as_domain(), Some(CoreError::InvalidState { .. }))),
            }
        }
        assert_eq!(created, 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM checkouts WHERE order_id = ?1")
            .bind(&order_id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        db.close().await;
        remove_db_files(&path);
    }
}
