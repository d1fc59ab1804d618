//! # Order Repository
//!
//! The order aggregate: a client's purchase, its running total and its
//! lifecycle status.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. CREATE                                                              │
//! │     └── create_for_client() → existing OPEN order, or a new one         │
//! │                                                                         │
//! │  2. FILL THE CART (OPEN only)                                           │
//! │     └── add_product() → cart line + reservation + recompute_total       │
//! │                                                                         │
//! │  3. CHECKOUT                                                            │
//! │     └── CheckoutRepository::process() → AWAITING_PAYMENT                │
//! │                                                                         │
//! │  4. PAYMENT OUTCOME                                                     │
//! │     ├── PAID     → reservation consumed                                 │
//! │     └── CANCELED → reserved stock goes back to the ledger               │
//! │                                                                         │
//! │  OPEN ⇄ PROCESSING, and OPEN/PROCESSING → CANCELED, are the only        │
//! │  edges set_status() may take directly.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use ecofraldas_core::totals::{order_total, verify_total};
use ecofraldas_core::validation::validate_id;
use ecofraldas_core::{CoreError, Entity, Money, Order, OrderStatus, PaymentType};

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use crate::repository::{cart, checkout, client, stock};
use crate::retry::{with_retry, RetryPolicy};

const ORDER_COLUMNS: &str = "id, client_id, status, total_cents, created_at, updated_at";

/// Repository for the order aggregate.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        OrderRepository { pool, retry }
    }

    /// Returns the client's OPEN order, creating an empty one if there is
    /// none. Calling it twice returns the same order.
    pub async fn create_for_client(&self, client_id: &str) -> DbResult<Order> {
        validate_id("client_id", client_id)?;

        with_retry(self.retry, "create_order", move || async move {
            let mut tx = begin_write(&self.pool).await?;

            if !client::exists_in(&mut tx, client_id).await? {
                return Err(DbError::not_found(Entity::Client, client_id));
            }

            if let Some(mut existing) = find_open_in(&mut tx, client_id).await? {
                existing.lines = cart::lines_in(&mut tx, &existing.id).await?;
                tx.commit().await?;
                debug!(order_id = %existing.id, client_id = %client_id, "Reusing open order");
                return Ok(existing);
            }

            let now = Utc::now();
            let order = Order {
                id: Uuid::new_v4().to_string(),
                client_id: client_id.to_string(),
                status: OrderStatus::Open,
                total_cents: 0,
                created_at: now,
                updated_at: now,
                lines: Vec::new(),
            };

            sqlx::query(
                r#"
                INSERT INTO orders (id, client_id, status, total_cents, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&order.id)
            .bind(&order.client_id)
            .bind(order.status)
            .bind(order.total_cents)
            .bind(order.created_at)
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| match DbError::from(e) {
                // Another request opened one first; the retry will find it.
                DbError::UniqueViolation { .. } => {
                    DbError::Conflict(format!("client {} opened an order concurrently", client_id))
                }
                other => other,
            })?;

            tx.commit().await?;

            info!(order_id = %order.id, client_id = %client_id, "Order created");
            Ok(order)
        })
        .await
    }

    /// Adds a product line to an OPEN order and returns the updated order.
    pub async fn add_product(
        &self,
        order_id: &str,
        product_id: &str,
        qty: i64,
        payment_type: PaymentType,
    ) -> DbResult<Order> {
        with_retry(self.retry, "add_product", move || async move {
            let mut tx = begin_write(&self.pool).await?;

            let order = require_order_in(&mut tx, order_id).await?;
            if !order.status.allows_cart_mutation() {
                return Err(DbError::invalid_state(
                    Entity::Order,
                    order_id,
                    format!("products can only be added while OPEN (status is {})", order.status),
                ));
            }

            cart::add_line_in(&mut tx, &order, product_id, qty, payment_type).await?;

            let updated = load_in(&mut tx, order_id).await?;
            tx.commit().await?;
            Ok(updated)
        })
        .await
    }

    /// Administrative status change.
    ///
    /// AWAITING_PAYMENT and PAID are only entered through a checkout and its
    /// payment notification, so they are refused here.
    pub async fn set_status(&self, order_id: &str, next: OrderStatus) -> DbResult<Order> {
        if matches!(next, OrderStatus::AwaitingPayment | OrderStatus::Paid) {
            return Err(DbError::invalid_state(
                Entity::Order,
                order_id,
                format!("{} is only reachable through checkout", next),
            ));
        }

        with_retry(self.retry, "set_order_status", move || async move {
            let mut tx = begin_write(&self.pool).await?;

            let order = require_order_in(&mut tx, order_id).await?;
            transition_in(&mut tx, &order, next).await?;

            let updated = load_in(&mut tx, order_id).await?;
            tx.commit().await?;
            Ok(updated)
        })
        .await
    }

    /// Deletes an order with its lines and checkout.
    ///
    /// Lines whose stock is still reserved (OPEN, PROCESSING,
    /// AWAITING_PAYMENT) are restocked first. A PAID order's stock is gone;
    /// a CANCELED order's was already given back.
    pub async fn delete(&self, order_id: &str) -> DbResult<()> {
        with_retry(self.retry, "delete_order", move || async move {
            let mut tx = begin_write(&self.pool).await?;

            let order = require_order_in(&mut tx, order_id).await?;
            if order.status.holds_reservation() {
                restock_lines_in(&mut tx, order_id).await?;
            }

            sqlx::query("DELETE FROM orders WHERE id = ?1")
                .bind(order_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            info!(order_id = %order_id, status = %order.status, "Order deleted");
            Ok(())
        })
        .await
    }

    /// Gets an order with its lines.
    pub async fn get(&self, order_id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;

        match order_row_in(&mut conn, order_id).await? {
            Some(mut order) => {
                order.lines = cart::lines_in(&mut conn, order_id).await?;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    pub async fn find_open_for_client(&self, client_id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;

        match find_open_in(&mut conn, client_id).await? {
            Some(mut order) => {
                order.lines = cart::lines_in(&mut conn, &order.id).await?;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    /// All orders of a client, newest first.
    pub async fn list_for_client(&self, client_id: &str) -> DbResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE client_id = ?1 ORDER BY created_at DESC, rowid DESC"
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(client_id)
            .fetch_all(&self.pool)
            .await?;

        self.with_lines(orders).await
    }

    pub async fn list_for_client_with_status(
        &self,
        client_id: &str,
        status: OrderStatus,
    ) -> DbResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE client_id = ?1 AND status = ?2 \
             ORDER BY created_at DESC, rowid DESC"
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(client_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        self.with_lines(orders).await
    }

    /// Every order, newest first. Administrative listing.
    pub async fn list_all(&self) -> DbResult<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, rowid DESC");
        let orders = sqlx::query_as::<_, Order>(&sql).fetch_all(&self.pool).await?;

        self.with_lines(orders).await
    }

    /// Orders containing at least one product listed by the affiliate.
    pub async fn list_for_affiliate(&self, affiliate_id: &str) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT o.id, o.client_id, o.status, o.total_cents, o.created_at, o.updated_at
            FROM orders o
            WHERE EXISTS (
                SELECT 1
                FROM cart_lines l
                JOIN products p ON p.id = l.product_id
                WHERE l.order_id = o.id AND p.affiliate_id = ?1
            )
            ORDER BY o.created_at DESC, o.rowid DESC
            "#,
        )
        .bind(affiliate_id)
        .fetch_all(&self.pool)
        .await?;

        self.with_lines(orders).await
    }

    /// Re-reads an order and its lines in one snapshot and checks the
    /// persisted total against them.
    pub async fn audit_total(&self, order_id: &str) -> DbResult<Money> {
        let mut tx = self.pool.begin().await?;

        let order = require_order_in(&mut tx, order_id).await?;
        let lines = cart::lines_in(&mut tx, order_id).await?;
        tx.commit().await?;

        verify_total(order_id, order.total_cents, &lines)?;
        Ok(order.total())
    }

    async fn with_lines(&self, mut orders: Vec<Order>) -> DbResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        for order in &mut orders {
            order.lines = cart::lines_in(&mut conn, &order.id).await?;
        }
        Ok(orders)
    }
}

// =============================================================================
// Connection-level operations
// =============================================================================

pub(crate) async fn order_row_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1");
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(order)
}

pub(crate) async fn require_order_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Order> {
    order_row_in(conn, order_id)
        .await?
        .ok_or_else(|| DbError::not_found(Entity::Order, order_id))
}

/// Order row plus its lines.
pub(crate) async fn load_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Order> {
    let mut order = require_order_in(conn, order_id).await?;
    order.lines = cart::lines_in(conn, order_id).await?;
    Ok(order)
}

async fn find_open_in(conn: &mut SqliteConnection, client_id: &str) -> DbResult<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE client_id = ?1 AND status = ?2");
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(client_id)
        .bind(OrderStatus::Open)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(order)
}

/// Sets `total_cents` to the sum of the order's current lines.
///
/// Must run in the transaction that changed the lines.
pub(crate) async fn recompute_total_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Money> {
    let lines = cart::lines_in(conn, order_id).await?;
    let total = order_total(&lines)?;

    let result = sqlx::query("UPDATE orders SET total_cents = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(order_id)
        .bind(total.cents())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found(Entity::Order, order_id));
    }

    debug!(order_id = %order_id, total_cents = total.cents(), lines = lines.len(), "Order total recomputed");
    Ok(total)
}

/// Moves an order along one edge of the state machine.
///
/// Entering CANCELED gives reserved stock back and cancels a pending
/// checkout. The UPDATE is conditional on the status read by the caller.
pub(crate) async fn transition_in(
    conn: &mut SqliteConnection,
    order: &Order,
    next: OrderStatus,
) -> DbResult<()> {
    order.status.ensure_transition(&order.id, next)?;

    if next == OrderStatus::Canceled {
        if order.status.holds_reservation() {
            restock_lines_in(conn, &order.id).await?;
        }
        checkout::cancel_pending_in(conn, &order.id).await?;
    }

    let result = sqlx::query(
        "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = ?4",
    )
    .bind(&order.id)
    .bind(next)
    .bind(Utc::now())
    .bind(order.status)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::ConsistencyViolation(format!(
            "order {} left {} before it could move to {}",
            order.id, order.status, next
        ))
        .into());
    }

    info!(order_id = %order.id, from = %order.status, to = %next, "Order status changed");
    Ok(())
}

/// Returns every line's quantity to the ledger. Lines stay in place.
async fn restock_lines_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<()> {
    let lines = cart::lines_in(conn, order_id).await?;
    for line in &lines {
        stock::add_stock_in(conn, &line.product_id, line.quantity).await?;
    }

    debug!(order_id = %order_id, lines = lines.len(), "Reserved stock returned");
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        file_db, remove_db_files, seed_affiliate_product, seed_client, seed_product, test_db,
    };

    #[tokio::test]
    async fn test_create_for_client_is_idempotent() {
        let db = test_db().await;
        let client = seed_client(&db).await;
        let orders = db.orders();

        let first = orders.create_for_client(&client.id).await.unwrap();
        let second = orders.create_for_client(&client.id).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.status, OrderStatus::Open);
        assert_eq!(first.total_cents, 0);
        assert_eq!(orders.list_for_client(&client.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_for_unknown_client() {
        let db = test_db().await;
        let err = db.orders().create_for_client("nobody").await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::NotFound {
                entity: Entity::Client,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_new_open_order_after_cancel() {
        let db = test_db().await;
        let client = seed_client(&db).await;
        let orders = db.orders();

        let first = orders.create_for_client(&client.id).await.unwrap();
        orders.set_status(&first.id, OrderStatus::Canceled).await.unwrap();

        let second = orders.create_for_client(&client.id).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_add_product_scenario_a() {
        let db = test_db().await;
        let client = seed_client(&db).await;
        let product = seed_product(&db, 8990, 50).await;
        let orders = db.orders();

        let order = orders.create_for_client(&client.id).await.unwrap();
        let order = orders
            .add_product(&order.id, &product.id, 20, PaymentType::Card)
            .await
            .unwrap();

        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.lines[0].quantity, 20);
        assert_eq!(order.total_cents, 20 * 8990);
        assert_eq!(db.ledger().available_quantity(&product.id).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_add_product_requires_open_order() {
        let db = test_db().await;
        let client = seed_client(&db).await;
        let product = seed_product(&db, 1000, 10).await;
        let orders = db.orders();

        let order = orders.create_for_client(&client.id).await.unwrap();
        orders.set_status(&order.id, OrderStatus::Processing).await.unwrap();

        let err = orders
            .add_product(&order.id, &product.id, 1, PaymentType::Pix)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidState { .. })));
        assert_eq!(db.ledger().available_quantity(&product.id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_add_product_insufficient_stock_changes_nothing() {
        let db = test_db().await;
        let client = seed_client(&db).await;
        let product = seed_product(&db, 1000, 3).await;
        let orders = db.orders();

        let order = orders.create_for_client(&client.id).await.unwrap();
        let err = orders
            .add_product(&order.id, &product.id, 4, PaymentType::Card)
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InsufficientStock { requested: 4, available: 3, .. })
        ));
        let order = orders.get(&order.id).await.unwrap().unwrap();
        assert!(order.lines.is_empty());
        assert_eq!(order.total_cents, 0);
    }

    #[tokio::test]
    async fn test_set_status_follows_state_machine() {
        let db = test_db().await;
        let client = seed_client(&db).await;
        let orders = db.orders();
        let order = orders.create_for_client(&client.id).await.unwrap();

        let order = orders.set_status(&order.id, OrderStatus::Processing).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        let order = orders.set_status(&order.id, OrderStatus::Open).await.unwrap();
        assert_eq!(order.status, OrderStatus::Open);

        for target in [OrderStatus::AwaitingPayment, OrderStatus::Paid, OrderStatus::Open] {
            let err = orders.set_status(&order.id, target).await.unwrap_err();
            assert!(matches!(err.as_domain(), Some(CoreError::InvalidState { .. })));
        }

        orders.set_status(&order.id, OrderStatus::Canceled).await.unwrap();
        let err = orders.set_status(&order.id, OrderStatus::Open).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_cancel_returns_reserved_stock() {
        let db = test_db().await;
        let client = seed_client(&db).await;
        let product = seed_product(&db, 1000, 10).await;
        let orders = db.orders();

        let order = orders.create_for_client(&client.id).await.unwrap();
        orders.add_product(&order.id, &product.id, 7, PaymentType::Card).await.unwrap();
        assert_eq!(db.ledger().available_quantity(&product.id).await.unwrap(), 3);

        orders.set_status(&order.id, OrderStatus::Canceled).await.unwrap();
        assert_eq!(db.ledger().available_quantity(&product.id).await.unwrap(), 10);

        // Deleting a canceled order must not restock a second time.
        orders.delete(&order.id).await.unwrap();
        assert_eq!(db.ledger().available_quantity(&product.id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_delete_restocks_and_cascades() {
        let db = test_db().await;
        let client = seed_client(&db).await;
        let product = seed_product(&db, 1000, 10).await;
        let orders = db.orders();

        let order = orders.create_for_client(&client.id).await.unwrap();
        let order = orders
            .add_product(&order.id, &product.id, 4, PaymentType::Boleto)
            .await
            .unwrap();
        let line_id = order.lines[0].id.clone();

        orders.delete(&order.id).await.unwrap();

        assert!(orders.get(&order.id).await.unwrap().is_none());
        assert!(db.carts().get_line(&line_id).await.unwrap().is_none());
        assert_eq!(db.ledger().available_quantity(&product.id).await.unwrap(), 10);

        assert!(matches!(
            orders.delete(&order.id).await.unwrap_err().as_domain(),
            Some(CoreError::NotFound { entity: Entity::Order, .. })
        ));
    }

    #[tokio::test]
    async fn test_listings() {
        let db = test_db().await;
        let client = seed_client(&db).await;
        let mine = seed_affiliate_product(&db, "aff-1", 1000, 10).await;
        let theirs = seed_affiliate_product(&db, "aff-2", 500, 10).await;
        let orders = db.orders();

        let first = orders.create_for_client(&client.id).await.unwrap();
        orders.add_product(&first.id, &mine.id, 1, PaymentType::Card).await.unwrap();
        orders.set_status(&first.id, OrderStatus::Canceled).await.unwrap();

        let second = orders.create_for_client(&client.id).await.unwrap();
        orders.add_product(&second.id, &theirs.id, 1, PaymentType::Card).await.unwrap();

        assert_eq!(orders.list_for_client(&client.id).await.unwrap().len(), 2);

        let canceled = orders
            .list_for_client_with_status(&client.id, OrderStatus::Canceled)
            .await
            .unwrap();
        assert_eq!(canceled.len(), 1);
        assert_eq!(canceled[0].id, first.id);

        let for_aff = orders.list_for_affiliate("aff-1").await.unwrap();
        assert_eq!(for_aff.len(), 1);
        assert_eq!(for_aff[0].id, first.id);
        assert_eq!(for_aff[0].lines.len(), 1);

        let open = orders.find_open_for_client(&client.id).await.unwrap().unwrap();
        assert_eq!(open.id, second.id);

        let other = seed_client(&db).await;
        orders.create_for_client(&other.id).await.unwrap();
        let all = orders.list_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.iter().map(|o| o.lines.len()).sum::<usize>(), 2);
    }

    #[tokio::test]
    async fn test_audit_total_detects_drift() {
        let db = test_db().await;
        let client = seed_client(&db).await;
        let product = seed_product(&db, 1250, 10).await;
        let orders = db.orders();

        let order = orders.create_for_client(&client.id).await.unwrap();
        orders.add_product(&order.id, &product.id, 2, PaymentType::Pix).await.unwrap();
        assert_eq!(orders.audit_total(&order.id).await.unwrap().cents(), 2500);

        sqlx::query("UPDATE orders SET total_cents = 1 WHERE id = ?1")
            .bind(&order.id)
            .execute(db.pool())
            .await
            .unwrap();

        let err = orders.audit_total(&order.id).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::ConsistencyViolation(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_yields_one_open_order() {
        let (db, path) = file_db(4).await;
        let client = seed_client(&db).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let orders = db.orders();
            let client_id = client.id.clone();
            handles.push(tokio::spawn(async move { orders.create_for_client(&client_id).await }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);

        db.close().await;
        remove_db_files(&path);
    }
}
