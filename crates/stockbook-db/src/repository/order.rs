//! # Order Accounting Engine
//!
//! Keeps an order's recorded total consistent with its line items and
//! serves the joined order views.
//!
//! ## The Total Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │       Order.total_cents == Σ OrderItem.total_cents                      │
//! │                                                                         │
//! │  Every item write path re-derives the total in the SAME transaction:   │
//! │                                                                         │
//! │  create_order ──────► insert order + items, total from items           │
//! │  replace_items ─────► delete + insert items, recompute total           │
//! │  set_item_quantity ─► update one line, recompute total                 │
//! │                                                                         │
//! │  verify_total guards against writes that bypassed the engine:          │
//! │  a persisted total that disagrees with its item sum is a               │
//! │  ConsistencyViolation, never silently accepted.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! `unit_price_cents` is copied from the product at order time. Later price
//! changes never alter existing orders; detail views additionally join the
//! product's current name and unit for display.
//!
//! Every item write path opens its transaction IMMEDIATE. The paths read
//! before they write (existence check, total recompute), and a deferred
//! transaction doing that fails its write-lock upgrade with SQLITE_BUSY
//! when a concurrent writer commits first; taking the write lock up front
//! makes concurrent writers queue on busy_timeout.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::{begin_immediate, commit, rollback};
use stockbook_core::validation::{validate_item_quantity, validate_order_number};
use stockbook_core::{
    new_order_total, CustomerSnapshot, NewOrder, NewOrderItem, Order, OrderDetail,
    OrderItemDetail, OrderSummary,
};

/// The order accounting engine.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Lists the account's orders with their customer names, most recently
    /// created first. The full result set is returned; callers needing
    /// pagination wrap this contract.
    pub async fn list(&self, account_id: &str) -> DbResult<Vec<OrderSummary>> {
        let orders = sqlx::query_as::<_, OrderSummary>(
            r#"
            SELECT o.*, c.name AS customer_name
            FROM orders o
            JOIN customers c ON o.customer_id = c.id
            WHERE o.account_id = ?1
            ORDER BY o.created_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Gets one order with its customer snapshot and items.
    ///
    /// ## Errors
    /// * `NotFound` - the order/customer join yields zero rows for this
    ///   account; never a generic store error
    pub async fn get_detail(&self, account_id: &str, order_id: &str) -> DbResult<OrderDetail> {
        #[derive(sqlx::FromRow)]
        struct HeaderRow {
            #[sqlx(flatten)]
            order: Order,
            customer_name: String,
            customer_email: Option<String>,
            customer_phone: Option<String>,
        }

        let header = sqlx::query_as::<_, HeaderRow>(
            r#"
            SELECT o.*,
                   c.name AS customer_name,
                   c.email AS customer_email,
                   c.phone AS customer_phone
            FROM orders o
            JOIN customers c ON o.customer_id = c.id
            WHERE o.id = ?1 AND o.account_id = ?2
            "#,
        )
        .bind(order_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Order", order_id))?;

        let items = sqlx::query_as::<_, OrderItemDetail>(
            r#"
            SELECT oi.*,
                   p.name AS product_name,
                   p.unit AS product_unit
            FROM order_items oi
            JOIN products p ON oi.product_id = p.id
            WHERE oi.order_id = ?1
            ORDER BY oi.created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(OrderDetail {
            order: header.order,
            customer: CustomerSnapshot {
                name: header.customer_name,
                email: header.customer_email,
                phone: header.customer_phone,
            },
            items,
        })
    }

    /// Creates an order with its initial items, atomically.
    ///
    /// The total is computed from the items, never caller-supplied.
    ///
    /// ## Errors
    /// * `NotFound` - customer absent under this account
    /// * `InvalidInput` - empty order number or non-positive item quantity
    /// * `UniqueViolation` - duplicate order number
    pub async fn create(&self, account_id: &str, input: NewOrder) -> DbResult<Order> {
        validate_order_number(&input.order_number)?;
        for item in &input.items {
            validate_item_quantity(item.quantity)?;
        }

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            customer_id: input.customer_id,
            order_number: input.order_number,
            status: input.status,
            total_cents: new_order_total(&input.items).cents(),
            notes: input.notes,
            order_date: input.order_date.unwrap_or(now),
            delivery_date: input.delivery_date,
            created_at: now,
            updated_at: now,
        };

        debug!(
            id = %order.id,
            order_number = %order.order_number,
            items = input.items.len(),
            "Creating order"
        );

        let mut conn = begin_immediate(&self.pool).await?;

        match create_in_tx(&mut conn, account_id, &order, &input.items).await {
            Ok(()) => {
                commit(&mut conn).await?;
                Ok(order)
            }
            Err(err) => {
                rollback(&mut conn).await;
                Err(err)
            }
        }
    }

    /// Replaces the order's items with a new set and re-derives the total,
    /// all in one transaction.
    ///
    /// ## Returns
    /// The order with its freshly computed total.
    pub async fn replace_items(
        &self,
        account_id: &str,
        order_id: &str,
        items: Vec<NewOrderItem>,
    ) -> DbResult<Order> {
        for item in &items {
            validate_item_quantity(item.quantity)?;
        }

        debug!(order_id = %order_id, items = items.len(), "Replacing order items");

        let mut conn = begin_immediate(&self.pool).await?;

        match replace_items_in_tx(&mut conn, account_id, order_id, &items).await {
            Ok(order) => {
                commit(&mut conn).await?;
                Ok(order)
            }
            Err(err) => {
                rollback(&mut conn).await;
                Err(err)
            }
        }
    }

    /// Changes one item's quantity, re-deriving its line total and the
    /// order total in the same transaction.
    pub async fn set_item_quantity(
        &self,
        account_id: &str,
        order_id: &str,
        item_id: &str,
        quantity: i64,
    ) -> DbResult<Order> {
        validate_item_quantity(quantity)?;

        debug!(order_id = %order_id, item_id = %item_id, quantity, "Updating item quantity");

        let mut conn = begin_immediate(&self.pool).await?;

        match set_item_quantity_in_tx(&mut conn, account_id, order_id, item_id, quantity).await {
            Ok(order) => {
                commit(&mut conn).await?;
                Ok(order)
            }
            Err(err) => {
                rollback(&mut conn).await;
                Err(err)
            }
        }
    }

    /// Checks the total invariant for one order.
    ///
    /// ## Errors
    /// * `ConsistencyViolation` - the persisted total disagrees with the
    ///   item sum (something wrote around the engine)
    /// * `NotFound` - no such order under this account
    pub async fn verify_total(&self, account_id: &str, order_id: &str) -> DbResult<()> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE id = ?1 AND account_id = ?2",
        )
        .bind(order_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Order", order_id))?;

        let item_sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total_cents), 0) FROM order_items WHERE order_id = ?1",
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;

        if order.total_cents != item_sum {
            return Err(DbError::inconsistent(format!(
                "order {} total is {} but items sum to {}",
                order_id, order.total_cents, item_sum
            )));
        }

        Ok(())
    }

    /// Counts the account's orders.
    pub async fn count(&self, account_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE account_id = ?1")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Counts the account's pending orders.
    pub async fn count_pending(&self, account_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE account_id = ?1 AND status = 'pending'",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// The create transaction body: customer check, order insert, item inserts.
/// Runs on a connection holding the write lock; the caller commits or rolls
/// back.
async fn create_in_tx(
    conn: &mut SqliteConnection,
    account_id: &str,
    order: &Order,
    items: &[NewOrderItem],
) -> DbResult<()> {
    let customer_exists: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM customers WHERE id = ?1 AND account_id = ?2")
            .bind(&order.customer_id)
            .bind(account_id)
            .fetch_optional(&mut *conn)
            .await?;

    if customer_exists.is_none() {
        return Err(DbError::not_found("Customer", &order.customer_id));
    }

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, account_id, customer_id, order_number, status, total_cents,
            notes, order_date, delivery_date, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&order.id)
    .bind(&order.account_id)
    .bind(&order.customer_id)
    .bind(&order.order_number)
    .bind(order.status)
    .bind(order.total_cents)
    .bind(&order.notes)
    .bind(order.order_date)
    .bind(order.delivery_date)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    for item in items {
        insert_item(conn, &order.id, item, order.created_at).await?;
    }

    Ok(())
}

/// The replace transaction body: delete the old items, insert the new set,
/// re-derive the total.
async fn replace_items_in_tx(
    conn: &mut SqliteConnection,
    account_id: &str,
    order_id: &str,
    items: &[NewOrderItem],
) -> DbResult<Order> {
    require_order(conn, account_id, order_id).await?;

    sqlx::query("DELETE FROM order_items WHERE order_id = ?1")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

    let now = Utc::now();
    for item in items {
        insert_item(conn, order_id, item, now).await?;
    }

    persist_total(conn, account_id, order_id).await
}

/// The quantity-update transaction body: one line update, then the total
/// re-derivation.
async fn set_item_quantity_in_tx(
    conn: &mut SqliteConnection,
    account_id: &str,
    order_id: &str,
    item_id: &str,
    quantity: i64,
) -> DbResult<Order> {
    require_order(conn, account_id, order_id).await?;

    let result = sqlx::query(
        r#"
        UPDATE order_items
        SET quantity = ?1, total_cents = ?1 * unit_price_cents
        WHERE id = ?2 AND order_id = ?3
        "#,
    )
    .bind(quantity)
    .bind(item_id)
    .bind(order_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("OrderItem", item_id));
    }

    persist_total(conn, account_id, order_id).await
}

/// Fails with NotFound unless the order exists under the account.
async fn require_order(
    conn: &mut SqliteConnection,
    account_id: &str,
    order_id: &str,
) -> DbResult<()> {
    let exists: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM orders WHERE id = ?1 AND account_id = ?2")
            .bind(order_id)
            .bind(account_id)
            .fetch_optional(&mut *conn)
            .await?;

    if exists.is_none() {
        return Err(DbError::not_found("Order", order_id));
    }

    Ok(())
}

/// Inserts one order line with its derived line total.
async fn insert_item(
    conn: &mut SqliteConnection,
    order_id: &str,
    item: &NewOrderItem,
    now: chrono::DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO order_items (
            id, order_id, product_id, quantity, unit_price_cents, total_cents, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(order_id)
    .bind(&item.product_id)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.line_total().cents())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Recomputes the item sum, persists it as the order total, and returns the
/// refreshed order. Runs inside the caller's transaction so the item write
/// and the total update commit together.
async fn persist_total(
    conn: &mut SqliteConnection,
    account_id: &str,
    order_id: &str,
) -> DbResult<Order> {
    let item_sum: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(total_cents), 0) FROM order_items WHERE order_id = ?1",
    )
    .bind(order_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("UPDATE orders SET total_cents = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(item_sum)
        .bind(Utc::now())
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE id = ?1 AND account_id = ?2",
    )
    .bind(order_id)
    .bind(account_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(order)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use stockbook_core::{NewCustomer, NewProduct, OrderStatus};

    async fn setup() -> (Database, String, String, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (account, customer, p1, p2) = seed(&db).await;
        (db, account, customer, p1, p2)
    }

    async fn seed(db: &Database) -> (String, String, String, String) {
        let account = db
            .create_account("Test Owner", "owner@example.com", None)
            .await
            .unwrap();

        let customer = db
            .customers()
            .insert(
                &account.id,
                NewCustomer {
                    name: "Ayşe Kaya".into(),
                    email: Some("ayse@example.com".into()),
                    phone: Some("+90 555 000 0000".into()),
                    address: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let mut product_ids = Vec::new();
        for (name, price) in [("Bolt Box", 2550), ("Anvil", 12000)] {
            let product = db
                .products()
                .insert(
                    &account.id,
                    NewProduct {
                        name: name.into(),
                        description: None,
                        price_cents: price,
                        category: None,
                        stock_quantity: 100,
                        unit: "pcs".into(),
                        barcode: None,
                        min_stock_level: 0,
                    },
                )
                .await
                .unwrap();
            product_ids.push(product.id);
        }

        let p2 = product_ids.pop().unwrap();
        let p1 = product_ids.pop().unwrap();
        (account.id, customer.id, p1, p2)
    }

    fn two_line_order(customer_id: &str, p1: &str, p2: &str) -> NewOrder {
        NewOrder {
            customer_id: customer_id.to_string(),
            order_number: "ORD-0001".into(),
            status: OrderStatus::Pending,
            notes: None,
            order_date: None,
            delivery_date: None,
            items: vec![
                NewOrderItem {
                    product_id: p1.to_string(),
                    quantity: 2,
                    unit_price_cents: 2550,
                },
                NewOrderItem {
                    product_id: p2.to_string(),
                    quantity: 1,
                    unit_price_cents: 12000,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_create_computes_total_from_items() {
        let (db, account, customer, p1, p2) = setup().await;

        let order = db
            .orders()
            .create(&account, two_line_order(&customer, &p1, &p2))
            .await
            .unwrap();

        // 2 × 25.50 + 1 × 120.00 = 171.00
        assert_eq!(order.total_cents, 17100);
        db.orders().verify_total(&account, &order.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_detail_carries_snapshots() {
        let (db, account, customer, p1, p2) = setup().await;
        let order = db
            .orders()
            .create(&account, two_line_order(&customer, &p1, &p2))
            .await
            .unwrap();

        let detail = db.orders().get_detail(&account, &order.id).await.unwrap();

        assert_eq!(detail.order.order_number, "ORD-0001");
        assert_eq!(detail.customer.name, "Ayşe Kaya");
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.items[0].product_name, "Bolt Box");
        assert_eq!(detail.items[0].product_unit, "pcs");
        assert_eq!(detail.items[0].item.total_cents, 5100);
    }

    #[tokio::test]
    async fn test_detail_missing_is_not_found() {
        let (db, account, ..) = setup().await;

        let err = db.orders().get_detail(&account, "no-such-order").await;
        assert!(matches!(err, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let (db, account, customer, p1, p2) = setup().await;
        let orders = db.orders();

        let mut first = two_line_order(&customer, &p1, &p2);
        first.order_number = "ORD-0001".into();
        orders.create(&account, first).await.unwrap();

        let mut second = two_line_order(&customer, &p1, &p2);
        second.order_number = "ORD-0002".into();
        orders.create(&account, second).await.unwrap();

        let listed = orders.list(&account).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].order.created_at >= listed[1].order.created_at);
        assert_eq!(listed[0].customer_name, "Ayşe Kaya");
    }

    #[tokio::test]
    async fn test_set_item_quantity_rederives_total() {
        let (db, account, customer, p1, p2) = setup().await;
        let orders = db.orders();

        let order = orders
            .create(&account, two_line_order(&customer, &p1, &p2))
            .await
            .unwrap();
        let detail = orders.get_detail(&account, &order.id).await.unwrap();
        let first_item = &detail.items[0].item;

        let updated = orders
            .set_item_quantity(&account, &order.id, &first_item.id, 3)
            .await
            .unwrap();

        // 3 × 25.50 + 1 × 120.00 = 196.50
        assert_eq!(updated.total_cents, 19650);
        orders.verify_total(&account, &order.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_replace_items_rederives_total() {
        let (db, account, customer, p1, p2) = setup().await;
        let orders = db.orders();

        let order = orders
            .create(&account, two_line_order(&customer, &p1, &p2))
            .await
            .unwrap();

        let updated = orders
            .replace_items(
                &account,
                &order.id,
                vec![NewOrderItem {
                    product_id: p1.clone(),
                    quantity: 4,
                    unit_price_cents: 2550,
                }],
            )
            .await
            .unwrap();

        assert_eq!(updated.total_cents, 10200);

        let detail = orders.get_detail(&account, &order.id).await.unwrap();
        assert_eq!(detail.items.len(), 1);
        let _ = p2;
    }

    #[tokio::test]
    async fn test_bypassing_write_is_a_consistency_violation() {
        let (db, account, customer, p1, p2) = setup().await;
        let orders = db.orders();

        let order = orders
            .create(&account, two_line_order(&customer, &p1, &p2))
            .await
            .unwrap();

        // A write around the engine: total no longer matches the items
        sqlx::query("UPDATE orders SET total_cents = 999 WHERE id = ?1")
            .bind(&order.id)
            .execute(db.pool())
            .await
            .unwrap();

        let err = orders.verify_total(&account, &order.id).await;
        assert!(matches!(err, Err(DbError::ConsistencyViolation(_))));
    }

    #[tokio::test]
    async fn test_zero_quantity_item_rejected() {
        let (db, account, customer, p1, p2) = setup().await;

        let mut input = two_line_order(&customer, &p1, &p2);
        input.items[0].quantity = 0;

        let err = db.orders().create(&account, input).await;
        assert!(matches!(err, Err(DbError::InvalidInput(_))));
        assert_eq!(db.orders().count(&account).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counts() {
        let (db, account, customer, p1, p2) = setup().await;
        let orders = db.orders();

        let mut pending = two_line_order(&customer, &p1, &p2);
        pending.order_number = "ORD-0001".into();
        orders.create(&account, pending).await.unwrap();

        let mut shipped = two_line_order(&customer, &p1, &p2);
        shipped.order_number = "ORD-0002".into();
        shipped.status = OrderStatus::Shipped;
        orders.create(&account, shipped).await.unwrap();

        assert_eq!(orders.count(&account).await.unwrap(), 2);
        assert_eq!(orders.count_pending(&account).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creates_both_commit() {
        // A multi-connection file-backed pool, so the two creates race on
        // separate connections instead of serializing on one. Both must
        // commit; neither may fail with a busy error.
        let path = std::env::temp_dir().join(format!("stockbook-test-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(5))
            .await
            .unwrap();
        let (account, customer, p1, p2) = seed(&db).await;

        let orders_a = db.orders();
        let orders_b = db.orders();
        let (account_a, account_b) = (account.clone(), account.clone());
        let mut input_a = two_line_order(&customer, &p1, &p2);
        input_a.order_number = "ORD-0001".into();
        let mut input_b = two_line_order(&customer, &p1, &p2);
        input_b.order_number = "ORD-0002".into();

        let task_a = tokio::spawn(async move { orders_a.create(&account_a, input_a).await });
        let task_b = tokio::spawn(async move { orders_b.create(&account_b, input_b).await });

        task_a.await.unwrap().unwrap();
        task_b.await.unwrap().unwrap();

        assert_eq!(db.orders().count(&account).await.unwrap(), 2);

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_missing_customer_is_not_found() {
        let (db, account, _customer, p1, p2) = setup().await;

        let input = two_line_order("no-such-customer", &p1, &p2);
        let err = db.orders().create(&account, input).await;
        assert!(matches!(err, Err(DbError::NotFound { .. })));
    }
}
