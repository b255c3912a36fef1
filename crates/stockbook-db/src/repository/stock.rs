//! # Stock Ledger Engine
//!
//! Applies stock movements to product quantities and answers the stock
//! queries (low stock, barcode lookup, movement listings).
//!
//! ## Movement Application
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    apply_movement                                       │
//! │                                                                         │
//! │  validate quantity (non-negative; zero is an audit no-op)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN IMMEDIATE  ← write lock taken before the first read             │
//! │  ├── product exists under this account? (else NotFound, rollback)     │
//! │  ├── INSERT stock_movements row (append-only ledger entry)            │
//! │  ├── UPDATE products:                                                  │
//! │  │      in         → stock_quantity = stock_quantity + qty            │
//! │  │      out        → stock_quantity = stock_quantity - qty            │
//! │  │      adjustment → stock_quantity = qty                             │
//! │  └── SELECT refreshed product                                          │
//! │  COMMIT  ← both writes land together or neither does                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lost-Update Guard
//! In/out use a delta UPDATE (`stock_quantity = stock_quantity ± ?`), an
//! atomic read-modify-write at the store. Two concurrent increments both
//! apply; +5 and +3 on a stock of 10 always land on 18. For adjustments
//! last-committed-wins is the accepted outcome.
//!
//! The transaction opens IMMEDIATE rather than the default DEFERRED. A
//! deferred transaction would take its read snapshot at the existence check
//! and then fail the write-lock upgrade with SQLITE_BUSY once a concurrent
//! movement commits first; busy_timeout never applies to that upgrade.
//! With the write lock held from the start, concurrent movements queue and
//! both commit.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::{begin_immediate, commit, rollback};
use stockbook_core::validation::{validate_barcode, validate_movement_quantity};
use stockbook_core::{MovementKind, NewStockMovement, Product, StockMovement, StockMovementRow};

/// The stock ledger engine.
///
/// The only component that writes `products.stock_quantity` or
/// `stock_movements`. Callers never insert movement rows directly.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Applies a stock movement to a product, atomically.
    ///
    /// ## Arguments
    /// * `account_id` - Owning account; a product under another account is
    ///   NotFound, indistinguishable from a missing one
    /// * `input` - The movement to apply; `occurred_at` defaults to now
    ///
    /// ## Returns
    /// The persisted movement and the refreshed product, so callers can read
    /// the new `stock_quantity` and low-stock flag without a second query.
    ///
    /// ## Errors
    /// * `NotFound` - product absent under this account; nothing written
    /// * `InvalidInput` - negative quantity; nothing written
    pub async fn apply_movement(
        &self,
        account_id: &str,
        input: NewStockMovement,
    ) -> DbResult<(StockMovement, Product)> {
        validate_movement_quantity(input.quantity)?;

        let now = Utc::now();
        let movement = StockMovement {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            product_id: input.product_id,
            kind: input.kind,
            quantity: input.quantity,
            reference: input.reference,
            description: input.description,
            occurred_at: input.occurred_at.unwrap_or(now),
            created_at: now,
        };

        debug!(
            product_id = %movement.product_id,
            kind = %movement.kind,
            quantity = movement.quantity,
            "Applying stock movement"
        );

        // IMMEDIATE: the write lock is held before the existence check runs,
        // so concurrent movements queue on busy_timeout instead of failing
        // a deferred snapshot upgrade
        let mut conn = begin_immediate(&self.pool).await?;

        match apply_in_tx(&mut conn, account_id, &movement).await {
            Ok(product) => {
                commit(&mut conn).await?;

                debug!(
                    product_id = %product.id,
                    stock_quantity = product.stock_quantity,
                    low_stock = product.is_low_stock(),
                    "Stock movement applied"
                );

                Ok((movement, product))
            }
            Err(err) => {
                rollback(&mut conn).await;
                Err(err)
            }
        }
    }

    /// Lists the account's stock movements, most recent first, each joined
    /// with its product's name.
    pub async fn list_movements(&self, account_id: &str) -> DbResult<Vec<StockMovementRow>> {
        let movements = sqlx::query_as::<_, StockMovementRow>(
            r#"
            SELECT sm.*, p.name AS product_name
            FROM stock_movements sm
            JOIN products p ON sm.product_id = p.id
            WHERE sm.account_id = ?1
            ORDER BY sm.occurred_at DESC, sm.created_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Returns the products at or below their minimum stock level,
    /// ascending by stock quantity.
    ///
    /// A product pushed below its threshold by a movement appears in the
    /// very next call; one restocked above it disappears.
    pub async fn find_low_stock(&self, account_id: &str) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT *
            FROM products
            WHERE account_id = ?1 AND stock_quantity <= min_stock_level
            ORDER BY stock_quantity ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Looks a product up by barcode.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - match under this account
    /// * `Ok(None)` - no match; a normal outcome, not an error
    ///
    /// ## Errors
    /// * `InvalidInput` - empty or malformed barcode query
    pub async fn find_by_barcode(
        &self,
        account_id: &str,
        barcode: &str,
    ) -> DbResult<Option<Product>> {
        let barcode = validate_barcode(barcode)?;

        debug!(barcode = %barcode, "Barcode lookup");

        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE barcode = ?1 AND account_id = ?2",
        )
        .bind(&barcode)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Counts the account's movement rows (for diagnostics and tests).
    pub async fn count_movements(&self, account_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE account_id = ?1")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// The movement transaction body: existence check, ledger append, quantity
/// fold, refreshed read. Runs on a connection holding the write lock; the
/// caller commits or rolls back.
async fn apply_in_tx(
    conn: &mut SqliteConnection,
    account_id: &str,
    movement: &StockMovement,
) -> DbResult<Product> {
    // Account-scoped existence check. An FK failure on the insert would
    // surface as a store error, not the NotFound the contract requires.
    let exists: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM products WHERE id = ?1 AND account_id = ?2")
            .bind(&movement.product_id)
            .bind(account_id)
            .fetch_optional(&mut *conn)
            .await?;

    if exists.is_none() {
        return Err(DbError::not_found("Product", &movement.product_id));
    }

    // (1) Append the ledger entry
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, account_id, product_id, kind, quantity,
            reference, description, occurred_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.account_id)
    .bind(&movement.product_id)
    .bind(movement.kind)
    .bind(movement.quantity)
    .bind(&movement.reference)
    .bind(&movement.description)
    .bind(movement.occurred_at)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    // (2) Fold the movement into the product quantity. In/out are delta
    // updates so concurrent movements serialize at the store; adjustment
    // replaces the accumulated value outright.
    let update_sql = match movement.kind {
        MovementKind::In => {
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity + ?1, updated_at = ?2
            WHERE id = ?3 AND account_id = ?4
            "#
        }
        MovementKind::Out => {
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity - ?1, updated_at = ?2
            WHERE id = ?3 AND account_id = ?4
            "#
        }
        MovementKind::Adjustment => {
            r#"
            UPDATE products
            SET stock_quantity = ?1, updated_at = ?2
            WHERE id = ?3 AND account_id = ?4
            "#
        }
    };

    sqlx::query(update_sql)
        .bind(movement.quantity)
        .bind(movement.created_at)
        .bind(&movement.product_id)
        .bind(account_id)
        .execute(&mut *conn)
        .await?;

    // Refreshed product, read inside the same transaction
    let product: Product =
        sqlx::query_as("SELECT * FROM products WHERE id = ?1 AND account_id = ?2")
            .bind(&movement.product_id)
            .bind(account_id)
            .fetch_one(&mut *conn)
            .await?;

    Ok(product)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use std::str::FromStr;
    use stockbook_core::NewProduct;

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let account = db
            .create_account("Test Owner", "owner@example.com", None)
            .await
            .unwrap();
        (db, account.id)
    }

    async fn seed_product(db: &Database, account_id: &str, stock: i64, min: i64) -> Product {
        db.products()
            .insert(
                account_id,
                NewProduct {
                    name: "Widget".into(),
                    description: None,
                    price_cents: 1000,
                    category: None,
                    stock_quantity: stock,
                    unit: "pcs".into(),
                    barcode: None,
                    min_stock_level: min,
                },
            )
            .await
            .unwrap()
    }

    fn movement(product_id: &str, kind: MovementKind, quantity: i64) -> NewStockMovement {
        NewStockMovement {
            product_id: product_id.to_string(),
            kind,
            quantity,
            reference: None,
            description: None,
            occurred_at: None,
        }
    }

    #[tokio::test]
    async fn test_signed_sum_of_deltas() {
        let (db, account) = setup().await;
        let product = seed_product(&db, &account, 0, 0).await;
        let other = seed_product(&db, &account, 0, 0).await;
        let stock = db.stock();

        // Interleave movements for two products; each folds independently
        for (target, kind, qty) in [
            (&product, MovementKind::In, 10),
            (&other, MovementKind::In, 100),
            (&product, MovementKind::Out, 4),
            (&other, MovementKind::Out, 1),
            (&product, MovementKind::In, 7),
            (&product, MovementKind::Out, 2),
        ] {
            stock
                .apply_movement(&account, movement(&target.id, kind, qty))
                .await
                .unwrap();
        }

        let refreshed = db.products().get_by_id(&account, &product.id).await.unwrap();
        assert_eq!(refreshed.stock_quantity, 10 - 4 + 7 - 2);

        let refreshed_other = db.products().get_by_id(&account, &other.id).await.unwrap();
        assert_eq!(refreshed_other.stock_quantity, 99);
    }

    #[tokio::test]
    async fn test_adjustment_sets_absolute_value() {
        let (db, account) = setup().await;
        let product = seed_product(&db, &account, 0, 0).await;
        let stock = db.stock();

        stock
            .apply_movement(&account, movement(&product.id, MovementKind::In, 42))
            .await
            .unwrap();

        let (_, updated) = stock
            .apply_movement(&account, movement(&product.id, MovementKind::Adjustment, 7))
            .await
            .unwrap();

        assert_eq!(updated.stock_quantity, 7);
    }

    #[tokio::test]
    async fn test_over_decrement_goes_negative() {
        let (db, account) = setup().await;
        let product = seed_product(&db, &account, 3, 0).await;

        let (_, updated) = db
            .stock()
            .apply_movement(&account, movement(&product.id, MovementKind::Out, 10))
            .await
            .unwrap();

        // No floor: the engine records the over-decrement and exposes the
        // low-stock predicate instead of rejecting
        assert_eq!(updated.stock_quantity, -7);
        assert!(updated.is_low_stock());
    }

    #[tokio::test]
    async fn test_zero_quantity_recorded_as_noop() {
        let (db, account) = setup().await;
        let product = seed_product(&db, &account, 5, 0).await;
        let stock = db.stock();

        let (recorded, updated) = stock
            .apply_movement(&account, movement(&product.id, MovementKind::In, 0))
            .await
            .unwrap();

        assert_eq!(recorded.quantity, 0);
        assert_eq!(updated.stock_quantity, 5);
        assert_eq!(stock.count_movements(&account).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_negative_quantity_rejected_without_write() {
        let (db, account) = setup().await;
        let product = seed_product(&db, &account, 5, 0).await;
        let stock = db.stock();

        let err = stock
            .apply_movement(&account, movement(&product.id, MovementKind::In, -3))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput(_)));

        // No partial write: ledger empty, quantity untouched
        assert_eq!(stock.count_movements(&account).await.unwrap(), 0);
        let refreshed = db.products().get_by_id(&account, &product.id).await.unwrap();
        assert_eq!(refreshed.stock_quantity, 5);
    }

    #[tokio::test]
    async fn test_unknown_kind_rejected_at_the_boundary() {
        let (db, account) = setup().await;
        let product = seed_product(&db, &account, 5, 0).await;
        let stock = db.stock();

        // A wire string outside the closed set never reaches the engine:
        // parsing is the boundary, and it fails as InvalidInput
        let err: DbError = MovementKind::from_str("invalid").unwrap_err().into();
        assert!(matches!(err, DbError::InvalidInput(_)));

        assert_eq!(stock.count_movements(&account).await.unwrap(), 0);
        let refreshed = db.products().get_by_id(&account, &product.id).await.unwrap();
        assert_eq!(refreshed.stock_quantity, 5);
    }

    #[tokio::test]
    async fn test_missing_product_is_not_found() {
        let (db, account) = setup().await;

        let err = db
            .stock()
            .apply_movement(&account, movement("no-such-id", MovementKind::In, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_other_accounts_product_is_not_found() {
        let (db, account) = setup().await;
        let product = seed_product(&db, &account, 5, 0).await;

        let stranger = db
            .create_account("Other", "other@example.com", None)
            .await
            .unwrap();

        let err = db
            .stock()
            .apply_movement(&stranger.id, movement(&product.id, MovementKind::In, 1))
            .await
            .unwrap_err();

        // Indistinguishable from a missing product: existence never leaks
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    /// Database on a temp file with a multi-connection pool. The in-memory
    /// config pins a single connection, which serializes everything and
    /// cannot exhibit a lost update or a write-lock conflict.
    async fn file_backed_db() -> (Database, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("stockbook-test-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(5))
            .await
            .unwrap();
        (db, path)
    }

    async fn remove_db_files(db: Database, path: &std::path::Path) {
        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let (db, path) = file_backed_db().await;
        let account = db
            .create_account("Test Owner", "owner@example.com", None)
            .await
            .unwrap()
            .id;
        let product = seed_product(&db, &account, 10, 0).await;

        // Each task holds its own pooled connection, so the movements
        // genuinely race: both must commit (neither may fail busy) and
        // neither increment may be lost
        let stock_a = db.stock();
        let stock_b = db.stock();
        let (account_a, account_b) = (account.clone(), account.clone());
        let (id_a, id_b) = (product.id.clone(), product.id.clone());

        let task_a = tokio::spawn(async move {
            stock_a
                .apply_movement(&account_a, movement(&id_a, MovementKind::In, 5))
                .await
        });
        let task_b = tokio::spawn(async move {
            stock_b
                .apply_movement(&account_b, movement(&id_b, MovementKind::In, 3))
                .await
        });

        task_a.await.unwrap().unwrap();
        task_b.await.unwrap().unwrap();

        let refreshed = db.products().get_by_id(&account, &product.id).await.unwrap();
        assert_eq!(refreshed.stock_quantity, 18); // never 13 or 15

        remove_db_files(db, &path).await;
    }

    #[tokio::test]
    async fn test_low_stock_end_to_end() {
        let (db, account) = setup().await;
        let product = seed_product(&db, &account, 100, 20).await;
        let stock = db.stock();

        let (_, after_out) = stock
            .apply_movement(&account, movement(&product.id, MovementKind::Out, 85))
            .await
            .unwrap();
        assert_eq!(after_out.stock_quantity, 15);
        assert!(after_out.is_low_stock());

        let low = stock.find_low_stock(&account).await.unwrap();
        assert!(low.iter().any(|p| p.id == product.id));

        let (_, after_in) = stock
            .apply_movement(&account, movement(&product.id, MovementKind::In, 10))
            .await
            .unwrap();
        assert_eq!(after_in.stock_quantity, 25);
        assert!(!after_in.is_low_stock());

        let low = stock.find_low_stock(&account).await.unwrap();
        assert!(!low.iter().any(|p| p.id == product.id));
    }

    #[tokio::test]
    async fn test_low_stock_ordered_ascending() {
        let (db, account) = setup().await;
        let stock = db.stock();

        // Three low products with distinct quantities, one healthy
        seed_product(&db, &account, 5, 10).await;
        seed_product(&db, &account, -2, 0).await;
        seed_product(&db, &account, 8, 10).await;
        seed_product(&db, &account, 50, 10).await;

        let low = stock.find_low_stock(&account).await.unwrap();
        let quantities: Vec<i64> = low.iter().map(|p| p.stock_quantity).collect();
        assert_eq!(quantities, vec![-2, 5, 8]);
    }

    #[tokio::test]
    async fn test_barcode_lookup() {
        let (db, account) = setup().await;
        let product = db
            .products()
            .insert(
                &account,
                NewProduct {
                    name: "Cola 330ml".into(),
                    description: None,
                    price_cents: 250,
                    category: None,
                    stock_quantity: 10,
                    unit: "pcs".into(),
                    barcode: Some("5449000000996".into()),
                    min_stock_level: 0,
                },
            )
            .await
            .unwrap();

        let found = db
            .stock()
            .find_by_barcode(&account, "5449000000996")
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, product.id);

        // No match is Ok(None), not an error
        let missing = db.stock().find_by_barcode(&account, "0000000000000").await;
        assert!(matches!(missing, Ok(None)));

        // Malformed query is InvalidInput
        let err = db.stock().find_by_barcode(&account, "  ").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_list_movements_most_recent_first() {
        let (db, account) = setup().await;
        let product = seed_product(&db, &account, 0, 0).await;
        let stock = db.stock();

        let earlier = Utc::now() - chrono::Duration::hours(1);
        stock
            .apply_movement(
                &account,
                NewStockMovement {
                    occurred_at: Some(earlier),
                    ..movement(&product.id, MovementKind::In, 1)
                },
            )
            .await
            .unwrap();
        stock
            .apply_movement(&account, movement(&product.id, MovementKind::Out, 1))
            .await
            .unwrap();

        let rows = stock.list_movements(&account).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].movement.kind, MovementKind::Out);
        assert_eq!(rows[0].product_name, "Widget");
        assert!(rows[0].movement.occurred_at >= rows[1].movement.occurred_at);
    }
}
