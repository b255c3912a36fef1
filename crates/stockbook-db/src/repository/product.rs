//! # Product Repository
//!
//! Single-record reads and inserts for products.
//!
//! Stock quantity changes do NOT happen here: they go through the stock
//! ledger engine (`repository::stock`), which is the only writer of
//! `stock_quantity` after a product is created.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockbook_core::validation::validate_name;
use stockbook_core::{NewProduct, Product};

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let product = repo.insert(&account_id, new_product).await?;
/// let listed = repo.list(&account_id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product with generated id and timestamps
    /// * `Err(DbError::UniqueViolation)` - barcode already exists under the
    ///   account
    pub async fn insert(&self, account_id: &str, input: NewProduct) -> DbResult<Product> {
        validate_name(&input.name)?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            name: input.name,
            description: input.description,
            price_cents: input.price_cents,
            category: input.category,
            stock_quantity: input.stock_quantity,
            unit: input.unit,
            barcode: input.barcode,
            min_stock_level: input.min_stock_level,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, account_id, name, description, price_cents, category,
                stock_quantity, unit, barcode, min_stock_level,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&product.id)
        .bind(&product.account_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(&product.category)
        .bind(product.stock_quantity)
        .bind(&product.unit)
        .bind(&product.barcode)
        .bind(product.min_stock_level)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by its ID under the caller's account.
    ///
    /// ## Errors
    /// * `NotFound` - no such product under this account
    pub async fn get_by_id(&self, account_id: &str, id: &str) -> DbResult<Product> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = ?1 AND account_id = ?2",
        )
        .bind(id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        product.ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Lists the account's products, name ascending.
    pub async fn list(&self, account_id: &str) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE account_id = ?1 ORDER BY name ASC",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Counts the account's products.
    pub async fn count(&self, account_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE account_id = ?1")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let account = db
            .create_account("Test Owner", "owner@example.com", None)
            .await
            .unwrap();
        (db, account.id)
    }

    fn widget(name: &str, barcode: Option<&str>) -> NewProduct {
        NewProduct {
            name: name.into(),
            description: None,
            price_cents: 1000,
            category: None,
            stock_quantity: 0,
            unit: "pcs".into(),
            barcode: barcode.map(str::to_string),
            min_stock_level: 0,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (db, account) = setup().await;
        let repo = db.products();

        let product = repo.insert(&account, widget("Widget", None)).await.unwrap();
        let fetched = repo.get_by_id(&account, &product.id).await.unwrap();

        assert_eq!(fetched.name, "Widget");
        assert_eq!(fetched.stock_quantity, 0);
    }

    #[tokio::test]
    async fn test_get_scoped_to_account() {
        let (db, account) = setup().await;
        let product = db
            .products()
            .insert(&account, widget("Widget", None))
            .await
            .unwrap();

        let stranger = db
            .create_account("Other", "other@example.com", None)
            .await
            .unwrap();

        let err = db.products().get_by_id(&stranger.id, &product.id).await;
        assert!(matches!(err, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_ordered_by_name() {
        let (db, account) = setup().await;
        let repo = db.products();

        repo.insert(&account, widget("Zinc Plate", None)).await.unwrap();
        repo.insert(&account, widget("Anvil", None)).await.unwrap();

        let products = repo.list(&account).await.unwrap();
        let names: Vec<&str> = products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Anvil", "Zinc Plate"]);
    }

    #[tokio::test]
    async fn test_duplicate_barcode_rejected_per_account() {
        let (db, account) = setup().await;
        let repo = db.products();

        repo.insert(&account, widget("A", Some("123-456")))
            .await
            .unwrap();
        let err = repo.insert(&account, widget("B", Some("123-456"))).await;
        assert!(matches!(err, Err(DbError::UniqueViolation { .. })));

        // Same barcode under another account is fine
        let other = db
            .create_account("Other", "other@example.com", None)
            .await
            .unwrap();
        assert!(repo.insert(&other.id, widget("C", Some("123-456"))).await.is_ok());
    }

    #[tokio::test]
    async fn test_count() {
        let (db, account) = setup().await;
        let repo = db.products();

        assert_eq!(repo.count(&account).await.unwrap(), 0);
        repo.insert(&account, widget("Widget", None)).await.unwrap();
        assert_eq!(repo.count(&account).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let (db, account) = setup().await;
        let err = db.products().insert(&account, widget("  ", None)).await;
        assert!(matches!(err, Err(DbError::InvalidInput(_))));
    }
}
