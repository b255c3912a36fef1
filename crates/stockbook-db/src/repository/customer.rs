//! # Customer Repository
//!
//! Single-record reads and inserts for customers. No derived invariants
//! here; the dashboard facade consumes the count.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockbook_core::validation::validate_name;
use stockbook_core::{Customer, NewCustomer};

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Inserts a new customer.
    pub async fn insert(&self, account_id: &str, input: NewCustomer) -> DbResult<Customer> {
        validate_name(&input.name)?;

        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            name: input.name,
            email: input.email,
            phone: input.phone,
            address: input.address,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %customer.id, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, account_id, name, email, phone, address, notes,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.account_id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(&customer.notes)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Gets a customer by ID under the caller's account.
    ///
    /// ## Errors
    /// * `NotFound` - no such customer under this account
    pub async fn get_by_id(&self, account_id: &str, id: &str) -> DbResult<Customer> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE id = ?1 AND account_id = ?2",
        )
        .bind(id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        customer.ok_or_else(|| DbError::not_found("Customer", id))
    }

    /// Lists the account's customers, most recently created first.
    pub async fn list(&self, account_id: &str) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE account_id = ?1 ORDER BY created_at DESC",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Counts the account's customers.
    pub async fn count(&self, account_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers WHERE account_id = ?1")
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

    fn customer(name: &str) -> NewCustomer {
        NewCustomer {
            name: name.into(),
            email: None,
            phone: None,
            address: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_insert_get_and_count() {
        let (db, account) = setup().await;
        let repo = db.customers();

        let created = repo.insert(&account, customer("Ayşe Kaya")).await.unwrap();
        let fetched = repo.get_by_id(&account, &created.id).await.unwrap();

        assert_eq!(fetched.name, "Ayşe Kaya");
        assert_eq!(repo.count(&account).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lookup_scoped_to_account() {
        let (db, account) = setup().await;
        let created = db
            .customers()
            .insert(&account, customer("Ayşe Kaya"))
            .await
            .unwrap();

        let stranger = db
            .create_account("Other", "other@example.com", None)
            .await
            .unwrap();

        let err = db.customers().get_by_id(&stranger.id, &created.id).await;
        assert!(matches!(err, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let (db, account) = setup().await;
        let err = db.customers().insert(&account, customer("")).await;
        assert!(matches!(err, Err(DbError::InvalidInput(_))));
    }
}
