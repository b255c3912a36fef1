//! # Financial Roll-up Engine
//!
//! Records income and expense transactions and aggregates them into
//! per-month totals.
//!
//! ## Month Bucketing
//! A transaction belongs to the calendar month of its `occurred_at`
//! timestamp as stored. Aggregation matches on `strftime('%Y-%m', ...)`,
//! which is exactly the text a `YearMonth` renders to, so the bucket key
//! is computed once and compared as a string on both sides.
//!
//! Profit is always revenue minus expense for the month; loss months come
//! back negative, never clamped.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use stockbook_core::validation::{validate_amount_cents, validate_name};
use stockbook_core::{FinTransaction, Money, MonthlyRollup, NewTransaction, TransactionKind, YearMonth};

/// The financial roll-up engine.
#[derive(Debug, Clone)]
pub struct FinanceRepository {
    pool: SqlitePool,
}

impl FinanceRepository {
    /// Creates a new FinanceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        FinanceRepository { pool }
    }

    /// Records one income or expense transaction.
    ///
    /// `occurred_at` defaults to now when absent, so backdated entries are
    /// an explicit choice by the caller.
    ///
    /// ## Errors
    /// * `InvalidInput` - zero or negative amount, or empty category
    pub async fn insert(
        &self,
        account_id: &str,
        input: NewTransaction,
    ) -> DbResult<FinTransaction> {
        validate_amount_cents(input.amount_cents)?;
        validate_name(&input.category)?;

        let now = Utc::now();
        let transaction = FinTransaction {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            kind: input.kind,
            category: input.category,
            amount_cents: input.amount_cents,
            description: input.description,
            occurred_at: input.occurred_at.unwrap_or(now),
            created_at: now,
        };

        debug!(
            id = %transaction.id,
            kind = %transaction.kind,
            amount_cents = transaction.amount_cents,
            "Recording transaction"
        );

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, account_id, kind, category, amount_cents, description,
                occurred_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.account_id)
        .bind(transaction.kind)
        .bind(&transaction.category)
        .bind(transaction.amount_cents)
        .bind(&transaction.description)
        .bind(transaction.occurred_at)
        .bind(transaction.created_at)
        .execute(&self.pool)
        .await?;

        Ok(transaction)
    }

    /// Lists the account's transactions, most recent occurrence first.
    pub async fn list(&self, account_id: &str) -> DbResult<Vec<FinTransaction>> {
        let transactions = sqlx::query_as::<_, FinTransaction>(
            r#"
            SELECT * FROM transactions
            WHERE account_id = ?1
            ORDER BY occurred_at DESC, created_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    /// Totals one calendar month of income and expense.
    ///
    /// `month` defaults to the current calendar month. A month with no
    /// transactions rolls up to all zeros, not an error.
    pub async fn monthly_rollup(
        &self,
        account_id: &str,
        month: Option<YearMonth>,
    ) -> DbResult<MonthlyRollup> {
        let month = month.unwrap_or_else(|| YearMonth::from_date(&Utc::now()));
        let bucket = month.to_string();

        let revenue = self
            .month_total(account_id, TransactionKind::Income, &bucket)
            .await?;
        let expense = self
            .month_total(account_id, TransactionKind::Expense, &bucket)
            .await?;

        Ok(MonthlyRollup::new(revenue, expense))
    }

    async fn month_total(
        &self,
        account_id: &str,
        kind: TransactionKind,
        bucket: &str,
    ) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)
            FROM transactions
            WHERE account_id = ?1
              AND kind = ?2
              AND strftime('%Y-%m', occurred_at) = ?3
            "#,
        )
        .bind(account_id)
        .bind(kind)
        .bind(bucket)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(cents))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use chrono::TimeZone;

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let account = db
            .create_account("Test Owner", "owner@example.com", None)
            .await
            .unwrap();
        (db, account.id)
    }

    fn tx(kind: TransactionKind, amount_cents: i64, occurred_at: Option<chrono::DateTime<Utc>>) -> NewTransaction {
        NewTransaction {
            kind,
            category: "general".into(),
            amount_cents,
            description: None,
            occurred_at,
        }
    }

    #[tokio::test]
    async fn test_rollup_sums_by_kind() {
        let (db, account) = setup().await;
        let finance = db.finance();

        let march = |day, hour| Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap();
        finance
            .insert(&account, tx(TransactionKind::Income, 50000, Some(march(3, 9))))
            .await
            .unwrap();
        finance
            .insert(&account, tx(TransactionKind::Income, 25000, Some(march(18, 14))))
            .await
            .unwrap();
        finance
            .insert(&account, tx(TransactionKind::Expense, 30000, Some(march(20, 11))))
            .await
            .unwrap();
        // April income must not leak into March
        finance
            .insert(
                &account,
                tx(
                    TransactionKind::Income,
                    99900,
                    Some(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()),
                ),
            )
            .await
            .unwrap();

        let rollup = finance
            .monthly_rollup(&account, Some(YearMonth::new(2026, 3).unwrap()))
            .await
            .unwrap();

        assert_eq!(rollup.revenue_cents, 75000);
        assert_eq!(rollup.expense_cents, 30000);
        assert_eq!(rollup.profit_cents, 45000);
    }

    #[tokio::test]
    async fn test_empty_month_is_all_zeros() {
        let (db, account) = setup().await;

        let rollup = db
            .finance()
            .monthly_rollup(&account, Some(YearMonth::new(2019, 1).unwrap()))
            .await
            .unwrap();

        assert_eq!(rollup, MonthlyRollup::new(Money::zero(), Money::zero()));
    }

    #[tokio::test]
    async fn test_loss_month_is_negative_profit() {
        let (db, account) = setup().await;
        let finance = db.finance();

        let when = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap();
        finance
            .insert(&account, tx(TransactionKind::Income, 10000, Some(when)))
            .await
            .unwrap();
        finance
            .insert(&account, tx(TransactionKind::Expense, 40000, Some(when)))
            .await
            .unwrap();

        let rollup = finance
            .monthly_rollup(&account, Some(YearMonth::new(2026, 5).unwrap()))
            .await
            .unwrap();

        assert_eq!(rollup.profit_cents, -30000);
    }

    #[tokio::test]
    async fn test_default_month_is_current() {
        let (db, account) = setup().await;
        let finance = db.finance();

        finance
            .insert(&account, tx(TransactionKind::Income, 1200, None))
            .await
            .unwrap();

        let rollup = finance.monthly_rollup(&account, None).await.unwrap();
        assert_eq!(rollup.revenue_cents, 1200);
    }

    #[tokio::test]
    async fn test_rollup_is_account_scoped() {
        let (db, account) = setup().await;
        let other = db
            .create_account("Other Owner", "other@example.com", None)
            .await
            .unwrap();

        let when = Utc.with_ymd_and_hms(2026, 6, 2, 8, 0, 0).unwrap();
        db.finance()
            .insert(&other.id, tx(TransactionKind::Income, 77700, Some(when)))
            .await
            .unwrap();

        let rollup = db
            .finance()
            .monthly_rollup(&account, Some(YearMonth::new(2026, 6).unwrap()))
            .await
            .unwrap();

        assert_eq!(rollup.revenue_cents, 0);
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let (db, account) = setup().await;

        for amount in [0, -500] {
            let err = db
                .finance()
                .insert(&account, tx(TransactionKind::Expense, amount, None))
                .await;
            assert!(matches!(err, Err(DbError::InvalidInput(_))));
        }

        assert!(db.finance().list(&account).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_most_recent_occurrence_first() {
        let (db, account) = setup().await;
        let finance = db.finance();

        let old = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        finance
            .insert(&account, tx(TransactionKind::Income, 100, Some(old)))
            .await
            .unwrap();
        finance
            .insert(&account, tx(TransactionKind::Expense, 200, Some(new)))
            .await
            .unwrap();

        let listed = finance.list(&account).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].amount_cents, 200);
        assert_eq!(listed[1].amount_cents, 100);
    }
}
