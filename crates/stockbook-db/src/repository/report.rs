//! # Dashboard Reporting
//!
//! Composes the other engines into the one-screen dashboard view: entity
//! counts, the current month's financial roll-up, and the low-stock list.
//!
//! Composition is fail-fast. If any underlying read fails the dashboard
//! fails with that error rather than returning a partially filled view.

use sqlx::SqlitePool;

use crate::error::DbResult;
use crate::repository::customer::CustomerRepository;
use crate::repository::finance::FinanceRepository;
use crate::repository::order::OrderRepository;
use crate::repository::product::ProductRepository;
use crate::repository::stock::StockRepository;
use stockbook_core::DashboardStats;

/// Read-only composition over the other repositories.
#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    /// Creates a new ReportRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    /// Builds the dashboard for one account.
    ///
    /// The roll-up always covers the current calendar month; callers
    /// wanting another month go to the finance engine directly.
    pub async fn dashboard(&self, account_id: &str) -> DbResult<DashboardStats> {
        let customers = CustomerRepository::new(self.pool.clone());
        let products = ProductRepository::new(self.pool.clone());
        let orders = OrderRepository::new(self.pool.clone());
        let finance = FinanceRepository::new(self.pool.clone());
        let stock = StockRepository::new(self.pool.clone());

        let total_customers = customers.count(account_id).await?;
        let total_products = products.count(account_id).await?;
        let total_orders = orders.count(account_id).await?;
        let pending_orders = orders.count_pending(account_id).await?;
        let monthly = finance.monthly_rollup(account_id, None).await?;
        let low_stock_products = stock.find_low_stock(account_id).await?;

        Ok(DashboardStats {
            total_customers,
            total_products,
            total_orders,
            pending_orders,
            monthly,
            low_stock_products,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
