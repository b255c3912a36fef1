//! # stockbook-db: Database Layer for Stockbook
//!
//! This crate provides database access for the Stockbook back-office
//! engine. It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Stockbook Data Flow                               │
//! │                                                                         │
//! │  Caller (app shell, HTTP handler, CLI)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   stockbook-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  (stock.rs,   │    │  (embedded)  │  │   │
//! │  │   │               │    │   order.rs,   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│   finance.rs, │    │ 001_initial  │  │   │
//! │  │   │ Connection    │    │   report.rs)  │    │ _schema.sql  │  │   │
//! │  │   │ Management    │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (one file, or :memory: for tests)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (stock, order, finance, ...)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockbook_db::{Database, DbConfig};
//!
//! // Create database with default config
//! let config = DbConfig::new("path/to/stockbook.db");
//! let db = Database::new(config).await?;
//!
//! // Use repositories; every call names its account
//! let low = db.stock().find_low_stock(&account_id).await?;
//! let stats = db.reports().dashboard(&account_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::customer::CustomerRepository;
pub use repository::finance::FinanceRepository;
pub use repository::order::OrderRepository;
pub use repository::product::ProductRepository;
pub use repository::report::ReportRepository;
pub use repository::stock::StockRepository;
