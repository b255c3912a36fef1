//! # Repository Module
//!
//! Database repository implementations for Stockbook.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Caller                                                                 │
//! │       │                                                                 │
//! │       │  db.stock().apply_movement(account_id, movement)               │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  StockRepository                                                       │
//! │  ├── apply_movement(&self, account_id, movement)                       │
//! │  ├── list_movements(&self, account_id)                                 │
//! │  ├── find_low_stock(&self, account_id)                                 │
//! │  └── find_by_barcode(&self, account_id, barcode)                       │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • Clean separation of concerns                                        │
//! │  • Easy to test (in-memory database per test)                          │
//! │  • SQL is isolated in one place                                        │
//! │  • Every query is account-scoped at this boundary                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`StockRepository`] - Stock movement ledger and derived quantities
//! - [`OrderRepository`] - Orders, line items, and the total invariant
//! - [`FinanceRepository`] - Transactions and monthly roll-ups
//! - [`ReportRepository`] - Dashboard composition over the engines
//! - [`ProductRepository`] - Product records
//! - [`CustomerRepository`] - Customer records
//!
//! [`StockRepository`]: stock::StockRepository
//! [`OrderRepository`]: order::OrderRepository
//! [`FinanceRepository`]: finance::FinanceRepository
//! [`ReportRepository`]: report::ReportRepository
//! [`ProductRepository`]: product::ProductRepository
//! [`CustomerRepository`]: customer::CustomerRepository

pub mod customer;
pub mod finance;
pub mod order;
pub mod product;
pub mod report;
pub mod stock;
