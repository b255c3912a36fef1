//! # Database Error Types
//!
//! Error types for store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Reporting facade and external callers, unmodified                     │
//! │                                                                         │
//! │  Engines never retry and never swallow: a failed count query is a      │
//! │  failed dashboard, not a zero.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Taxonomy
//! - `NotFound` - entity absent or not owned by the caller's account. The
//!   two cases are indistinguishable on purpose: lookups never leak the
//!   existence of other accounts' rows.
//! - `InvalidInput` - bad movement kind, negative quantity, malformed
//!   barcode. Wraps the core error; nothing was written.
//! - `ConsistencyViolation` - an order total disagrees with its item sum
//!   after a write. Fatal to that write; the transaction rolls back.
//! - Everything else is a store failure, propagated unchanged.

use thiserror::Error;

use stockbook_core::CoreError;

/// Store operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and caller feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found under the caller's account.
    ///
    /// ## When This Occurs
    /// - ID doesn't exist
    /// - ID exists but belongs to a different account
    /// - A detail join yields zero rows
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Caller input rejected before any write.
    ///
    /// ## When This Occurs
    /// - Movement kind outside the closed set
    /// - Negative movement quantity
    /// - Empty or malformed barcode query
    /// - Non-positive item quantity or transaction amount
    #[error("invalid input: {0}")]
    InvalidInput(#[from] CoreError),

    /// A derived invariant failed after a write; the transaction was
    /// rolled back.
    ///
    /// ## When This Occurs
    /// - An order's persisted total does not equal the sum of its items
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate order number
    /// - Duplicate barcode within an account
    #[error("duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Referencing a non-existent product or customer id
    #[error("foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a ConsistencyViolation error.
    pub fn inconsistent(message: impl Into<String>) -> Self {
        DbError::ConsistencyViolation(message.into())
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite error messages for constraints:
                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<stockbook_core::ValidationError> for DbError {
    fn from(err: stockbook_core::ValidationError) -> Self {
        DbError::InvalidInput(err.into())
    }
}

/// Result type for store operations.
pub type DbResult<T> = Result<T, DbError>;
