//! # Validation Module
//!
//! Input validation utilities for Stockbook.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (web handler, deserialization)                        │
//! │  ├── Type validation (closed enums reject unknown wire strings)        │
//! │  └── THIS MODULE: Business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── UNIQUE constraints (barcode, order number)                        │
//! │  └── Foreign key constraints                                           │
//! │                                                                         │
//! │  Defense in depth: Multiple layers catch different errors              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockbook_core::validation::{validate_movement_quantity, validate_item_quantity};
//!
//! // Validate before the store transaction runs
//! validate_movement_quantity(5).unwrap();
//! validate_item_quantity(2).unwrap();
//! ```

use crate::error::{ValidationError, ValidationResult};

// =============================================================================
// Stock Ledger Validators
// =============================================================================

/// Validates a stock movement quantity.
///
/// ## Rules
/// - Must be non-negative
/// - Zero is allowed: a zero-delta movement is still recorded for audit
///   completeness
///
/// ## Example
/// ```rust
/// use stockbook_core::validation::validate_movement_quantity;
///
/// assert!(validate_movement_quantity(85).is_ok());
/// assert!(validate_movement_quantity(0).is_ok());
/// assert!(validate_movement_quantity(-3).is_err());
/// ```
pub fn validate_movement_quantity(qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::MustBeNonNegative {
            field: "quantity".to_string(),
            value: qty,
        });
    }

    Ok(())
}

/// Validates a barcode lookup query.
///
/// ## Rules
/// - Must not be empty after trimming
/// - Maximum 64 characters
/// - Alphanumeric plus hyphens only (EAN-13, UPC-A, internal codes)
///
/// ## Returns
/// The trimmed barcode string.
pub fn validate_barcode(barcode: &str) -> ValidationResult<String> {
    let barcode = barcode.trim();

    if barcode.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }

    if barcode.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "barcode".to_string(),
            max: 64,
        });
    }

    if !barcode.chars().all(|c| c.is_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must contain only letters, numbers, and hyphens".to_string(),
        });
    }

    Ok(barcode.to_string())
}

// =============================================================================
// Order Validators
// =============================================================================

/// Validates an order item quantity.
///
/// ## Rules
/// - Must be positive (> 0); an order line for zero units makes no sense
pub fn validate_item_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates an order number.
///
/// ## Rules
/// - Must not be empty
/// - Maximum 50 characters
pub fn validate_order_number(order_number: &str) -> ValidationResult<()> {
    let order_number = order_number.trim();

    if order_number.is_empty() {
        return Err(ValidationError::Required {
            field: "order_number".to_string(),
        });
    }

    if order_number.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "order_number".to_string(),
            max: 50,
        });
    }

    Ok(())
}

// =============================================================================
// Financial Validators
// =============================================================================

/// Validates a transaction amount in cents.
///
/// ## Rules
/// - Must be strictly positive; the kind (income/expense) carries the sign
///
/// ## Example
/// ```rust
/// use stockbook_core::validation::validate_amount_cents;
///
/// assert!(validate_amount_cents(12000).is_ok());
/// assert!(validate_amount_cents(0).is_err());
/// assert!(validate_amount_cents(-100).is_err());
/// ```
pub fn validate_amount_cents(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Shared Validators
// =============================================================================

/// Validates a display name (product, customer, category).
///
/// ## Rules
/// - Must not be empty
/// - Maximum 200 characters
pub fn validate_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
