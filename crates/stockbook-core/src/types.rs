//! # Domain Types
//!
//! Core domain types used throughout Stockbook.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │     Order       │   │ StockMovement   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  barcode        │   │  order_number   │   │  product_id (FK)│       │
//! │  │  stock_quantity │   │  status         │   │  kind           │       │
//! │  │  min_stock_level│   │  total_cents    │   │  quantity       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  MovementKind   │   │  OrderStatus    │   │ TransactionKind │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  In ("in")      │   │  Pending        │   │  Income         │       │
//! │  │  Out ("out")    │   │  Processing     │   │  Expense        │       │
//! │  │  Adjustment     │   │  Shipped ...    │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID where one exists: (order_number, barcode) - human-readable
//!
//! ## Closed Enumerations
//! Movement kind, order status, and transaction kind are free-text strings in
//! the store but closed tagged variants at the engine boundary. The store's
//! CHECK constraints are defense-in-depth, not the primary guarantee.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::money::Money;

// =============================================================================
// Movement Kind
// =============================================================================

/// The semantics of a stock movement.
///
/// Wire/store values are the closed string set `{"in", "out", "adjustment"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Increment: adds the quantity to the product's stock.
    In,
    /// Decrement: subtracts the quantity (stock may go negative).
    Out,
    /// Absolute set: replaces the stock with the quantity outright.
    Adjustment,
}

impl MovementKind {
    /// The store representation of this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementKind::In => "in",
            MovementKind::Out => "out",
            MovementKind::Adjustment => "adjustment",
        }
    }
}

impl FromStr for MovementKind {
    type Err = CoreError;

    /// Parses a wire string into a movement kind.
    ///
    /// Anything outside the closed set fails before any record is written.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementKind::In),
            "out" => Ok(MovementKind::Out),
            "adjustment" => Ok(MovementKind::Adjustment),
            other => Err(CoreError::InvalidMovementKind(other.to_string())),
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The status of an order.
///
/// Free text in the legacy store; a closed enumeration here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// The store representation of this status.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(CoreError::InvalidOrderStatus(other.to_string())),
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transaction Kind
// =============================================================================

/// Income or expense, the two sides of the financial ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(CoreError::InvalidTransactionKind(other.to_string())),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Year-Month
// =============================================================================

/// A calendar month, the bucketing unit for financial roll-ups.
///
/// Formats as `YYYY-MM`, which is exactly what the store's
/// `strftime('%Y-%m', ...)` produces, so a roll-up query can compare the
/// two strings directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Creates a year-month, rejecting months outside 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self, CoreError> {
        if !(1..=12).contains(&month) {
            return Err(CoreError::InvalidMonth(month));
        }
        Ok(YearMonth { year, month })
    }

    /// The calendar month a timestamp falls in.
    ///
    /// Uses the timestamp as stored; no timezone normalization beyond what
    /// the store provides.
    pub fn from_date(date: &DateTime<Utc>) -> Self {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }

    pub const fn year(&self) -> i32 {
        self.year
    }

    pub const fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// =============================================================================
// Account
// =============================================================================

/// The owning account (business/tenant) that scopes all other entities.
///
/// The engines never operate cross-account: every call takes an explicit
/// account id and every query is filtered by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
    pub business_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Customer
// =============================================================================

/// A customer of the owning account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

// =============================================================================
// Product
// =============================================================================

/// A product with a stock quantity maintained by the stock ledger.
///
/// ## Invariant
/// `stock_quantity` is always the sum, in event order, of all accepted
/// movement deltas since creation, or the result of the last absolute-set
/// movement plus subsequent deltas. Only the Stock Ledger Engine writes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Owning account.
    pub account_id: String,

    /// Display name.
    pub name: String,

    /// Optional description.
    pub description: Option<String>,

    /// Price in cents (smallest currency unit).
    pub price_cents: i64,

    /// Optional category label.
    pub category: Option<String>,

    /// Current stock. May be negative: over-decrement is allowed and
    /// surfaces through the low-stock predicate, not a rejection.
    pub stock_quantity: i64,

    /// Unit of measure shown alongside quantities ("pcs", "kg", ...).
    pub unit: String,

    /// Barcode, unique per account when present.
    pub barcode: Option<String>,

    /// Threshold for the low-stock predicate.
    pub min_stock_level: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Low-stock predicate: quantity at or below the configured minimum.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.min_stock_level
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub category: Option<String>,
    /// Opening stock. Subsequent changes go through the stock ledger.
    #[serde(default)]
    pub stock_quantity: i64,
    pub unit: String,
    pub barcode: Option<String>,
    #[serde(default)]
    pub min_stock_level: i64,
}

// =============================================================================
// Stock Movement
// =============================================================================

/// An immutable, appended record of a stock quantity change for one product.
///
/// Movements are only ever created by the Stock Ledger Engine, never edited
/// or deleted, and never written by callers bypassing the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub id: String,
    pub account_id: String,
    pub product_id: String,
    pub kind: MovementKind,
    /// Non-negative magnitude for In/Out; target value for Adjustment.
    pub quantity: i64,
    /// Free-text reference (order number, invoice number, ...).
    pub reference: Option<String>,
    pub description: Option<String>,
    /// When the movement happened (caller-supplied or stamped on apply).
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// The signed stock delta this movement applies, or `None` for an
    /// absolute set.
    pub fn delta(&self) -> Option<i64> {
        match self.kind {
            MovementKind::In => Some(self.quantity),
            MovementKind::Out => Some(-self.quantity),
            MovementKind::Adjustment => None,
        }
    }
}

/// Input for applying a new stock movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStockMovement {
    pub product_id: String,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reference: Option<String>,
    pub description: Option<String>,
    /// Defaults to now when absent.
    pub occurred_at: Option<DateTime<Utc>>,
}

/// A stock movement joined with its product's name, for listings.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovementRow {
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub movement: StockMovement,
    pub product_name: String,
}

// =============================================================================
// Order
// =============================================================================

/// An order placed by a customer.
///
/// ## Invariant
/// `total_cents == Σ item.total_cents` over the order's items. Every item
/// write path recomputes and persists the total in the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    pub account_id: String,
    pub customer_id: String,
    /// Unique business identifier shown on documents.
    pub order_number: String,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub notes: Option<String>,
    pub order_date: DateTime<Utc>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the recorded total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line item of an order.
///
/// `unit_price_cents` is a snapshot captured at order time, not re-derived
/// from the product's current price.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// Positive integer.
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// quantity × unit_price_cents.
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// Input for one order line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl NewOrderItem {
    /// The line total this item will carry: quantity × unit price.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// Input for creating an order with its initial items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: String,
    pub order_number: String,
    #[serde(default)]
    pub status: OrderStatus,
    pub notes: Option<String>,
    /// Defaults to now when absent.
    pub order_date: Option<DateTime<Utc>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub items: Vec<NewOrderItem>,
}

/// An order joined with its customer's name, for listings.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderSummary {
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: String,
}

/// Customer fields snapshotted into an order detail view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// An order item joined with its product's name and unit, for detail views.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItemDetail {
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub item: OrderItem,
    pub product_name: String,
    pub product_unit: String,
}

/// Full order view: the order, its customer snapshot, and its items.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub customer: CustomerSnapshot,
    pub items: Vec<OrderItemDetail>,
}

// =============================================================================
// Financial Transaction
// =============================================================================

/// An immutable income or expense ledger entry.
///
/// Named `FinTransaction` to keep it apart from store transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FinTransaction {
    pub id: String,
    pub account_id: String,
    pub kind: TransactionKind,
    pub category: String,
    /// Positive amount in cents.
    pub amount_cents: i64,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl FinTransaction {
    /// Returns the amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// Input for recording a financial transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub category: String,
    pub amount_cents: i64,
    pub description: Option<String>,
    /// Defaults to now when absent.
    pub occurred_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Roll-up and Dashboard Views
// =============================================================================

/// One calendar month of financial totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyRollup {
    pub revenue_cents: i64,
    pub expense_cents: i64,
    pub profit_cents: i64,
}

impl MonthlyRollup {
    /// Builds a roll-up from revenue and expense; profit is always the
    /// difference, negative months included.
    pub fn new(revenue: Money, expense: Money) -> Self {
        MonthlyRollup {
            revenue_cents: revenue.cents(),
            expense_cents: expense.cents(),
            profit_cents: (revenue - expense).cents(),
        }
    }

    #[inline]
    pub fn revenue(&self) -> Money {
        Money::from_cents(self.revenue_cents)
    }

    #[inline]
    pub fn expense(&self) -> Money {
        Money::from_cents(self.expense_cents)
    }

    #[inline]
    pub fn profit(&self) -> Money {
        Money::from_cents(self.profit_cents)
    }
}

/// The dashboard view: counts, current-month roll-up, low-stock list.
///
/// Derived on every request from the persisted entities, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_customers: i64,
    pub total_products: i64,
    pub total_orders: i64,
    pub pending_orders: i64,
    pub monthly: MonthlyRollup,
    pub low_stock_products: Vec<Product>,
}

// =============================================================================
// Pure Order Math
// =============================================================================

/// Sums persisted items into the total the order must record.
pub fn order_total(items: &[OrderItem]) -> Money {
    items.iter().map(|i| i.line_total()).sum()
}

/// Sums incoming items into the total the order will record.
pub fn new_order_total(items: &[NewOrderItem]) -> Money {
    items.iter().map(|i| i.line_total()).sum()
}

// =============================================================================
// Unit Tests
// =============================================================================
