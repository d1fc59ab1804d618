//! # Error Types
//!
//! Domain-specific error types for ecofraldas-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  ecofraldas-core errors (this file)                                    │
//! │  ├── CoreError        - NotFound, InsufficientStock, InvalidState,     │
//! │  │                      ConsistencyViolation, AmountOverflow            │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  ecofraldas-db errors (separate crate)                                 │
//! │  └── DbError          - Wraps CoreError unchanged + SQLite failures    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No component downgrades an error it receives from a component it
//! depends on: `InsufficientStock` raised by the ledger reaches the caller of
//! `CartStore::add_line` as the same variant with the same numbers.

use std::fmt;

use thiserror::Error;

// =============================================================================
// Entity
// =============================================================================

/// The kind of record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Order,
    Product,
    CartLine,
    StockEntry,
    Checkout,
    Client,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Order => "Order",
            Entity::Product => "Product",
            Entity::CartLine => "Cart line",
            Entity::StockEntry => "Stock entry",
            Entity::Checkout => "Checkout",
            Entity::Client => "Client",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Domain errors raised by the consistency engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced record does not exist.
    ///
    /// Surfaced to the caller as a client error and never retried.
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    /// The ledger cannot cover the requested quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// addLine(order, P, qty: 100)
    ///      │
    ///      ▼
    /// reserve(P, 100): available = 10
    ///      │
    ///      ▼
    /// InsufficientStock { requested: 100, available: 10 }
    ///      │
    ///      ▼
    /// Caller resubmits with a smaller quantity
    /// ```
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: i64,
        available: i64,
    },

    /// The operation is not allowed by the order or payment state machine.
    ///
    /// ## When This Occurs
    /// - Adding a product to an order that is no longer OPEN
    /// - A second checkout for the same order
    /// - A payment update on a checkout that is already PAID or CANCELED
    #[error("{entity} {id}: {reason}")]
    InvalidState {
        entity: Entity,
        id: String,
        reason: String,
    },

    /// Persisted state disagrees with what was just computed, or a
    /// concurrent writer won a race.
    ///
    /// Treated as a transaction-retry signal, not surfaced raw.
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    /// A monetary computation left the `i64` cents range.
    ///
    /// Only reachable with prices stored outside the catalog's bounds.
    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    /// Order already has the maximum number of cart lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error.
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates an InvalidState error.
    pub fn invalid_state(entity: Entity, id: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidState {
            entity,
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if re-running the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ConsistencyViolation(_))
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur before any ledger or order state is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
