//! # ecofraldas-core: Pure Domain Logic for EcoFraldas
//!
//! This crate holds the rules of the order / cart / inventory engine as pure
//! functions with zero I/O dependencies. `ecofraldas-db` wraps these rules in
//! SQLite transactions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       EcoFraldas Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           HTTP / JWT / DTO layer (outside this workspace)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 ecofraldas-db (consistency engine)              │   │
//! │  │   InventoryLedger ── CartStore ── OrderRepository ── Checkout   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ calls                                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ ecofraldas-core (THIS CRATE) ★                  │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌───────────┐ ┌──────────┐ ┌──────┐│   │
//! │  │   │  types   │ │  money   │ │ lifecycle │ │  totals  │ │valid.││   │
//! │  │   │ Order    │ │  Money   │ │ OrderStat │ │ Σ lines  │ │ qty  ││   │
//! │  │   │ Checkout │ │          │ │ PaymentSt │ │ snapshot │ │ addr ││   │
//! │  │   └──────────┘ └──────────┘ └───────────┘ └──────────┘ └──────┘│   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (StockEntry, CartLine, Order, Checkout, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`lifecycle`] - Order and payment state machines
//! - [`totals`] - Order total computation and checkout snapshots
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use ecofraldas_core::lifecycle::OrderStatus;
//! use ecofraldas_core::money::Money;
//!
//! let unit_price = Money::from_cents(8990); // $89.90
//! assert_eq!(unit_price.multiply_quantity(2).cents(), 17980);
//!
//! assert!(OrderStatus::Open.can_transition_to(OrderStatus::AwaitingPayment));
//! assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Open));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod lifecycle;
pub mod money;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, Entity, ValidationError};
pub use lifecycle::{OrderStatus, PaymentStatus};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of line items in a single order's cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single cart line.
///
/// Guards against typing 1000 instead of 10. Stock levels themselves are
/// not capped.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum catalog unit price, in cents (R$ 1.000.000,00).
///
/// Keeps `price × MAX_ITEM_QUANTITY × MAX_CART_LINES` well inside `i64`.
pub const MAX_UNIT_PRICE_CENTS: i64 = 100_000_000;

/// Maximum length of a shipping address, in characters.
pub const MAX_SHIPPING_ADDRESS_LEN: usize = 500;
