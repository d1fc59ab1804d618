//! # Domain Types
//!
//! Records owned by the consistency engine plus the two collaborator records
//! (catalog product, directory client) it reads.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Product (catalog) ◄──── StockEntry*      owned by InventoryLedger      │
//! │       ▲                                                                 │
//! │       │                                                                 │
//! │  CartLine* ──────────► Order ◄──── Client (directory)                   │
//! │  owned by its Order      │                                              │
//! │                          │ 1:1                                          │
//! │                          ▼                                              │
//! │                      Checkout ──► CheckoutLine*  (frozen at creation)   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Identifiers are UUID v4 strings. Money columns are integer cents.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::lifecycle::{OrderStatus, PaymentStatus};
use crate::money::Money;

// =============================================================================
// Catalog / Directory Collaborators
// =============================================================================

/// A product as seen by the engine: an id and a unit price.
///
/// The remaining fields exist for the catalog's own listings and for
/// affiliate ownership lookups.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Current price in cents. Cart lines copy this at add time.
    pub unit_price_cents: i64,
    /// Affiliate (seller) that lists the product.
    pub affiliate_id: Option<String>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

/// Input for registering a product in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub unit_price_cents: i64,
    pub affiliate_id: Option<String>,
}

/// A buyer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub email: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Stock Entry
// =============================================================================

/// One bucket of stock for a product. A product may have several; the
/// ledger reports their sum.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockEntry {
    pub id: String,
    pub product_id: String,
    /// Never negative.
    pub quantity: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Payment Type
// =============================================================================

/// How the client intends to pay for a line / checkout.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Card,
    Pix,
    Boleto,
    Cash,
}

impl PaymentType {
    pub const ALL: [PaymentType; 4] = [
        PaymentType::Card,
        PaymentType::Pix,
        PaymentType::Boleto,
        PaymentType::Cash,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Card => "CARD",
            PaymentType::Pix => "PIX",
            PaymentType::Boleto => "BOLETO",
            PaymentType::Cash => "CASH",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        PaymentType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "payment_type".to_string(),
                allowed: PaymentType::ALL.iter().map(|t| t.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Cart Line
// =============================================================================

/// A product/quantity entry in an order's cart.
///
/// `unit_price_cents` is frozen when the line is added; later catalog price
/// changes do not move the order total.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CartLine {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// Always > 0; a line at zero is removed instead.
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub payment_type: PaymentType,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl CartLine {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// unit price × quantity
    pub fn line_total(&self) -> CoreResult<Money> {
        self.unit_price()
            .checked_multiply_quantity(self.quantity)
            .ok_or_else(|| {
                CoreError::AmountOverflow(format!(
                    "cart line {}: {} × {}",
                    self.id,
                    self.unit_price(),
                    self.quantity
                ))
            })
    }
}

// =============================================================================
// Order
// =============================================================================

/// A client's purchase: cart lines, running total and lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub client_id: String,
    pub status: OrderStatus,
    /// Σ(line.unit_price_cents × line.quantity), kept current by every line mutation.
    pub total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// Loaded separately from `cart_lines`.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub lines: Vec<CartLine>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Checkout
// =============================================================================

/// The one-shot, priced and addressed record of an order's purchase.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Checkout {
    pub id: String,
    pub order_id: String,
    /// Order total at checkout time.
    pub total_price_cents: i64,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentType,
    pub shipping_address: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// Purchased items as they were when the checkout was created.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub lines: Vec<CheckoutLine>,
}

impl Checkout {
    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }
}

/// Frozen copy of one cart line inside a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CheckoutLine {
    pub checkout_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl CheckoutLine {
    pub fn line_total(&self) -> CoreResult<Money> {
        Money::from_cents(self.unit_price_cents)
            .checked_multiply_quantity(self.quantity)
            .ok_or_else(|| {
                CoreError::AmountOverflow(format!(
                    "checkout {} line for product {}",
                    self.checkout_id, self.product_id
                ))
            })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(qty: i64, price: i64) -> CartLine {
        CartLine {
            id: "l-1".into(),
            order_id: "o-1".into(),
            product_id: "p-1".into(),
            quantity: qty,
            unit_price_cents: price,
            payment_type: PaymentType::Card,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_line_total() {
        assert_eq!(line(20, 8990).line_total().unwrap().cents(), 179_800);
    }

    #[test]
    fn test_line_total_overflow_is_an_error() {
        let err = line(999, i64::MAX / 2).line_total().unwrap_err();
        assert!(matches!(err, CoreError::AmountOverflow(_)));
    }

    #[test]
    fn test_payment_type_parse() {
        assert_eq!("card".parse::<PaymentType>().unwrap(), PaymentType::Card);
        assert_eq!("PIX".parse::<PaymentType>().unwrap(), PaymentType::Pix);
        assert!(matches!(
            "cheque".parse::<PaymentType>(),
            Err(ValidationError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_order_lines_default_when_missing_from_json() {
        let json = r#"{
            "id": "o-1",
            "client_id": "c-1",
            "status": "OPEN",
            "total_cents": 0,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert!(order.lines.is_empty());
        assert_eq!(order.status, OrderStatus::Open);
    }
}
