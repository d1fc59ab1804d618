//! # Order and Payment Lifecycles
//!
//! Closed state machines for orders and checkout payments. Status values are
//! never stored as free text: anything outside these enums is rejected at
//! parse time, and any transition outside the tables below is rejected with
//! `CoreError::InvalidState`.
//!
//! ## Order State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │        ┌────────── OPEN ◄──────────┐                                    │
//! │        │            │              │                                    │
//! │        │            ▼              │                                    │
//! │        │       PROCESSING ─────────┘                                    │
//! │        │            │                                                   │
//! │        ▼            ▼                                                   │
//! │     AWAITING_PAYMENT  (checkout created)                                │
//! │        │            │                                                   │
//! │        ▼            ▼                                                   │
//! │      PAID       CANCELED      (OPEN / PROCESSING may also cancel)       │
//! │                                                                         │
//! │  Cart mutation:        OPEN only                                        │
//! │  Checkout creation:    OPEN, PROCESSING                                 │
//! │  Holds reservation:    OPEN, PROCESSING, AWAITING_PAYMENT               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Payment State Machine
//! ```text
//! PENDING ──► PAID       (order → PAID)
//!    └──────► CANCELED   (order → CANCELED)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, Entity, ValidationError};

// =============================================================================
// Order Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Cart is being filled.
    Open,
    /// Client paused editing before checkout.
    Processing,
    /// Checkout exists, waiting for the payment notification.
    AwaitingPayment,
    /// Payment confirmed. Terminal.
    Paid,
    /// Order abandoned or payment refused. Terminal.
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Open,
        OrderStatus::Processing,
        OrderStatus::AwaitingPayment,
        OrderStatus::Paid,
        OrderStatus::Canceled,
    ];

    /// The stored / wire representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::AwaitingPayment => "AWAITING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::Canceled => "CANCELED",
        }
    }

    /// Whether `self → next` is an edge of the order state machine.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Open, Processing)
                | (Open, AwaitingPayment)
                | (Open, Canceled)
                | (Processing, Open)
                | (Processing, AwaitingPayment)
                | (Processing, Canceled)
                | (AwaitingPayment, Paid)
                | (AwaitingPayment, Canceled)
        )
    }

    /// Returns `InvalidState` unless `self → next` is allowed.
    pub fn ensure_transition(&self, order_id: &str, next: OrderStatus) -> CoreResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::invalid_state(
                Entity::Order,
                order_id,
                format!("cannot move from {} to {}", self, next),
            ))
        }
    }

    /// Line items may only be added, changed or removed while OPEN.
    pub const fn allows_cart_mutation(&self) -> bool {
        matches!(self, OrderStatus::Open)
    }

    pub const fn allows_checkout(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::Processing)
    }

    /// Whether the order's lines still have stock reserved in the ledger.
    ///
    /// Reservations are consumed on PAID and given back on CANCELED.
    pub const fn holds_reservation(&self) -> bool {
        matches!(
            self,
            OrderStatus::Open | OrderStatus::Processing | OrderStatus::AwaitingPayment
        )
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Canceled)
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Open
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: OrderStatus::ALL.iter().map(|s| s.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Payment Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Canceled,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 3] = [
        PaymentStatus::Pending,
        PaymentStatus::Paid,
        PaymentStatus::Canceled,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Canceled => "CANCELED",
        }
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Paid)
                | (PaymentStatus::Pending, PaymentStatus::Canceled)
        )
    }

    pub fn ensure_transition(&self, checkout_id: &str, next: PaymentStatus) -> CoreResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::invalid_state(
                Entity::Checkout,
                checkout_id,
                format!("payment cannot move from {} to {}", self, next),
            ))
        }
    }

    /// The order status a payment outcome drives the parent order to.
    pub const fn order_status(&self) -> Option<OrderStatus> {
        match self {
            PaymentStatus::Pending => None,
            PaymentStatus::Paid => Some(OrderStatus::Paid),
            PaymentStatus::Canceled => Some(OrderStatus::Canceled),
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "payment_status".to_string(),
                allowed: PaymentStatus::ALL.iter().map(|s| s.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
