//! # Order Totals
//!
//! Cart math shared by the cart store (recompute after every line mutation),
//! the order repository (total audit) and checkout (snapshot).
//!
//! ```text
//! addLine / updateLine / removeLine
//!      │
//!      ▼
//! lines = SELECT ... FROM cart_lines WHERE order_id = ?   (same transaction)
//!      │
//!      ▼
//! order_total(&lines)  ← THIS MODULE
//!      │
//!      ▼
//! UPDATE orders SET total_cents = ?
//! ```

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CartLine, CheckoutLine};

/// Σ(line.unit_price × line.quantity). Zero for an empty cart.
///
/// Fails with `AmountOverflow` instead of wrapping or panicking.
pub fn order_total(lines: &[CartLine]) -> CoreResult<Money> {
    lines.iter().try_fold(Money::zero(), |acc, line| {
        acc.checked_add(line.line_total()?)
            .ok_or_else(|| CoreError::AmountOverflow(format!("order {} total", line.order_id)))
    })
}

/// Total number of units across all lines.
pub fn total_quantity(lines: &[CartLine]) -> i64 {
    lines.iter().map(|l| l.quantity).sum()
}

/// Fails with `ConsistencyViolation` when a persisted total no longer
/// matches its lines.
pub fn verify_total(order_id: &str, persisted_cents: i64, lines: &[CartLine]) -> CoreResult<()> {
    let computed = order_total(lines)?;
    if computed.cents() != persisted_cents {
        return Err(CoreError::ConsistencyViolation(format!(
            "order {} total is {} but its lines sum to {}",
            order_id,
            Money::from_cents(persisted_cents),
            computed
        )));
    }
    Ok(())
}

/// Freezes cart lines into checkout lines, one per cart line, in cart order.
pub fn snapshot_lines(checkout_id: &str, lines: &[CartLine]) -> Vec<CheckoutLine> {
    lines
        .iter()
        .map(|l| CheckoutLine {
            checkout_id: checkout_id.to_string(),
            product_id: l.product_id.clone(),
            quantity: l.quantity,
            unit_price_cents: l.unit_price_cents,
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
