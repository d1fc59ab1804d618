//! # Money Module
//!
//! Provides the `Money` type used for unit prices, line totals, order totals
//! and checkout snapshots.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Order.totalAmount == Σ(line.unitPriceAtAdd × line.quantity)           │
//! │                                                                         │
//! │  With floats, 0.1 + 0.2 != 0.3 and the equality above can fail for    │
//! │  reasons that have nothing to do with concurrency. In integer cents    │
//! │  the sum is exact, so any mismatch is a real consistency violation.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ecofraldas_core::money::Money;
//!
//! let price = Money::from_cents(8990); // $89.90
//! let line = price.multiply_quantity(2);
//! assert_eq!(line.cents(), 17980);
//!
//! let total: Money = [line, Money::from_cents(500)].into_iter().sum();
//! assert_eq!(total.to_string(), "$184.80");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// Signed so that differences (e.g. persisted minus computed total) can be
/// represented, even though prices and totals are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use ecofraldas_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(8990).cents(), 8990);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Like [`Money::multiply_quantity`] but returns `None` on overflow.
    ///
    /// ```rust
    /// use ecofraldas_core::money::Money;
    ///
    /// assert!(Money::from_cents(i64::MAX).checked_multiply_quantity(2).is_none());
    /// ```
    #[inline]
    pub fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        self.0.checked_mul(qty).map(Money)
    }

    /// Addition that returns `None` on overflow.
    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Self> {
        self.0.checked_add(other.0).map(Money)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly display: `$89.90`. Localized formatting belongs to the
/// storefront.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}${}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
