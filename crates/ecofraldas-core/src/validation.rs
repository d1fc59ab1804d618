//! # Validation Module
//!
//! Input checks run before a transaction touches the ledger or an order.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: HTTP adapter (outside this workspace)                         │
//! │  └── Deserialization, auth, ownership                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Quantities, addresses, cart size                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                        │
//! │  ├── CHECK (quantity >= 0) on stock_entries                            │
//! │  ├── UNIQUE (order_id) on checkouts                                    │
//! │  └── Foreign keys                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ecofraldas_core::validation::{validate_quantity, validate_shipping_address};
//!
//! validate_quantity(20).unwrap();
//! validate_shipping_address("123 Main St").unwrap();
//! assert!(validate_quantity(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::{MAX_CART_LINES, MAX_ITEM_QUANTITY, MAX_SHIPPING_ADDRESS_LEN, MAX_UNIT_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a cart line quantity or a reservation amount.
///
/// ## Rules
/// - Must be positive
/// - Must not exceed `MAX_ITEM_QUANTITY` (999)
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an administrative stock level. Zero is allowed.
pub fn validate_stock_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 0 {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a restock / release amount: positive, otherwise unbounded.
pub fn validate_restock_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates a shipping address.
///
/// ## Rules
/// - Must not be blank
/// - At most `MAX_SHIPPING_ADDRESS_LEN` characters after trimming
pub fn validate_shipping_address(address: &str) -> ValidationResult<()> {
    let address = address.trim();

    if address.is_empty() {
        return Err(ValidationError::Required {
            field: "shipping_address".to_string(),
        });
    }

    if address.chars().count() > MAX_SHIPPING_ADDRESS_LEN {
        return Err(ValidationError::TooLong {
            field: "shipping_address".to_string(),
            max: MAX_SHIPPING_ADDRESS_LEN,
        });
    }

    Ok(())
}

/// Validates that one more line fits in a cart holding `current_lines`.
pub fn validate_cart_size(current_lines: usize) -> ValidationResult<()> {
    if current_lines >= MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "cart_lines".to_string(),
            min: 0,
            max: MAX_CART_LINES as i64,
        });
    }
    Ok(())
}

/// Validates an identifier passed in from the outside.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a catalog price in cents.
///
/// ## Rules
/// - Must be positive
/// - Must not exceed `MAX_UNIT_PRICE_CENTS`
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "unit_price_cents".to_string(),
        });
    }

    if cents > MAX_UNIT_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "unit_price_cents".to_string(),
            min: 1,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
