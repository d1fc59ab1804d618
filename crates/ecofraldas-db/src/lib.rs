//! # ecofraldas-db: Persistence and Consistency Engine
//!
//! The order / cart / inventory engine of the EcoFraldas store, on SQLite
//! through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EcoFraldas Data Flow                             │
//! │                                                                         │
//! │  HTTP adapter (auth, DTOs, ownership checks)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  ecofraldas-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ Ledger        │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ Cart / Order  │    │ 001_core     │  │   │
//! │  │   │ RetryPolicy   │    │ Checkout      │    │ _schema.sql  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`config`] - Environment-driven store settings
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`retry`] - Whole-transaction retry on lost races
//! - [`repository`] - Ledger, cart, order, checkout and collaborators
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ecofraldas_db::{Database, DbConfig};
//! use ecofraldas_core::PaymentType;
//!
//! let db = Database::new(DbConfig::new("ecofraldas.db")).await?;
//!
//! let order = db.orders().create_for_client(&client_id).await?;
//! db.orders().add_product(&order.id, &product_id, 20, PaymentType::Card).await?;
//! let checkout = db.checkouts().process(&order.id, "123 Main St", PaymentType::Card).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod retry;

#[cfg(test)]
pub(crate) mod test_utils;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, StoreConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use retry::RetryPolicy;

// Repository re-exports for convenience
pub use repository::cart::CartRepository;
pub use repository::catalog::ProductCatalog;
pub use repository::checkout::CheckoutRepository;
pub use repository::client::ClientDirectory;
pub use repository::order::OrderRepository;
pub use repository::ownership::OwnershipLookup;
pub use repository::stock::InventoryLedger;
