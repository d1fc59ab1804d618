//! # Repository Module
//!
//! The engine's components, one per file, all over the same SQLite pool.
//!
//! ## Component Graph
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   CheckoutRepository ──► OrderRepository ──► CartRepository             │
//! │          │                      │                  │                    │
//! │          │                      │                  ▼                    │
//! │          │                      └──────────► InventoryLedger            │
//! │          │                                         │                    │
//! │          ▼                                         ▼                    │
//! │   ┌────────────────────── one SQLite transaction ───────────────────┐  │
//! │   │  Calls between components pass the caller's connection          │  │
//! │   │  (`*_in(&mut SqliteConnection, ..)`) so they commit together.   │  │
//! │   └─────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │   ProductCatalog / ClientDirectory: collaborator lookups               │
//! │   OwnershipLookup: read-only, for the authorization layer              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`InventoryLedger`](stock::InventoryLedger) - Stock per product, reserve / release
//! - [`CartRepository`](cart::CartRepository) - Cart lines coupled to reservations
//! - [`OrderRepository`](order::OrderRepository) - Order aggregate and lifecycle
//! - [`CheckoutRepository`](checkout::CheckoutRepository) - Checkout and payment status
//! - [`ProductCatalog`](catalog::ProductCatalog) - Product lookups
//! - [`ClientDirectory`](client::ClientDirectory) - Client existence
//! - [`OwnershipLookup`](ownership::OwnershipLookup) - Who owns what

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod client;
pub mod order;
pub mod ownership;
pub mod stock;
