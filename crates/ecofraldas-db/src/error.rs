//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  CoreError (NotFound, InsufficientStock, InvalidState, ...)            │
//! │       │  carried unchanged in DbError::Domain                           │
//! │       ▼                                                                 │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │  categorized: busy/snapshot → Conflict, UNIQUE → Unique...     │
//! │       ▼                                                                 │
//! │  DbError (this module)                                                 │
//! │       │                                                                 │
//! │       ├── is_retryable()? ──► retry::with_retry re-runs the operation  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller (HTTP adapter maps to status codes)                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ecofraldas_core::{CoreError, Entity, ValidationError};
use thiserror::Error;

/// SQLite primary / extended result codes that mean "another writer got
/// there first": SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_RECOVERY,
/// SQLITE_BUSY_SNAPSHOT.
const SQLITE_CONTENTION_CODES: &[&str] = &["5", "6", "261", "517"];

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Domain error raised by a component (not found, insufficient stock,
    /// invalid state, consistency violation). Passed through untouched.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Second checkout row for the same order
    /// - Second OPEN order for the same client
    /// - Duplicate client email
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// SQLite refused the write because a concurrent transaction holds or
    /// invalidated the write lock. Retryable.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        DbError::Domain(CoreError::not_found(entity, id))
    }

    /// Creates an InvalidState error.
    pub fn invalid_state(entity: Entity, id: impl Into<String>, reason: impl Into<String>) -> Self {
        DbError::Domain(CoreError::invalid_state(entity, id, reason))
    }

    /// Whether re-running the whole transaction may succeed.
    ///
    /// True for SQLite write contention and for domain consistency
    /// violations (a lost optimistic race). Everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::Conflict(_) => true,
            DbError::Domain(core) => core.is_retryable(),
            _ => false,
        }
    }

    /// Returns the wrapped domain error, if any.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            DbError::Domain(core) => Some(core),
            _ => None,
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound         → DbError::QueryFailed (callers use fetch_optional)
/// Database, busy/locked code       → DbError::Conflict
/// Database, UNIQUE                 → DbError::UniqueViolation
/// Database, FOREIGN KEY            → DbError::ForeignKeyViolation
/// Database, CHECK                  → CoreError::ConsistencyViolation
/// sqlx::Error::PoolTimedOut        → DbError::PoolExhausted
/// Other                            → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::QueryFailed("expected a row, found none".to_string()),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();
                let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();

                if SQLITE_CONTENTION_CODES.contains(&code.as_str())
                    || msg.contains("database is locked")
                {
                    DbError::Conflict(msg)
                } else if db_err.is_unique_violation() {
                    // "UNIQUE constraint failed: <table>.<column>"
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation { message: msg }
                } else if db_err.is_check_violation() {
                    DbError::Domain(CoreError::ConsistencyViolation(msg))
                } else {
                    DbError::QueryFailed(msg)
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================
