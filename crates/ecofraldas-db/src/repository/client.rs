//! # Client Directory
//!
//! The directory collaborator. Orders only need to know that a client
//! exists.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use ecofraldas_core::{Client, ValidationError};

use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct ClientDirectory {
    pool: SqlitePool,
}

impl ClientDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        ClientDirectory { pool }
    }

    /// Registers a client. A duplicate email is a `UniqueViolation`.
    pub async fn insert(&self, name: &str, email: &str) -> DbResult<Client> {
        for (field, value) in [("name", name), ("email", email)] {
            if value.trim().is_empty() {
                return Err(ValidationError::Required {
                    field: field.to_string(),
                }
                .into());
            }
        }

        let client = Client {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            email: email.trim().to_ascii_lowercase(),
            created_at: Utc::now(),
        };

        debug!(id = %client.id, "Inserting client");

        sqlx::query("INSERT INTO clients (id, name, email, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&client.id)
            .bind(&client.name)
            .bind(&client.email)
            .bind(client.created_at)
            .execute(&self.pool)
            .await?;

        Ok(client)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Client>> {
        let client = sqlx::query_as::<_, Client>(
            "SELECT id, name, email, created_at FROM clients WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    pub async fn exists(&self, id: &str) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        exists_in(&mut conn, id).await
    }
}

pub(crate) async fn exists_in(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM clients WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(found.is_some())
}

// =============================================================================
// Unit Tests
// =============================================================================
