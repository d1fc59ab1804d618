//! Shared fixtures for the repository tests.

use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ecofraldas_core::{Client, NewProduct, Product};

use crate::pool::{Database, DbConfig};

pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Fresh migrated in-memory database.
pub(crate) async fn test_db() -> Database {
    init_test_tracing();
    Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database")
}

/// File-backed WAL database with several connections and the default retry
/// policy, for tests that need real concurrent writers. Call
/// [`remove_db_files`] when done.
pub(crate) async fn file_db(max_connections: u32) -> (Database, PathBuf) {
    init_test_tracing();
    let path = std::env::temp_dir().join(format!("ecofraldas-{}.db", Uuid::new_v4()));

    let config = DbConfig::new(&path).max_connections(max_connections);

    let db = Database::new(config).await.expect("file database");
    (db, path)
}

pub(crate) fn remove_db_files(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let _ = std::fs::remove_file(file);
    }
}

pub(crate) async fn seed_client(db: &Database) -> Client {
    let tag = Uuid::new_v4().simple().to_string();
    db.clients()
        .insert("Cliente Teste", &format!("cliente-{tag}@ecofraldas.test"))
        .await
        .expect("seed client")
}

pub(crate) async fn seed_product(db: &Database, unit_price_cents: i64, stock: i64) -> Product {
    insert_product(db, None, unit_price_cents, stock).await
}

pub(crate) async fn seed_affiliate_product(
    db: &Database,
    affiliate_id: &str,
    unit_price_cents: i64,
    stock: i64,
) -> Product {
    insert_product(db, Some(affiliate_id), unit_price_cents, stock).await
}

async fn insert_product(
    db: &Database,
    affiliate_id: Option<&str>,
    unit_price_cents: i64,
    stock: i64,
) -> Product {
    let new_product = NewProduct {
        name: "Fralda Ecológica Teste".to_string(),
        unit_price_cents,
        affiliate_id: affiliate_id.map(str::to_string),
    };
    db.catalog()
        .insert(&new_product, stock)
        .await
        .expect("seed product")
}
