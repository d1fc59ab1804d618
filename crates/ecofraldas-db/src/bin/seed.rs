//! # Seed Data Loader
//!
//! Populates a development database with a sample client and an
//! affiliate's eco-diaper line, stock included.
//!
//! ## Usage
//! ```bash
//! # Use ECOFRALDAS_DB_PATH (default: ./ecofraldas.db)
//! cargo run -p ecofraldas-db --bin seed
//!
//! # Specify database path
//! cargo run -p ecofraldas-db --bin seed -- --db ./data/ecofraldas.db
//! ```
//!
//! Running it twice is harmless: if the sample affiliate already has
//! products, nothing is inserted.

use std::env;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ecofraldas_core::NewProduct;
use ecofraldas_db::{Database, StoreConfig};

const SAMPLE_AFFILIATE_ID: &str = "afiliado-exemplo";

/// (name, price in cents, initial stock)
const PRODUCTS: &[(&str, i64, i64)] = &[
    ("Fralda Ecológica Infantil P", 8_990, 50),
    ("Fralda Ecológica Infantil M", 9_990, 40),
    ("Fralda Ecológica Infantil G", 10_990, 30),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = StoreConfig::load()?;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.db_path = args[i + 1].clone().into();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("EcoFraldas Seed Data Loader");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: $ECOFRALDAS_DB_PATH or ./ecofraldas.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    info!(config = %serde_json::to_string(&config)?, "Store configuration loaded");
    info!(path = %config.db_path.display(), "Seeding database");
    let db = Database::new(config.db_config()).await?;

    let catalog = db.catalog();
    if !catalog.list_by_affiliate(SAMPLE_AFFILIATE_ID).await?.is_empty() {
        info!("Sample data already present, skipping");
        db.close().await;
        return Ok(());
    }

    let client = db
        .clients()
        .insert("Cliente Exemplo", "cliente@ecofraldas.com")
        .await?;
    info!(client_id = %client.id, "Sample client created");

    for (name, unit_price_cents, stock) in PRODUCTS {
        let product = catalog
            .insert(
                &NewProduct {
                    name: name.to_string(),
                    unit_price_cents: *unit_price_cents,
                    affiliate_id: Some(SAMPLE_AFFILIATE_ID.to_string()),
                },
                *stock,
            )
            .await?;
        info!(product_id = %product.id, name = %name, stock, "Product created");
    }

    db.close().await;
    info!("Seed complete");
    Ok(())
}
