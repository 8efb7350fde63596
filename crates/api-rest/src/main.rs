//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `prom-run` binary serves the same
//! router and also checks the data directory layout before starting.

use api_rest::{router, AppState};
use prom_core::config::{data_dir_from_env_value, merge_order_from_env_value};
use prom_core::{CoreConfig, JsonFileStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("prom_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("PROM_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let data_dir = data_dir_from_env_value(std::env::var("PROM_DATA_DIR").ok());
    let merge_order = merge_order_from_env_value(std::env::var("PROM_MERGE_ORDER").ok())?;
    let cfg = Arc::new(CoreConfig::new(data_dir.clone(), merge_order)?);
    let store = Arc::new(JsonFileStore::new(data_dir.clone()));

    tracing::info!(
        "-- Starting PROM REST API on {} (data: {})",
        addr,
        data_dir.display()
    );

    let app = router(AppState::new(cfg, store));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
