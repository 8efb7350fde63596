use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use prom_core::config::{data_dir_from_env_value, merge_order_from_env_value};
use prom_core::{Collection, CoreConfig, JsonFileStore};

/// Main entry point for the PROM backend
///
/// Resolves configuration once, makes sure every collection directory exists, then serves the
/// REST API.
///
/// # Environment Variables
/// - `PROM_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `PROM_DATA_DIR`: Directory for bundle storage (default: "prom_data")
/// - `PROM_MERGE_ORDER`: Comma-separated collection precedence for merged views
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prom=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("prom_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("PROM_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let data_dir = data_dir_from_env_value(std::env::var("PROM_DATA_DIR").ok());
    let merge_order = merge_order_from_env_value(std::env::var("PROM_MERGE_ORDER").ok())?;
    let cfg = Arc::new(CoreConfig::new(data_dir.clone(), merge_order)?);

    for collection in Collection::ALL {
        std::fs::create_dir_all(data_dir.join(collection.dir_name()))?;
    }

    tracing::info!("++ Starting PROM REST on {}", rest_addr);
    tracing::info!(
        "++ Bundle store at {} (merge order: {})",
        data_dir.display(),
        cfg.merge_order()
            .iter()
            .map(|c| c.dir_name())
            .collect::<Vec<_>>()
            .join(",")
    );

    let store = Arc::new(JsonFileStore::new(data_dir));
    let app = router(AppState::new(cfg, store));

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
