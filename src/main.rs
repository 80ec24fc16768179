use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use visitlog::analytics::{GeoLocator, VisitorService};
use visitlog::api;
use visitlog::config::Config;
use visitlog::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let executor = storage::connect(&config.database).await?;

    info!("Initializing database...");
    executor.init().await?;
    info!("Database initialized successfully");

    let locator = GeoLocator::new(config.analytics.geoip_city_db_path.as_deref())?;
    if locator.is_enabled() {
        info!("GeoIP lookups enabled");
    } else {
        info!("GeoIP database not configured, visits get placeholder locations");
    }

    let service = Arc::new(
        VisitorService::new(Arc::clone(&executor), config.cache.clone()).with_locator(locator),
    );

    let api_router = api::create_api_router(service);

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("🚀 API server listening on http://{}", api_addr);
    info!("   - Visitor endpoints available at http://{}/api/visitors", api_addr);

    axum::serve(api_listener, api_router).await?;

    Ok(())
}
