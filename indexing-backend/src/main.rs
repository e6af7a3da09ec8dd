use anyhow::{Context, Result};
use indexing_backend::api::{create_router, ApiState};
use indexing_backend::scheduler::IndexingScheduler;
use indexing_backend::store::CatalogStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "indexing_backend=info".into()),
        )
        .init();

    info!("Indexing backend starting...");

    // Read configuration from environment
    let db_path = std::env::var("INDEXING_DB").unwrap_or_else(|_| "indexing.db".to_string());

    let api_port: u16 = std::env::var("INDEXING_API_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .context("INDEXING_API_PORT must be a valid port number")?;

    let tick_secs: u64 = std::env::var("INDEXING_TICK_SECS")
        .unwrap_or_else(|_| "5".to_string())
        .parse()
        .context("INDEXING_TICK_SECS must be a number of seconds")?;

    info!(
        db_path = %db_path,
        api_port = api_port,
        tick_secs = tick_secs,
        "Configuration loaded"
    );

    let store = Arc::new(CatalogStore::new(&db_path).context("Failed to initialize catalog")?);
    info!("Catalog store initialized");

    let scheduler = Arc::new(IndexingScheduler::new(Arc::clone(&store)));
    scheduler.start(Duration::from_secs(tick_secs.max(1)));

    let router = create_router(ApiState {
        store,
        scheduler: Arc::clone(&scheduler),
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", api_port))
        .await
        .context("Failed to bind API port")?;
    info!(port = api_port, "Management API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Management API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    scheduler.shutdown();
    info!("Indexing backend stopped");

    Ok(())
}
