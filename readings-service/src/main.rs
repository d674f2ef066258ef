use anyhow::Result;
use readings_service::{
    auth::PrivilegedUsers,
    config::AppConfig,
    http::{self, AppState},
    ledger::ReadingLedger,
    metrics_server, observability,
    photos::{FsPhotoStore, PhotoStore},
    registry::MeterRegistry,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pool = meter_ledger::db::connect(&cfg.database.path, cfg.database.max_connections).await?;
    meter_ledger::db::init_schema(&pool).await?;

    let photos: Arc<dyn PhotoStore> = Arc::new(FsPhotoStore::new(&cfg.storage.upload_dir)?);
    let delete_policy = Arc::new(PrivilegedUsers::from_config(&cfg.auth));

    let registry = MeterRegistry::new(pool.clone());
    let ledger = Arc::new(ReadingLedger::new(
        pool,
        registry.clone(),
        photos.clone(),
        delete_policy,
    ));

    let app = http::router(
        AppState {
            registry,
            ledger,
            photos,
        },
        cfg.storage.max_upload_bytes,
    );

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind_addr).await?;
    tracing::info!(addr = %cfg.server.bind_addr, "energy tracker listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
