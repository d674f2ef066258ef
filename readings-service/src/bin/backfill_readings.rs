use anyhow::{bail, Result};
use readings_service::{
    auth::PrivilegedUsers,
    backfill,
    config::AppConfig,
    ledger::ReadingLedger,
    observability,
    photos::{FsPhotoStore, PhotoStore},
    registry::MeterRegistry,
};
use std::{env, path::Path, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_readings <csv_file_path>");
    }
    let file_path = &args[1];

    // Load configuration (can point ENERGY_TRACKER_CONFIG to an import-specific file).
    let cfg = AppConfig::load()?;

    let pool = meter_ledger::db::connect(&cfg.database.path, cfg.database.max_connections).await?;
    meter_ledger::db::init_schema(&pool).await?;

    let photos: Arc<dyn PhotoStore> = Arc::new(FsPhotoStore::new(&cfg.storage.upload_dir)?);
    let registry = MeterRegistry::new(pool.clone());
    let ledger = ReadingLedger::new(
        pool,
        registry,
        photos,
        Arc::new(PrivilegedUsers::from_config(&cfg.auth)),
    );

    let summary = backfill::run(&ledger, Path::new(file_path)).await?;
    tracing::info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        "backfill finished"
    );

    Ok(())
}
