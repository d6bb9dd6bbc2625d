//! tidemark - periodic ingestion runner.
//!
//! Loads configuration, opens the relational store and the blob backend, and
//! triggers an ingestion run on a fixed interval.

use std::sync::Arc;
use tidemark::config::Config;
use tidemark::db::Database;
use tidemark::ingest::IngestContext;
use tidemark::providers::ProviderRegistry;
use tidemark::store::FsBlobStore;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tidemark=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        db = %config.db_path.display(),
        blob_dir = %config.blob_dir.display(),
        interval_secs = config.fetch_interval.as_secs(),
        "Loaded configuration"
    );

    let db = Database::open(&config.db_path)?;
    let blobs = Arc::new(FsBlobStore::new(config.blob_dir.clone()));
    let providers = ProviderRegistry::live(&config);
    let ctx = IngestContext::new(&config, db, blobs, providers);

    let mut ticker = tokio::time::interval(config.fetch_interval);
    loop {
        ticker.tick().await;
        match ctx.run_ingestion().await {
            Ok(result) => info!(
                processed_accounts = result.processed_accounts,
                updated_users = result.updated_users.len(),
                failed_accounts = result.failed_accounts.len(),
                timelines_generated = result.timelines_generated,
                "Ingestion run complete"
            ),
            Err(e) => error!(error = %e, "Ingestion run failed"),
        }
    }
}
