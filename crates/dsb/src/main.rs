use std::sync::Arc;

use anyhow::Context;

use dsb_core::{
    config::{Config, StoreKind},
    ports::HostingPort,
    store::{FileStore, MemoryFileStore},
};
use dsb_dropbox::DropboxClient;
use dsb_postgres::PgFileStore;

mod health;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dsb_core::logging::init("dsb")?;

    let cfg = Arc::new(Config::load()?);

    let store = open_store(&cfg).await?;
    store
        .init_schema()
        .await
        .context("failed to initialize store schema")?;

    let hosting: Arc<dyn HostingPort> = Arc::new(DropboxClient::new(
        cfg.dropbox_token.clone(),
        cfg.download_timeout,
    )?);

    let port = cfg.port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(port).await {
            tracing::error!(error = %e, "health endpoint stopped");
        }
    });

    dsb_telegram::router::run_polling(cfg, store, hosting)
        .await
        .context("telegram bot failed")?;

    Ok(())
}

async fn open_store(cfg: &Config) -> anyhow::Result<Arc<dyn FileStore>> {
    match cfg.store_kind {
        StoreKind::Postgres => {
            let url = cfg
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres store")?;
            let store = PgFileStore::connect(url, cfg.db_max_connections)
                .await
                .context("failed to connect to database")?;
            tracing::info!("using postgres store");
            Ok(Arc::new(store))
        }
        StoreKind::Memory => {
            tracing::warn!("using in-memory store; indexed data is lost on restart");
            Ok(Arc::new(MemoryFileStore::new()))
        }
    }
}
