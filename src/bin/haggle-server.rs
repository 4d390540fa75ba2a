//! Haggle server
//!
//! Serves the live negotiation channel (`/ws`) and the HTTP fallback API.

use anyhow::Context;
use clap::Parser;
use haggle::auth::StaticIdentityProvider;
use haggle::hub::Hub;
use haggle::outbox::Outbox;
use haggle::storage::{Property, Settings, Store};
use haggle::transport::Server;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "haggle-server", about = "Real-time property inquiry negotiation server")]
struct Args {
    /// Settings file (JSON); defaults are used when it does not exist
    #[arg(short, long, default_value = "haggle.json")]
    config: PathBuf,

    /// Override the listen address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Override the SQLite database path
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    haggle::init();
    let args = Args::parse();

    let mut settings = Settings::load(&args.config)
        .with_context(|| format!("Failed to load settings from {}", args.config.display()))?;
    if let Some(bind) = args.bind {
        settings.server.bind_addr = bind.to_string();
    }
    if let Some(database) = args.database {
        settings.server.database_path = database.display().to_string();
    }

    let store = Arc::new(
        Store::new(&settings.server.database_path)
            .with_context(|| format!("Failed to open database {}", settings.server.database_path))?,
    );
    let outbox = Arc::new(
        Outbox::new_with_path(&settings.server.database_path)
            .context("Failed to open notification outbox")?
            .with_settings(&settings.outbox),
    );

    let mut seeded = 0;
    for seed in &settings.properties {
        if store.load_property(seed.id)?.is_none() {
            store.save_property(&Property::available(seed.id, seed.owner_id, seed.listed_price))?;
            seeded += 1;
        }
    }
    if seeded > 0 {
        info!("Seeded {} properties into the catalog", seeded);
    }
    if settings.identities.is_empty() {
        warn!("No identities configured; every request will be rejected as unauthorized");
    }

    let identities = Arc::new(StaticIdentityProvider::new(&settings.identities));
    let hub = Arc::new(Hub::new(
        settings.server.clone(),
        store.clone(),
        store,
        outbox,
        identities,
    ));

    let addr: SocketAddr = settings
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address {}", settings.server.bind_addr))?;

    let mut server = Server::new(hub);
    let local_addr = server.start(addr).await?;
    info!("Haggle server ready on http://{}", local_addr);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    server.shutdown();

    Ok(())
}
