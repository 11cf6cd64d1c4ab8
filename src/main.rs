//! Reelcollab server - collaboration requests and payment agreements between filmmakers

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelcollab::changes::ChangeFeed;
use reelcollab::config::Config;
use reelcollab::store::SqliteStore;
use reelcollab::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelcollab=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    let store = SqliteStore::connect(&config.database_url, config.max_connections).await?;
    store.migrate().await?;

    let state = AppState::new(
        store,
        ChangeFeed::new(config.change_feed_capacity),
        config.retry_policy(),
    );
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
