use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use registrar::api::router;
use registrar::config::{Config, StoreBackend};
use registrar::db::{EntityStore, MemoryStore, SqliteStore};
use registrar::services::seed_demo_data;
use registrar::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "registrar=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::new_from_env()?;

    let store: Arc<dyn EntityStore> = match config.store_backend {
        StoreBackend::Sqlite => {
            info!("using sqlite store at {}", config.database_url);
            Arc::new(SqliteStore::connect(&config.database_url, config.db_max_connections).await?)
        }
        StoreBackend::Memory => {
            info!("using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    if config.seed_demo_data {
        seed_demo_data(store.as_ref()).await?;
    }

    let app = router(AppState::new(store));

    let addr = config.bind_addr();
    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
