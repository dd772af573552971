//! DevDuo Console Gateway: operator dashboard over HTTP.
//! Sled record store, allowlist identity, live listings kept current by change notifications.
//! One console session is shared by every HTTP client (single-operator wiring).

mod routes;
mod seed;

use devduo_core::{AllowlistIdentityProvider, Console, ConsoleConfig, IdentityProvider, RecordStore, SledRecordStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConsoleConfig::load()?;
    tracing::info!(
        "[SYSTEM] {} v{} starting ({} operator address(es) on the allowlist)",
        config.app_name,
        devduo_core::version(),
        config.admin_emails.len()
    );

    let store = Arc::new(SledRecordStore::open(Some(&config.storage_path))?);
    if config.seed_demo {
        seed::seed_if_empty(&store).await?;
    }
    let identity = Arc::new(AllowlistIdentityProvider::new(&config.admin_emails));

    let identity_dyn: Arc<dyn IdentityProvider> = identity.clone();
    let store_dyn: Arc<dyn RecordStore> = store.clone();
    let console = Console::start(
        identity_dyn,
        store_dyn,
        config.dashboard_options(),
        config.public_root.clone(),
    );

    let state = Arc::new(routes::AppState {
        console: console.handle(),
        identity,
        store: Arc::clone(&store),
        public_root: config.public_root.clone(),
    });
    let app = routes::router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("[SYSTEM] Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("[SYSTEM] Shutdown requested");
        })
        .await?;

    console.shutdown();
    store.flush()?;
    Ok(())
}
