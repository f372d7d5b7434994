use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use parley_api::auth::{AppState, AppStateInner};
use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;
use parley_server::{ServerConfig, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "parley_server=debug,parley_api=debug,parley_db=debug,parley_gateway=debug,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let db = Database::open(&PathBuf::from(&config.db_path))?;
    let dispatcher = Dispatcher::new();

    let state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher,
        config: config.auth.clone(),
    });

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
