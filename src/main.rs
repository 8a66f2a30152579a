use std::sync::Arc;

use anyhow::Context;
use streamchat::{app, config::Config, store::SqliteStore, AppState};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let store = SqliteStore::connect(&config.database_url)
        .await
        .context("open message store")?;
    let app_state = AppState::new(config.clone(), Arc::new(store)).map_err(|err| err.0)?;

    if let Some(every) = config.room_reap_interval {
        Arc::clone(&app_state.hub).spawn_reaper(every, config.room_idle_timeout);
    }

    let listener = TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("bind {}", config.server_addr))?;
    info!(addr = %config.server_addr, "chat server starting");

    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("chat server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
