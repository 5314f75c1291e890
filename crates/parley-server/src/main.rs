use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parley=info")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    ensure_data_dir(&config.database.url);

    let db = parley_db::create_pool(&config.database.url, config.database.max_connections).await?;
    parley_db::run_migrations(&db).await?;

    let state = parley_core::AppState::new(
        db,
        parley_core::AppConfig {
            server_name: config.server.server_name.clone(),
            database_url: config.database.url.clone(),
            ring_timeout: Duration::from_secs(config.calls.ring_timeout_seconds),
        },
    );
    let shutdown_notify = state.shutdown.clone();

    let app = parley_ws::gateway_router().with_state(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        server_name = %config.server.server_name,
        bind_address = %config.server.bind_address,
        database_url = %config.database.url,
        ring_timeout_seconds = config.calls.ring_timeout_seconds,
        "parley coordinator listening"
    );

    let shutdown_signal = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down (ctrl-c)...");
            }
            _ = shutdown_notify.notified() => {
                tracing::info!("Shutting down (requested)...");
            }
        }
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// Create the sqlite data directory up front so the first connection does
/// not fail on a missing path.
fn ensure_data_dir(database_url: &str) {
    if let Some(path) = database_url
        .strip_prefix("sqlite://")
        .map(|rest| rest.split('?').next().unwrap_or(rest))
    {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Could not create data directory '{}': {err}", parent.display());
                }
            }
        }
    }
}
