mod api;
mod config;
mod display;
mod monitor;
mod query;
mod store;
mod store_manager;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use shared::types::PollSnapshot;
use crate::config::Config;
use crate::display::discord::DiscordDisplay;
use crate::monitor::poller::PollSettings;
use crate::monitor::{Monitor, MonitorHandle};
use crate::query::a2s::A2sQuery;
use crate::store::document::TomlFile;
use crate::store::Store;
use crate::store_manager::StoreHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("server_monitord=info"))
        )
        .init();

    tracing::info!("Starting server-monitord");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/server-monitor/monitord.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Load the persisted servers and watch groups
    let mut file = TomlFile::new(&config.store.path);
    let document = file.load_or_init()?;
    tracing::info!(
        "Loaded {} server(s) and {} watch group(s) from {}",
        document.servers.len(),
        document.active_messages.len(),
        file.path().display()
    );

    let store = StoreHandle::spawn(Store::new(document, Box::new(file)));

    let (status_tx, status_rx) = watch::channel(PollSnapshot::default());
    let (monitor_handle, commands) = MonitorHandle::channel();

    let monitor = Monitor::new(
        store.clone(),
        A2sQuery,
        DiscordDisplay::new(&config.discord),
        PollSettings {
            timeout: config.monitor.query_timeout(),
            concurrency: config.monitor.max_concurrent_queries,
        },
        status_tx,
    );

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn monitor task
    let monitor_cancel = cancel.clone();
    let interval = config.monitor.interval();
    let mut monitor_task = tokio::spawn(monitor::run(monitor, commands, interval, monitor_cancel));

    // Build API router
    let app_state = api::routes::AppState {
        store: store.clone(),
        monitor: monitor_handle,
        status_rx,
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Run until ctrl-c, or until the monitor stops on its own
    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            tracing::info!("Shutdown signal received");
            cancel.cancel();
            (&mut monitor_task).await
        }
        result = &mut monitor_task => {
            cancel.cancel();
            result
        }
    };

    let _ = server_handle.await;

    // Flush and stop the store thread
    if let Err(e) = store.shutdown().await {
        tracing::error!("Failed to shutdown store: {}", e);
    }

    match outcome {
        Ok(Ok(())) => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::error!("Monitor failed: {:#}", e);
            Err(e)
        }
        Err(e) => Err(e).context("Monitor task panicked"),
    }
}
