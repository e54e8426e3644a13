mod api;
mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use boardsight_core::config::{AppConfig, LoadOptions};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use boardsight_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the loaded config, so load first and bootstrap from the same value.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    let stop_accepting = CancellationToken::new();
    let in_flight = CancellationToken::new();
    tokio::spawn(watch_shutdown(
        stop_accepting.clone(),
        in_flight.clone(),
        Duration::from_secs(app.config.server.graceful_shutdown_secs),
    ));

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "boardsight-server listening"
    );

    let router = api::router(app.agent_runtime, in_flight);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { stop_accepting.cancelled().await })
        .await?;

    tracing::info!(event_name = "system.server.stopped", correlation_id = "shutdown", "boardsight-server stopped");
    Ok(())
}

/// Stops accepting connections on the first signal, then cancels in-flight requests once
/// the grace period runs out.
async fn watch_shutdown(stop_accepting: CancellationToken, in_flight: CancellationToken, grace: Duration) {
    if let Err(error) = wait_for_signal().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for shutdown signals"
        );
        return;
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "boardsight-server stopping"
    );
    stop_accepting.cancel();
    tokio::time::sleep(grace).await;
    in_flight.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
