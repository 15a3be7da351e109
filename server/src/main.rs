use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use dcs_server::code_channel::LoopbackPipeline;
use dcs_server::config::Config;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let config_path = env::var("DCS_CONFIG").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/etc/dsf/dcs.toml"));
    let config = Config::load(&config_path).unwrap_or_else(|e| panic!("failed to load config: {e}"));

    info!(socket = %config.socket_path.display(), "starting control server");

    // No RRF transport is wired up in this workspace (`spec.md` §1's
    // non-goals); codes submitted before a real pipeline is plugged in just
    // complete immediately, so the IPC core can be exercised end-to-end on
    // its own.
    let pipeline = Arc::new(LoopbackPipeline);
    let shutdown = CancellationToken::new();

    let serve_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { dcs_server::serve(config, pipeline, serde_json::json!({}), shutdown).await })
    };

    shutdown_signal().await;
    shutdown.cancel();

    match serve_task.await {
        Ok(Ok(())) => info!("control server shut down cleanly"),
        Ok(Err(e)) => tracing::error!(error = %e, "control server exited with an error"),
        Err(e) => tracing::error!(error = %e, "control server task panicked"),
    }
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful
/// shutdown of the accept loop.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
