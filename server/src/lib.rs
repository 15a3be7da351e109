//! The control-server daemon: accepts connections on a UNIX domain socket,
//! performs the hello handshake, and drives each connection with the
//! processor matching its negotiated mode.
//!
//! This crate is the whole IPC core from `spec.md`: framing and the wire
//! codec live in `dcs-protocol` below it; everything here is socket
//! plumbing, the command dispatcher, the object-model lock, and the
//! subscription fanout. RRF transport and HTTP serving are represented only
//! as the [`code_channel::CodePipeline`] trait and the endpoint registry —
//! both out of scope for this workspace per `spec.md` §1.

pub mod auth;
pub mod code_channel;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod endpoint_socket;
pub mod error;
pub mod fanout;
pub mod gcode;
pub mod handshake;
pub mod intercept;
pub mod model;
pub mod model_lock;
pub mod processors;
pub mod state;

use std::sync::Arc;

use serde_json::Value;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::code_channel::CodePipeline;
use crate::config::Config;
use crate::state::AppState;

/// Bind the configured socket and accept connections until `shutdown` fires.
/// Each accepted connection runs its handshake and processor loop on its own
/// spawned task; `serve` itself only drives the accept loop.
pub async fn serve(
    config: Config,
    pipeline: Arc<dyn CodePipeline>,
    initial_model: Value,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let state = AppState::new(config, pipeline, initial_model);
    serve_with_state(state, shutdown).await
}

/// Same as [`serve`], but takes an already-constructed [`AppState`] —
/// the shape integration tests use to share one state across assertions
/// made from outside the socket (e.g. polling `state.current_model()`).
pub async fn serve_with_state(state: AppState, shutdown: CancellationToken) -> std::io::Result<()> {
    let socket_path = state.config.socket_path.clone();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(&socket_path)?;
    info!(path = %socket_path.display(), "control server listening");

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                info!("shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => {
                let (stream, _addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let state = state.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Some(handshaked) = handshake::perform(stream, &state, &shutdown).await {
                        processors::run(handshaked, state).await;
                    }
                });
            }
        }
    }

    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}
