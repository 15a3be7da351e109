pub mod command;
pub mod http_endpoint;
pub mod intercept;
pub mod subscribe;

use dcs_protocol::Mode;
use tracing::{info_span, Instrument};

use crate::handshake::Handshaked;
use crate::state::AppState;

/// Drive a handshaked connection with the processor matching its declared
/// mode until the processor reports the connection is done (clean EOF,
/// protocol fault, or cancellation), then force-release whatever
/// connection-scoped resources it still held — the object-model lock above
/// all, since a processor bug must never leave the daemon permanently
/// locked.
pub async fn run(handshaked: Handshaked, state: AppState) {
    let Handshaked { connection, client_hello } = handshaked;
    let connection_id = connection.id;
    let span = info_span!("connection", id = connection_id, peer_pid = connection.peer_pid, mode = ?connection.mode);

    async move {
        match connection.mode {
            Mode::Command => command::run(connection, state.clone()).await,
            Mode::Intercept => intercept::run(connection, client_hello, state.clone()).await,
            Mode::Subscribe => subscribe::run(connection, client_hello, state.clone()).await,
            Mode::PluginHttpEndpoint => http_endpoint::run(connection, client_hello, state.clone()).await,
            Mode::PluginService => {
                let mut connection = connection;
                while connection.recv_frame::<serde_json::Value>().await.unwrap_or(None).is_some() {}
            }
        }
    }
    .instrument(span)
    .await;

    state.model_lock.force_release(connection_id).await;
    state.fanout.unregister(connection_id).await;
    state.interceptors.unregister(connection_id).await;
    state.endpoints.write().await.remove(&connection_id);
}
